//! Integration tests for configuration loading

use dock_vision::domain::types::Point;
use dock_vision::infra::Config;
use dock_vision::services::Session;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[site]
warehouse = "WH042"
camera = "Camera07"

[staging]
corners = [[100.0, 200.0], [300.0, 100.0], [500.0, 250.0], [400.0, 600.0]]

[ingest]
port = 6000
max_frame_bytes = 1048576

[detector]
url = "http://detector:8080/detect"
min_confidence = 0.5

[sink]
url = "http://wms:5001/api"
timeout_ms = 3000
workers = 2

[tracking]
stale_after_ms = 5000
door_confirm_count = 3

[status]
port = 0

[metrics]
interval_secs = 15
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.warehouse(), "WH042");
    assert_eq!(config.camera(), "Camera07");
    assert_eq!(config.staging_corners()[1], Point::new(300.0, 100.0));
    assert_eq!(config.ingest_port(), 6000);
    assert_eq!(config.ingest_bind_address(), "0.0.0.0");
    assert_eq!(config.max_frame_bytes(), 1_048_576);
    assert_eq!(config.detector_url(), "http://detector:8080/detect");
    assert_eq!(config.detector_input_size(), 640);
    assert!((config.min_confidence() - 0.5).abs() < 1e-9);
    assert_eq!(config.sink_url(), "http://wms:5001/api");
    assert_eq!(config.sink_timeout_ms(), 3000);
    assert_eq!(config.sink_workers(), 2);
    assert_eq!(config.sink_queue_size(), 256);
    assert_eq!(config.tracking().stale_after_ms, 5000);
    assert_eq!(config.tracking().door_confirm_count, 3);
    assert_eq!(config.tracking().history_len, 10);
    assert_eq!(config.status_port(), 0);
    assert_eq!(config.metrics_interval_secs(), 15);
    assert!(Session::from_config(&config).is_ok());
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.warehouse(), "WH001");
    assert_eq!(config.camera(), "Camera01");
    assert_eq!(config.ingest_port(), 5000);
    assert_eq!(config.sink_url(), "http://127.0.0.1:5001/api/");
    assert_eq!(config.sink_timeout_ms(), 10_000);
    assert_eq!(config.config_file(), "default");
}

#[test]
fn test_malformed_file_is_an_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[site\nwarehouse = ").unwrap();
    temp_file.flush().unwrap();

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse config file"));
}

#[test]
fn test_misordered_corners_abort_session() {
    let mut temp_file = NamedTempFile::new().unwrap();
    // corner0 and corner1 swapped: the door edge no longer runs left to right
    temp_file
        .write_all(
            br#"
[staging]
corners = [[344.0, 110.0], [160.0, 240.0], [580.0, 260.0], [458.0, 638.0]]
"#,
        )
        .unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    assert!(Session::from_config(&config).is_err());
}
