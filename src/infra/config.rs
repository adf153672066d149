//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::types::Point;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Warehouse number reported as `WHNUM`
    #[serde(default = "default_warehouse")]
    pub warehouse: String,
    /// Camera identifier reported as `CameraNO`
    #[serde(default = "default_camera")]
    pub camera: String,
}

fn default_warehouse() -> String {
    "WH001".to_string()
}

fn default_camera() -> String {
    "Camera01".to_string()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { warehouse: default_warehouse(), camera: default_camera() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StagingConfig {
    /// corner0 (door-side near), corner1 (door-side far), corner2, corner3 as [x, y]
    #[serde(default = "default_corners")]
    pub corners: [[f64; 2]; 4],
}

fn default_corners() -> [[f64; 2]; 4] {
    [[160.0, 240.0], [344.0, 110.0], [580.0, 260.0], [458.0, 638.0]]
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self { corners: default_corners() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_ingest_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_ingest_port")]
    pub port: u16,
    /// Frames larger than this end the session
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

fn default_ingest_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_ingest_port() -> u16 {
    5000
}

fn default_max_frame_bytes() -> usize {
    8 * 1024 * 1024
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind_address: default_ingest_bind_address(),
            port: default_ingest_port(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_detector_url")]
    pub url: String,
    /// Square inference resolution requested from the detector
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    /// Detections below this confidence are discarded
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

fn default_detector_url() -> String {
    "http://127.0.0.1:8080/detect".to_string()
}

fn default_input_size() -> u32 {
    640
}

fn default_min_confidence() -> f64 {
    0.4
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            url: default_detector_url(),
            input_size: default_input_size(),
            min_confidence: default_min_confidence(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    /// Base URL; the event category is appended as the last path segment
    #[serde(default = "default_sink_url")]
    pub url: String,
    #[serde(default = "default_sink_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_sink_workers")]
    pub workers: usize,
    #[serde(default = "default_sink_queue_size")]
    pub queue_size: usize,
}

fn default_sink_url() -> String {
    "http://127.0.0.1:5001/api/".to_string()
}

fn default_sink_timeout_ms() -> u64 {
    10_000
}

fn default_sink_workers() -> usize {
    4
}

fn default_sink_queue_size() -> usize {
    256
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            url: default_sink_url(),
            timeout_ms: default_sink_timeout_ms(),
            workers: default_sink_workers(),
            queue_size: default_sink_queue_size(),
        }
    }
}

/// Gates and timeouts of the door tracker and pallet reconciler
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TrackingConfig {
    /// Nearest-neighbour gate for pallet candidate matching
    #[serde(default = "default_match_radius_px")]
    pub match_radius_px: f64,
    /// Unmatched records older than this are evicted
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    /// A full history within this radius of its oldest point is settled
    #[serde(default = "default_settle_deviation_px")]
    pub settle_deviation_px: f64,
    #[serde(default = "default_fixed_merge_radius_px")]
    pub fixed_merge_radius_px: f64,
    #[serde(default = "default_fixed_refresh_radius_px")]
    pub fixed_refresh_radius_px: f64,
    #[serde(default = "default_fixed_refresh_min_confidence")]
    pub fixed_refresh_min_confidence: f64,
    /// Fixed -> Moving identity hand-over window (exclusive on both ends)
    #[serde(default = "default_handoff_min_px")]
    pub handoff_min_px: f64,
    #[serde(default = "default_handoff_max_px")]
    pub handoff_max_px: f64,
    /// Identity adoption search radius
    #[serde(default = "default_donor_radius_px")]
    pub donor_radius_px: f64,
    /// Donors must have been idle at least this long
    #[serde(default = "default_donor_idle_ms")]
    pub donor_idle_ms: u64,
    /// Unidentified tracks adopt an identity once their history exceeds this
    #[serde(default = "default_donor_min_history")]
    pub donor_min_history: usize,
    #[serde(default = "default_door_search_radius_px")]
    pub door_search_radius_px: f64,
    /// Doors validate once their counter exceeds this value
    #[serde(default = "default_door_confirm_count")]
    pub door_confirm_count: u32,
    /// Unvalidated doors unseen for longer than this are dropped
    #[serde(default = "default_door_provisional_ms")]
    pub door_provisional_ms: u64,
}

fn default_match_radius_px() -> f64 {
    50.0
}

fn default_stale_after_ms() -> u64 {
    3000
}

fn default_history_len() -> usize {
    10
}

fn default_settle_deviation_px() -> f64 {
    5.0
}

fn default_fixed_merge_radius_px() -> f64 {
    5.0
}

fn default_fixed_refresh_radius_px() -> f64 {
    5.0
}

fn default_fixed_refresh_min_confidence() -> f64 {
    0.5
}

fn default_handoff_min_px() -> f64 {
    30.0
}

fn default_handoff_max_px() -> f64 {
    50.0
}

fn default_donor_radius_px() -> f64 {
    1000.0
}

fn default_donor_idle_ms() -> u64 {
    1000
}

fn default_donor_min_history() -> usize {
    5
}

fn default_door_search_radius_px() -> f64 {
    100.0
}

fn default_door_confirm_count() -> u32 {
    2
}

fn default_door_provisional_ms() -> u64 {
    3000
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            match_radius_px: default_match_radius_px(),
            stale_after_ms: default_stale_after_ms(),
            history_len: default_history_len(),
            settle_deviation_px: default_settle_deviation_px(),
            fixed_merge_radius_px: default_fixed_merge_radius_px(),
            fixed_refresh_radius_px: default_fixed_refresh_radius_px(),
            fixed_refresh_min_confidence: default_fixed_refresh_min_confidence(),
            handoff_min_px: default_handoff_min_px(),
            handoff_max_px: default_handoff_max_px(),
            donor_radius_px: default_donor_radius_px(),
            donor_idle_ms: default_donor_idle_ms(),
            donor_min_history: default_donor_min_history(),
            door_search_radius_px: default_door_search_radius_px(),
            door_confirm_count: default_door_confirm_count(),
            door_provisional_ms: default_door_provisional_ms(),
        }
    }
}

impl TrackingConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    pub fn donor_idle(&self) -> Duration {
        Duration::from_millis(self.donor_idle_ms)
    }

    pub fn door_provisional(&self) -> Duration {
        Duration::from_millis(self.door_provisional_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusConfig {
    /// Status/metrics HTTP port (0 to disable)
    #[serde(default = "default_status_port")]
    pub port: u16,
}

fn default_status_port() -> u16 {
    9090
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self { port: default_status_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    10
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    warehouse: String,
    camera: String,
    staging_corners: [Point; 4],
    ingest_bind_address: String,
    ingest_port: u16,
    max_frame_bytes: usize,
    detector_url: String,
    detector_input_size: u32,
    min_confidence: f64,
    sink_url: String,
    sink_timeout_ms: u64,
    sink_workers: usize,
    sink_queue_size: usize,
    tracking: TrackingConfig,
    status_port: u16,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            warehouse: toml_config.site.warehouse,
            camera: toml_config.site.camera,
            staging_corners: toml_config.staging.corners.map(Point::from),
            ingest_bind_address: toml_config.ingest.bind_address,
            ingest_port: toml_config.ingest.port,
            max_frame_bytes: toml_config.ingest.max_frame_bytes,
            detector_url: toml_config.detector.url,
            detector_input_size: toml_config.detector.input_size,
            min_confidence: toml_config.detector.min_confidence,
            sink_url: toml_config.sink.url,
            sink_timeout_ms: toml_config.sink.timeout_ms,
            sink_workers: toml_config.sink.workers,
            sink_queue_size: toml_config.sink.queue_size,
            tracking: toml_config.tracking,
            status_port: toml_config.status.port,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file,
        }
    }

    /// Determine config file path: explicit argument, then CONFIG_FILE, then the default
    pub fn resolve_config_path(explicit: Option<&str>) -> String {
        if let Some(path) = explicit {
            return path.to_string();
        }
        if let Ok(path) = std::env::var("CONFIG_FILE") {
            return path;
        }
        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn warehouse(&self) -> &str {
        &self.warehouse
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    pub fn staging_corners(&self) -> [Point; 4] {
        self.staging_corners
    }

    pub fn ingest_bind_address(&self) -> &str {
        &self.ingest_bind_address
    }

    pub fn ingest_port(&self) -> u16 {
        self.ingest_port
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    pub fn detector_url(&self) -> &str {
        &self.detector_url
    }

    pub fn detector_input_size(&self) -> u32 {
        self.detector_input_size
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    pub fn sink_url(&self) -> &str {
        &self.sink_url
    }

    pub fn sink_timeout_ms(&self) -> u64 {
        self.sink_timeout_ms
    }

    pub fn sink_workers(&self) -> usize {
        self.sink_workers
    }

    pub fn sink_queue_size(&self) -> usize {
        self.sink_queue_size
    }

    pub fn tracking(&self) -> &TrackingConfig {
        &self.tracking
    }

    pub fn status_port(&self) -> u16 {
        self.status_port
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to override tracking gates
    #[cfg(test)]
    pub fn with_tracking(mut self, tracking: TrackingConfig) -> Self {
        self.tracking = tracking;
        self
    }
}
