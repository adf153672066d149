//! Dock Vision - loading dock monitoring service
//!
//! Receives camera frames over TCP, runs them through an object detector and
//! tracks doors and pallets around a staging area, reporting dock events to
//! the warehouse system over HTTP.
//!
//! Module structure:
//! - `domain/` - Core types (geometry primitives, detections, pallets, events)
//! - `io/` - External interfaces (ingestion, detector, event sink, status HTTP)
//! - `services/` - Tracking logic (doors, pallets, session, cycle worker)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use dock_vision::infra::{Config, Metrics};
use dock_vision::io::{
    create_event_sink, start_ingest_listener, start_status_server, FrameMailbox, HttpDetector,
    IngestListenerConfig, SinkSettings,
};
use dock_vision::services::{create_cycle_worker, Session};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Dock Vision - pallet and door tracking for a loading dock camera
#[derive(Parser, Debug)]
#[command(name = "dock-vision", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Default: INFO, use RUST_LOG=debug for per-cycle visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("dock-vision starting");

    let args = Args::parse();
    let config = Config::load_from_path(Config::resolve_config_path(args.config.as_deref()));

    info!(
        config_file = %config.config_file(),
        warehouse = %config.warehouse(),
        camera = %config.camera(),
        ingest_port = %config.ingest_port(),
        detector_url = %config.detector_url(),
        sink_url = %config.sink_url(),
        sink_workers = %config.sink_workers(),
        status_port = %config.status_port(),
        staging = ?config.staging_corners(),
        "config_loaded"
    );

    // Staging geometry is validated once; a bad area aborts startup
    let session = match Session::from_config(&config) {
        Ok(session) => session,
        Err(e) => {
            error!(error = %format!("{e:#}"), "invalid_staging_area");
            return Err(e.into());
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());
    let mailbox = Arc::new(FrameMailbox::new());

    // Event sink: bounded queue drained by a fixed worker pool
    let (emitter, sink_workers) =
        create_event_sink(SinkSettings::from_config(&config), metrics.clone())?;
    let sink_handles: Vec<_> =
        sink_workers.into_iter().map(|worker| tokio::spawn(worker.run())).collect();

    let detector = HttpDetector::new(config.detector_url(), config.detector_input_size())?;

    let (signal_tx, status_rx, cycle_worker) = create_cycle_worker(
        session,
        detector,
        mailbox.clone(),
        emitter,
        metrics.clone(),
        shutdown_rx.clone(),
    );
    let cycle_handle = tokio::spawn(cycle_worker.run());

    // Start ingestion listener
    let ingest_config = IngestListenerConfig {
        bind_address: config.ingest_bind_address().to_string(),
        port: config.ingest_port(),
        max_frame_bytes: config.max_frame_bytes(),
    };
    let ingest_mailbox = mailbox.clone();
    let ingest_metrics = metrics.clone();
    let ingest_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = start_ingest_listener(
            ingest_config,
            ingest_mailbox,
            signal_tx,
            ingest_metrics,
            ingest_shutdown,
        )
        .await
        {
            error!(error = %e, "ingest listener error");
        }
    });

    // Start status HTTP server (if port > 0)
    let status_port = config.status_port();
    if status_port > 0 {
        let status_metrics = metrics.clone();
        let status_shutdown = shutdown_rx.clone();
        let site = config.warehouse().to_string();
        tokio::spawn(async move {
            if let Err(e) =
                start_status_server(status_port, status_metrics, status_rx, site, status_shutdown)
                    .await
            {
                error!(error = %e, "status server error");
            }
        });
    }

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // The cycle worker owns the emitter; once it stops, sink workers drain and exit
    if let Err(e) = cycle_handle.await {
        error!(error = %e, "cycle worker panicked");
    }
    for handle in sink_handles {
        let _ = handle.await;
    }

    info!("dock-vision shutdown complete");
    Ok(())
}
