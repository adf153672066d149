//! Status and metrics HTTP endpoint
//!
//! - `GET /status`: current door/pallet status strings and record counts (JSON)
//! - `GET /metrics`: Prometheus text format
//! - `GET /health`: liveness

use crate::infra::metrics::{
    Metrics, MetricsSnapshot, METRICS_CYCLE_BOUNDS, METRICS_DETECT_BOUNDS, METRICS_NUM_BUCKETS,
};
use crate::services::session::StatusSnapshot;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    bounds: &[u64; 10],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in bounds.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {cumulative}");
}

/// Format metrics in Prometheus text exposition format
///
/// Reads monotonic counters only; the periodic summary log keeps its own window.
fn format_prometheus_metrics(metrics: &Metrics, status: &StatusSnapshot, site: &str) -> String {
    let s = metrics.snapshot();
    let mut output = String::with_capacity(4096);

    write_frame_metrics(&mut output, site, &s);
    write_cycle_metrics(&mut output, site, &s);
    write_event_metrics(&mut output, site, &s);
    write_tracking_gauges(&mut output, site, status);

    output
}

fn write_frame_metrics(output: &mut String, site: &str, s: &MetricsSnapshot) {
    write_metric(
        output,
        "dock_frames_received_total",
        "Frames read from the ingestion connection",
        MetricType::Counter,
        site,
        s.frames_received,
    );
    write_metric(
        output,
        "dock_frames_replaced_total",
        "Frames replaced in the mailbox before processing",
        MetricType::Counter,
        site,
        s.frames_replaced,
    );
    write_metric(
        output,
        "dock_frames_skipped_total",
        "Frames skipped as undecodable",
        MetricType::Counter,
        site,
        s.frames_skipped,
    );
    write_metric(
        output,
        "dock_sessions_total",
        "Ingestion sessions opened",
        MetricType::Counter,
        site,
        s.sessions_opened,
    );
}

fn write_cycle_metrics(output: &mut String, site: &str, s: &MetricsSnapshot) {
    write_metric(
        output,
        "dock_cycles_total",
        "Tracking cycles completed",
        MetricType::Counter,
        site,
        s.cycles_total,
    );
    write_histogram(
        output,
        "dock_cycle_latency_us",
        "Tracking cycle latency in microseconds",
        site,
        &s.cycle_lat_buckets,
        &METRICS_CYCLE_BOUNDS,
        s.cycle_lat_sum_us,
    );
    write_histogram(
        output,
        "dock_detect_latency_ms",
        "Detector round-trip in milliseconds",
        site,
        &s.detect_lat_buckets,
        &METRICS_DETECT_BOUNDS,
        s.detect_lat_sum_ms,
    );
    write_metric(
        output,
        "dock_detector_errors_total",
        "Detector transport or protocol failures",
        MetricType::Counter,
        site,
        s.detector_errors,
    );
}

fn write_event_metrics(output: &mut String, site: &str, s: &MetricsSnapshot) {
    write_metric(
        output,
        "dock_events_emitted_total",
        "Dock events produced",
        MetricType::Counter,
        site,
        s.events_emitted,
    );
    write_metric(
        output,
        "dock_events_dropped_total",
        "Dock events dropped on a full sink queue",
        MetricType::Counter,
        site,
        s.events_dropped,
    );
    write_metric(
        output,
        "dock_events_delivered_total",
        "Dock events accepted by the sink",
        MetricType::Counter,
        site,
        s.events_delivered,
    );
    write_metric(
        output,
        "dock_events_failed_total",
        "Dock events that failed delivery",
        MetricType::Counter,
        site,
        s.events_failed,
    );
}

fn write_tracking_gauges(output: &mut String, site: &str, status: &StatusSnapshot) {
    write_metric(output, "dock_doors", "Tracked doors", MetricType::Gauge, site, status.doors as u64);
    write_metric(
        output,
        "dock_doors_open",
        "Validated open doors",
        MetricType::Gauge,
        site,
        status.doors_open as u64,
    );

    let _ = writeln!(output, "# HELP dock_pallets Live pallet records by category");
    let _ = writeln!(output, "# TYPE dock_pallets gauge");
    for (category, count) in [
        ("moving", status.moving),
        ("door_side", status.door_side),
        ("rack_side", status.rack_side),
        ("fixed", status.fixed),
    ] {
        let _ =
            writeln!(output, "dock_pallets{{site=\"{site}\",category=\"{category}\"}} {count}");
    }
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    status_rx: watch::Receiver<StatusSnapshot>,
    site: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/status") => {
            let status = status_rx.borrow().clone();
            match serde_json::to_vec(&status) {
                Ok(body) => Ok(Response::builder()
                    .status(StatusCode::OK)
                    .header("Content-Type", "application/json")
                    .header("Access-Control-Allow-Origin", "*")
                    .body(Full::new(Bytes::from(body)))
                    .expect("static response should not fail")),
                Err(e) => {
                    error!(error = %e, "status_serialize_failed");
                    Ok(Response::builder()
                        .status(StatusCode::INTERNAL_SERVER_ERROR)
                        .body(Full::new(Bytes::from("status unavailable")))
                        .expect("static response should not fail"))
                }
            }
        }
        (&Method::GET, "/metrics") => {
            let status = status_rx.borrow().clone();
            let body = format_prometheus_metrics(&metrics, &status, &site);
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail"))
        }
        (&Method::GET, "/health") => Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail")),
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

/// Start the status HTTP server
pub async fn start_status_server(
    port: u16,
    metrics: Arc<Metrics>,
    status_rx: watch::Receiver<StatusSnapshot>,
    site: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site = Arc::new(site);

    info!(port = %port, site = %site, "status_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let status_rx = status_rx.clone();
                        let site = site.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let status_rx = status_rx.clone();
                                let site = site.clone();
                                async move { handle_request(req, metrics, status_rx, site).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "status_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "status_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("status_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
