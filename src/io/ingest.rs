//! TCP frame ingestion
//!
//! Accepts one camera connection at a time. Each connection is a tracking
//! session: the cycle worker is told to reset when it opens and again when it
//! closes. Frames are length-prefixed (4-byte big-endian) encoded images; a
//! zero length is a keepalive. Frames that are not JPEG or PNG are skipped
//! here and never reach the detector.

use crate::infra::metrics::Metrics;
use crate::infra::shutdown::wait_for_shutdown;
use crate::io::frame::{Frame, FrameFormat};
use crate::io::mailbox::FrameMailbox;
use bytes::{Bytes, BytesMut};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Session boundary notifications for the cycle worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    Opened,
    Closed,
}

/// Ingestion listener configuration
#[derive(Debug, Clone)]
pub struct IngestListenerConfig {
    pub bind_address: String,
    pub port: u16,
    pub max_frame_bytes: usize,
}

/// Read the next frame payload, skipping keepalives
///
/// Returns `Ok(None)` when the peer closed the connection. A declared length
/// above `max_frame_bytes` is an `InvalidData` error.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_bytes: usize,
) -> std::io::Result<Option<Bytes>> {
    loop {
        let len = match reader.read_u32().await {
            Ok(len) => len as usize,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        };
        if len == 0 {
            continue;
        }
        if len > max_frame_bytes {
            return Err(std::io::Error::new(
                ErrorKind::InvalidData,
                format!("frame of {len} bytes exceeds limit of {max_frame_bytes}"),
            ));
        }
        let mut buf = BytesMut::zeroed(len);
        reader.read_exact(&mut buf).await?;
        return Ok(Some(buf.freeze()));
    }
}

/// Pump frames from one connection into the mailbox until it closes
///
/// Returns the number of frames posted.
pub async fn pump_frames<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_bytes: usize,
    mailbox: &FrameMailbox,
    metrics: &Metrics,
) -> std::io::Result<u64> {
    let mut seq = 0u64;
    let mut posted = 0u64;
    // Rate-limit replacement warnings to 1 per second
    let mut last_replace_warn = Instant::now() - Duration::from_secs(2);

    while let Some(data) = read_frame(reader, max_frame_bytes).await? {
        seq += 1;
        metrics.record_frame_received();

        let Some(format) = FrameFormat::sniff(&data) else {
            metrics.record_frame_skipped();
            debug!(seq = seq, bytes = data.len(), "frame_skipped_unknown_format");
            continue;
        };

        if let Some(replaced) = mailbox.post(Frame::new(seq, format, data)) {
            metrics.record_frame_replaced();
            if last_replace_warn.elapsed() > Duration::from_secs(1) {
                debug!(replaced_seq = replaced.seq, seq = seq, "frame_replaced: cycle behind ingestion");
                last_replace_warn = Instant::now();
            }
        }
        posted += 1;
    }
    Ok(posted)
}

/// Start the ingestion listener
pub async fn start_ingest_listener(
    config: IngestListenerConfig,
    mailbox: Arc<FrameMailbox>,
    signal_tx: mpsc::Sender<SessionSignal>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!(addr = %addr, max_frame_bytes = config.max_frame_bytes, "ingest_listener_started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("ingest_listener_shutdown");
                    return Ok(());
                }
            }
            result = listener.accept() => {
                match result {
                    Ok((socket, peer)) => {
                        let _ = socket.set_nodelay(true);
                        let stopped = run_session(
                            socket,
                            peer,
                            &config,
                            &mailbox,
                            &signal_tx,
                            &metrics,
                            &mut shutdown,
                        )
                        .await;
                        if stopped {
                            info!("ingest_listener_shutdown");
                            return Ok(());
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "ingest_accept_failed");
                    }
                }
            }
        }
    }
}

/// Serve one connection to completion; returns true if shutdown was requested
async fn run_session(
    mut socket: tokio::net::TcpStream,
    peer: SocketAddr,
    config: &IngestListenerConfig,
    mailbox: &FrameMailbox,
    signal_tx: &mpsc::Sender<SessionSignal>,
    metrics: &Metrics,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    info!(peer = %peer, "ingest_session_opened");
    metrics.record_session_opened();
    mailbox.clear();
    if signal_tx.send(SessionSignal::Opened).await.is_err() {
        warn!("ingest_signal_channel_closed");
    }

    let mut stopped = false;
    tokio::select! {
        result = pump_frames(&mut socket, config.max_frame_bytes, mailbox, metrics) => {
            match result {
                Ok(frames) => info!(peer = %peer, frames = frames, "ingest_session_closed"),
                Err(e) => warn!(peer = %peer, error = %e, "ingest_session_failed"),
            }
        }
        _ = wait_for_shutdown(shutdown) => {
            stopped = true;
        }
    }

    mailbox.clear();
    if signal_tx.send(SessionSignal::Closed).await.is_err() {
        warn!("ingest_signal_channel_closed");
    }
    stopped
}
