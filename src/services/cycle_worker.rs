//! Cycle worker - runs detection and tracking one frame at a time
//!
//! The worker owns the Session. It takes the newest frame from the mailbox,
//! calls the detector, runs one tracking cycle and hands the resulting events
//! to the emitter. Session boundary signals from ingestion are applied
//! between cycles, so a reset never interleaves with a running cycle.
//! Shutdown abandons a frame still waiting on the detector; the session is
//! only touched once detection returns.

use crate::infra::metrics::Metrics;
use crate::infra::shutdown::wait_for_shutdown;
use crate::io::detector::Detector;
use crate::io::event_sink::EventEmitter;
use crate::io::frame::Frame;
use crate::io::ingest::SessionSignal;
use crate::io::mailbox::FrameMailbox;
use crate::services::session::{Session, StatusSnapshot};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Capacity of the session signal channel
const SIGNAL_BUFFER: usize = 8;

pub struct CycleWorker<D: Detector> {
    session: Session,
    detector: D,
    mailbox: Arc<FrameMailbox>,
    signal_rx: mpsc::Receiver<SessionSignal>,
    emitter: EventEmitter,
    status_tx: watch::Sender<StatusSnapshot>,
    metrics: Arc<Metrics>,
    shutdown: watch::Receiver<bool>,
    last_error_warn: Instant,
}

impl<D: Detector> CycleWorker<D> {
    /// Run until shutdown is requested
    pub async fn run(mut self) {
        info!("cycle_worker_started");
        let mut signals_open = true;

        loop {
            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                signal = self.signal_rx.recv(), if signals_open => {
                    match signal {
                        Some(signal) => self.apply_signal(signal),
                        None => signals_open = false,
                    }
                }
                frame = self.mailbox.recv() => {
                    let mut shutdown = self.shutdown.clone();
                    tokio::select! {
                        _ = self.process_frame(frame) => {}
                        _ = wait_for_shutdown(&mut shutdown) => {
                            info!("cycle_worker_frame_abandoned");
                            break;
                        }
                    }
                }
            }
        }

        info!(cycles = self.session.status().cycles, "cycle_worker_stopped");
    }

    fn apply_signal(&mut self, signal: SessionSignal) {
        debug!(signal = ?signal, "session_signal");
        self.session.reset();
        self.status_tx.send_replace(self.session.status());
    }

    async fn process_frame(&mut self, frame: Frame) {
        let detect_start = Instant::now();
        let detections = match self.detector.detect(&frame).await {
            Ok(detections) => detections,
            Err(e) if e.is_rejected() => {
                self.metrics.record_frame_skipped();
                debug!(seq = frame.seq, error = %e, "frame_rejected");
                return;
            }
            Err(e) => {
                self.metrics.record_detector_error();
                // Rate-limit warning to 1 per second
                if self.last_error_warn.elapsed() > Duration::from_secs(1) {
                    warn!(seq = frame.seq, error = %e, "detector_failed");
                    self.last_error_warn = Instant::now();
                }
                return;
            }
        };
        self.metrics.record_detect_latency(detect_start.elapsed().as_millis() as u64);

        let cycle_start = Instant::now();
        let events = self.session.run_cycle(&detections, cycle_start);
        for event in events {
            self.emitter.emit(event);
        }
        self.metrics.record_cycle(cycle_start.elapsed().as_micros() as u64);

        debug!(
            seq = frame.seq,
            format = frame.format.as_str(),
            bytes = frame.data.len(),
            age_ms = frame.received_at.elapsed().as_millis() as u64,
            detections = detections.len(),
            "frame_processed"
        );
        self.status_tx.send_replace(self.session.status());
    }
}

/// Create the cycle worker and its channels
///
/// Returns the session signal sender (for ingestion), the status receiver
/// (for the status endpoint) and the worker (to be spawned)
pub fn create_cycle_worker<D: Detector>(
    session: Session,
    detector: D,
    mailbox: Arc<FrameMailbox>,
    emitter: EventEmitter,
    metrics: Arc<Metrics>,
    shutdown: watch::Receiver<bool>,
) -> (mpsc::Sender<SessionSignal>, watch::Receiver<StatusSnapshot>, CycleWorker<D>) {
    let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_BUFFER);
    let (status_tx, status_rx) = watch::channel(session.status());
    let worker = CycleWorker {
        session,
        detector,
        mailbox,
        signal_rx,
        emitter,
        status_tx,
        metrics,
        shutdown,
        last_error_warn: Instant::now() - Duration::from_secs(2),
    };
    (signal_tx, status_rx, worker)
}
