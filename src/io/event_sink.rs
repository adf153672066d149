//! Dock event delivery to the warehouse system
//!
//! The cycle worker hands events to an `EventEmitter`, which enqueues them
//! without waiting. A fixed pool of `EventSinkWorker`s drains the queue and
//! POSTs each event to `{base}/{category}`. Delivery is best effort: failures
//! are logged and counted, never retried.

use crate::domain::event::{DockEvent, EventCategory};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Request body expected by the warehouse endpoint
#[derive(Debug, Serialize)]
pub struct SinkPayload<'a> {
    #[serde(rename = "WHNUM")]
    pub warehouse: &'a str,
    #[serde(rename = "CameraNO")]
    pub camera: &'a str,
    #[serde(rename = "DocCat")]
    pub doc_cat: &'static str,
    #[serde(rename = "DocType")]
    pub doc_type: &'static str,
    #[serde(rename = "PAK_ID")]
    pub pallet_id: Option<String>,
    #[serde(rename = "DoorNO")]
    pub door: Option<&'a str>,
}

impl<'a> SinkPayload<'a> {
    pub fn new(event: &'a DockEvent, warehouse: &'a str, camera: &'a str) -> Self {
        Self {
            warehouse,
            camera,
            doc_cat: event.category().as_str(),
            doc_type: event.kind.doc_type(),
            pallet_id: event.pallet_id.map(|id| id.to_string()),
            door: event.door.as_deref(),
        }
    }
}

/// URL for one event category; tolerates a trailing slash on the base
pub fn endpoint(base: &str, category: EventCategory) -> String {
    format!("{}/{}", base.trim_end_matches('/'), category.as_str())
}

/// Sink settings
#[derive(Debug, Clone)]
pub struct SinkSettings {
    pub url: String,
    pub warehouse: String,
    pub camera: String,
    pub timeout: Duration,
    pub workers: usize,
    pub queue_size: usize,
}

impl SinkSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.sink_url().to_string(),
            warehouse: config.warehouse().to_string(),
            camera: config.camera().to_string(),
            timeout: Duration::from_millis(config.sink_timeout_ms()),
            workers: config.sink_workers().max(1),
            queue_size: config.sink_queue_size().max(1),
        }
    }
}

/// An event waiting for delivery
#[derive(Debug)]
pub struct QueuedEvent {
    pub event: DockEvent,
    /// When the event was enqueued (for queue delay measurement)
    pub enqueued_at: Instant,
}

/// Non-blocking producer side of the sink queue
pub struct EventEmitter {
    tx: mpsc::Sender<QueuedEvent>,
    metrics: Arc<Metrics>,
    last_drop_warn: Instant,
}

impl EventEmitter {
    /// Enqueue an event; returns false if it was dropped
    pub fn emit(&mut self, event: DockEvent) -> bool {
        self.metrics.record_event_emitted();
        info!(kind = %event.kind, pallet_id = ?event.pallet_id.map(|id| id.to_string()), door = ?event.door, "dock_event");

        match self.tx.try_send(QueuedEvent { event, enqueued_at: Instant::now() }) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                self.metrics.record_event_dropped();
                // Rate-limit warning to 1 per second
                if self.last_drop_warn.elapsed() > Duration::from_secs(1) {
                    warn!(kind = %dropped.event.kind, "event_dropped: sink queue full");
                    self.last_drop_warn = Instant::now();
                }
                false
            }
            Err(TrySendError::Closed(dropped)) => {
                self.metrics.record_event_dropped();
                warn!(kind = %dropped.event.kind, "event_sink_closed");
                false
            }
        }
    }
}

/// Worker delivering queued events
pub struct EventSinkWorker {
    id: usize,
    client: reqwest::Client,
    settings: Arc<SinkSettings>,
    rx: Arc<Mutex<mpsc::Receiver<QueuedEvent>>>,
    metrics: Arc<Metrics>,
}

impl EventSinkWorker {
    /// Run the worker until the emitter is dropped and the queue is drained
    pub async fn run(self) {
        debug!(worker = self.id, "event_sink_worker_started");

        loop {
            // The lock is only held while waiting for the next event
            let next = self.rx.lock().await.recv().await;
            let Some(queued) = next else { break };
            self.deliver(queued).await;
        }

        debug!(worker = self.id, "event_sink_worker_stopped");
    }

    async fn deliver(&self, queued: QueuedEvent) {
        let queue_delay_us = queued.enqueued_at.elapsed().as_micros() as u64;
        let event = &queued.event;
        let url = endpoint(&self.settings.url, event.category());
        let payload = SinkPayload::new(event, &self.settings.warehouse, &self.settings.camera);

        let start = Instant::now();
        match self.client.post(&url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                self.metrics.record_event_delivered();
                info!(
                    kind = %event.kind,
                    status = response.status().as_u16(),
                    queue_delay_us = %queue_delay_us,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "event_delivered"
                );
            }
            Ok(response) => {
                self.metrics.record_event_failed();
                warn!(kind = %event.kind, url = %url, status = response.status().as_u16(), "event_rejected");
            }
            Err(e) => {
                self.metrics.record_event_failed();
                warn!(kind = %event.kind, url = %url, error = %e, "event_delivery_failed");
            }
        }
    }
}

/// Create the sink queue, its emitter and the worker pool
///
/// Returns the emitter (for the cycle worker) and the workers (to be spawned)
pub fn create_event_sink(
    settings: SinkSettings,
    metrics: Arc<Metrics>,
) -> Result<(EventEmitter, Vec<EventSinkWorker>), reqwest::Error> {
    let client = reqwest::Client::builder().timeout(settings.timeout).http1_only().build()?;
    let (tx, rx) = mpsc::channel(settings.queue_size);
    let rx = Arc::new(Mutex::new(rx));
    let settings = Arc::new(settings);

    let workers = (0..settings.workers)
        .map(|id| EventSinkWorker {
            id,
            client: client.clone(),
            settings: settings.clone(),
            rx: rx.clone(),
            metrics: metrics.clone(),
        })
        .collect();

    let emitter = EventEmitter {
        tx,
        metrics,
        last_drop_warn: Instant::now() - Duration::from_secs(2),
    };
    Ok((emitter, workers))
}
