//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `frame` - Encoded frames and format sniffing
//! - `mailbox` - Single-slot latest-frame hand-off to the cycle worker
//! - `ingest` - TCP listener for the camera frame stream
//! - `detector` - HTTP client for the object detector
//! - `event_sink` - Dock event queue and HTTP delivery workers
//! - `status_http` - Status, health and Prometheus metrics endpoint

pub mod detector;
pub mod event_sink;
pub mod frame;
pub mod ingest;
pub mod mailbox;
pub mod status_http;

// Re-export commonly used types
pub use detector::{DetectError, Detector, HttpDetector};
pub use event_sink::{create_event_sink, EventEmitter, EventSinkWorker, SinkSettings};
pub use frame::{Frame, FrameFormat};
pub use ingest::{start_ingest_listener, IngestListenerConfig, SessionSignal};
pub use mailbox::FrameMailbox;
pub use status_http::start_status_server;
