//! Single-slot latest-value frame mailbox
//!
//! Decouples frame arrival from cycle execution. The ingestion side posts
//! without ever waiting; a frame not yet taken by the cycle worker is
//! replaced by the newer one. The worker awaits `recv()`.

use crate::io::frame::Frame;
use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Default)]
pub struct FrameMailbox {
    slot: Mutex<Option<Frame>>,
    notify: Notify,
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frame`, returning the unconsumed frame it replaced
    pub fn post(&self, frame: Frame) -> Option<Frame> {
        let replaced = self.slot.lock().replace(frame);
        self.notify.notify_one();
        replaced
    }

    pub fn try_take(&self) -> Option<Frame> {
        self.slot.lock().take()
    }

    /// Wait for the next frame
    pub async fn recv(&self) -> Frame {
        loop {
            if let Some(frame) = self.try_take() {
                return frame;
            }
            self.notify.notified().await;
        }
    }

    /// Discard any pending frame; returns whether one was discarded
    pub fn clear(&self) -> bool {
        self.slot.lock().take().is_some()
    }
}
