//! Per-connection tracking session
//!
//! The Session owns every piece of tracking state for one ingestion
//! connection:
//! - the validated staging area
//! - the door tracker
//! - the pallet reconciler and its four category arenas
//! - the per-cycle candidate buffer
//!
//! One call to `run_cycle` processes the detections of one frame and returns
//! the events that frame produced. Nothing here is shared; the cycle worker
//! owns the Session and applies resets between cycles.

#[cfg(test)]
mod tests;

use crate::domain::event::DockEvent;
use crate::domain::types::{Detection, ObjectClass};
use crate::infra::config::{Config, TrackingConfig};
use crate::services::door_tracker::DoorTracker;
use crate::services::geometry::StagingArea;
use crate::services::pallet_classifier::{classify, CandidateBuffer};
use crate::services::reconciler::PalletReconciler;
use serde::Serialize;
use smallvec::SmallVec;
use std::time::Instant;
use tracing::{debug, info};

/// Overlay/status view of a session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub door_status: String,
    pub pallet_status: String,
    pub doors: usize,
    pub doors_open: usize,
    pub moving: usize,
    pub door_side: usize,
    pub rack_side: usize,
    pub fixed: usize,
    pub cycles: u64,
}

/// All tracking state for one ingestion connection
pub struct Session {
    area: StagingArea,
    doors: DoorTracker,
    reconciler: PalletReconciler,
    candidates: CandidateBuffer,
    min_confidence: f64,
    cycles: u64,
}

impl Session {
    pub fn new(area: StagingArea, tracking: TrackingConfig, min_confidence: f64) -> Self {
        Self {
            area,
            doors: DoorTracker::new(tracking),
            reconciler: PalletReconciler::new(tracking),
            candidates: CandidateBuffer::default(),
            min_confidence,
            cycles: 0,
        }
    }

    /// Build a session from configuration, validating the staging area
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let area = StagingArea::new(config.staging_corners())?;
        Ok(Self::new(area, *config.tracking(), config.min_confidence()))
    }

    /// Process the detections of one frame
    ///
    /// Pallets are classified against the door state left by the previous
    /// cycle, whatever the detection order; this frame's doors are matched
    /// afterwards and swept, and the reconciler runs last.
    /// Door events precede pallet events in the returned list.
    pub fn run_cycle(&mut self, detections: &[Detection], now: Instant) -> Vec<DockEvent> {
        self.cycles += 1;

        let min_confidence = self.min_confidence;
        let mut door_boxes: SmallVec<[&Detection; 4]> = SmallVec::new();
        for det in detections.iter().filter(|d| d.confidence >= min_confidence) {
            match det.class {
                ObjectClass::Pallet => {
                    classify(det, &self.area, &self.doors, &mut self.candidates, now);
                }
                ObjectClass::Door => door_boxes.push(det),
                ObjectClass::Forklift | ObjectClass::Other => {}
            }
        }
        for det in &door_boxes {
            self.doors.observe(det.bbox, det.confidence, &self.area, now);
        }
        let door_boxes = door_boxes.len();

        let mut events: Vec<DockEvent> = self.doors.sweep(now).into_iter().collect();
        let candidates = self.candidates.len();
        events.extend(self.reconciler.reconcile(&mut self.candidates, now));
        self.candidates.clear();

        debug!(
            cycle = self.cycles,
            detections = detections.len(),
            door_boxes = door_boxes,
            candidates = candidates,
            events = events.len(),
            "cycle_complete"
        );
        events
    }

    /// Drop all doors and pallets, as on a new ingestion connection
    pub fn reset(&mut self) {
        self.doors.reset();
        self.reconciler.reset();
        self.candidates.clear();
        info!(cycles = self.cycles, "session_reset");
        self.cycles = 0;
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            door_status: self.doors.status().to_string(),
            pallet_status: self.reconciler.status().to_string(),
            doors: self.doors.doors().len(),
            doors_open: self.doors.doors().iter().filter(|d| d.validated && d.open).count(),
            moving: self.reconciler.moving().len(),
            door_side: self.reconciler.door_side().len(),
            rack_side: self.reconciler.rack_side().len(),
            fixed: self.reconciler.fixed().len(),
            cycles: self.cycles,
        }
    }

    pub fn doors(&self) -> &DoorTracker {
        &self.doors
    }

    pub fn reconciler(&self) -> &PalletReconciler {
        &self.reconciler
    }
}
