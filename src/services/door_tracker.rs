//! Door state tracking with debounce
//!
//! Doors are matched frame to frame by their position along the door-side
//! edge of the staging area. A door is open when its center sits further from
//! that edge than the door box is tall. A status only counts once it has been
//! seen on enough consecutive matches; each confirmed change is reported once.

use crate::domain::event::{DockEvent, EventKind};
use crate::domain::types::{BoundingBox, Point};
use crate::infra::config::TrackingConfig;
use crate::services::geometry::StagingArea;
use smallvec::SmallVec;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Door {
    pub bbox: BoundingBox,
    pub confidence: f64,
    /// Center in the door-axis frame
    pub local: Point,
    pub open: bool,
    /// Consecutive same-status matches, clamped once validated
    pub valid_count: u32,
    pub validated: bool,
    /// Last status reported to the sink, if any
    pub reported_open: Option<bool>,
    pub last_seen: Instant,
}

impl Door {
    fn new(bbox: BoundingBox, confidence: f64, local: Point, now: Instant) -> Self {
        Self {
            bbox,
            confidence,
            local,
            open: local.y.abs() > bbox.height(),
            valid_count: 0,
            validated: false,
            reported_open: None,
            last_seen: now,
        }
    }

    /// True once the current status has been reported
    #[inline]
    pub fn event_sent(&self) -> bool {
        self.reported_open == Some(self.open)
    }

    pub fn status_label(&self) -> &'static str {
        if self.open {
            "Open"
        } else {
            "Close"
        }
    }
}

/// Per-session door model, ordered left to right along the door-side edge
#[derive(Debug)]
pub struct DoorTracker {
    doors: Vec<Door>,
    config: TrackingConfig,
    status: String,
}

impl DoorTracker {
    pub fn new(config: TrackingConfig) -> Self {
        Self { doors: Vec::new(), config, status: String::new() }
    }

    /// Match one door detection against the tracked doors
    pub fn observe(&mut self, bbox: BoundingBox, confidence: f64, area: &StagingArea, now: Instant) {
        let local = area.door_axis_of(&bbox);
        let open = local.y.abs() > bbox.height();

        let mut nearest: Option<(usize, f64)> = None;
        let mut best = self.config.door_search_radius_px;
        for (i, door) in self.doors.iter().enumerate() {
            let d = (door.local.x - local.x).abs();
            if d < best {
                best = d;
                nearest = Some((i, d));
            }
        }

        match nearest {
            Some((i, d)) if d < self.doors[i].bbox.width() / 2.0 => {
                let door = &mut self.doors[i];
                if door.open == open {
                    door.local = local;
                    door.valid_count += 1;
                    door.last_seen = now;
                } else {
                    debug!(door = i, open = open, "door_status_flip");
                    door.bbox = bbox;
                    door.confidence = confidence;
                    door.local = local;
                    door.open = open;
                    door.valid_count = 0;
                    door.last_seen = now;
                }
            }
            _ => {
                let at = self.doors.partition_point(|d| d.local.x < local.x);
                debug!(door = at, x0 = local.x, open = open, "door_created");
                self.doors.insert(at, Door::new(bbox, confidence, local, now));
            }
        }
    }

    /// Expire unconfirmed doors, validate debounced ones and report changes
    pub fn sweep(&mut self, now: Instant) -> SmallVec<[DockEvent; 2]> {
        let provisional = self.config.door_provisional();
        let before = self.doors.len();
        self.doors
            .retain(|d| d.validated || now.saturating_duration_since(d.last_seen) <= provisional);
        if self.doors.len() != before {
            debug!(expired = before - self.doors.len(), "doors_expired");
        }

        let confirm = self.config.door_confirm_count;
        let mut events = SmallVec::new();
        for (i, door) in self.doors.iter_mut().enumerate() {
            if door.valid_count <= confirm {
                continue;
            }
            door.valid_count = confirm;
            door.validated = true;
            if door.event_sent() {
                continue;
            }
            door.reported_open = Some(door.open);
            let kind = if door.open { EventKind::Open } else { EventKind::Close };
            self.status = format!("Door{}: {}", i, door.status_label());
            info!(door = i, status = door.status_label(), "door_status_confirmed");
            events.push(DockEvent::door(kind, i));
        }
        events
    }

    /// True if an open, validated door spans image x strictly
    pub fn open_door_spanning(&self, x: f64) -> bool {
        self.doors.iter().any(|d| d.open && d.validated && d.bbox.x1 < x && x < d.bbox.x2)
    }

    pub fn doors(&self) -> &[Door] {
        &self.doors
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn reset(&mut self) {
        self.doors.clear();
        self.status = "Init".to_string();
    }
}
