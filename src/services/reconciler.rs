//! Pallet reconciliation across cycles
//!
//! Persistent pallet records live in four category arenas. Each cycle the
//! candidate buffer produced by the classifier is matched against them in a
//! fixed order (door side, rack side, moving, fixed); matched candidates are
//! consumed, the rest become new records. Category moves carry the pallet
//! identity forward and produce the dock/stage events.
//!
//! All matching is nearest-neighbour on image-space centers with strict gates.

use crate::domain::event::{DockEvent, EventKind};
use crate::domain::pallet::{PalletRecord, TrackHistory};
use crate::domain::types::{PalletId, Point};
use crate::infra::config::TrackingConfig;
use crate::services::arena::{Arena, SlotId};
use crate::services::geometry::distance;
use crate::services::pallet_classifier::CandidateBuffer;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Outside edge of the staging area a record sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Door,
    Rack,
}

impl Edge {
    /// Event when a pallet leaves this edge into the staging area
    fn entry_kind(self) -> EventKind {
        match self {
            Edge::Door => EventKind::Unload,
            Edge::Rack => EventKind::StageIn,
        }
    }

    /// Event when a pallet leaves the staging area onto this edge
    fn exit_kind(self) -> EventKind {
        match self {
            Edge::Door => EventKind::Load,
            Edge::Rack => EventKind::StageOut,
        }
    }
}

/// Nearest key strictly within `gate` of `to`
fn nearest<K>(items: impl Iterator<Item = (K, Point)>, to: Point, gate: f64) -> Option<(K, f64)> {
    let mut best = None;
    let mut limit = gate;
    for (key, point) in items {
        let d = distance(point, to);
        if d < limit {
            limit = d;
            best = Some((key, d));
        }
    }
    best
}

fn nearest_candidate(list: &[PalletRecord], to: Point, gate: f64) -> Option<usize> {
    nearest(list.iter().enumerate().map(|(i, c)| (i, c.center)), to, gate).map(|(i, _)| i)
}

fn idle_for(record: &PalletRecord, now: Instant) -> Duration {
    now.saturating_duration_since(record.updated_at)
}

/// Nearest identified Moving record other than `exclude`, optionally idle for at least `min_idle`
fn find_donor(
    moving: &Arena<PalletRecord>,
    exclude: SlotId,
    to: Point,
    radius: f64,
    min_idle: Option<Duration>,
    now: Instant,
) -> Option<SlotId> {
    let eligible = moving.iter().filter(|(id, r)| {
        *id != exclude && r.is_identified() && min_idle.map_or(true, |idle| idle_for(r, now) >= idle)
    });
    nearest(eligible.map(|(id, r)| (id, r.center)), to, radius).map(|(id, _)| id)
}

/// Move the donor's identity onto `recipient`, removing the donor
fn adopt_identity(moving: &mut Arena<PalletRecord>, recipient: SlotId, donor: SlotId) -> Option<PalletId> {
    let pallet_id = moving.take(donor)?.pallet_id;
    if let Some(record) = moving.get_mut(recipient) {
        record.pallet_id = pallet_id;
    }
    pallet_id
}

/// Four-category pallet state machine
#[derive(Debug)]
pub struct PalletReconciler {
    moving: Arena<PalletRecord>,
    door_side: Arena<PalletRecord>,
    rack_side: Arena<PalletRecord>,
    fixed: Arena<PalletRecord>,
    config: TrackingConfig,
    status: String,
}

impl PalletReconciler {
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            moving: Arena::new(),
            door_side: Arena::new(),
            rack_side: Arena::new(),
            fixed: Arena::new(),
            config,
            status: "Init".to_string(),
        }
    }

    /// Run one reconciliation pass, consuming the candidate buffer
    pub fn reconcile(&mut self, candidates: &mut CandidateBuffer, now: Instant) -> Vec<DockEvent> {
        let mut events = Vec::new();

        self.reconcile_edge(Edge::Door, candidates, now, &mut events);
        self.reconcile_edge(Edge::Rack, candidates, now, &mut events);
        self.reconcile_moving(candidates, now, &mut events);
        self.reconcile_fixed(candidates, now);
        self.admit_leftovers(candidates);

        self.moving.compact();
        self.door_side.compact();
        self.rack_side.compact();
        self.fixed.compact();

        if let Some(status) = events.last().and_then(|e| e.kind.pallet_status()) {
            self.status = status.to_string();
        }
        events
    }

    /// DoorSide / RackSide records: refresh, promote into the staging area, or expire
    fn reconcile_edge(
        &mut self,
        edge: Edge,
        candidates: &mut CandidateBuffer,
        now: Instant,
        events: &mut Vec<DockEvent>,
    ) {
        let cfg = self.config;
        let (records, own) = match edge {
            Edge::Door => (&mut self.door_side, &mut candidates.door_side),
            Edge::Rack => (&mut self.rack_side, &mut candidates.rack_side),
        };

        for id in records.slot_ids() {
            let Some((center, identified, updated_at)) =
                records.get(id).map(|r| (r.center, r.is_identified(), r.updated_at))
            else {
                continue;
            };

            if let Some(ci) = nearest_candidate(own, center, cfg.match_radius_px) {
                let candidate = own.remove(ci);
                if let Some(record) = records.get_mut(id) {
                    record.refresh_from(&candidate, now);
                }
                continue;
            }

            if !identified {
                if let Some(ci) = nearest_candidate(&candidates.moving, center, cfg.match_radius_px) {
                    let mut promoted = candidates.moving.remove(ci);
                    records.take(id);
                    let pallet_id = PalletId::mint();
                    promoted.pallet_id = Some(pallet_id);
                    promoted.history = Some(TrackHistory::seeded(center));
                    self.moving.push(promoted);

                    let kind = edge.entry_kind();
                    info!(pallet_id = %pallet_id, event = %kind, "pallet_entered_staging");
                    events.push(DockEvent::pallet(kind, pallet_id));
                    continue;
                }
            }

            if now.saturating_duration_since(updated_at) > cfg.stale_after() {
                records.take(id);
                debug!(edge = ?edge, "edge_pallet_expired");
            }
        }
    }

    /// Moving records: adopt identities, leave through an edge, advance, settle or expire
    fn reconcile_moving(&mut self, candidates: &mut CandidateBuffer, now: Instant, events: &mut Vec<DockEvent>) {
        let cfg = self.config;

        for id in self.moving.slot_ids() {
            let Some(record) = self.moving.get(id) else {
                continue;
            };

            if !record.is_identified() && record.history_len() > cfg.donor_min_history {
                let center = record.center;
                let donor =
                    find_donor(&self.moving, id, center, cfg.donor_radius_px, Some(cfg.donor_idle()), now);
                if let Some(donor) = donor {
                    if let Some(pallet_id) = adopt_identity(&mut self.moving, id, donor) {
                        debug!(pallet_id = %pallet_id, "moving_pallet_adopted_identity");
                    }
                }
            }

            let Some(center) = self.moving.get(id).map(|r| r.center) else {
                continue;
            };

            if let Some(ci) = nearest_candidate(&candidates.door_side, center, cfg.match_radius_px) {
                let candidate = candidates.door_side.remove(ci);
                self.leave_staging(id, Edge::Door, candidate, now, events);
                continue;
            }

            if let Some(ci) = nearest_candidate(&candidates.rack_side, center, cfg.match_radius_px) {
                let candidate = candidates.rack_side.remove(ci);
                self.leave_staging(id, Edge::Rack, candidate, now, events);
                continue;
            }

            if let Some(ci) = nearest_candidate(&candidates.moving, center, cfg.match_radius_px) {
                let candidate = candidates.moving.remove(ci);
                let Some(record) = self.moving.get_mut(id) else {
                    continue;
                };
                record.refresh_from(&candidate, now);
                let history = record.history.get_or_insert_with(TrackHistory::default);
                history.push_capped(candidate.center, cfg.history_len);
                if history.is_full(cfg.history_len) && history.max_deviation() < cfg.settle_deviation_px {
                    self.settle(id);
                }
                continue;
            }

            if let Some(record) = self.moving.get(id) {
                if !record.is_identified() && idle_for(record, now) > cfg.stale_after() {
                    self.moving.take(id);
                    debug!("moving_pallet_expired");
                }
            }
        }
    }

    /// Move a Moving record onto an outside edge, giving it an identity first if needed
    fn leave_staging(
        &mut self,
        id: SlotId,
        edge: Edge,
        mut candidate: PalletRecord,
        now: Instant,
        events: &mut Vec<DockEvent>,
    ) {
        let Some((existing, center)) = self.moving.get(id).map(|r| (r.pallet_id, r.center)) else {
            return;
        };
        let pallet_id = match existing {
            Some(pallet_id) => pallet_id,
            None => {
                let donor = find_donor(&self.moving, id, center, self.config.donor_radius_px, None, now);
                match donor.and_then(|donor| adopt_identity(&mut self.moving, id, donor)) {
                    Some(pallet_id) => pallet_id,
                    None => PalletId::mint(),
                }
            }
        };

        self.moving.take(id);
        candidate.pallet_id = Some(pallet_id);
        candidate.history = None;
        candidate.updated_at = now;
        match edge {
            Edge::Door => self.door_side.push(candidate),
            Edge::Rack => self.rack_side.push(candidate),
        };

        let kind = edge.exit_kind();
        info!(pallet_id = %pallet_id, event = %kind, "pallet_left_staging");
        events.push(DockEvent::pallet(kind, pallet_id));
    }

    /// A settled Moving record merges into a nearby Fixed record, or becomes Fixed if identified
    fn settle(&mut self, id: SlotId) {
        let Some(record) = self.moving.get(id) else {
            return;
        };
        let center = record.center;
        let identified = record.is_identified();

        let merge_into = nearest(
            self.fixed.iter().map(|(fid, r)| (fid, r.center)),
            center,
            self.config.fixed_merge_radius_px,
        );

        if let Some((fixed_id, _)) = merge_into {
            let Some(record) = self.moving.take(id) else {
                return;
            };
            if let Some(fixed) = self.fixed.get_mut(fixed_id) {
                let pallet_id = fixed.pallet_id;
                *fixed = PalletRecord { pallet_id, ..record };
                debug!(pallet_id = ?pallet_id, "settled_pallet_merged");
            }
        } else if identified {
            if let Some(record) = self.moving.take(id) {
                if let Some(pallet_id) = record.pallet_id {
                    info!(pallet_id = %pallet_id, "pallet_settled");
                }
                self.fixed.push(record);
            }
        }
    }

    /// Fixed records: refresh from a very close candidate, hand identity to a departing track
    fn reconcile_fixed(&mut self, candidates: &mut CandidateBuffer, now: Instant) {
        let cfg = self.config;

        for id in self.fixed.slot_ids() {
            let Some(center) = self.fixed.get(id).map(|r| r.center) else {
                continue;
            };

            if let Some(ci) = nearest_candidate(&candidates.moving, center, cfg.fixed_refresh_radius_px) {
                let candidate = candidates.moving.remove(ci);
                if candidate.confidence > cfg.fixed_refresh_min_confidence {
                    if let Some(fixed) = self.fixed.get_mut(id) {
                        fixed.refresh_from(&candidate, now);
                        fixed
                            .history
                            .get_or_insert_with(TrackHistory::default)
                            .push_capped(candidate.center, cfg.history_len);
                    }
                }
            }

            let Some(center) = self.fixed.get(id).map(|r| r.center) else {
                continue;
            };
            let closest = nearest(
                self.moving.iter().map(|(mid, r)| (mid, r.center)),
                center,
                cfg.handoff_max_px,
            );
            let Some((moving_id, d)) = closest else {
                continue;
            };
            let unidentified = self.moving.get(moving_id).is_some_and(|r| !r.is_identified());
            if d > cfg.handoff_min_px && unidentified {
                if let Some(fixed) = self.fixed.take(id) {
                    if let Some(record) = self.moving.get_mut(moving_id) {
                        record.pallet_id = fixed.pallet_id;
                    }
                    if let Some(pallet_id) = fixed.pallet_id {
                        info!(pallet_id = %pallet_id, "fixed_pallet_picked_up");
                    }
                }
            }
        }
    }

    /// Unmatched candidates become new records in their own category
    fn admit_leftovers(&mut self, candidates: &mut CandidateBuffer) {
        for mut candidate in candidates.moving.drain(..) {
            candidate.history = Some(TrackHistory::seeded(candidate.center));
            self.moving.push(candidate);
        }
        for candidate in candidates.door_side.drain(..) {
            self.door_side.push(candidate);
        }
        for candidate in candidates.rack_side.drain(..) {
            self.rack_side.push(candidate);
        }
    }

    pub fn moving(&self) -> &Arena<PalletRecord> {
        &self.moving
    }

    pub fn door_side(&self) -> &Arena<PalletRecord> {
        &self.door_side
    }

    pub fn rack_side(&self) -> &Arena<PalletRecord> {
        &self.rack_side
    }

    pub fn fixed(&self) -> &Arena<PalletRecord> {
        &self.fixed
    }

    /// Every live record across all categories
    pub fn records(&self) -> impl Iterator<Item = &PalletRecord> {
        self.moving
            .values()
            .chain(self.door_side.values())
            .chain(self.rack_side.values())
            .chain(self.fixed.values())
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn reset(&mut self) {
        self.moving.clear();
        self.door_side.clear();
        self.rack_side.clear();
        self.fixed.clear();
        self.status = "Reset".to_string();
    }
}
