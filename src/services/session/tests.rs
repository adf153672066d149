//! Scenario tests for the Session cycle

use super::*;
use crate::domain::event::EventKind;
use crate::domain::types::{BoundingBox, PalletId, Point};
use std::collections::HashSet;
use std::time::Duration;

fn dock_area() -> StagingArea {
    StagingArea::new([
        Point::new(160.0, 240.0),
        Point::new(344.0, 110.0),
        Point::new(580.0, 260.0),
        Point::new(458.0, 638.0),
    ])
    .unwrap()
}

fn create_test_session() -> Session {
    Session::new(dock_area(), TrackingConfig::default(), 0.4)
}

fn pallet(x: f64, y: f64) -> Detection {
    pallet_with_confidence(x, y, 0.9)
}

fn pallet_with_confidence(x: f64, y: f64, confidence: f64) -> Detection {
    Detection::new(ObjectClass::Pallet, BoundingBox::centered(Point::new(x, y), 40.0, 30.0), confidence)
}

/// Door whose center sits 56.6px off the door edge; 40px tall, so open
fn open_door() -> Detection {
    Detection::new(ObjectClass::Door, BoundingBox::new(230.0, 80.0, 290.0, 120.0), 0.9)
}

/// Same door as `open_door`, 80px tall, so closed
fn closed_door() -> Detection {
    Detection::new(ObjectClass::Door, BoundingBox::new(230.0, 60.0, 290.0, 140.0), 0.9)
}

/// Simulated frame clock
struct Clock {
    t0: Instant,
    elapsed_ms: u64,
}

impl Clock {
    fn new() -> Self {
        Self { t0: Instant::now(), elapsed_ms: 0 }
    }

    fn advance(&mut self, ms: u64) -> Instant {
        self.elapsed_ms += ms;
        self.now()
    }

    fn now(&self) -> Instant {
        self.t0 + Duration::from_millis(self.elapsed_ms)
    }
}

fn pallet_events(events: &[DockEvent]) -> Vec<(EventKind, PalletId)> {
    events.iter().filter_map(|e| e.pallet_id.map(|id| (e.kind, id))).collect()
}

fn assert_unique_identities(session: &Session) {
    let ids: Vec<PalletId> = session.reconciler().records().filter_map(|r| r.pallet_id).collect();
    let unique: HashSet<PalletId> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len(), "duplicate pallet identity among live records");
}

/// Rack-side pallet enters the staging area: returns the minted identity
fn stage_in(session: &mut Session, clock: &mut Clock) -> PalletId {
    for _ in 0..5 {
        session.run_cycle(&[pallet(560.0, 420.0)], clock.advance(100));
    }
    let events = session.run_cycle(&[pallet(520.0, 430.0)], clock.advance(100));
    let pallets = pallet_events(&events);
    assert_eq!(pallets.len(), 1);
    assert_eq!(pallets[0].0, EventKind::StageIn);
    pallets[0].1
}

#[test]
fn test_stage_in_then_load_sequence() {
    let mut session = create_test_session();
    let mut clock = Clock::new();
    let mut all = Vec::new();

    // rack side only for two seconds
    for _ in 0..20 {
        let events = session.run_cycle(&[pallet(560.0, 420.0)], clock.advance(100));
        assert!(events.is_empty());
    }
    assert_eq!(session.status().rack_side, 1);

    // door appears; pallet picked up into the staging area
    all.extend(session.run_cycle(&[open_door(), pallet(520.0, 430.0)], clock.advance(100)));
    assert_unique_identities(&session);

    // carried across toward the door in steps under the match radius
    for k in 1..=9 {
        let f = k as f64 / 9.0;
        let p = pallet(520.0 - 255.0 * f, 430.0 - 245.0 * f);
        all.extend(session.run_cycle(&[open_door(), p], clock.advance(100)));
        assert_unique_identities(&session);
    }
    assert_eq!(session.status().doors_open, 1);
    assert_eq!(session.status().moving, 1);

    // out through the open door
    all.extend(session.run_cycle(&[open_door(), pallet(260.0, 150.0)], clock.advance(100)));
    assert_unique_identities(&session);

    let pallets = pallet_events(&all);
    let kinds: Vec<EventKind> = pallets.iter().map(|(k, _)| *k).collect();
    assert_eq!(kinds, vec![EventKind::StageIn, EventKind::Load]);
    assert_eq!(pallets[0].1, pallets[1].1);

    let doors: Vec<&DockEvent> = all.iter().filter(|e| e.door.is_some()).collect();
    assert_eq!(doors.len(), 1);
    assert_eq!(doors[0].kind, EventKind::Open);

    let status = session.status();
    assert_eq!(status.pallet_status, "load state");
    assert_eq!(status.door_status, "Door0: Open");
    assert_eq!(status.door_side, 1);
    assert_eq!(status.moving, 0);
}

#[test]
fn test_unload_through_open_door() {
    let mut session = create_test_session();
    let mut clock = Clock::new();

    for _ in 0..4 {
        session.run_cycle(&[open_door()], clock.advance(100));
    }
    assert_eq!(session.status().doors_open, 1);

    session.run_cycle(&[open_door(), pallet(260.0, 150.0)], clock.advance(100));
    assert_eq!(session.status().door_side, 1);

    let events = session.run_cycle(&[open_door(), pallet(265.0, 185.0)], clock.advance(100));
    let pallets = pallet_events(&events);
    assert_eq!(pallets.len(), 1);
    assert_eq!(pallets[0].0, EventKind::Unload);
    assert_eq!(session.status().pallet_status, "unload state");
    assert_eq!(session.status().door_side, 0);
    assert_eq!(session.status().moving, 1);
}

#[test]
fn test_door_side_pallet_ignored_without_open_door() {
    let mut session = create_test_session();
    let mut clock = Clock::new();

    session.run_cycle(&[pallet(260.0, 150.0)], clock.advance(100));
    let events = session.run_cycle(&[pallet(265.0, 185.0)], clock.advance(100));

    assert!(events.is_empty());
    assert_eq!(session.status().door_side, 0);
    assert_eq!(session.status().moving, 1);
}

#[test]
fn test_door_side_admission_ignores_detection_order() {
    // The door closes in the same frame the pallet shows up beside it
    for frame in [[closed_door(), pallet(260.0, 150.0)], [pallet(260.0, 150.0), closed_door()]] {
        let mut session = create_test_session();
        let mut clock = Clock::new();
        for _ in 0..4 {
            session.run_cycle(&[open_door()], clock.advance(100));
        }
        assert_eq!(session.status().doors_open, 1);

        session.run_cycle(&frame, clock.advance(100));

        assert_eq!(session.status().door_side, 1, "order {:?}", frame.map(|d| d.class));
    }
}

#[test]
fn test_stale_records_are_evicted() {
    let mut session = create_test_session();
    let mut clock = Clock::new();

    session.run_cycle(&[pallet(600.0, 400.0), pallet(300.0, 300.0)], clock.advance(100));
    assert_eq!(session.status().rack_side, 1);
    assert_eq!(session.status().moving, 1);

    session.run_cycle(&[], clock.advance(3000));
    assert_eq!(session.status().rack_side, 1);
    assert_eq!(session.status().moving, 1);

    session.run_cycle(&[], clock.advance(1));
    assert_eq!(session.status().rack_side, 0);
    assert_eq!(session.status().moving, 0);
}

#[test]
fn test_identified_moving_pallet_never_expires() {
    let mut session = create_test_session();
    let mut clock = Clock::new();
    let pallet_id = stage_in(&mut session, &mut clock);

    session.run_cycle(&[], clock.advance(10_000));
    session.run_cycle(&[], clock.advance(10_000));

    let moving: Vec<_> = session.reconciler().moving().values().collect();
    assert_eq!(moving.len(), 1);
    assert_eq!(moving[0].pallet_id, Some(pallet_id));
}

#[test]
fn test_settled_pallet_becomes_fixed() {
    let mut session = create_test_session();
    let mut clock = Clock::new();
    let pallet_id = stage_in(&mut session, &mut clock);

    // jitter within the settle radius until the history has scrolled past the pick-up point
    for i in 0..10 {
        let jitter = if i % 2 == 0 { 0.0 } else { 2.0 };
        let events = session.run_cycle(&[pallet(520.0 + jitter, 430.0 + jitter / 2.0)], clock.advance(100));
        assert!(events.is_empty());
    }

    let status = session.status();
    assert_eq!(status.fixed, 1);
    assert_eq!(status.moving, 0);
    let fixed = session.reconciler().fixed().values().next().unwrap();
    assert_eq!(fixed.pallet_id, Some(pallet_id));

    // fixed records are refreshed in place and never time out
    session.run_cycle(&[pallet(521.0, 430.0)], clock.advance(100));
    session.run_cycle(&[], clock.advance(60_000));
    let status = session.status();
    assert_eq!(status.fixed, 1);
    assert_eq!(status.moving, 0);
    assert_eq!(session.reconciler().fixed().values().next().unwrap().center, Point::new(521.0, 430.0));
}

#[test]
fn test_settled_track_merges_into_nearby_fixed() {
    let mut session = create_test_session();
    let mut clock = Clock::new();
    let pallet_id = stage_in(&mut session, &mut clock);
    for _ in 0..10 {
        session.run_cycle(&[pallet(520.0, 430.0)], clock.advance(100));
    }
    assert_eq!(session.status().fixed, 1);

    // a fresh track 6px off the fixed pallet, then settling 3px off it
    session.run_cycle(&[pallet(526.0, 430.0)], clock.advance(100));
    assert_eq!(session.status().moving, 1);
    for _ in 0..9 {
        session.run_cycle(&[pallet(523.0, 430.0)], clock.advance(100));
        assert_unique_identities(&session);
    }

    let status = session.status();
    assert_eq!(status.fixed, 1);
    assert_eq!(status.moving, 0);
    let fixed = session.reconciler().fixed().values().next().unwrap();
    assert_eq!(fixed.pallet_id, Some(pallet_id));
    assert_eq!(fixed.center, Point::new(523.0, 430.0));
}

#[test]
fn test_fixed_identity_follows_pallet_when_moved() {
    let mut session = create_test_session();
    let mut clock = Clock::new();
    let pallet_id = stage_in(&mut session, &mut clock);
    for _ in 0..10 {
        session.run_cycle(&[pallet(520.0, 430.0)], clock.advance(100));
    }
    assert_eq!(session.status().fixed, 1);

    // pallet lifted and carried: first seen 40px away
    session.run_cycle(&[pallet(480.0, 430.0)], clock.advance(100));
    session.run_cycle(&[pallet(478.0, 430.0)], clock.advance(100));

    let status = session.status();
    assert_eq!(status.fixed, 0);
    assert_eq!(status.moving, 1);
    let moving = session.reconciler().moving().values().next().unwrap();
    assert_eq!(moving.pallet_id, Some(pallet_id));
}

#[test]
fn test_low_confidence_and_forklift_ignored() {
    let mut session = create_test_session();
    let forklift = Detection::new(ObjectClass::Forklift, BoundingBox::new(280.0, 280.0, 320.0, 320.0), 0.9);

    let events = session.run_cycle(&[pallet_with_confidence(300.0, 300.0, 0.3), forklift], Instant::now());

    assert!(events.is_empty());
    assert_eq!(session.status().moving, 0);
    assert_eq!(session.status().cycles, 1);
}

#[test]
fn test_reset_clears_state() {
    let mut session = create_test_session();
    let mut clock = Clock::new();
    assert_eq!(session.status().pallet_status, "Init");
    assert_eq!(session.status().door_status, "");

    stage_in(&mut session, &mut clock);
    for _ in 0..4 {
        session.run_cycle(&[open_door()], clock.advance(100));
    }

    session.reset();
    let status = session.status();
    assert_eq!(status.door_status, "Init");
    assert_eq!(status.pallet_status, "Reset");
    assert_eq!(status.doors, 0);
    assert_eq!(status.moving + status.door_side + status.rack_side + status.fixed, 0);
    assert_eq!(status.cycles, 0);
}

#[test]
fn test_from_config_builds_default_area() {
    assert!(Session::from_config(&Config::default()).is_ok());
}
