//! Per-frame pallet classification into candidate buffers

use crate::domain::pallet::PalletRecord;
use crate::domain::types::{Detection, Point};
use crate::services::door_tracker::DoorTracker;
use crate::services::geometry::StagingArea;
use std::time::Instant;
use tracing::trace;

/// Where a pallet detection sits relative to the staging area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Inside the staging quadrilateral
    Moving,
    /// Outside, nearer the door-side edge
    DoorSide,
    /// Outside, nearer the rack-side edge
    RackSide,
}

/// Candidates collected during one cycle, cleared when the cycle ends
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    pub moving: Vec<PalletRecord>,
    pub door_side: Vec<PalletRecord>,
    pub rack_side: Vec<PalletRecord>,
}

impl CandidateBuffer {
    pub fn clear(&mut self) {
        self.moving.clear();
        self.door_side.clear();
        self.rack_side.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.moving.is_empty() && self.door_side.is_empty() && self.rack_side.is_empty()
    }

    pub fn len(&self) -> usize {
        self.moving.len() + self.door_side.len() + self.rack_side.len()
    }
}

/// Classify a point, returning its placement with the door-axis and side-axis projections.
/// The side-axis projection is only computed for points outside the area.
pub fn placement(area: &StagingArea, center: Point) -> (Placement, Point, Point) {
    let door_axis = area.door_axis(center);
    if area.contains(center) {
        return (Placement::Moving, door_axis, Point::default());
    }
    let side_axis = area.side_axis(center);
    if side_axis.y.abs() > door_axis.y.abs() {
        (Placement::DoorSide, door_axis, side_axis)
    } else {
        (Placement::RackSide, door_axis, side_axis)
    }
}

/// Returns true when a nested candidate already exists; the stored one takes the
/// new geometry if the new detection is more confident.
fn merge_duplicate(list: &mut [PalletRecord], record: &PalletRecord) -> bool {
    match list.iter_mut().find(|c| c.bbox.nests_with(&record.bbox)) {
        Some(existing) => {
            if existing.confidence < record.confidence {
                *existing = record.clone();
            }
            true
        }
        None => false,
    }
}

/// Classify one pallet detection into `buffer`
pub fn classify(
    det: &Detection,
    area: &StagingArea,
    doors: &DoorTracker,
    buffer: &mut CandidateBuffer,
    now: Instant,
) -> Placement {
    let center = det.bbox.center();
    let (placement, door_axis, side_axis) = placement(area, center);
    let record = PalletRecord::from_detection(det, door_axis, side_axis, now);

    match placement {
        Placement::Moving => {
            if !merge_duplicate(&mut buffer.moving, &record) {
                buffer.moving.push(record);
            }
        }
        Placement::DoorSide => {
            if !merge_duplicate(&mut buffer.door_side, &record) {
                if doors.open_door_spanning(center.x) {
                    buffer.door_side.push(record);
                } else {
                    trace!(x = center.x, y = center.y, "door_side_pallet_without_open_door");
                }
            }
        }
        Placement::RackSide => {
            if !merge_duplicate(&mut buffer.rack_side, &record) {
                buffer.rack_side.push(record);
            }
        }
    }
    placement
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{BoundingBox, ObjectClass};
    use crate::infra::config::TrackingConfig;
    use std::time::Duration;

    fn area() -> StagingArea {
        StagingArea::new([
            Point::new(160.0, 240.0),
            Point::new(344.0, 110.0),
            Point::new(580.0, 260.0),
            Point::new(458.0, 638.0),
        ])
        .unwrap()
    }

    fn pallet_at(x: f64, y: f64, conf: f64) -> Detection {
        Detection::new(ObjectClass::Pallet, BoundingBox::centered(Point::new(x, y), 40.0, 30.0), conf)
    }

    fn open_door_tracker(area: &StagingArea) -> DoorTracker {
        let mut doors = DoorTracker::new(TrackingConfig::default());
        let t0 = Instant::now();
        for i in 0..4 {
            let now = t0 + Duration::from_millis(i * 100);
            doors.observe(BoundingBox::new(230.0, 80.0, 290.0, 120.0), 0.9, area, now);
            doors.sweep(now);
        }
        doors
    }

    #[test]
    fn test_placement_partition() {
        let area = area();
        assert_eq!(placement(&area, Point::new(252.0, 175.0)).0, Placement::Moving);
        assert_eq!(placement(&area, Point::new(300.0, 300.0)).0, Placement::Moving);
        assert_eq!(placement(&area, Point::new(600.0, 400.0)).0, Placement::RackSide);
        assert_eq!(placement(&area, Point::new(260.0, 150.0)).0, Placement::DoorSide);
    }

    #[test]
    fn test_nested_duplicates_keep_most_confident() {
        let area = area();
        let doors = DoorTracker::new(TrackingConfig::default());
        let mut buffer = CandidateBuffer::default();
        let now = Instant::now();

        let outer = Detection::new(ObjectClass::Pallet, BoundingBox::new(280.0, 280.0, 320.0, 320.0), 0.6);
        let inner = Detection::new(ObjectClass::Pallet, BoundingBox::new(290.0, 290.0, 310.0, 310.0), 0.8);
        let weaker = Detection::new(ObjectClass::Pallet, BoundingBox::new(285.0, 285.0, 315.0, 315.0), 0.5);

        classify(&outer, &area, &doors, &mut buffer, now);
        classify(&inner, &area, &doors, &mut buffer, now);
        classify(&weaker, &area, &doors, &mut buffer, now);

        assert_eq!(buffer.moving.len(), 1);
        assert_eq!(buffer.moving[0].confidence, 0.8);
        assert_eq!(buffer.moving[0].bbox, inner.bbox);
    }

    #[test]
    fn test_separate_pallets_both_kept() {
        let area = area();
        let doors = DoorTracker::new(TrackingConfig::default());
        let mut buffer = CandidateBuffer::default();
        let now = Instant::now();

        classify(&pallet_at(300.0, 300.0, 0.9), &area, &doors, &mut buffer, now);
        classify(&pallet_at(400.0, 400.0, 0.9), &area, &doors, &mut buffer, now);
        classify(&pallet_at(600.0, 400.0, 0.9), &area, &doors, &mut buffer, now);

        assert_eq!(buffer.moving.len(), 2);
        assert_eq!(buffer.rack_side.len(), 1);
        assert_eq!(buffer.len(), 3);

        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_door_side_needs_open_door() {
        let area = area();
        let now = Instant::now();
        let det = pallet_at(260.0, 150.0, 0.9);

        let closed = DoorTracker::new(TrackingConfig::default());
        let mut buffer = CandidateBuffer::default();
        assert_eq!(classify(&det, &area, &closed, &mut buffer, now), Placement::DoorSide);
        assert!(buffer.door_side.is_empty());

        let open = open_door_tracker(&area);
        let mut buffer = CandidateBuffer::default();
        classify(&det, &area, &open, &mut buffer, now);
        assert_eq!(buffer.door_side.len(), 1);
        assert!(buffer.door_side[0].side_axis.y.abs() > buffer.door_side[0].door_axis.y.abs());
    }
}
