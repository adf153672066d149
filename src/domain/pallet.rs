//! Pallet records and their position history

use super::types::{BoundingBox, Detection, PalletId, Point};
use smallvec::SmallVec;
use std::time::Instant;

/// Inline capacity of a track history (matches the default history length)
pub const HISTORY_INLINE: usize = 10;

/// Bounded FIFO of recent image-space centers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackHistory {
    points: SmallVec<[Point; HISTORY_INLINE]>,
}

impl TrackHistory {
    /// History holding a single point
    pub fn seeded(point: Point) -> Self {
        let mut points = SmallVec::new();
        points.push(point);
        Self { points }
    }

    /// Append a point, evicting the oldest once `cap` is reached
    pub fn push_capped(&mut self, point: Point, cap: usize) {
        self.points.push(point);
        while self.points.len() > cap.max(1) {
            self.points.remove(0);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn is_full(&self, cap: usize) -> bool {
        self.points.len() >= cap
    }

    pub fn oldest(&self) -> Option<Point> {
        self.points.first().copied()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Largest distance of any point from the oldest one
    pub fn max_deviation(&self) -> f64 {
        let Some(first) = self.oldest() else {
            return 0.0;
        };
        self.points
            .iter()
            .map(|p| ((p.x - first.x).powi(2) + (p.y - first.y).powi(2)).sqrt())
            .fold(0.0, f64::max)
    }
}

/// Persistent pallet state, owned by exactly one category arena
#[derive(Debug, Clone)]
pub struct PalletRecord {
    pub bbox: BoundingBox,
    pub confidence: f64,
    /// Image-space center of `bbox`
    pub center: Point,
    /// Center projected into the door-axis frame (corner0 -> corner1)
    pub door_axis: Point,
    /// Center projected into the side-axis frame (corner1 -> corner2); zero when not computed
    pub side_axis: Point,
    pub updated_at: Instant,
    pub pallet_id: Option<PalletId>,
    /// Present for Moving and Fixed records only
    pub history: Option<TrackHistory>,
}

impl PalletRecord {
    pub fn from_detection(det: &Detection, door_axis: Point, side_axis: Point, now: Instant) -> Self {
        Self {
            bbox: det.bbox,
            confidence: det.confidence,
            center: det.bbox.center(),
            door_axis,
            side_axis,
            updated_at: now,
            pallet_id: None,
            history: None,
        }
    }

    /// Take geometry and confidence from `other`, keeping identity and history
    pub fn refresh_from(&mut self, other: &PalletRecord, now: Instant) {
        self.bbox = other.bbox;
        self.confidence = other.confidence;
        self.center = other.center;
        self.door_axis = other.door_axis;
        self.side_axis = other.side_axis;
        self.updated_at = now;
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.bbox.width()
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.bbox.height()
    }

    #[inline]
    pub fn is_identified(&self) -> bool {
        self.pallet_id.is_some()
    }

    pub fn history_len(&self) -> usize {
        self.history.as_ref().map_or(0, TrackHistory::len)
    }
}
