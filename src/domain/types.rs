//! Shared types for dock vision

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Image-space or staging-local coordinate pair (pixels)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned detection box in image coordinates (x1,y1 top-left; x2,y2 bottom-right)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    #[inline]
    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Box of the given size centered on `center`
    pub fn centered(center: Point, width: f64, height: f64) -> Self {
        Self {
            x1: center.x - width / 2.0,
            y1: center.y - height / 2.0,
            x2: center.x + width / 2.0,
            y2: center.y + height / 2.0,
        }
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    #[inline]
    pub fn center(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// True if `other` lies fully inside this box (edges inclusive)
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.x1 >= self.x1 && other.y1 >= self.y1 && other.x2 <= self.x2 && other.y2 <= self.y2
    }

    /// True if either box fully contains the other
    pub fn nests_with(&self, other: &BoundingBox) -> bool {
        self.contains(other) || other.contains(self)
    }
}

/// Object classes reported by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectClass {
    Door,
    Pallet,
    Forklift,
    #[serde(other)]
    Other,
}

impl std::str::FromStr for ObjectClass {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "door" => ObjectClass::Door,
            "pallet" => ObjectClass::Pallet,
            "forklift" => ObjectClass::Forklift,
            _ => ObjectClass::Other,
        })
    }
}

impl ObjectClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectClass::Door => "door",
            ObjectClass::Pallet => "pallet",
            ObjectClass::Forklift => "forklift",
            ObjectClass::Other => "other",
        }
    }
}

/// One detector output for a single frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub class: ObjectClass,
    pub bbox: BoundingBox,
    pub confidence: f64,
}

impl Detection {
    pub fn new(class: ObjectClass, bbox: BoundingBox, confidence: f64) -> Self {
        Self { class, bbox, confidence }
    }
}

/// Globally unique pallet identity, minted at most once per physical pallet
///
/// Backed by a UUIDv7 so identities sort by creation time in the inventory system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PalletId(pub Uuid);

impl PalletId {
    pub fn mint() -> Self {
        Self(Uuid::now_v7())
    }
}

impl std::fmt::Display for PalletId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
