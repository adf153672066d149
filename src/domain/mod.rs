//! Domain models - detections, pallet records and dock events
//!
//! This module contains the canonical data types used throughout the system:
//! - `Detection` - one detector output box with class and confidence
//! - `PalletRecord` - tracked pallet geometry, identity and position history
//! - `DockEvent` - business events delivered to the inventory system

pub mod event;
pub mod pallet;
pub mod types;

pub use event::{DockEvent, EventCategory, EventKind};
pub use pallet::{PalletRecord, TrackHistory};
pub use types::{BoundingBox, Detection, ObjectClass, PalletId, Point};
