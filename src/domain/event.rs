//! Business events emitted to the inventory system

use super::types::PalletId;
use serde::Serialize;
use std::fmt;

/// Event category, also the last path segment of the sink endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventCategory {
    Door,
    Dock,
    Stage,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Door => "Door",
            EventCategory::Dock => "Dock",
            EventCategory::Stage => "Stage",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Door confirmed open
    Open,
    /// Door confirmed closed
    Close,
    /// Pallet left the door side into the staging area (truck unloaded)
    Unload,
    /// Pallet left the staging area through the door side (truck loaded)
    Load,
    /// Pallet left the rack side into the staging area
    StageIn,
    /// Pallet left the staging area toward the racks
    StageOut,
}

impl EventKind {
    pub fn category(&self) -> EventCategory {
        match self {
            EventKind::Open | EventKind::Close => EventCategory::Door,
            EventKind::Unload | EventKind::Load => EventCategory::Dock,
            EventKind::StageIn | EventKind::StageOut => EventCategory::Stage,
        }
    }

    /// Document type code expected by the inventory system
    pub fn doc_type(&self) -> &'static str {
        match self {
            EventKind::Open => "Open",
            EventKind::Close => "Close",
            EventKind::Unload => "UOD",
            EventKind::Load => "LOD",
            EventKind::StageIn => "IN",
            EventKind::StageOut => "Out",
        }
    }

    /// Overlay status text for pallet transitions
    pub fn pallet_status(&self) -> Option<&'static str> {
        match self {
            EventKind::Unload => Some("unload state"),
            EventKind::StageIn => Some("in state"),
            EventKind::Load => Some("load state"),
            EventKind::StageOut => Some("out state"),
            EventKind::Open | EventKind::Close => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category(), self.doc_type())
    }
}

/// A discrete dock event produced by one tracking cycle
#[derive(Debug, Clone, PartialEq)]
pub struct DockEvent {
    pub kind: EventKind,
    /// Set for pallet events
    pub pallet_id: Option<PalletId>,
    /// Set for door events (`Door{index}`)
    pub door: Option<String>,
}

impl DockEvent {
    pub fn door(kind: EventKind, index: usize) -> Self {
        Self { kind, pallet_id: None, door: Some(format!("Door{}", index)) }
    }

    pub fn pallet(kind: EventKind, pallet_id: PalletId) -> Self {
        Self { kind, pallet_id: Some(pallet_id), door: None }
    }

    #[inline]
    pub fn category(&self) -> EventCategory {
        self.kind.category()
    }
}
