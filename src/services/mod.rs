//! Services - tracking logic and state management
//!
//! This module contains the core tracking services:
//! - `geometry` - Staging-area polygon, projections and distances
//! - `arena` - Stable-slot storage with mark-and-compact removal
//! - `door_tracker` - Door matching, debounce and validation
//! - `pallet_classifier` - Per-frame pallet placement into candidate buffers
//! - `reconciler` - Pallet category state machine and identity handling
//! - `session` - Per-connection tracking state and the cycle entry point
//! - `cycle_worker` - Async worker driving detection and cycles

pub mod arena;
pub mod cycle_worker;
pub mod door_tracker;
pub mod geometry;
pub mod pallet_classifier;
pub mod reconciler;
pub mod session;

// Re-export commonly used types
pub use cycle_worker::{create_cycle_worker, CycleWorker};
pub use geometry::StagingArea;
pub use session::{Session, StatusSnapshot};
