//! Core simulation: the toroidal grid, change tracking and generation stepping.
//!
//! The session and FFI layers drive everything through
//! [`stepping::SimulationScheduler`].

pub mod cell;
pub mod frames;
pub mod grid;
pub mod incremental;
pub mod pacing;
pub mod pending;
pub mod stepping;

pub use cell::{wrap, Cell, Point};
pub use frames::{Frame, FrameKind, FrameQueue};
pub use grid::{count_neighbors, GridSnapshot, GridStore, GridView, NeighborhoodView};
pub use incremental::DirtySetTracker;
pub use pacing::PacingController;
pub use pending::PendingChangeBuffer;
pub use stepping::{RunStatus, SchedulerState, SimulationScheduler, StepOutcome, StopStatus};
