//! Domain entities for the pane compositor.
//!
//! This module contains the core vocabulary of the composite dialog:
//! - Pane identity: table keys, pane indexes, window handles, slot values
//! - Commands: the two-command control protocol
//! - Layout: composite plans (strip / split) and per-pane specs
//! - Phases: coordinator and worker lifecycle states

mod command;
mod layout;
mod pane;
mod phase;

pub use command::ControlCommand;
pub use layout::{CompositePlan, PaneLayout, PaneSpec};
pub use pane::{PaneIndex, Slot, TableKey, WindowHandle, UNASSIGNED_PID, UNPUBLISHED_HANDLE};
pub use phase::{CoordinatorPhase, WorkerPhase};
