//! panemux: multi-process pane compositor for composite dialogs
//!
//! This crate assembles one dialog window out of panes that each live in
//! their own process. A coordinator creates a shared slot table and launches
//! one worker per pane; each worker publishes its window handle into its
//! slot, the coordinator grafts the published windows into the composite,
//! and a two-signal protocol drives result emission and termination.

pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod services;
pub mod worker;

pub use config::CompositorConfig;
pub use coordinator::{Coordinator, PaneHost};
pub use error::{CompositorError, Result};
pub use worker::{PaneDialog, RunOutcome, Worker};
