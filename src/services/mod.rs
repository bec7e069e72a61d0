//! Infrastructure services for the pane compositor.
//!
//! This module contains the process- and OS-facing plumbing:
//! - Shm: named shared-memory segments for table rendezvous
//! - Table: the slot table and its write capabilities
//! - Retry: bounded polling with exponential backoff
//! - Control: the two-signal command protocol
//! - Launch: worker argv construction and spawning

pub mod control;
pub mod launch;
pub mod retry;
pub mod shm;
pub mod table;

pub use control::{send_command, signal_for, CommandListener};
pub use launch::{resolve_program, spawn_worker, WorkerArgs, PANE_ROLE_FLAG};
pub use retry::PollSchedule;
pub use shm::ShmSegment;
pub use table::{byte_len_for, MemBacking, PaneSlotWriter, SlotTable, TableBacking, SLOT_SIZE};
