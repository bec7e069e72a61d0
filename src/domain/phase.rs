//! Lifecycle phases of the two compositor roles.
//!
//! Phases gate which operations are legal; calling an operation out of phase
//! is a contract violation, not a hang or a silent no-op.

use crate::domain::ControlCommand;

/// Coordinator lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorPhase {
    /// Table not created yet
    Init,
    /// Launching worker processes
    Spawning,
    /// Waiting for panes to publish their window handles
    AwaitingReady,
    /// All panes embedded; composite is live
    Running,
    /// TERMINATE broadcast; waiting for workers to exit
    ShuttingDown,
    /// Table destroyed
    Done,
}

impl CoordinatorPhase {
    pub fn name(&self) -> &'static str {
        match self {
            CoordinatorPhase::Init => "init",
            CoordinatorPhase::Spawning => "spawning",
            CoordinatorPhase::AwaitingReady => "awaiting-ready",
            CoordinatorPhase::Running => "running",
            CoordinatorPhase::ShuttingDown => "shutting-down",
            CoordinatorPhase::Done => "done",
        }
    }

    /// True once the composite can no longer accept lifecycle calls
    pub fn is_terminal(&self) -> bool {
        matches!(self, CoordinatorPhase::Done)
    }
}

/// Worker lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    /// Retrying attachment to a table that may not exist yet
    Attaching,
    /// Attached; waiting for the coordinator's init flag
    WaitingForTable,
    /// Writing pid and window handle into the pane slot
    Publishing,
    /// Published; waiting for control commands
    Running,
    /// Handling one received command
    Reacting(ControlCommand),
    /// Run loop finished
    Exited,
}

impl WorkerPhase {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerPhase::Attaching => "attaching",
            WorkerPhase::WaitingForTable => "waiting-for-table",
            WorkerPhase::Publishing => "publishing",
            WorkerPhase::Running => "running",
            WorkerPhase::Reacting(_) => "reacting",
            WorkerPhase::Exited => "exited",
        }
    }
}
