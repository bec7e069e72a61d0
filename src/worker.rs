//! Worker (pane) side of the compositor.
//!
//! A worker attaches to the coordinator's table, publishes its pid and
//! window handle exactly once, then sits in a run loop reacting to control
//! commands until told to terminate. The pane's window stays physically
//! owned by the worker for its whole life; only the handle crosses the
//! process boundary.

use tracing::{debug, info, warn};

use crate::config::CompositorConfig;
use crate::domain::{ControlCommand, PaneIndex, TableKey, WindowHandle, WorkerPhase};
use crate::error::{
    CompositorError, ContractViolation, DialogError, LivenessGap, ResourceError, Result,
};
use crate::services::control::CommandListener;
use crate::services::table::SlotTable;

/// One pane's dialog logic, supplied by the invoking program.
pub trait PaneDialog {
    /// Build the pane's widget tree and return its transferable window handle
    fn realize(&mut self) -> std::result::Result<WindowHandle, DialogError>;

    /// Produce the pane's current result text (EMIT_RESULT). The pane keeps
    /// running afterwards; repeated emits are normal.
    fn emit_result(&mut self);
}

/// How a worker's run loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// TERMINATE received
    Terminated { emitted: usize },
    /// The signal driver shut down before any TERMINATE arrived
    ControlClosed { emitted: usize },
}

/// One pane worker, from attach to exit.
pub struct Worker {
    key: TableKey,
    pane: PaneIndex,
    table: SlotTable,
    listener: CommandListener,
    phase: WorkerPhase,
    published: bool,
}

impl Worker {
    /// Attach to the composite's table, retrying while it appears.
    ///
    /// The command listener is installed before anything else, so a command
    /// sent right after our publish is queued for the run loop instead of
    /// hitting the OS default action.
    pub async fn attach(
        key: TableKey,
        pane: PaneIndex,
        pane_count: usize,
        config: &CompositorConfig,
    ) -> Result<Self> {
        let listener = CommandListener::install()?;
        let mut schedule = config.timing.attach_schedule();
        debug!("pane {} attaching to table {}", pane, key);

        let table = loop {
            match SlotTable::attach(key, pane_count) {
                Ok(table) => break table,
                // the segment may not exist yet, or exist but not be sized
                Err(CompositorError::Resource(ResourceError::NotFound(_)))
                | Err(CompositorError::Resource(ResourceError::SizeMismatch {
                    actual: 0, ..
                })) => match schedule.next_delay() {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => {
                        return Err(LivenessGap::AttachTimeout {
                            key,
                            waited_ms: schedule.waited_ms(),
                        }
                        .into())
                    }
                },
                Err(other) => return Err(other),
            }
        };

        // attached; now wait for the creator's init flag
        while !table.is_initialized() {
            match schedule.next_delay() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => {
                    return Err(LivenessGap::AttachTimeout {
                        key,
                        waited_ms: schedule.waited_ms(),
                    }
                    .into())
                }
            }
        }

        // our index must address a pane slot of this table
        if pane.raw() > table.capacity() {
            return Err(ContractViolation::IndexOutOfRange {
                index: pane.raw(),
                capacity: table.capacity(),
            }
            .into());
        }

        info!(
            "pane {} attached to table {} (capacity {})",
            pane,
            key,
            table.capacity()
        );
        Ok(Self {
            key,
            pane,
            table,
            listener,
            phase: WorkerPhase::Publishing,
            published: false,
        })
    }

    pub fn key(&self) -> TableKey {
        self.key
    }

    pub fn pane(&self) -> PaneIndex {
        self.pane
    }

    pub fn phase(&self) -> WorkerPhase {
        self.phase
    }

    /// Publish this process's pid and the dialog's window handle, once.
    ///
    /// The slot's single-writer contract is enforced twice over: this worker
    /// cannot publish again through its own state, and a racing publish from
    /// another process loses the slot's pid claim.
    pub fn publish(&mut self, handle: WindowHandle) -> Result<()> {
        if self.published {
            return Err(ContractViolation::AlreadyPublished(self.pane).into());
        }
        let pid = std::process::id() as i64;
        self.table.pane_writer(self.pane)?.publish(pid, handle)?;
        self.published = true;
        info!("pane {} published handle {} (pid {})", self.pane, handle, pid);
        Ok(())
    }

    /// React to control commands until terminated.
    ///
    /// EMIT_RESULT asks the dialog for its result text and keeps the loop
    /// going; TERMINATE ends it. When both are pending at once, TERMINATE
    /// wins: a terminated pane never emits one more result.
    pub async fn run<D: PaneDialog>(mut self, dialog: &mut D) -> Result<RunOutcome> {
        if !self.published {
            return Err(ContractViolation::RunBeforePublish.into());
        }
        self.phase = WorkerPhase::Running;
        debug!("pane {} entering run loop", self.pane);

        let mut emitted = 0usize;
        let outcome = loop {
            match self.listener.next().await {
                Some(ControlCommand::EmitResult) => {
                    self.phase = WorkerPhase::Reacting(ControlCommand::EmitResult);
                    debug!("pane {} emitting result", self.pane);
                    dialog.emit_result();
                    emitted += 1;
                    self.phase = WorkerPhase::Running;
                }
                Some(ControlCommand::Terminate) => {
                    self.phase = WorkerPhase::Reacting(ControlCommand::Terminate);
                    info!("pane {} terminating after {} result(s)", self.pane, emitted);
                    break RunOutcome::Terminated { emitted };
                }
                None => {
                    warn!("pane {} control stream closed", self.pane);
                    break RunOutcome::ControlClosed { emitted };
                }
            }
        };
        self.phase = WorkerPhase::Exited;
        Ok(outcome)
    }
}
