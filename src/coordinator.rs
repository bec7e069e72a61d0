//! Coordinator side of the compositor.
//!
//! The coordinator owns one composite dialog's lifecycle: it creates the
//! slot table, launches one worker per pane, waits for each pane to publish
//! its window handle, grafts those windows into the composite through the
//! host, broadcasts control commands, and destroys the table once every
//! worker has exited.

use std::process::Child;

use tracing::{debug, info, warn};

use crate::config::CompositorConfig;
use crate::domain::{
    CompositePlan, ControlCommand, CoordinatorPhase, PaneIndex, Slot, TableKey, WindowHandle,
};
use crate::error::{ContractResult, ContractViolation, EmbedError, LivenessGap, Result};
use crate::services::control::send_command;
use crate::services::launch::{resolve_program, spawn_worker, WorkerArgs};
use crate::services::table::SlotTable;

/// Embeds ready pane windows into the composite.
///
/// Implementations adapt the published handle to whatever is actually
/// rendering the composite: a socket/plug pair, a reparenting call, or a
/// recorder in tests.
pub trait PaneHost {
    fn embed(
        &mut self,
        pane: PaneIndex,
        handle: WindowHandle,
    ) -> std::result::Result<(), EmbedError>;
}

/// Coordinator-side record of one pane's worker process
struct PaneProc {
    index: PaneIndex,
    child: Child,
    /// The publication observed in the table, once seen
    observed: Option<Slot>,
    embedded: bool,
    exit_status: Option<i32>,
}

impl PaneProc {
    fn new(index: PaneIndex, child: Child) -> Self {
        Self {
            index,
            child,
            observed: None,
            embedded: false,
            exit_status: None,
        }
    }

    /// Non-blocking liveness check; reaps and caches the status once the
    /// child has exited
    fn poll_exit(&mut self) -> std::io::Result<Option<i32>> {
        if self.exit_status.is_none() {
            if let Some(status) = self.child.try_wait()? {
                self.exit_status = Some(status.code().unwrap_or(-1));
            }
        }
        Ok(self.exit_status)
    }
}

/// Owns a composite dialog from table creation to teardown.
///
/// The composite's pane count is fixed by the plan given to `spawn`; there
/// is no way to add a pane to a running composite.
pub struct Coordinator {
    table: SlotTable,
    panes: Vec<PaneProc>,
    phase: CoordinatorPhase,
    config: CompositorConfig,
}

impl Coordinator {
    /// Create the shared table and launch one worker per pane.
    ///
    /// Any single launch failure aborts the whole composite: already-started
    /// workers are killed and the table is destroyed, so no partial layout
    /// survives.
    pub fn spawn(key: TableKey, plan: &CompositePlan, config: CompositorConfig) -> Result<Self> {
        let capacity = plan.pane_count();
        let program = resolve_program(config.launch.worker_program.as_deref())?;
        info!(
            "creating {:?} composite {} with {} panes",
            plan.layout(),
            key,
            capacity
        );
        let table = SlotTable::create(key, capacity)?;

        let mut panes: Vec<PaneProc> = Vec::with_capacity(capacity);
        for (index, spec) in PaneIndex::range(capacity).zip(plan.panes()) {
            let args = WorkerArgs::new(key, index, capacity, spec.args.clone());
            match spawn_worker(&program, &args, config.launch.inherit_stdout) {
                Ok(child) => {
                    debug!("launched worker pid {} for pane {}", child.id(), index);
                    panes.push(PaneProc::new(index, child));
                }
                Err(err) => {
                    warn!("worker launch failed for pane {}; aborting composite", index);
                    abort_composite(table, &mut panes);
                    return Err(err.into());
                }
            }
        }

        Ok(Self {
            table,
            panes,
            phase: CoordinatorPhase::AwaitingReady,
            config,
        })
    }

    pub fn key(&self) -> TableKey {
        self.table.key()
    }

    pub fn phase(&self) -> CoordinatorPhase {
        self.phase
    }

    pub fn pane_count(&self) -> usize {
        self.panes.len()
    }

    /// Read one pane slot. The coordinator never writes pane slots.
    pub fn slot(&self, index: PaneIndex) -> Result<Slot> {
        Ok(self.table.get(index)?)
    }

    /// Check once whether a pane has published, without waiting.
    ///
    /// Hosts that drive their own event loop can poll this instead of
    /// parking in `await_ready`.
    pub fn try_ready(&mut self, index: PaneIndex) -> Result<Option<WindowHandle>> {
        self.ensure_phase(&[CoordinatorPhase::AwaitingReady], "try_ready")?;
        if let Some(slot) = self.pane(index)?.observed {
            return Ok(slot.handle());
        }
        let slot = self.table.get(index)?;
        match slot.handle() {
            Some(handle) => {
                debug!(
                    "pane {} published handle {} from pid {}",
                    index, handle, slot.owner_pid
                );
                self.pane_mut(index)?.observed = Some(slot);
                Ok(Some(handle))
            }
            None => Ok(None),
        }
    }

    /// Wait until a pane publishes, under the readiness deadline.
    ///
    /// A worker that exits before publishing is detected immediately and
    /// reported as a liveness gap rather than waited out.
    pub async fn await_ready(&mut self, index: PaneIndex) -> Result<WindowHandle> {
        let mut schedule = self.config.timing.ready_schedule();
        loop {
            if let Some(handle) = self.try_ready(index)? {
                return Ok(handle);
            }
            if let Some(status) = self.pane_mut(index)?.poll_exit()? {
                warn!("pane {} exited with status {} before publishing", index, status);
                return Err(LivenessGap::ExitedBeforePublish {
                    pane: index,
                    status,
                }
                .into());
            }
            match schedule.next_delay() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => {
                    return Err(LivenessGap::PublishTimeout {
                        pane: index,
                        waited_ms: schedule.waited_ms(),
                    }
                    .into())
                }
            }
        }
    }

    /// Graft one ready pane's window into the host, exactly once
    pub fn embed(&mut self, index: PaneIndex, host: &mut dyn PaneHost) -> Result<()> {
        self.ensure_phase(&[CoordinatorPhase::AwaitingReady], "embed")?;
        let pane = self.pane(index)?;
        let slot = pane
            .observed
            .ok_or(ContractViolation::EmbedBeforeReady(index))?;
        if pane.embedded {
            return Err(ContractViolation::AlreadyEmbedded(index).into());
        }
        let handle = slot
            .handle()
            .ok_or(ContractViolation::EmbedBeforeReady(index))?;
        host.embed(index, handle)?;
        self.pane_mut(index)?.embedded = true;
        debug!("embedded pane {} ({})", index, handle);
        Ok(())
    }

    /// Wait for every pane in index order, embedding each as it publishes.
    ///
    /// On success the composite is running; on any failure the caller should
    /// `abort` the coordinator.
    pub async fn await_all_ready(&mut self, host: &mut dyn PaneHost) -> Result<()> {
        self.ensure_phase(&[CoordinatorPhase::AwaitingReady], "await_all_ready")?;
        for index in PaneIndex::range(self.table.capacity()) {
            self.await_ready(index).await?;
            self.embed(index, host)?;
        }
        self.phase = CoordinatorPhase::Running;
        info!(
            "all {} panes embedded; composite is running",
            self.table.capacity()
        );
        Ok(())
    }

    /// Send one control command to every published pane.
    ///
    /// TERMINATE moves the composite into shutdown; once there, EMIT_RESULT
    /// is no longer a legal broadcast.
    pub fn broadcast(&mut self, command: ControlCommand) -> Result<()> {
        let allowed: &[CoordinatorPhase] = match command {
            ControlCommand::EmitResult => &[CoordinatorPhase::Running],
            ControlCommand::Terminate => {
                &[CoordinatorPhase::Running, CoordinatorPhase::ShuttingDown]
            }
        };
        self.ensure_phase(allowed, "broadcast")?;
        info!("broadcasting {} to {} panes", command, self.panes.len());
        for pane in &self.panes {
            if let Some(slot) = pane.observed {
                send_command(slot.owner_pid, command)?;
            }
        }
        if command == ControlCommand::Terminate {
            self.phase = CoordinatorPhase::ShuttingDown;
            debug!("composite {} shutting down", self.table.key());
        }
        Ok(())
    }

    /// Wait for every worker process to exit, under the exit deadline
    pub async fn await_exit_all(&mut self) -> Result<()> {
        self.ensure_phase(&[CoordinatorPhase::ShuttingDown], "await_exit_all")?;
        let mut schedule = self.config.timing.exit_schedule();
        loop {
            let mut remaining = 0;
            for pane in &mut self.panes {
                if pane.poll_exit()?.is_none() {
                    remaining += 1;
                }
            }
            if remaining == 0 {
                info!("all {} workers exited", self.panes.len());
                return Ok(());
            }
            match schedule.next_delay() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => {
                    return Err(LivenessGap::ExitTimeout {
                        remaining,
                        waited_ms: schedule.waited_ms(),
                    }
                    .into())
                }
            }
        }
    }

    /// Destroy the table and finish the composite.
    ///
    /// Consumes the coordinator, so a second teardown cannot compile. If any
    /// worker is still running this aborts the composite instead of
    /// unlinking a live table out from under it, and reports the violation.
    pub fn teardown(self) -> Result<()> {
        let all_exited = self.phase == CoordinatorPhase::ShuttingDown
            && self.panes.iter().all(|p| p.exit_status.is_some());
        if !all_exited {
            warn!(
                "teardown requested in phase {} with live workers; aborting composite",
                self.phase.name()
            );
            self.abort();
            return Err(ContractViolation::TeardownBeforeExit.into());
        }
        let key = self.table.key();
        self.table.destroy()?;
        info!("composite {} done; table destroyed", key);
        Ok(())
    }

    /// Kill every worker and destroy the table, best effort.
    ///
    /// For fatal paths (spawn failures, liveness gaps) where the composite
    /// cannot be shown. Failures here are logged, not returned.
    pub fn abort(self) {
        let Coordinator {
            table, mut panes, ..
        } = self;
        abort_composite(table, &mut panes);
    }

    fn ensure_phase(&self, allowed: &[CoordinatorPhase], op: &'static str) -> ContractResult<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(ContractViolation::OutOfPhase {
                op,
                phase: self.phase.name(),
            })
        }
    }

    fn pane(&self, index: PaneIndex) -> ContractResult<&PaneProc> {
        self.panes
            .get(index.raw() - 1)
            .ok_or(ContractViolation::IndexOutOfRange {
                index: index.raw(),
                capacity: self.panes.len(),
            })
    }

    fn pane_mut(&mut self, index: PaneIndex) -> ContractResult<&mut PaneProc> {
        let capacity = self.panes.len();
        self.panes
            .get_mut(index.raw() - 1)
            .ok_or(ContractViolation::IndexOutOfRange {
                index: index.raw(),
                capacity,
            })
    }
}

fn abort_composite(table: SlotTable, panes: &mut [PaneProc]) {
    for pane in panes.iter_mut() {
        if pane.exit_status.is_some() {
            continue;
        }
        if let Err(e) = pane.child.kill() {
            // already-exited children report InvalidInput here
            debug!("kill pane {}: {}", pane.index, e);
        }
        match pane.child.wait() {
            Ok(status) => pane.exit_status = Some(status.code().unwrap_or(-1)),
            Err(e) => warn!("failed to reap pane {}: {}", pane.index, e),
        }
    }
    if let Err(e) = table.destroy() {
        warn!("failed to destroy table during abort: {}", e);
    }
    info!("composite aborted");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CompositorError, ResourceError};
    use std::path::{Path, PathBuf};

    fn unique_key(tag: u32) -> TableKey {
        TableKey::new(std::process::id().wrapping_mul(1000).wrapping_add(700 + tag))
    }

    fn test_config(program: &Path) -> CompositorConfig {
        let mut config = CompositorConfig::default();
        config.launch.worker_program = Some(program.to_path_buf());
        config.launch.inherit_stdout = false;
        config.timing.ready_deadline_ms = 300;
        config.timing.exit_deadline_ms = 2000;
        config.timing.poll_initial_ms = 10;
        config
    }

    /// Worker stand-in that ignores its argv, never publishes, and stays
    /// alive until killed. Coreutils are no substitute here: yes(1)
    /// option-parses the worker argv and exits 1 on the spot.
    fn sleeper_program(dir: &tempfile::TempDir) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("sleeper.sh");
        std::fs::write(&path, "#!/bin/sh\nexec sleep 600\n").unwrap();
        let mut permissions = std::fs::metadata(&path).unwrap().permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(&path, permissions).unwrap();
        path
    }

    fn strip(panes: usize) -> CompositePlan {
        CompositePlan::strip(vec![crate::domain::PaneSpec::default(); panes]).unwrap()
    }

    struct NullHost;

    impl PaneHost for NullHost {
        fn embed(
            &mut self,
            _pane: PaneIndex,
            _handle: WindowHandle,
        ) -> std::result::Result<(), EmbedError> {
            Ok(())
        }
    }

    #[test]
    fn test_spawn_failure_destroys_table() {
        let key = unique_key(0);
        let config = test_config(Path::new("/nonexistent/worker"));
        let result = Coordinator::spawn(key, &strip(2), config);
        assert!(matches!(result, Err(CompositorError::Spawn(_))));

        // the table did not outlive the failed spawn
        assert!(matches!(
            SlotTable::attach(key, 2),
            Err(CompositorError::Resource(ResourceError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_early_exit_detected_before_deadline() {
        // /bin/true never publishes; it just exits. The readiness wait must
        // report that as soon as the exit is seen instead of burning the
        // whole deadline.
        let key = unique_key(1);
        let mut config = test_config(Path::new("/bin/true"));
        config.timing.ready_deadline_ms = 10_000;
        let mut coordinator = Coordinator::spawn(key, &strip(1), config).unwrap();

        let started = std::time::Instant::now();
        let result = coordinator.await_ready(PaneIndex::FIRST).await;
        assert!(matches!(
            result,
            Err(CompositorError::Liveness(LivenessGap::ExitedBeforePublish {
                status: 0,
                ..
            }))
        ));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        coordinator.abort();
    }

    #[tokio::test]
    async fn test_publish_timeout_for_silent_worker() {
        let dir = tempfile::tempdir().unwrap();
        let key = unique_key(2);
        let mut coordinator =
            Coordinator::spawn(key, &strip(1), test_config(&sleeper_program(&dir))).unwrap();

        let result = coordinator.await_ready(PaneIndex::FIRST).await;
        match result {
            Err(CompositorError::Liveness(LivenessGap::PublishTimeout { pane, waited_ms })) => {
                assert_eq!(pane, PaneIndex::FIRST);
                assert!(waited_ms >= 300);
            }
            other => panic!("expected publish timeout, got {other:?}"),
        }
        coordinator.abort();
    }

    #[tokio::test]
    async fn test_phase_guards_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let key = unique_key(3);
        let mut coordinator =
            Coordinator::spawn(key, &strip(1), test_config(&sleeper_program(&dir))).unwrap();
        assert_eq!(coordinator.phase(), CoordinatorPhase::AwaitingReady);

        // nothing published yet
        assert_eq!(coordinator.try_ready(PaneIndex::FIRST).unwrap(), None);
        assert!(matches!(
            coordinator.embed(PaneIndex::FIRST, &mut NullHost),
            Err(CompositorError::Contract(
                ContractViolation::EmbedBeforeReady(_)
            ))
        ));

        // broadcast and exit-wait belong to later phases
        assert!(matches!(
            coordinator.broadcast(ControlCommand::EmitResult),
            Err(CompositorError::Contract(ContractViolation::OutOfPhase {
                op: "broadcast",
                ..
            }))
        ));
        assert!(matches!(
            coordinator.await_exit_all().await,
            Err(CompositorError::Contract(ContractViolation::OutOfPhase {
                op: "await_exit_all",
                ..
            }))
        ));

        coordinator.abort();
    }

    #[tokio::test]
    async fn test_teardown_with_live_workers_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let key = unique_key(4);
        let coordinator =
            Coordinator::spawn(key, &strip(2), test_config(&sleeper_program(&dir))).unwrap();

        let result = coordinator.teardown();
        assert!(matches!(
            result,
            Err(CompositorError::Contract(
                ContractViolation::TeardownBeforeExit
            ))
        ));

        // the abort path still destroyed the table
        assert!(matches!(
            SlotTable::attach(key, 2),
            Err(CompositorError::Resource(ResourceError::NotFound(_)))
        ));
    }

    #[test]
    fn test_slot_reads_unassigned_before_publish() {
        let dir = tempfile::tempdir().unwrap();
        let key = unique_key(5);
        let coordinator =
            Coordinator::spawn(key, &strip(1), test_config(&sleeper_program(&dir))).unwrap();
        assert_eq!(
            coordinator.slot(PaneIndex::FIRST).unwrap(),
            Slot::UNASSIGNED
        );
        coordinator.abort();
    }
}
