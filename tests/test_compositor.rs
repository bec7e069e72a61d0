//! End-to-end composite lifecycles against real pane worker processes.
//!
//! Workers here are re-invocations of the panemux binary in pane role,
//! hosting the stub dialog. Results are observed through files the stubs
//! append to on EMIT_RESULT.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use panemux::domain::{CompositePlan, ControlCommand, PaneIndex, PaneSpec, TableKey, WindowHandle};
use panemux::error::{EmbedError, LivenessGap, ResourceError};
use panemux::services::{SlotTable, WorkerArgs};
use panemux::{CompositorConfig, CompositorError, Coordinator, PaneHost};

static NEXT_KEY: AtomicU32 = AtomicU32::new(0);

/// Keys unique per test and per test process
fn unique_key() -> TableKey {
    let n = NEXT_KEY.fetch_add(1, Ordering::Relaxed);
    TableKey::new(std::process::id().wrapping_mul(1000).wrapping_add(100 + n))
}

fn test_config() -> CompositorConfig {
    let mut config = CompositorConfig::default();
    config.launch.worker_program = Some(PathBuf::from(env!("CARGO_BIN_EXE_panemux")));
    config.launch.inherit_stdout = false;
    config
}

#[derive(Default)]
struct RecordingHost {
    embedded: Vec<(PaneIndex, WindowHandle)>,
}

impl PaneHost for RecordingHost {
    fn embed(
        &mut self,
        pane: PaneIndex,
        handle: WindowHandle,
    ) -> std::result::Result<(), EmbedError> {
        self.embedded.push((pane, handle));
        Ok(())
    }
}

/// Poll a stub result file until it holds at least `lines` lines
async fn wait_for_lines(path: &Path, lines: usize, deadline: Duration) -> Vec<String> {
    let started = Instant::now();
    loop {
        if let Ok(contents) = std::fs::read_to_string(path) {
            let got: Vec<String> = contents.lines().map(String::from).collect();
            if got.len() >= lines {
                return got;
            }
        }
        assert!(
            started.elapsed() < deadline,
            "timed out waiting for {lines} line(s) in {path:?}"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn test_strip_composite_emits_results_then_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let key = unique_key();

    let mut result_files = Vec::new();
    let mut specs = Vec::new();
    for i in 1..=3 {
        let path = dir.path().join(format!("pane-{i}.result"));
        specs.push(PaneSpec::new(vec![
            "--result-file".to_string(),
            path.display().to_string(),
            "--result-text".to_string(),
            format!("result from pane {i}"),
        ]));
        result_files.push(path);
    }
    let plan = CompositePlan::strip(specs).unwrap();

    let mut coordinator = Coordinator::spawn(key, &plan, test_config()).unwrap();
    let mut host = RecordingHost::default();
    coordinator.await_all_ready(&mut host).await.unwrap();

    // every pane embedded exactly once, in index order
    let order: Vec<usize> = host.embedded.iter().map(|(pane, _)| pane.raw()).collect();
    assert_eq!(order, vec![1, 2, 3]);

    // handles round-trip bit-identically: the stub derives its handle from
    // its own pid, which also sits in the slot it published
    for (pane, handle) in &host.embedded {
        let slot = coordinator.slot(*pane).unwrap();
        assert!(slot.owner_pid > 0);
        assert_eq!(
            handle.raw(),
            ((slot.owner_pid as u64) << 8) | pane.raw() as u64
        );
    }

    // nothing is emitted before EMIT_RESULT
    for path in &result_files {
        assert!(!path.exists());
    }

    coordinator.broadcast(ControlCommand::EmitResult).unwrap();
    for (i, path) in result_files.iter().enumerate() {
        let lines = wait_for_lines(path, 1, Duration::from_secs(5)).await;
        assert_eq!(lines[0], format!("result from pane {}", i + 1));
    }

    // panes keep running after an emit; a second broadcast emits again
    coordinator.broadcast(ControlCommand::EmitResult).unwrap();
    for path in &result_files {
        let lines = wait_for_lines(path, 2, Duration::from_secs(5)).await;
        assert_eq!(lines[0], lines[1]);
    }

    coordinator.broadcast(ControlCommand::Terminate).unwrap();
    coordinator.await_exit_all().await.unwrap();
    coordinator.teardown().unwrap();

    // the table name is gone
    assert!(matches!(
        SlotTable::attach(key, 3),
        Err(CompositorError::Resource(ResourceError::NotFound(_)))
    ));
}

#[tokio::test]
async fn test_split_composite_terminated_without_emitting() {
    let dir = tempfile::tempdir().unwrap();
    let key = unique_key();

    let left = dir.path().join("left.result");
    let right = dir.path().join("right.result");
    let plan = CompositePlan::split(
        PaneSpec::new(vec![
            "--result-file".to_string(),
            left.display().to_string(),
        ]),
        PaneSpec::new(vec![
            "--result-file".to_string(),
            right.display().to_string(),
        ]),
    );

    let mut coordinator = Coordinator::spawn(key, &plan, test_config()).unwrap();
    let mut host = RecordingHost::default();
    coordinator.await_all_ready(&mut host).await.unwrap();
    assert_eq!(host.embedded.len(), 2);

    // terminate before any emit: the panes exit without producing results
    coordinator.broadcast(ControlCommand::Terminate).unwrap();
    coordinator.await_exit_all().await.unwrap();
    coordinator.teardown().unwrap();

    assert!(!left.exists());
    assert!(!right.exists());
    assert!(matches!(
        SlotTable::attach(key, 2),
        Err(CompositorError::Resource(ResourceError::NotFound(_)))
    ));
}

#[tokio::test]
async fn test_failing_pane_surfaces_liveness_gap() {
    let key = unique_key();

    let plan = CompositePlan::strip(vec![
        PaneSpec::new(vec![]),
        PaneSpec::new(vec!["--fail-before-publish".to_string()]),
        PaneSpec::new(vec![]),
    ])
    .unwrap();

    let mut coordinator = Coordinator::spawn(key, &plan, test_config()).unwrap();
    let mut host = RecordingHost::default();

    let started = Instant::now();
    let result = coordinator.await_all_ready(&mut host).await;
    match result {
        Err(CompositorError::Liveness(LivenessGap::ExitedBeforePublish { pane, status })) => {
            assert_eq!(pane.raw(), 2);
            assert_eq!(status, 3);
        }
        other => panic!("expected exited-before-publish, got {other:?}"),
    }
    // detected well inside the readiness deadline, not by timing out
    assert!(started.elapsed() < Duration::from_secs(8));

    // the healthy panes and the table are cleaned up
    coordinator.abort();
    assert!(matches!(
        SlotTable::attach(key, 3),
        Err(CompositorError::Resource(ResourceError::NotFound(_)))
    ));
}

#[tokio::test]
async fn test_slow_exit_pane_surfaces_exit_timeout() {
    let key = unique_key();

    // pane 2 lingers long past any deadline we would wait out here
    let plan = CompositePlan::strip(vec![
        PaneSpec::new(vec![]),
        PaneSpec::new(vec!["--linger-ms".to_string(), "30000".to_string()]),
    ])
    .unwrap();

    let mut config = test_config();
    config.timing.exit_deadline_ms = 500;
    let mut coordinator = Coordinator::spawn(key, &plan, config).unwrap();
    let mut host = RecordingHost::default();
    coordinator.await_all_ready(&mut host).await.unwrap();

    coordinator.broadcast(ControlCommand::Terminate).unwrap();
    match coordinator.await_exit_all().await {
        Err(CompositorError::Liveness(LivenessGap::ExitTimeout {
            remaining,
            waited_ms,
        })) => {
            assert!(remaining >= 1);
            assert!(waited_ms >= 500);
        }
        other => panic!("expected exit timeout, got {other:?}"),
    }

    // the lingering pane is killed rather than waited out
    coordinator.abort();
    assert!(matches!(
        SlotTable::attach(key, 2),
        Err(CompositorError::Resource(ResourceError::NotFound(_)))
    ));
}

#[test]
fn test_worker_reads_project_config_from_cwd() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(".panemux.toml"),
        "[timing]\nattach_deadline_ms = 100\n",
    )
    .unwrap();

    // no table exists for this key, so the worker can only time out; the
    // project file's 100ms deadline bounds that, not the stock 5000ms
    let args = WorkerArgs::new(unique_key(), PaneIndex::FIRST, 1, Vec::new());
    let started = Instant::now();
    let status = std::process::Command::new(env!("CARGO_BIN_EXE_panemux"))
        .args(args.to_argv())
        .current_dir(dir.path())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .unwrap();

    assert!(!status.success());
    assert!(started.elapsed() < Duration::from_secs(3));
}
