//! panemux: multi-process pane compositor for composite dialogs
//!
//! One binary, two roles: invoked normally it coordinates a demo composite
//! of stub panes; re-invoked with --pane-role it becomes a single pane
//! worker hosting a stub dialog.

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use panemux::domain::{CompositePlan, ControlCommand, PaneIndex, PaneSpec, TableKey, WindowHandle};
use panemux::error::{DialogError, EmbedError};
use panemux::services::WorkerArgs;
use panemux::{CompositorConfig, Coordinator, PaneDialog, PaneHost, Worker};

/// Initialize logging with RUST_LOG environment variable support
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

/// Load configuration, layering any project file in the working directory.
///
/// Workers inherit the coordinator's working directory, so both roles see
/// the same project file.
fn load_config() -> CompositorConfig {
    let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    CompositorConfig::load(Some(&project_root))
        .unwrap_or_else(|_| CompositorConfig::load_defaults())
}

/// Stub pane dialog for the worker role.
///
/// A real dialog builds a widget tree; this one derives a deterministic
/// handle from its pid and pane index, and answers EMIT_RESULT by printing
/// its result text (and optionally writing it to a file). `--linger-ms`
/// delays the exit after TERMINATE, standing in for slow pane teardown.
struct StubDialog {
    pane: PaneIndex,
    result_text: String,
    result_file: Option<PathBuf>,
    fail_before_publish: bool,
    linger_ms: Option<u64>,
}

impl StubDialog {
    /// Parse the dialog-args fragment of a pane-role invocation
    fn from_args(pane: PaneIndex, args: &[String]) -> Result<Self> {
        let mut dialog = Self {
            pane,
            result_text: format!("pane-{pane}"),
            result_file: None,
            fail_before_publish: false,
            linger_ms: None,
        };
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--result-text" => {
                    dialog.result_text = iter
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("missing value for --result-text"))?
                        .clone();
                }
                "--result-file" => {
                    dialog.result_file = Some(PathBuf::from(
                        iter.next()
                            .ok_or_else(|| anyhow::anyhow!("missing value for --result-file"))?,
                    ));
                }
                "--fail-before-publish" => dialog.fail_before_publish = true,
                "--linger-ms" => {
                    dialog.linger_ms = Some(
                        iter.next()
                            .ok_or_else(|| anyhow::anyhow!("missing value for --linger-ms"))?
                            .parse()?,
                    );
                }
                other => anyhow::bail!("unknown dialog argument: {other}"),
            }
        }
        Ok(dialog)
    }
}

impl PaneDialog for StubDialog {
    fn realize(&mut self) -> std::result::Result<WindowHandle, DialogError> {
        // pid in the high bits keeps handles distinct across pane processes
        let handle = ((std::process::id() as u64) << 8) | self.pane.raw() as u64;
        Ok(WindowHandle::new(handle))
    }

    fn emit_result(&mut self) {
        println!("{}", self.result_text);
        if let Some(path) = &self.result_file {
            // one line per emit, so repeated emits stay observable
            let line = format!("{}\n", self.result_text);
            let written = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .and_then(|mut file| std::io::Write::write_all(&mut file, line.as_bytes()));
            if let Err(e) = written {
                tracing::warn!("failed to write result file {:?}: {}", path, e);
            }
        }
    }
}

/// Demo host: logs each graft instead of talking to a real toolkit
struct LoggingHost;

impl PaneHost for LoggingHost {
    fn embed(
        &mut self,
        pane: PaneIndex,
        handle: WindowHandle,
    ) -> std::result::Result<(), EmbedError> {
        tracing::info!("grafting pane {} window {} into composite", pane, handle);
        Ok(())
    }
}

/// Pane-role entry point
async fn worker_main(args: WorkerArgs) -> Result<()> {
    let config = load_config();
    let mut dialog = StubDialog::from_args(args.pane, &args.dialog_args)?;
    if dialog.fail_before_publish {
        tracing::warn!("pane {} exiting before publish as instructed", args.pane);
        std::process::exit(3);
    }

    let mut worker = Worker::attach(args.key, args.pane, args.pane_count, &config).await?;
    let handle = dialog.realize()?;
    worker.publish(handle)?;
    let outcome = worker.run(&mut dialog).await?;
    tracing::info!("pane {} finished: {:?}", args.pane, outcome);
    if let Some(ms) = dialog.linger_ms {
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    }
    Ok(())
}

/// Coordinator-role entry point for the demo composites
async fn demo_main(plan: CompositePlan) -> Result<()> {
    let config = load_config();
    let key = TableKey::new(std::process::id());
    tracing::info!("Starting panemux composite {} ({} panes)", key, plan.pane_count());

    let mut coordinator = Coordinator::spawn(key, &plan, config)?;
    if let Err(err) = drive(&mut coordinator).await {
        coordinator.abort();
        return Err(err.into());
    }
    coordinator.teardown()?;
    Ok(())
}

/// One full demo lifecycle: ready, emit, terminate, reap
async fn drive(coordinator: &mut Coordinator) -> panemux::Result<()> {
    let mut host = LoggingHost;
    coordinator.await_all_ready(&mut host).await?;
    coordinator.broadcast(ControlCommand::EmitResult)?;
    // give the panes a moment to print before shutting down
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    coordinator.broadcast(ControlCommand::Terminate)?;
    coordinator.await_exit_all().await?;
    Ok(())
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  panemux demo strip <panes>   run a strip composite of stub panes");
    eprintln!("  panemux demo split           run a two-pane split composite");
    eprintln!();
    eprintln!("Workers are re-invocations of this binary with --pane-role.");
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Some(parsed) = WorkerArgs::parse(&args) {
        return worker_main(parsed?).await;
    }

    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["demo", "strip", count] => {
            let count: usize = count.parse()?;
            let panes = (1..=count)
                .map(|i| {
                    PaneSpec::new(vec!["--result-text".to_string(), format!("strip pane {i}")])
                })
                .collect();
            demo_main(CompositePlan::strip(panes)?).await
        }
        ["demo", "split"] => {
            demo_main(CompositePlan::split(
                PaneSpec::new(vec!["--result-text".to_string(), "left pane".to_string()]),
                PaneSpec::new(vec!["--result-text".to_string(), "right pane".to_string()]),
            ))
            .await
        }
        _ => {
            print_usage();
            std::process::exit(2);
        }
    }
}
