//! Unified error types for the pane compositor.

use crate::domain::{PaneIndex, TableKey};
use thiserror::Error;

/// Main compositor error type
#[derive(Debug, Error)]
pub enum CompositorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Spawn error: {0}")]
    Spawn(#[from] SpawnError),

    #[error("Liveness gap: {0}")]
    Liveness(#[from] LivenessGap),

    #[error("Contract violation: {0}")]
    Contract(#[from] ContractViolation),

    #[error("Launch argument error: {0}")]
    Launch(#[from] LaunchError),

    #[error("Embed error: {0}")]
    Embed(#[from] EmbedError),

    #[error("Dialog error: {0}")]
    Dialog(#[from] DialogError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Shared-segment errors: create, attach, destroy
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("a segment already exists for table key {0}")]
    KeyCollision(TableKey),

    #[error("permission denied for table key {0}")]
    PermissionDenied(TableKey),

    #[error("no segment exists for table key {0}")]
    NotFound(TableKey),

    #[error("segment for table key {key} is {actual} bytes, expected {expected}")]
    SizeMismatch {
        key: TableKey,
        expected: u64,
        actual: u64,
    },

    #[error("segment operation failed for table key {key}: {source}")]
    Os {
        key: TableKey,
        #[source]
        source: std::io::Error,
    },
}

/// Worker-process launch errors.
///
/// Any single spawn failure is fatal for the whole composite; partial
/// layouts are never shown.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to launch worker for pane {pane}: {source}")]
    Launch {
        pane: PaneIndex,
        #[source]
        source: std::io::Error,
    },

    #[error("worker program path unavailable: {0}")]
    Program(String),
}

/// A pane process stopped making progress within its deadline.
#[derive(Debug, Error)]
pub enum LivenessGap {
    #[error("pane {pane} did not publish within {waited_ms}ms")]
    PublishTimeout { pane: PaneIndex, waited_ms: u64 },

    #[error("pane {pane} exited with status {status} before publishing")]
    ExitedBeforePublish { pane: PaneIndex, status: i32 },

    #[error("{remaining} pane process(es) still alive after {waited_ms}ms")]
    ExitTimeout { remaining: usize, waited_ms: u64 },

    #[error("table for key {key} did not become attachable within {waited_ms}ms")]
    AttachTimeout { key: TableKey, waited_ms: u64 },
}

/// Violations of the slot-table and lifecycle contracts.
///
/// These indicate a programming error in the invoking dialog, not a runtime
/// condition to retry.
#[derive(Debug, Error)]
pub enum ContractViolation {
    #[error("table capacity must be at least 1")]
    ZeroCapacity,

    #[error("table capacity {0} overflows the segment layout")]
    CapacityOverflow(usize),

    #[error("pane index {index} out of range 1..={capacity}")]
    IndexOutOfRange { index: usize, capacity: usize },

    #[error("pane {0} already published")]
    AlreadyPublished(PaneIndex),

    #[error("window handle 0 is reserved as the unpublished sentinel")]
    SentinelHandle,

    #[error("owner pid must be positive, got {0}")]
    InvalidPid(i64),

    #[error("pane {0} has not published; embed requires an observed publish")]
    EmbedBeforeReady(PaneIndex),

    #[error("pane {0} already embedded")]
    AlreadyEmbedded(PaneIndex),

    #[error("{op} is not valid in the {phase} phase")]
    OutOfPhase {
        op: &'static str,
        phase: &'static str,
    },

    #[error("teardown requires every worker to have exited")]
    TeardownBeforeExit,

    #[error("worker must publish before entering its run loop")]
    RunBeforePublish,
}

/// Malformed pane-role launch arguments
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("missing required flag {0}")]
    MissingFlag(&'static str),

    #[error("missing value for flag {0}")]
    MissingValue(&'static str),

    #[error("invalid value for flag {flag}: {value}")]
    InvalidValue { flag: &'static str, value: String },

    #[error("unexpected argument {0} before the dialog-argument separator")]
    Unexpected(String),
}

/// Failure reported by the window-embedding collaborator
#[derive(Debug, Error)]
#[error("embedding pane {pane} failed: {reason}")]
pub struct EmbedError {
    pub pane: PaneIndex,
    pub reason: String,
}

/// Failure reported by the widget-construction collaborator
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DialogError(pub String);

/// Result type alias for the compositor
pub type Result<T> = std::result::Result<T, CompositorError>;

/// Result type alias for segment operations
pub type ResourceResult<T> = std::result::Result<T, ResourceError>;

/// Result type alias for contract checks
pub type ContractResult<T> = std::result::Result<T, ContractViolation>;
