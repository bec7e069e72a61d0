//! Worker-process launch: argv construction, its inverse parse, and spawn.
//!
//! A worker is the same program re-invoked in pane role. Everything a worker
//! needs to find its table and its slot travels on the command line, so the
//! launch argv and its parse must stay exact inverses of each other.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::str::FromStr;

use crate::domain::{PaneIndex, TableKey};
use crate::error::{LaunchError, SpawnError};

/// Marks an invocation as a pane worker
pub const PANE_ROLE_FLAG: &str = "--pane-role";

const TABLE_KEY_FLAG: &str = "--table-key";
const PANE_INDEX_FLAG: &str = "--pane-index";
const PANE_COUNT_FLAG: &str = "--pane-count";
const DIALOG_ARGS_SEP: &str = "--";

/// Identity and geometry a worker process is launched with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerArgs {
    pub key: TableKey,
    pub pane: PaneIndex,
    pub pane_count: usize,
    /// Passed through untouched to the pane's dialog
    pub dialog_args: Vec<String>,
}

impl WorkerArgs {
    pub fn new(key: TableKey, pane: PaneIndex, pane_count: usize, dialog_args: Vec<String>) -> Self {
        Self {
            key,
            pane,
            pane_count,
            dialog_args,
        }
    }

    /// Full argv (after the program name) that re-invokes the program in
    /// pane role
    pub fn to_argv(&self) -> Vec<String> {
        let mut argv = vec![
            PANE_ROLE_FLAG.to_string(),
            TABLE_KEY_FLAG.to_string(),
            self.key.raw().to_string(),
            PANE_INDEX_FLAG.to_string(),
            self.pane.raw().to_string(),
            PANE_COUNT_FLAG.to_string(),
            self.pane_count.to_string(),
        ];
        if !self.dialog_args.is_empty() {
            argv.push(DIALOG_ARGS_SEP.to_string());
            argv.extend(self.dialog_args.iter().cloned());
        }
        argv
    }

    /// Detect and parse a pane-role argv.
    ///
    /// Returns None when the argv does not carry the pane-role flag at all,
    /// so non-worker invocations fall through to normal argument handling.
    pub fn parse(args: &[String]) -> Option<std::result::Result<Self, LaunchError>> {
        if !args.iter().any(|a| a == PANE_ROLE_FLAG) {
            return None;
        }
        Some(Self::parse_pane_role(args))
    }

    fn parse_pane_role(args: &[String]) -> std::result::Result<Self, LaunchError> {
        let mut key = None;
        let mut pane = None;
        let mut count = None;
        let mut dialog_args = Vec::new();

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                PANE_ROLE_FLAG => {}
                TABLE_KEY_FLAG => key = Some(parse_value::<u32>(TABLE_KEY_FLAG, iter.next())?),
                PANE_INDEX_FLAG => {
                    pane = Some(parse_value::<usize>(PANE_INDEX_FLAG, iter.next())?)
                }
                PANE_COUNT_FLAG => {
                    count = Some(parse_value::<usize>(PANE_COUNT_FLAG, iter.next())?)
                }
                DIALOG_ARGS_SEP => {
                    dialog_args = iter.cloned().collect();
                    break;
                }
                other => return Err(LaunchError::Unexpected(other.to_string())),
            }
        }

        let key = TableKey::new(key.ok_or(LaunchError::MissingFlag(TABLE_KEY_FLAG))?);
        let pane_raw = pane.ok_or(LaunchError::MissingFlag(PANE_INDEX_FLAG))?;
        let pane = PaneIndex::new(pane_raw).ok_or(LaunchError::InvalidValue {
            flag: PANE_INDEX_FLAG,
            value: pane_raw.to_string(),
        })?;
        let pane_count = count.ok_or(LaunchError::MissingFlag(PANE_COUNT_FLAG))?;
        if pane_count == 0 || pane.raw() > pane_count {
            return Err(LaunchError::InvalidValue {
                flag: PANE_COUNT_FLAG,
                value: pane_count.to_string(),
            });
        }
        Ok(Self {
            key,
            pane,
            pane_count,
            dialog_args,
        })
    }
}

fn parse_value<T: FromStr>(
    flag: &'static str,
    value: Option<&String>,
) -> std::result::Result<T, LaunchError> {
    let value = value.ok_or(LaunchError::MissingValue(flag))?;
    value.parse().map_err(|_| LaunchError::InvalidValue {
        flag,
        value: value.clone(),
    })
}

/// The program to re-invoke as a worker: an explicit override, or this
/// executable
pub fn resolve_program(override_path: Option<&Path>) -> std::result::Result<PathBuf, SpawnError> {
    match override_path {
        Some(path) => Ok(path.to_path_buf()),
        None => std::env::current_exe().map_err(|e| SpawnError::Program(e.to_string())),
    }
}

/// Launch one worker process for a pane.
///
/// stderr is always inherited so worker logs land next to the coordinator's;
/// stdout carries dialog results and is inherited only when asked.
pub fn spawn_worker(
    program: &Path,
    args: &WorkerArgs,
    inherit_stdout: bool,
) -> std::result::Result<Child, SpawnError> {
    let stdout = if inherit_stdout {
        Stdio::inherit()
    } else {
        Stdio::null()
    };
    Command::new(program)
        .args(args.to_argv())
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|source| SpawnError::Launch {
            pane: args.pane,
            source,
        })
}
