//! Control-protocol endpoints.
//!
//! Commands travel between processes as POSIX signals: SIGUSR1 carries
//! EMIT_RESULT and SIGUSR2 carries TERMINATE. Receivers never run dialog
//! logic inside a signal handler; the OS handler only notifies a stream,
//! and the worker observes commands synchronously from its run loop.

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::io;
use tokio::signal::unix::{signal, Signal as SignalStream, SignalKind};

use crate::domain::ControlCommand;
use crate::error::{ContractViolation, Result};

/// The signal carrying each control command
pub fn signal_for(command: ControlCommand) -> Signal {
    match command {
        ControlCommand::EmitResult => Signal::SIGUSR1,
        ControlCommand::Terminate => Signal::SIGUSR2,
    }
}

/// Send one control command to a pane process.
///
/// A pid that no longer exists is not an error: commands are fire-and-forget
/// and a pane that already exited has simply nothing left to do.
pub fn send_command(pid: i64, command: ControlCommand) -> Result<()> {
    if pid <= 0 {
        return Err(ContractViolation::InvalidPid(pid).into());
    }
    let raw: i32 = pid
        .try_into()
        .map_err(|_| ContractViolation::InvalidPid(pid))?;
    match kill(Pid::from_raw(raw), signal_for(command)) {
        Ok(()) => {
            tracing::debug!("sent {} to pid {}", command, pid);
            Ok(())
        }
        Err(Errno::ESRCH) => {
            tracing::debug!("pid {} gone before {} was delivered", pid, command);
            Ok(())
        }
        Err(errno) => Err(io::Error::from_raw_os_error(errno as i32).into()),
    }
}

/// Receives control commands delivered to this process.
///
/// Installing the listener registers handlers for both protocol signals, so
/// commands arriving before the run loop polls are queued rather than hitting
/// the OS default action.
pub struct CommandListener {
    emit: SignalStream,
    terminate: SignalStream,
}

impl CommandListener {
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            emit: signal(SignalKind::user_defined1())?,
            terminate: signal(SignalKind::user_defined2())?,
        })
    }

    /// Wait for the next command.
    ///
    /// When both commands are pending, TERMINATE wins: a terminated pane must
    /// not emit one more result. Returns None if the signal driver shuts down.
    pub async fn next(&mut self) -> Option<ControlCommand> {
        tokio::select! {
            biased;
            got = self.terminate.recv() => got.map(|_| ControlCommand::Terminate),
            got = self.emit.recv() => got.map(|_| ControlCommand::EmitResult),
        }
    }
}

/// Serializes tests that deliver real signals to the test process.
#[cfg(test)]
pub(crate) fn signal_test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}
