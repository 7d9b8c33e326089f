//! Checkpoint: leave the target's process tree, run `criu dump` against it
//! and tell it how that went.
//!
//! CRIU must not be a descendant of the process it dumps, so the worker
//! double-forks and waits to be adopted before launching the tool:
//!
//! ```text
//! caller --fork--> child --fork--> worker (adopted) --fork--> criu dump
//!   wait <--------- exit 0
//! ```

use std::io;
use std::path::{Path, PathBuf};

use crate::argv::{self, ArgVec};
use crate::config::InvocationConfig;
use crate::error::Result;
use crate::notify::CompletionSignal;
use crate::paths;
use crate::process::{self, Fork, Pid, SpinWait, WaitStatus};
use crate::quote::CommandLine;

/// Exit status of a CRIU child that has already printed its own error.
pub const SUPPRESS_ERROR_IN_PARENT: i32 = 77;

/// Pid that adopts orphans when no subreaper is set.
const INIT_PID: Pid = 1;

/// Runs the checkpoint sequence on behalf of `target`.
///
/// Returns in the calling process once the detached worker is on its own;
/// the forked processes never return from here.
pub fn checkpoint(config: &InvocationConfig, target: Pid) -> Result<()> {
    match process::fork() {
        Ok(Fork::Parent { child }) => {
            if let Err(e) = process::wait_pid(child) {
                log::debug!("waiting for checkpoint child {}: {}", child, e);
            }
            return Ok(());
        }
        Ok(Fork::Child) => {}
        Err(e) => {
            log::error!("{}", e);
            CompletionSignal::FAILURE.notify(target);
            return Ok(());
        }
    }

    let tree = ProcessTreeState::new(process::current_pid());
    match process::fork() {
        Ok(Fork::Parent { .. }) => std::process::exit(0),
        Ok(Fork::Child) => {}
        Err(e) => {
            log::error!("{}", e);
            CompletionSignal::FAILURE.notify(target);
            std::process::exit(0);
        }
    }

    run_worker(config, target, &tree)
}

fn run_worker(config: &InvocationConfig, target: Pid, tree: &ProcessTreeState) -> ! {
    let detachment = tree.await_detach(SpinWait::REPARENT, process::parent_pid);
    let completion = worker_step(detachment, || match dump(config, target) {
        Ok(completion) => completion,
        Err(e) => {
            log::error!("{}", e);
            Some(CompletionSignal::FAILURE)
        }
    });
    if let Some(signal) = completion {
        signal.notify(target);
    }
    std::process::exit(0)
}

/// Decides what the worker owes the target. CRIU only runs once the worker
/// has left the target's process tree.
pub fn worker_step(
    detachment: Detachment,
    run_dump: impl FnOnce() -> Option<CompletionSignal>,
) -> Option<CompletionSignal> {
    match detachment {
        Detachment::Detached { adopted_by } => {
            log::debug!("Checkpoint worker {} adopted by {}", process::current_pid(), adopted_by);
            run_dump()
        }
        Detachment::Stuck => {
            log::error!("can't move out of the target process hierarchy");
            Some(CompletionSignal::FAILURE)
        }
    }
}

/// Launches `criu dump`, waits for it and reports. Returns the signal owed
/// to the target, if any.
fn dump(config: &InvocationConfig, target: Pid) -> Result<Option<CompletionSignal>> {
    let args = argv::checkpoint_args(config, target)?;
    let log_path = dump_log_location(config);

    let outcome = match process::fork() {
        Ok(Fork::Child) => exec_in_child(&args),
        Ok(Fork::Parent { child }) => match process::wait_any() {
            Ok((pid, status)) if pid == child => ToolOutcome::from_raw(status),
            Ok((pid, _)) => ToolOutcome::WaitFailed(io::Error::new(
                io::ErrorKind::Other,
                format!("reaped unexpected child {}", pid),
            )),
            Err(e) => ToolOutcome::WaitFailed(e),
        },
        Err(e) => ToolOutcome::LaunchFailed(e.to_string()),
    };

    outcome.report(&args, &log_path);
    Ok(outcome.completion(config.leave_running))
}

fn exec_in_child(argv: &ArgVec) -> ! {
    let err = super::exec_tool(argv);
    log::error!("{}", err);
    std::process::exit(SUPPRESS_ERROR_IN_PARENT)
}

/// Remembers who our parent was before the second fork so adoption can be
/// told apart from a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessTreeState {
    original_parent: Pid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detachment {
    Detached { adopted_by: Pid },
    Stuck,
}

impl ProcessTreeState {
    pub fn new(original_parent: Pid) -> Self {
        ProcessTreeState { original_parent }
    }

    /// Spins until the parent pid becomes init. Adoption by a subreaper is
    /// only noticed once the budget runs out, and still counts as detached.
    pub fn await_detach(&self, spin: SpinWait, parent_pid: impl FnMut() -> Pid) -> Detachment {
        let parent = spin.until(parent_pid, |p| p == INIT_PID);
        if parent == self.original_parent {
            Detachment::Stuck
        } else {
            Detachment::Detached { adopted_by: parent }
        }
    }
}

/// How the CRIU child ended.
#[derive(Debug)]
pub enum ToolOutcome {
    LaunchFailed(String),
    WaitFailed(io::Error),
    /// Not a normal exit; holds the raw wait status.
    Abnormal(i32),
    /// Exited with `SUPPRESS_ERROR_IN_PARENT`.
    AlreadyReported,
    Failed(i32),
    Succeeded,
}

impl ToolOutcome {
    pub fn from_raw(status: libc::c_int) -> Self {
        match WaitStatus::from_raw(status) {
            WaitStatus::Exited(0) => ToolOutcome::Succeeded,
            WaitStatus::Exited(SUPPRESS_ERROR_IN_PARENT) => ToolOutcome::AlreadyReported,
            WaitStatus::Exited(code) => ToolOutcome::Failed(code),
            WaitStatus::Signaled(_) | WaitStatus::Other(_) => ToolOutcome::Abnormal(status),
        }
    }

    /// The signal owed to the target. A plain dump that succeeded owes
    /// nothing: the target has been frozen and will not run on.
    pub fn completion(&self, leave_running: bool) -> Option<CompletionSignal> {
        match self {
            ToolOutcome::Succeeded if leave_running => Some(CompletionSignal::SUCCESS),
            ToolOutcome::Succeeded => None,
            _ => Some(CompletionSignal::FAILURE),
        }
    }

    /// Operator-facing diagnostic, or `None` when nothing should be printed.
    pub fn diagnostic(&self, log_path: &Path) -> Option<String> {
        match self {
            ToolOutcome::LaunchFailed(e) => Some(format!("Cannot launch CRIU: {}", e)),
            ToolOutcome::WaitFailed(e) => Some(format!(
                "Error waiting for CRIU: {} - check {}",
                e,
                log_path.display()
            )),
            ToolOutcome::Abnormal(status) => Some(format!(
                "CRIU has not properly exited, waitpid status was {} - check {}",
                status,
                log_path.display()
            )),
            ToolOutcome::Failed(code) => Some(format!(
                "CRIU failed with exit code {} - check {}",
                code,
                log_path.display()
            )),
            ToolOutcome::AlreadyReported | ToolOutcome::Succeeded => None,
        }
    }

    fn report(&self, argv: &ArgVec, log_path: &Path) {
        if let Some(message) = self.diagnostic(log_path) {
            log::error!("{}", message);
            log::error!("Command: {}", CommandLine(argv));
        }
    }
}

/// Absolute location of the dump log, for diagnostics.
pub fn dump_log_location(config: &InvocationConfig) -> PathBuf {
    paths::log_location(&config.image_dir, Path::new(argv::dump_log(config)))
}
