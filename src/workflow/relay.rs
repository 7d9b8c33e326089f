//! `restorewait`: the process CRIU execs into once the restored tree runs.
//!
//! From the outside the relay stands in for the original direct child: every
//! catchable signal it receives goes to the restored process, and when that
//! process ends the relay ends the same way.

use std::sync::atomic::{AtomicI32, Ordering};

use crate::action::ENV_INIT_PID;
use crate::config::EnvSource;
use crate::error::{EngineError, Result};
use crate::process::{self, WaitStatus};

use super::parse_pid;

/// Pid signals are forwarded to; `-1` disables forwarding.
///
/// This is the only state the signal handler reads.
static RELAY_TARGET: AtomicI32 = AtomicI32::new(-1);

/// Highest classic (non real-time) signal number on Linux.
const LAST_STANDARD_SIGNAL: libc::c_int = 31;

extern "C" fn forward_signal(
    sig: libc::c_int,
    _info: *mut libc::siginfo_t,
    _ctx: *mut libc::c_void,
) {
    let pid = RELAY_TARGET.load(Ordering::Relaxed);
    if pid > 0 {
        unsafe { libc::kill(pid, sig) };
    }
}

/// Runs the relay and returns the exit code to leave with.
pub fn restorewait(env: &impl EnvSource) -> Result<i32> {
    let target = match env.var(ENV_INIT_PID) {
        Some(raw) => parse_pid(ENV_INIT_PID, &raw)?,
        None => {
            log::warn!("no {}: signals may not be delivered", ENV_INIT_PID);
            -1
        }
    };
    RELAY_TARGET.store(target, Ordering::Relaxed);

    install_forwarding();
    unblock_all_signals();

    let status = process::wait_pid(target).map_err(|source| EngineError::Os {
        syscall: "waitpid",
        source,
    })?;
    log::debug!("Restored process {} finished: {:?}", target, status);

    Ok(Termination::from(status).reproduce())
}

/// Every signal number that may carry a handler: classic signals except
/// SIGKILL and SIGSTOP, then the real-time range.
pub fn catchable_signals() -> impl Iterator<Item = libc::c_int> {
    (1..=LAST_STANDARD_SIGNAL)
        .filter(|&sig| sig != libc::SIGKILL && sig != libc::SIGSTOP)
        .chain(libc::SIGRTMIN()..=libc::SIGRTMAX())
}

fn install_forwarding() {
    let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
    action.sa_sigaction = forward_signal as libc::sighandler_t;
    action.sa_flags = libc::SA_SIGINFO;
    unsafe { libc::sigfillset(&mut action.sa_mask) };

    for sig in catchable_signals() {
        if unsafe { libc::sigaction(sig, &action, std::ptr::null_mut()) } == -1 {
            log::error!("sigaction({}): {}", sig, std::io::Error::last_os_error());
        }
    }
}

fn unblock_all_signals() {
    let mut all: libc::sigset_t = unsafe { std::mem::zeroed() };
    unsafe {
        libc::sigfillset(&mut all);
        if libc::sigprocmask(libc::SIG_UNBLOCK, &all, std::ptr::null_mut()) == -1 {
            log::error!("sigprocmask: {}", std::io::Error::last_os_error());
        }
    }
}

/// How the restored process ended, as the relay should mirror it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exit(i32),
    Signal(i32),
    Unknown,
}

impl From<WaitStatus> for Termination {
    fn from(status: WaitStatus) -> Self {
        match status {
            WaitStatus::Exited(code) => Termination::Exit(code),
            WaitStatus::Signaled(sig) => Termination::Signal(sig),
            WaitStatus::Other(_) => Termination::Unknown,
        }
    }
}

impl Termination {
    /// Exit code used when the termination cannot be reproduced directly,
    /// following the shell's `128 + n` convention for signals.
    pub fn exit_code(self) -> i32 {
        match self {
            Termination::Exit(code) => code,
            Termination::Signal(sig) => 128 + sig,
            Termination::Unknown => 1,
        }
    }

    /// Dies by the same signal if possible; otherwise returns the exit code.
    pub fn reproduce(self) -> i32 {
        if let Termination::Signal(sig) = self {
            unsafe {
                libc::signal(sig, libc::SIG_DFL);
                libc::raise(sig);
            }
            // Still alive: the signal's default action is to ignore it.
        }
        self.exit_code()
    }
}
