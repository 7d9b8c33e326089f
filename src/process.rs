//! Thin wrappers over the process primitives the workflows are built from:
//! fork, wait, exec and a capped spin for reparenting.

use std::convert::Infallible;
use std::io;
use std::thread;
use std::time::Duration;

use crate::argv::ArgVec;
use crate::error::{EngineError, Result};

pub type Pid = libc::pid_t;

/// Which side of a `fork` we are on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fork {
    Parent { child: Pid },
    Child,
}

/// Forks the calling process.
///
/// The helper is single-threaded, so the child may keep running ordinary
/// Rust code afterwards.
pub fn fork() -> Result<Fork> {
    match unsafe { libc::fork() } {
        -1 => Err(EngineError::last_os("fork")),
        0 => Ok(Fork::Child),
        child => Ok(Fork::Parent { child }),
    }
}

pub fn parent_pid() -> Pid {
    unsafe { libc::getppid() }
}

pub fn current_pid() -> Pid {
    unsafe { libc::getpid() }
}

/// Decoded `wait` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Exited(i32),
    Signaled(i32),
    /// Stopped, continued or otherwise not a termination. Keeps the raw word.
    Other(i32),
}

impl WaitStatus {
    pub fn from_raw(status: libc::c_int) -> Self {
        if libc::WIFEXITED(status) {
            WaitStatus::Exited(libc::WEXITSTATUS(status))
        } else if libc::WIFSIGNALED(status) {
            WaitStatus::Signaled(libc::WTERMSIG(status))
        } else {
            WaitStatus::Other(status)
        }
    }
}

/// Waits for any child once, without retrying on `EINTR`.
pub fn wait_any() -> io::Result<(Pid, libc::c_int)> {
    let mut status: libc::c_int = 0;
    let pid = unsafe { libc::wait(&mut status) };
    if pid == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok((pid, status))
}

/// Waits for `pid` (or any child for `-1`), retrying across interruptions.
pub fn wait_pid(pid: Pid) -> io::Result<WaitStatus> {
    retry_interrupted(|| {
        let mut status: libc::c_int = 0;
        let ret = unsafe { libc::waitpid(pid, &mut status, 0) };
        if ret == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(WaitStatus::from_raw(status))
    })
}

/// Repeats `op` while it fails with `EINTR`.
pub fn retry_interrupted<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match op() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// Replaces the process image with `argv[0]`.
///
/// Only returns on failure; `Infallible` makes the success arm unreachable.
pub fn exec(argv: &ArgVec) -> std::result::Result<Infallible, io::Error> {
    let program = argv
        .program()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty argument vector"))?;
    let ptrs = argv.as_ptrs();
    unsafe { libc::execv(program.as_ptr(), ptrs.as_ptr()) };
    Err(io::Error::last_os_error())
}

/// Polls a condition a bounded number of times with a fixed pause.
///
/// Never blocks indefinitely: once the budget is spent the caller takes
/// the timeout branch.
#[derive(Debug, Clone, Copy)]
pub struct SpinWait {
    pub tries: u32,
    pub interval: Duration,
}

impl SpinWait {
    /// Budget for noticing that we were adopted after our parent exited.
    pub const REPARENT: SpinWait = SpinWait {
        tries: 300,
        interval: Duration::from_micros(10),
    };

    /// Samples `probe` until `done` accepts the value or tries run out, and
    /// returns the last sample.
    pub fn until<T: Copy>(&self, mut probe: impl FnMut() -> T, done: impl Fn(T) -> bool) -> T {
        let mut value = probe();
        let mut tries = self.tries;
        while !done(value) && tries > 0 {
            tries -= 1;
            thread::sleep(self.interval);
            value = probe();
        }
        value
    }
}
