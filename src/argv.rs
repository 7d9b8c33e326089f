//! Bounded CRIU argument vectors.
//!
//! The vector handed to `execv` has a fixed number of slots, one of which is
//! always the terminating null pointer. Extra options from `CRAC_CRIU_OPTS`
//! are appended only while they fit; the rest are dropped with a warning.

use std::ffi::{CStr, CString, OsStr};
use std::os::unix::ffi::OsStrExt;

use thiserror::Error;

use crate::action::Action;
use crate::config::InvocationConfig;
use crate::error::Result;

/// Total slots in an argument vector, including the null terminator.
pub const ARGV_CAPACITY: usize = 32;

/// Log name used for dumps when `-o` is not given, relative to the image dir.
pub const DEFAULT_DUMP_LOG: &str = "dump4.log";

/// Action passed to ourselves through `--exec-cmd`.
const RESTOREWAIT: &str = "restorewait";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgvError {
    #[error("argument vector is full")]
    Full,

    #[error("argument contains an interior NUL byte: {0:?}")]
    Nul(String),
}

/// Ordered arguments with room for at most `ARGV_CAPACITY - 1` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgVec {
    args: Vec<CString>,
}

impl ArgVec {
    pub fn new() -> Self {
        ArgVec {
            args: Vec::with_capacity(ARGV_CAPACITY - 1),
        }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CStr> {
        self.args.iter().map(CString::as_c_str)
    }

    /// The executable, i.e. `argv[0]`.
    pub fn program(&self) -> Option<&CStr> {
        self.args.first().map(CString::as_c_str)
    }

    /// Appends `arg` if a slot is free besides the terminator.
    pub fn try_push(&mut self, arg: impl AsRef<OsStr>) -> std::result::Result<(), ArgvError> {
        self.try_push_reserving(arg, 0)
    }

    /// Appends `arg` only if `reserved` further slots stay available
    /// afterwards, on top of the terminator.
    pub fn try_push_reserving(
        &mut self,
        arg: impl AsRef<OsStr>,
        reserved: usize,
    ) -> std::result::Result<(), ArgvError> {
        if self.args.len() + 1 + reserved + 1 > ARGV_CAPACITY {
            return Err(ArgvError::Full);
        }
        let bytes = arg.as_ref().as_bytes();
        let arg = CString::new(bytes)
            .map_err(|_| ArgvError::Nul(String::from_utf8_lossy(bytes).into_owned()))?;
        self.args.push(arg);
        Ok(())
    }

    /// Null-terminated pointer array for `execv`. Valid while `self` lives.
    pub fn as_ptrs(&self) -> Vec<*const libc::c_char> {
        let mut ptrs: Vec<*const libc::c_char> = self.args.iter().map(|a| a.as_ptr()).collect();
        ptrs.push(std::ptr::null());
        ptrs
    }
}

/// `criu dump` for the target process.
pub fn checkpoint_args(config: &InvocationConfig, target: libc::pid_t) -> Result<ArgVec> {
    let mut argv = ArgVec::new();
    argv.try_push(&config.criu)?;
    argv.try_push("dump")?;
    argv.try_push("-t")?;
    argv.try_push(target.to_string())?;
    argv.try_push("-D")?;
    argv.try_push(&config.image_dir)?;
    argv.try_push("--shell-job")?;
    argv.try_push(config.verbosity_arg(Action::Checkpoint))?;
    argv.try_push("-o")?;
    argv.try_push(dump_log(config))?;
    if config.leave_running {
        argv.try_push("-R")?;
    }

    append_extra_opts(&mut argv, &config.extra_opts, 0)?;
    Ok(argv)
}

/// `criu restore` that calls back into this helper and finally execs
/// `<self> restorewait`.
pub fn restore_args(config: &InvocationConfig) -> Result<ArgVec> {
    let mut argv = ArgVec::new();
    argv.try_push(&config.criu)?;
    argv.try_push("restore")?;
    argv.try_push("-W")?;
    argv.try_push(".")?;
    argv.try_push("--shell-job")?;
    argv.try_push("--action-script")?;
    argv.try_push(&config.self_exe)?;
    argv.try_push("-D")?;
    argv.try_push(&config.image_dir)?;
    argv.try_push(config.verbosity_arg(Action::Restore))?;
    if let Some(log_file) = &config.log_file {
        argv.try_push("-o")?;
        argv.try_push(log_file)?;
    }

    let tail: [&OsStr; 4] = [
        OsStr::new("--exec-cmd"),
        OsStr::new("--"),
        config.self_exe.as_os_str(),
        OsStr::new(RESTOREWAIT),
    ];
    append_extra_opts(&mut argv, &config.extra_opts, tail.len())?;
    for arg in tail {
        argv.try_push(arg)?;
    }

    Ok(argv)
}

/// The dump log as passed to CRIU (possibly relative to the image dir).
pub fn dump_log(config: &InvocationConfig) -> &OsStr {
    match &config.log_file {
        Some(path) => path.as_os_str(),
        None => OsStr::new(DEFAULT_DUMP_LOG),
    }
}

/// Appends `opts` while `reserved` slots stay free after them; warns once,
/// naming the first token that did not fit.
fn append_extra_opts(argv: &mut ArgVec, opts: &[String], reserved: usize) -> Result<()> {
    for opt in opts {
        match argv.try_push_reserving(opt, reserved) {
            Ok(()) => {}
            Err(ArgvError::Full) => {
                log::warn!("too many arguments in CRAC_CRIU_OPTS (dropped from '{}')", opt);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
