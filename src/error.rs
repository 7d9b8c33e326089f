use std::io;
use thiserror::Error;

use crate::argv::ArgvError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("cannot find CRIU to use")]
    ToolNotFound,

    #[error("unknown command-line action: {0}")]
    UnknownAction(String),

    #[error("unknown context")]
    UnknownContext,

    #[error("{action} requires an image directory")]
    MissingImageDir { action: &'static str },

    #[error("cannot find {0} env")]
    MissingEnv(&'static str),

    #[error("invalid pid in {var}: {value:?}")]
    InvalidPid { var: &'static str, value: String },

    #[error(transparent)]
    Argv(#[from] ArgvError),

    #[error("Cannot execute CRIU \"{command}\": {source}")]
    Exec {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("{syscall} failed: {source}")]
    Os {
        syscall: &'static str,
        #[source]
        source: io::Error,
    },
}

impl EngineError {
    /// Wraps the current `errno` for a failed libc call.
    pub fn last_os(syscall: &'static str) -> Self {
        EngineError::Os {
            syscall,
            source: io::Error::last_os_error(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
