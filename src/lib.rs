//! Glue between a checkpointable process and CRIU.
//!
//! The helper detaches from the target's process tree before dumping,
//! execs CRIU for restore, relays signals to the restored process and
//! reports completion to the target with a queued real-time signal.

pub mod action;
pub mod argv;
pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod paths;
pub mod process;
pub mod quote;
pub mod workflow;

pub use action::{Action, ScriptEvent};
pub use config::{CliOptions, EnvSource, InvocationConfig, ProcessEnv};
pub use error::{EngineError, Result};
pub use notify::CompletionSignal;
