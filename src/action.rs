//! Actions the helper can perform and the environment contract that selects them.

use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// Overrides the CRIU executable path.
pub const ENV_CRIU_PATH: &str = "CRAC_CRIU_PATH";
/// When set, checkpoint leaves the target running and reports success.
pub const ENV_LEAVE_RUNNING: &str = "CRAC_CRIU_LEAVE_RUNNING";
/// Extra whitespace-separated arguments appended to the CRIU command line.
pub const ENV_CRIU_OPTS: &str = "CRAC_CRIU_OPTS";
/// Pid of the restored process, exported by CRIU to scripts and exec-cmd.
pub const ENV_INIT_PID: &str = "CRTOOLS_INIT_PID";
/// Optional payload for the post-resume completion signal.
pub const ENV_NEW_ARGS_ID: &str = "CRAC_NEW_ARGS_ID";
/// Names the CRIU lifecycle event when invoked as `--action-script`.
pub const ENV_SCRIPT_ACTION: &str = "CRTOOLS_SCRIPT_ACTION";

/// What a single invocation of the helper does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Checkpoint,
    Restore,
    /// Exec target of `criu restore --exec-cmd`; never typed by a user.
    RestoreWait,
    /// CRIU action-script callback at the post-resume point.
    PostResume,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Checkpoint => "checkpoint",
            Action::Restore => "restore",
            Action::RestoreWait => "restorewait",
            Action::PostResume => "post-resume",
        }
    }

}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the command-line action. `post-resume` is only reachable through
/// the action-script environment, never as an argument.
impl FromStr for Action {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checkpoint" => Ok(Action::Checkpoint),
            "restore" => Ok(Action::Restore),
            "restorewait" => Ok(Action::RestoreWait),
            _ => Err(EngineError::UnknownAction(s.to_string())),
        }
    }
}

/// CRIU action-script events. Only post-resume is acted upon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptEvent {
    PostResume,
    Other(String),
}

impl ScriptEvent {
    pub fn parse(name: &str) -> Self {
        match name {
            "post-resume" => ScriptEvent::PostResume,
            other => ScriptEvent::Other(other.to_string()),
        }
    }

    /// The action this event triggers, if any.
    pub fn action(&self) -> Option<Action> {
        match self {
            ScriptEvent::PostResume => Some(Action::PostResume),
            ScriptEvent::Other(_) => None,
        }
    }
}

impl fmt::Display for ScriptEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptEvent::PostResume => f.write_str(Action::PostResume.as_str()),
            ScriptEvent::Other(name) => f.write_str(name),
        }
    }
}
