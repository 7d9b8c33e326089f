//! The four actions: checkpoint, restore, the restorewait relay and the
//! post-resume callback.

pub mod checkpoint;
pub mod post_resume;
pub mod relay;
pub mod restore;

pub use checkpoint::{
    checkpoint, Detachment, ProcessTreeState, ToolOutcome, SUPPRESS_ERROR_IN_PARENT,
};
pub use post_resume::post_resume;
pub use relay::{restorewait, Termination};
pub use restore::restore;

use std::convert::Infallible;
use std::io::Write;

use crate::argv::ArgVec;
use crate::error::{EngineError, Result};
use crate::process::{self, Pid};
use crate::quote::CommandLine;

/// Execs CRIU and, if that fails, describes what was attempted.
pub(crate) fn exec_tool(argv: &ArgVec) -> EngineError {
    let _ = std::io::stderr().flush();
    let source = match process::exec(argv) {
        Ok(never) => match never {},
        Err(e) => e,
    };
    EngineError::Exec {
        command: CommandLine(argv).to_string(),
        source,
    }
}

/// Parses a pid handed to us through the environment.
pub(crate) fn parse_pid(var: &'static str, value: &str) -> Result<Pid> {
    match value.trim().parse::<Pid>() {
        Ok(pid) if pid > 0 => Ok(pid),
        _ => Err(EngineError::InvalidPid {
            var,
            value: value.to_string(),
        }),
    }
}

/// Unreachable-by-construction result of a successful exec.
pub type Exec = Result<Infallible>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pid() {
        assert_eq!(parse_pid("CRTOOLS_INIT_PID", "4242").unwrap(), 4242);
        assert_eq!(parse_pid("CRTOOLS_INIT_PID", " 17\n").unwrap(), 17);
    }

    #[test]
    fn test_parse_pid_rejects_garbage() {
        for bad in ["", "abc", "0", "-1", "12x"] {
            assert!(matches!(
                parse_pid("CRTOOLS_INIT_PID", bad),
                Err(EngineError::InvalidPid { var: "CRTOOLS_INIT_PID", .. })
            ));
        }
    }

    #[test]
    fn test_exec_tool_failure_names_command() {
        let mut argv = ArgVec::new();
        argv.try_push("/nonexistent/criu").unwrap();
        argv.try_push("restore").unwrap();
        let err = exec_tool(&argv);
        let msg = err.to_string();
        assert!(msg.starts_with("Cannot execute CRIU \"/nonexistent/criu restore\": "));
    }
}
