//! Action-script callback. CRIU runs the helper with no arguments and
//! `CRTOOLS_SCRIPT_ACTION` naming the lifecycle event.

use crate::action::{ENV_INIT_PID, ENV_NEW_ARGS_ID};
use crate::config::EnvSource;
use crate::error::{EngineError, Result};
use crate::notify::CompletionSignal;

use super::parse_pid;

/// Tells the resumed process that it is running again.
pub fn post_resume(env: &impl EnvSource) -> Result<()> {
    let pid = env
        .var(ENV_INIT_PID)
        .ok_or(EngineError::MissingEnv(ENV_INIT_PID))?;
    let pid = parse_pid(ENV_INIT_PID, &pid)?;

    let signal = CompletionSignal::with_payload(new_args_id(env));
    signal.deliver(pid).map_err(|source| EngineError::Os {
        syscall: "sigqueue",
        source,
    })
}

/// Payload chosen by the application, `0` when absent. Unparsable values
/// also read as `0`.
fn new_args_id(env: &impl EnvSource) -> i32 {
    match env.var(ENV_NEW_ARGS_ID) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Ignoring non-numeric {}={:?}", ENV_NEW_ARGS_ID, raw);
            0
        }),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> HashMap<String, String> {
        vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_post_resume_requires_pid() {
        let err = post_resume(&env(&[])).unwrap_err();
        assert_eq!(err.to_string(), "cannot find CRTOOLS_INIT_PID env");
    }

    #[test]
    fn test_post_resume_rejects_bad_pid() {
        let err = post_resume(&env(&[(ENV_INIT_PID, "jvm")])).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPid { .. }));
    }

    #[test]
    fn test_post_resume_reports_delivery_failure() {
        let err = post_resume(&env(&[(ENV_INIT_PID, &i32::MAX.to_string())])).unwrap_err();
        assert!(matches!(err, EngineError::Os { syscall: "sigqueue", .. }));
    }

    #[test]
    fn test_new_args_id() {
        assert_eq!(new_args_id(&env(&[])), 0);
        assert_eq!(new_args_id(&env(&[(ENV_NEW_ARGS_ID, "7")])), 7);
        assert_eq!(new_args_id(&env(&[(ENV_NEW_ARGS_ID, "-3")])), -3);
        assert_eq!(new_args_id(&env(&[(ENV_NEW_ARGS_ID, "seven")])), 0);
    }
}
