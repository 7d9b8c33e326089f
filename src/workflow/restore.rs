//! Restore: become `criu restore`.
//!
//! CRIU is told to call this helper back as its action script and, once the
//! restored tree runs, to exec `<self> restorewait` in its own place.

use crate::argv;
use crate::config::InvocationConfig;

use super::Exec;

/// Replaces the current process with CRIU. Only returns on failure.
pub fn restore(config: &InvocationConfig) -> Exec {
    let args = argv::restore_args(config)?;
    log::info!(
        "Restoring from {} with {}",
        config.image_dir.display(),
        config.criu.display()
    );
    Err(super::exec_tool(&args))
}
