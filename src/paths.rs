//! Path helpers used to report locations to the operator.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Makes `path` absolute against the current working directory.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

/// Where CRIU writes its log: relative log names are resolved inside the
/// image directory, because `-D` without `-W` makes CRIU chdir there.
pub fn log_location(image_dir: &Path, log_file: &Path) -> PathBuf {
    if log_file.is_absolute() {
        return log_file.to_path_buf();
    }
    match absolute(image_dir) {
        Ok(dir) => dir.join(log_file),
        Err(e) => {
            log::debug!("Cannot absolutize {}: {}", image_dir.display(), e);
            image_dir.join(log_file)
        }
    }
}
