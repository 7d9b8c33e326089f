//! Invocation resolution: turns command-line options and the environment
//! into one immutable [`InvocationConfig`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::action::{Action, ENV_CRIU_OPTS, ENV_CRIU_PATH, ENV_LEAVE_RUNNING};
use crate::error::{EngineError, Result};
use crate::paths;

/// Name of the CRIU binary shipped next to the helper.
pub const BUNDLED_CRIU: &str = "criu";
/// Distribution install location, tried last.
pub const SYSTEM_CRIU: &str = "/usr/sbin/criu";

/// Read-only view of environment variables.
pub trait EnvSource {
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var_os(name).map(|v| v.to_string_lossy().into_owned())
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Options taken from the command line after the action word.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    /// Value of `-v`/`--verbosity`, without the flag.
    pub verbosity: Option<String>,
    pub log_file: Option<PathBuf>,
    pub image_dir: Option<PathBuf>,
}

/// Everything a tool-launching workflow needs, resolved once.
#[derive(Debug, Clone)]
pub struct InvocationConfig {
    pub criu: PathBuf,
    /// Absolute path of this helper, handed to CRIU for callbacks.
    pub self_exe: PathBuf,
    pub image_dir: PathBuf,
    pub verbosity: Option<String>,
    pub log_file: Option<PathBuf>,
    /// Tokens of `CRAC_CRIU_OPTS`, in order. Bounded later by the builder.
    pub extra_opts: Vec<String>,
    pub leave_running: bool,
}

impl InvocationConfig {
    /// Builds the config for `checkpoint` or `restore`.
    pub fn resolve(
        action: Action,
        opts: CliOptions,
        env: &impl EnvSource,
        self_exe: PathBuf,
    ) -> Result<Self> {
        let image_dir = opts.image_dir.ok_or(EngineError::MissingImageDir {
            action: action.as_str(),
        })?;
        let criu = locate_criu(env, &self_exe)?;

        let extra_opts = env
            .var(ENV_CRIU_OPTS)
            .map(|s| split_opts(&s))
            .unwrap_or_default();

        let config = InvocationConfig {
            criu,
            self_exe,
            image_dir,
            verbosity: opts.verbosity,
            log_file: opts.log_file,
            extra_opts,
            leave_running: env.var(ENV_LEAVE_RUNNING).is_some(),
        };
        log::debug!("Resolved {} config: {:?}", action, config);
        Ok(config)
    }

    /// The CRIU verbosity argument. Checkpoint logs more by default than
    /// restore, whose log lands in the caller's working directory.
    pub fn verbosity_arg(&self, action: Action) -> String {
        match &self.verbosity {
            Some(v) => format!("--verbosity={}", v),
            None if action == Action::Checkpoint => "-v4".to_string(),
            None => "-v1".to_string(),
        }
    }
}

/// Splits `CRAC_CRIU_OPTS` into argument tokens.
pub fn split_opts(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Finds the CRIU executable: explicit override, bundled copy, system copy.
///
/// The override is trusted as given; the other two must exist.
pub fn locate_criu(env: &impl EnvSource, self_exe: &Path) -> Result<PathBuf> {
    if let Some(path) = env.var(ENV_CRIU_PATH) {
        return Ok(PathBuf::from(path));
    }

    let basedir = self_exe.parent().unwrap_or_else(|| Path::new("."));
    let bundled = basedir.join(BUNDLED_CRIU);
    if fs::metadata(&bundled).is_ok() {
        return Ok(bundled);
    }
    log::debug!("No bundled CRIU at {}", bundled.display());

    let system = PathBuf::from(SYSTEM_CRIU);
    if fs::metadata(&system).is_ok() {
        return Ok(system);
    }

    Err(EngineError::ToolNotFound)
}

/// Absolute path of the running helper.
///
/// Prefers the kernel's view of the executable and falls back to `argv[0]`
/// made absolute against the working directory.
pub fn helper_path(argv0: &str) -> Result<PathBuf> {
    match std::env::current_exe() {
        Ok(path) => Ok(path),
        Err(e) => {
            log::debug!("current_exe failed ({}), using argv[0]", e);
            paths::absolute(Path::new(argv0))
        }
    }
}
