//! Diagnostics to stderr through `env_logger`.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

/// Filter variable for the helper's own log output.
pub const LOG_ENV: &str = "CRIUENGINE_LOG";

const DEFAULT_FILTER: &str = "warn";

// Start time for dmesg-style timestamps
static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Installs the logger. Safe to call more than once; later calls are no-ops.
pub fn init() {
    let start = *START_TIME.get_or_init(Instant::now);

    let _ = env_logger::Builder::from_env(env_logger::Env::new().filter_or(LOG_ENV, DEFAULT_FILTER))
        .format(move |buf, record| {
            let elapsed = start.elapsed();
            writeln!(
                buf,
                "[{:5}.{:06}] {} {}",
                elapsed.as_secs(),
                elapsed.subsec_micros(),
                record.level(),
                record.args()
            )
        })
        .try_init();
}
