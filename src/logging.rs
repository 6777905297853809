//! Diagnostic logging.
//!
//! Every corral process (bootstrap, sidebar panel, dialogs, one-shot
//! commands) appends to the profile's `debug.log`. Stdout belongs to the
//! terminal UI, so nothing is logged there.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::Profile;
use crate::error::Result;

/// Environment variable holding an `EnvFilter` directive, e.g. `corral=debug`.
pub const LOG_ENV: &str = "CORRAL_LOG";

/// Install the global subscriber writing to the profile's log file.
///
/// The returned guard flushes buffered lines on drop and must be held for
/// the life of the process. Calling this twice keeps the first subscriber.
pub fn init(profile: &Profile) -> Result<WorkerGuard> {
    profile.ensure_dir()?;
    let log_path = profile.log_path();
    let dir = profile.base_dir();
    let file_name = log_path
        .file_name()
        .map_or_else(|| "debug.log".into(), |n| n.to_os_string());

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .try_init();

    Ok(guard)
}
