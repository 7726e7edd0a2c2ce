use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

/// Environment variable holding an `EnvFilter` directive (e.g. `debug`).
pub const LOG_FILTER_ENV: &str = "PIPELINE_LOG";

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

fn default_directive() -> &'static str {
    // Narration is for development; release runs stay quiet unless asked.
    if cfg!(debug_assertions) { "info" } else { "warn" }
}

/// Install the stderr subscriber once; later calls are no-ops.
pub fn init_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
            .unwrap_or_else(|_| EnvFilter::new(default_directive()));

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_thread_names(true)
            .with_target(false)
            .finish();

        // Another subscriber may already be installed (tests, embedding).
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            tracing::debug!("global tracing subscriber already set, keeping it");
        }
    });
}
