//! Log subscriber setup.
//!
//! `RUST_LOG` selects the filter (default `info`), for example
//! `RUST_LOG=load_planner=debug`.

use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LoggingConfig;

pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true);

    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Debug-level logging routed through the test harness.
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
