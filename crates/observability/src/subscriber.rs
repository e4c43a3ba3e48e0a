//! Process-wide `tracing` subscriber installation.
//!
//! The filter comes from `RUST_LOG` when set. Only the first successful
//! call installs a subscriber; later calls are no-ops.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info";

/// Output format of installed subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Single-line human readable output.
    Compact,
}

/// JSON logs with timestamps, filtered by `RUST_LOG` (default `info`).
pub fn init() {
    init_with(LogFormat::Json);
}

/// Install a subscriber in `format`. Returns `false` if one was already set.
pub fn init_with(format: LogFormat) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(DEFAULT_FILTER))
        .with_target(false);

    let installed = match format {
        LogFormat::Json => builder
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    installed.is_ok()
}

/// Compact output captured by the test harness; quiet unless `RUST_LOG` asks.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("warn"))
        .with_test_writer()
        .compact()
        .try_init();
}

fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}
