//! Logging initialization, following standard Rust practice.
//!
//! Respects the `RUST_LOG` environment variable, falls back to a
//! caller-supplied filter, and defaults to `"info"` when neither is set.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured logging for the process.
///
/// # Arguments
/// * `filter` - Optional log filter (e.g. `"info"`, `"rubin_p2p=debug"`).
///   If `None`, uses `RUST_LOG` or defaults to `"info"`.
pub fn init_logging(filter: Option<&str>) {
    let mut env_filter = EnvFilter::from_default_env();

    if filter.is_some() && std::env::var("RUST_LOG").is_err() {
        if let Some(f) = filter {
            env_filter = EnvFilter::new(f);
        }
    }

    if std::env::var("RUST_LOG").is_err() && filter.is_none() {
        env_filter = EnvFilter::new("info");
    }

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .with(env_filter)
        .init();
}
