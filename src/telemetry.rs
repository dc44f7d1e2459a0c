use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default directives when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,companion_memory=debug";

/// Initialize structured logging.
///
/// Configures a compact `tracing-subscriber::fmt` layer and an `EnvFilter`
/// that honours `RUST_LOG`, falling back to [`DEFAULT_FILTER`]. Calling this
/// twice is an error from the subscriber registry, so only `main` calls it.
pub fn init() {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .compact();

    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
