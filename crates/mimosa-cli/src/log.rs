//! Logging setup: a `tracing-subscriber` registry filtered by `LOG_LEVEL`,
//! with error-context spans attached via `tracing-error` so `color-eyre`
//! reports can include them.

use tracing_error::ErrorLayer;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, Layer as _, fmt};

use mimosa_core::config::LOG_LEVEL_ENV_VAR;

/// Install the global subscriber. Verbosity is read from `LOG_LEVEL`
/// (`RUST_LOG`-style directive syntax), defaulting to `info`.
pub fn init() {
    let filter = EnvFilter::builder()
        .with_env_var(LOG_LEVEL_ENV_VAR)
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr).with_filter(filter))
        .init();
}
