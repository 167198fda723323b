//! Structured logging setup

use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Build the default filter directive for a level from config
///
/// HTTP access logs from `tower_http` stay at debug regardless of level.
pub fn default_directive(level: &str) -> String {
    format!("myaei={},tower_http=debug", level)
}

/// Initialize the tracing subscriber
///
/// Only the first call has any effect. `RUST_LOG` wins over `default_level`.
///
/// ```no_run
/// myaei::telemetry::init("info");
/// tracing::info!("Application started");
/// ```
pub fn init(default_level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive(default_level)));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
