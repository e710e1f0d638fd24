//! Logging setup.
//!
//! Logs go to stderr so that `--json` output on stdout stays parseable.
//! The level comes from `RUST_LOG` and defaults to `info`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber, as plain text or JSON lines.
pub fn init(json: bool) {
    let registry = tracing_subscriber::registry().with(filter());
    let layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    // A second initialization (e.g. in tests) is ignored.
    let _ = if json {
        registry.with(layer.json()).try_init()
    } else {
        registry.with(layer).try_init()
    };
}
