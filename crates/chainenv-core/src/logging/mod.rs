//! Tracing setup for the `chainenv` binary
//!
//! Library code only emits `tracing` events; nothing is printed until a
//! subscriber is installed here.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding an `EnvFilter` directive string
pub const LOG_ENV: &str = "CHAINENV_LOG";

const DEBUG_DIRECTIVES: &str = "chainenv=debug,chainenv_core=debug";
const DEFAULT_DIRECTIVES: &str = "warn";

/// Filter used when `CHAINENV_LOG` is not set
pub fn default_directives(debug: bool) -> &'static str {
    if debug {
        DEBUG_DIRECTIVES
    } else {
        DEFAULT_DIRECTIVES
    }
}

/// Filter from explicit directives, falling back when they are absent or invalid
fn build_filter(directives: Option<String>, debug: bool) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directives(debug)))
}

/// Install a stderr subscriber
///
/// `CHAINENV_LOG` wins over `debug`. Calling this more than once is a no-op.
pub fn init(debug: bool) {
    let filter = build_filter(std::env::var(LOG_ENV).ok(), debug);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(debug),
        )
        .try_init()
        .ok();
}
