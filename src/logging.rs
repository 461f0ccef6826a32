//! Tracing setup. Logs go to stderr so stdout stays clean for reports and
//! `--json` output.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "ferry=info";
const VERBOSE_LOG_FILTER: &str = "ferry=debug";
const LOG_ENV: &str = "FERRY_LOG";

/// `FERRY_LOG` wins, then `RUST_LOG`, then the defaults. `-v` only changes
/// the default.
pub fn filter(verbose: bool) -> EnvFilter {
    let fallback = if verbose { VERBOSE_LOG_FILTER } else { DEFAULT_LOG_FILTER };

    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(fallback))
}

pub fn init(verbose: bool) {
    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter(verbose)),
        )
        .try_init();

    if let Err(e) = result {
        eprintln!("warning: logging already initialised: {e}");
    }
}
