//! Tracing subscriber initialization
//!
//! Logs go to stderr so that stdout carries only the JSON results of CLI
//! commands. The filter comes from `RUST_LOG`, then `LOG_LEVEL`, then `info`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Filter directive from the environment lookup
fn filter_directive<F>(env: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    env("RUST_LOG")
        .or_else(|| env("LOG_LEVEL"))
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Install the global subscriber; `json` switches to one JSON object per line
///
/// # Errors
///
/// Returns an error if a global subscriber is already set.
pub fn init_tracing(json: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let directive = filter_directive(|key| std::env::var(key).ok());
    let env_filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }

    Ok(())
}
