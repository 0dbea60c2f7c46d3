/*!
Logging setup for processes that embed a relay.

Relay epochs are short-lived processes or requests, so the useful signal is
a structured line per load, flush and hand-off. This module installs a
`tracing` subscriber that emits those lines.
*/

use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::{BatonError, Result};

/// Directive applied when `RUST_LOG` does not say otherwise
pub const DEFAULT_DIRECTIVE: &str = "baton_core=info";

fn env_filter() -> Result<EnvFilter> {
    let directive = DEFAULT_DIRECTIVE
        .parse()
        .map_err(|e| BatonError::validation(format!("Invalid log directive: {e}")))?;
    Ok(EnvFilter::from_default_env().add_directive(directive))
}

/// Install the global tracing subscriber
///
/// # Arguments
/// * `json` - Emit one JSON object per event instead of human-readable lines
///
/// Logs go to stderr so they never mix with a capability probe answer on stdout.
pub fn init_observability(json: bool) -> Result<()> {
    let filter = env_filter()?;

    let result = if json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_current_span(false)
            .with_writer(std::io::stderr);
        set_global_default(Registry::default().with(filter).with(fmt_layer))
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr);
        set_global_default(Registry::default().with(filter).with(fmt_layer))
    };

    result.map_err(|e| {
        BatonError::validation(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::debug!("Baton observability initialized");
    Ok(())
}

/// Initialize observability with default settings
pub fn init_default_observability() -> Result<()> {
    init_observability(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_parses() {
        assert!(env_filter().is_ok());
    }

    #[test]
    fn test_second_initialization_fails() {
        let _ = init_observability(true);

        assert!(init_default_observability().is_err());
    }
}
