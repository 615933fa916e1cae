//! Subscriber setup for applications without their own.
//!
//! `RUST_LOG` wins when set. Otherwise `FLAGSTAFF_LOG_LEVEL` selects the
//! level, falling back to `info`.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable selecting the log level when `RUST_LOG` is unset.
pub const LOG_LEVEL_ENV_VAR: &str = "FLAGSTAFF_LOG_LEVEL";

const DEFAULT_LEVEL: &str = "info";

/// Build the filter from the environment.
pub fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_from(std::env::var(LOG_LEVEL_ENV_VAR).ok())))
}

/// Create a subscriber honouring `RUST_LOG` and `FLAGSTAFF_LOG_LEVEL`.
pub fn subscriber() -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer())
}

/// Install the subscriber globally.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init() -> bool {
    tracing::subscriber::set_global_default(subscriber()).is_ok()
}

fn level_from(value: Option<String>) -> String {
    match value.as_deref().map(str::trim).map(str::to_lowercase) {
        Some(level) if matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error" | "off") => {
            level
        }
        Some(level) if level == "warning" => "warn".to_string(),
        _ => DEFAULT_LEVEL.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from() {
        assert_eq!(level_from(Some("debug".to_string())), "debug");
        assert_eq!(level_from(Some(" WARN ".to_string())), "warn");
        assert_eq!(level_from(Some("warning".to_string())), "warn");
        assert_eq!(level_from(Some("loud".to_string())), "info");
        assert_eq!(level_from(None), "info");
    }
}
