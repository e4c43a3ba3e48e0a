//! Engine configuration loading and representation.

use serde::{Deserialize, Serialize};

use stockledger_inventory::LocationId;

pub const MAX_COMMIT_ATTEMPTS_VAR: &str = "STOCKLEDGER_MAX_COMMIT_ATTEMPTS";
pub const FORECAST_WINDOW_DAYS_VAR: &str = "STOCKLEDGER_FORECAST_WINDOW_DAYS";
pub const DEFAULT_LOCATION_VAR: &str = "STOCKLEDGER_DEFAULT_LOCATION";

/// Tunables of a [`StockEngine`](crate::engine::StockEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Commits tried per command before a version conflict is surfaced.
    pub max_commit_attempts: u32,
    /// Forecast window used when the caller does not pass one.
    pub default_forecast_window_days: u32,
    /// Location used when a movement names none.
    pub default_location: LocationId,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: 3,
            default_forecast_window_days: 30,
            default_location: LocationId::default(),
        }
    }
}

impl EngineConfig {
    /// Read overrides from the process environment.
    ///
    /// Missing variables keep their default; invalid ones are logged and
    /// ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let max_commit_attempts = lookup(MAX_COMMIT_ATTEMPTS_VAR)
            .and_then(|raw| positive(MAX_COMMIT_ATTEMPTS_VAR, &raw))
            .unwrap_or(defaults.max_commit_attempts);

        let default_forecast_window_days = lookup(FORECAST_WINDOW_DAYS_VAR)
            .and_then(|raw| positive(FORECAST_WINDOW_DAYS_VAR, &raw))
            .unwrap_or(defaults.default_forecast_window_days);

        let default_location = lookup(DEFAULT_LOCATION_VAR)
            .and_then(|raw| match LocationId::new(raw) {
                Ok(location) => Some(location),
                Err(err) => {
                    tracing::warn!(var = DEFAULT_LOCATION_VAR, %err, "ignoring invalid value");
                    None
                }
            })
            .unwrap_or(defaults.default_location);

        Self {
            max_commit_attempts,
            default_forecast_window_days,
            default_location,
        }
    }
}

fn positive(var: &str, raw: &str) -> Option<u32> {
    match raw.trim().parse::<u32>() {
        Ok(0) | Err(_) => {
            tracing::warn!(var, value = raw, "expected a positive integer; using default");
            None
        }
        Ok(n) => Some(n),
    }
}
