//! Configuration loaded from `PAYWALL__`-prefixed environment variables.
//!
//! Sections map to nested keys with `__` separators, so
//! `PAYWALL__BILLING__MAX_RENEWAL_YEARS=5` sets `billing.max_renewal_years`.
//! A `.env` file is read first when present.
//!
//! ```no_run
//! use paywall_subscriptions::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! let classifier = config.billing.classifier();
//! ```

mod billing;
mod database;
mod error;
mod telemetry;

pub use billing::BillingConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use telemetry::{LogFormat, TelemetryConfig};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Required: at least `PAYWALL__DATABASE__URL` must be set.
    pub database: DatabaseConfig,

    #[serde(default)]
    pub billing: BillingConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Reads `.env` if present, then the environment.
    ///
    /// # Errors
    ///
    /// `ConfigError::LoadError` when a required key is missing or a value
    /// does not parse.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("PAYWALL")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Checks every section, stopping at the first problem.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.validate()?;
        self.billing.validate()?;
        self.telemetry.validate()?;
        Ok(())
    }
}
