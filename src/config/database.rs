//! PostgreSQL pool settings

use serde::Deserialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Executor;
use std::time::Duration;

use super::error::ValidationError;

/// Connection pool for the subscription store.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for a free connection
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Milliseconds a statement may wait on a row lock before failing.
    /// Zero waits forever.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_ms: u64,

    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Session statement run on every new connection.
    fn session_setup(&self) -> String {
        format!("SET lock_timeout = {}", self.lock_timeout_ms)
    }

    pub fn pool_options(&self) -> PgPoolOptions {
        let setup = self.session_setup();
        PgPoolOptions::new()
            .min_connections(self.min_connections)
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout())
            .after_connect(move |conn, _meta| {
                let setup = setup.clone();
                Box::pin(async move {
                    conn.execute(setup.as_str()).await?;
                    Ok(())
                })
            })
    }

    pub async fn connect(&self) -> Result<PgPool, sqlx::Error> {
        tracing::info!(
            min_connections = self.min_connections,
            max_connections = self.max_connections,
            lock_timeout_ms = self.lock_timeout_ms,
            "Connecting to PostgreSQL"
        );
        self.pool_options().connect(&self.url).await
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::MissingRequired("DATABASE_URL"));
        }
        if !["postgres://", "postgresql://"]
            .iter()
            .any(|scheme| self.url.starts_with(scheme))
        {
            return Err(ValidationError::InvalidDatabaseUrl);
        }
        if self.min_connections > self.max_connections {
            return Err(ValidationError::InvalidPoolSize);
        }
        if self.max_connections > MAX_POOL_SIZE {
            return Err(ValidationError::PoolSizeTooLarge);
        }
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            lock_timeout_ms: default_lock_timeout(),
            run_migrations: default_run_migrations(),
        }
    }
}

const MAX_POOL_SIZE: u32 = 100;

fn default_min_connections() -> u32 {
    2
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_lock_timeout() -> u64 {
    5_000
}

fn default_run_migrations() -> bool {
    true
}
