//! `paywall-migrate`: applies database migrations.
//!
//! Reads `PAYWALL__*` configuration, initialises logging, connects to
//! PostgreSQL and runs every pending migration in `migrations/`.

use std::process::ExitCode;

use paywall_subscriptions::config::AppConfig;
use paywall_subscriptions::observability::init_tracing;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = config.validate() {
        eprintln!("Invalid configuration: {}", err);
        return ExitCode::FAILURE;
    }
    if let Err(err) = init_tracing(&config.telemetry) {
        eprintln!("Failed to initialise logging: {}", err);
        return ExitCode::FAILURE;
    }

    if !config.database.run_migrations {
        tracing::info!("Migrations disabled by configuration");
        return ExitCode::SUCCESS;
    }

    let pool = match config.database.connect().await {
        Ok(pool) => pool,
        Err(err) => {
            tracing::error!(error = %err, "Failed to connect to PostgreSQL");
            return ExitCode::FAILURE;
        }
    };

    match sqlx::migrate!("./migrations").run(&pool).await {
        Ok(()) => {
            tracing::info!("Migrations applied");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, "Migration failed");
            ExitCode::FAILURE
        }
    }
}
