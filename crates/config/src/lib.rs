use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

/// Which persistence backend the process runs on.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// PostgreSQL through a deadpool connection pool.
    Postgres,
    /// Process-local tables, lost on restart. Meant for demos and tests.
    Memory,
}

/// `AppConfig` holds all configuration parameters required by the application.
///
/// The configuration is loaded from environment variables (optionally via a `.env` file)
/// or uses default values if the variable is not set.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AppConfig {
    // --- Database settings ---
    /// Database hostname ("localhost" for local runs, the service name under Docker Compose).
    pub db_host: String,
    /// Database port (default: 5432).
    pub db_port: u16,
    /// Database user.
    pub db_user: String,
    /// Database password.
    pub db_password: String,
    /// Database name.
    pub db_name: String,
    /// Maximum number of pooled connections.
    pub db_pool_size: usize,
    /// Directory with the `.sql` migrations, applied in file-name order.
    pub migrations_dir: String,

    // --- Storage ---
    pub storage: StorageKind,

    // --- HTTP server ---
    /// The port on which the HTTP server will listen.
    pub http_port: u16,

    // --- Shutdown timeout ---
    /// Graceful shutdown timeout (human-friendly format, e.g. "5s", "1m").
    #[serde(deserialize_with = "deserialize_duration")]
    pub shutdown_timeout: Duration,

    // --- Pricing ---
    /// Flat delivery fee added to every order.
    pub delivery_fee: Decimal,
}

/// Custom deserializer for graceful shutdown timeout.
/// Accepts human-readable formats like "5s", "1m", etc.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let val = String::deserialize(deserializer)?;
    humantime::parse_duration(&val)
        .map_err(|e| D::Error::custom(format!("Invalid duration '{val}': {e}")))
}

impl AppConfig {
    /// Loads configuration from environment variables (and optionally from `.env` file).
    ///
    /// Fields not set via env will be filled with default values.
    ///
    /// # Errors
    /// Returns an error if environment variables are invalid.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_builder(config::Config::builder().add_source(config::Environment::default()))
    }

    /// Builds the configuration from defaults overlaid with `source`.
    /// Does not read `.env` or the process environment.
    pub fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        Self::from_builder(config::Config::builder().add_source(source))
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        let settings = builder
            // Database
            .set_default("db_host", "localhost")?
            .set_default("db_port", 5432)?
            .set_default("db_user", "bakery_user")?
            .set_default("db_password", "securepassword")?
            .set_default("db_name", "bakery_db")?
            .set_default("db_pool_size", 16)?
            .set_default("migrations_dir", "migrations")?
            // Storage
            .set_default("storage", "postgres")?
            // HTTP
            .set_default("http_port", 8081)?
            // Shutdown
            .set_default("shutdown_timeout", "5s")?
            // Pricing
            .set_default("delivery_fee", "4000")?
            .build()?;

        settings
            .try_deserialize()
            .context("Failed to load configuration")
    }
}
