/// Bakery Shop Backend Application
///
/// Entry point of the bakery shop service: catalog, accounts, carts and the
/// order → payment → delivery lifecycle, served over HTTP.
///
/// # Architecture
///
/// - Repository layer for data access (PostgreSQL or in-memory tables)
/// - Service layer for business logic and access rules
/// - API layer for HTTP endpoints and metrics
///
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use app_config::{AppConfig, StorageKind};
use memstore::MemoryStore;
use repository::PgStore;
use server::{Server, Services};
use service::SaltedSha256;

/// Initialize the tracing subscriber for logging; `RUST_LOG` overrides the
/// default `info` level.
fn init_logger() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

async fn build_services(config: &AppConfig) -> Result<Services> {
    let hasher = Arc::new(SaltedSha256);
    let services = match config.storage {
        StorageKind::Postgres => {
            let pool = db::init_db_pool(config)
                .await
                .context("Failed to initialize database")?;
            info!("Database initialized successfully");
            Services::over(Arc::new(PgStore::new(pool)), hasher, config.delivery_fee)
        }
        StorageKind::Memory => {
            info!("Using in-memory storage; data is lost on restart");
            Services::over(Arc::new(MemoryStore::new()), hasher, config.delivery_fee)
        }
    };
    Ok(services)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();
    info!("Bakery backend starting...");

    let config = AppConfig::load().context("Failed to load configuration")?;
    info!(
        storage = ?config.storage,
        port = config.http_port,
        delivery_fee = %config.delivery_fee,
        "Configuration loaded"
    );

    let services = build_services(&config).await?;
    let server = Server::new(config.http_port, services, config.shutdown_timeout)?;
    server.start().await?;

    info!("Application stopped");
    Ok(())
}
