//! Database initialization and migration logic for the bakery backend.
//!
//! Provides `init_db_pool` for creating a connection pool and
//! auto-applying SQL migrations from the configured migrations directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use app_config::AppConfig;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio::fs;
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tracing::{debug, info};

/// Initializes the database connection pool and runs migrations.
///
/// # Errors
/// Returns an error if the pool cannot be created or migrations fail.
pub async fn init_db_pool(cfg: &AppConfig) -> Result<Pool> {
    let dsn = format!(
        "host={} port={} user={} password={} dbname={} sslmode=disable",
        cfg.db_host, cfg.db_port, cfg.db_user, cfg.db_password, cfg.db_name
    );

    let pg_config: PgConfig = dsn.parse().context("Failed to parse Postgres DSN")?;

    let mgr = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    let pool = Pool::builder(mgr)
        .max_size(cfg.db_pool_size)
        .runtime(Runtime::Tokio1)
        .build()
        .context("Failed to create database pool")?;

    let mut client = pool
        .get()
        .await
        .context("Failed to get DB connection for migrations")?;
    run_migrations(&mut client, &cfg.migrations_dir).await?;

    Ok(pool)
}

/// Applies the pending `.sql` migrations from `migrations_dir`.
///
/// Files run in file-name order, each in its own transaction, and are
/// recorded in `schema_migrations` so a restart skips them.
///
/// # Errors
/// Returns an error if migration files cannot be read or applied.
pub async fn run_migrations(client: &mut Client, migrations_dir: &str) -> Result<()> {
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                name       TEXT PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .await
        .context("Failed to create schema_migrations")?;

    for path in migration_files(Path::new(migrations_dir)).await? {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let applied = client
            .query_opt("SELECT 1 FROM schema_migrations WHERE name = $1", &[&name])
            .await?
            .is_some();
        if applied {
            debug!("Migration {} already applied", name);
            continue;
        }

        info!("Applying migration: {}", name);
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read migration file {name}"))?;

        let tx = client.transaction().await?;
        tx.batch_execute(&content)
            .await
            .with_context(|| format!("Failed to execute migration {name}"))?;
        tx.execute("INSERT INTO schema_migrations (name) VALUES ($1)", &[&name])
            .await?;
        tx.commit()
            .await
            .with_context(|| format!("Failed to commit migration {name}"))?;
    }
    Ok(())
}

/// Lists the `.sql` files of `dir`, sorted by name.
async fn migration_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read migrations directory {}", dir.display()))?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "sql") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migration_files_are_sorted_and_filtered() {
        let dir = std::env::temp_dir().join(format!("migrations-{}", std::process::id()));
        fs::create_dir_all(&dir).await.unwrap();
        for name in ["0002_more.sql", "README.md", "0001_init.sql", "0010_late.sql"] {
            fs::write(dir.join(name), "SELECT 1;").await.unwrap();
        }

        let files = migration_files(&dir).await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["0001_init.sql", "0002_more.sql", "0010_late.sql"]);

        fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        assert!(migration_files(Path::new("/definitely/not/here")).await.is_err());
    }
}
