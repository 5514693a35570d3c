//! PostgreSQL implementation of the repository traits.
//!
//! [`PgStore`] checks connections out of a `deadpool-postgres` pool and
//! opens a transaction on each; [`PgSession`] implements every repository
//! trait on top of that transaction.

mod cart;
mod catalog;
mod identity;
mod order;

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use tokio_postgres::Client;
use tokio_postgres::error::SqlState;
use tracing::{debug, warn};

use crate::{RepositoryError, Session, Store};

/// Store backed by a Postgres connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn Session>, RepositoryError> {
        let conn = self.pool.get().await?;
        conn.batch_execute("BEGIN").await?;
        Ok(Box::new(PgSession { conn: Some(conn) }))
    }
}

/// An open transaction on a pooled connection.
///
/// Committing returns the connection to the pool. Dropping an uncommitted
/// session issues `ROLLBACK` on a spawned task before the connection goes
/// back to the pool.
pub struct PgSession {
    conn: Option<Object>,
}

impl PgSession {
    fn db(&self) -> Result<&Client, RepositoryError> {
        match &self.conn {
            Some(conn) => {
                let client: &Client = conn;
                Ok(client)
            }
            None => Err(RepositoryError::Closed),
        }
    }
}

#[async_trait]
impl Session for PgSession {
    async fn commit(&mut self) -> Result<(), RepositoryError> {
        let conn = self.conn.take().ok_or(RepositoryError::Closed)?;
        conn.batch_execute("COMMIT").await?;
        Ok(())
    }
}

impl Drop for PgSession {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match conn.batch_execute("ROLLBACK").await {
                        Ok(()) => debug!("Session rolled back"),
                        Err(e) => warn!("Rollback failed: {}", e),
                    }
                });
            }
            Err(_) => {
                warn!("Session dropped outside of a runtime; connection discarded");
                drop(Object::take(conn));
            }
        }
    }
}

/// Maps constraint violations to [`RepositoryError::Conflict`].
pub(crate) fn constraint_error(err: tokio_postgres::Error, what: &str) -> RepositoryError {
    match err.code() {
        Some(code) if *code == SqlState::UNIQUE_VIOLATION => {
            RepositoryError::Conflict(format!("{what} already exists"))
        }
        Some(code) if *code == SqlState::FOREIGN_KEY_VIOLATION => {
            RepositoryError::Conflict(format!("{what} conflicts with related records"))
        }
        _ => RepositoryError::Db(err),
    }
}

/// Turns an affected-rows count into `NotFound` when nothing was updated.
pub(crate) fn expect_one(affected: u64) -> Result<(), RepositoryError> {
    if affected == 0 {
        Err(RepositoryError::NotFound)
    } else {
        Ok(())
    }
}
