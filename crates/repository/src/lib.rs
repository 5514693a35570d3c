//! # Data Repository Layer
//!
//! This module provides repository traits for every entity of the shop:
//! catalog, credentials and profiles, carts, orders, payments and
//! deliveries, plus the PostgreSQL implementation in [`pg`].
//!
//! All repository calls go through a [`Session`], which is one database
//! transaction. A [`Store`] hands out sessions; services open one per
//! operation, run their checks and writes on it and call
//! [`Session::commit`]. Dropping a session without committing rolls every
//! write back, which is what makes checkout and payment confirmation atomic.

use async_trait::async_trait;
use model::{
    Cart, CartLine, CartStatus, Category, Credential, Delivery, Order, OrderStatus, Payment,
    Product, User,
};
use thiserror::Error;
use uuid::Uuid;

pub mod pg;

pub use pg::{PgSession, PgStore};

/// # RepositoryError
///
/// Error types that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database-related errors, wrapping the underlying PostgreSQL error
    #[error("Database error: {0}")]
    Db(#[from] tokio_postgres::Error),
    /// Failed to obtain a connection from the pool.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
    /// A uniqueness or reference constraint rejected the write.
    #[error("{0}")]
    Conflict(String),
    /// The row targeted by an update does not exist.
    #[error("Not found")]
    NotFound,
    /// The session was already committed.
    #[error("Session is closed")]
    Closed,
}

/// Source of transactional sessions.
#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a new session (one transaction).
    async fn begin(&self) -> Result<Box<dyn Session>, RepositoryError>;
}

/// One unit of work over every repository. Dropping it without
/// [`commit`](Session::commit) discards its writes.
#[async_trait]
pub trait Session:
    CategoriesRepository
    + ProductsRepository
    + CredentialsRepository
    + UsersRepository
    + CartsRepository
    + OrdersRepository
    + PaymentsRepository
    + DeliveriesRepository
{
    async fn commit(&mut self) -> Result<(), RepositoryError>;
}

/// # CategoriesRepository
#[async_trait]
pub trait CategoriesRepository: Send {
    async fn list_categories(&mut self) -> Result<Vec<Category>, RepositoryError>;
    async fn get_category(&mut self, id: Uuid) -> Result<Option<Category>, RepositoryError>;
    async fn insert_category(&mut self, category: &Category) -> Result<(), RepositoryError>;
    async fn update_category(&mut self, category: &Category) -> Result<(), RepositoryError>;
    /// Returns `false` when no such category exists. Categories still
    /// referenced by products are rejected with [`RepositoryError::Conflict`].
    async fn delete_category(&mut self, id: Uuid) -> Result<bool, RepositoryError>;
}

/// # ProductsRepository
///
/// Products are never physically deleted; `update_product` with
/// `active = false` is the soft delete.
#[async_trait]
pub trait ProductsRepository: Send {
    async fn list_products(&mut self, include_inactive: bool) -> Result<Vec<Product>, RepositoryError>;
    async fn get_product(&mut self, id: Uuid) -> Result<Option<Product>, RepositoryError>;
    async fn insert_product(&mut self, product: &Product) -> Result<(), RepositoryError>;
    async fn update_product(&mut self, product: &Product) -> Result<(), RepositoryError>;

    /// Atomically subtracts `quantity` from the product's stock.
    ///
    /// Returns `false`, leaving the row untouched, when the stock is lower
    /// than `quantity`.
    async fn decrement_stock(&mut self, id: Uuid, quantity: i32) -> Result<bool, RepositoryError>;
}

/// # CredentialsRepository
#[async_trait]
pub trait CredentialsRepository: Send {
    async fn list_credentials(&mut self) -> Result<Vec<Credential>, RepositoryError>;
    async fn get_credential(&mut self, id: Uuid) -> Result<Option<Credential>, RepositoryError>;
    async fn find_credential_by_username(
        &mut self,
        username: &str,
    ) -> Result<Option<Credential>, RepositoryError>;
    async fn insert_credential(&mut self, credential: &Credential) -> Result<(), RepositoryError>;
    async fn update_credential(&mut self, credential: &Credential) -> Result<(), RepositoryError>;
}

/// # UsersRepository
#[async_trait]
pub trait UsersRepository: Send {
    async fn list_users(&mut self) -> Result<Vec<User>, RepositoryError>;
    async fn get_user(&mut self, id: Uuid) -> Result<Option<User>, RepositoryError>;
    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, RepositoryError>;
    async fn find_user_by_credential(
        &mut self,
        credential_id: Uuid,
    ) -> Result<Option<User>, RepositoryError>;
    async fn insert_user(&mut self, user: &User) -> Result<(), RepositoryError>;
    async fn update_user(&mut self, user: &User) -> Result<(), RepositoryError>;
}

/// # CartsRepository
///
/// Carts are returned with their lines loaded.
#[async_trait]
pub trait CartsRepository: Send {
    async fn list_carts(&mut self) -> Result<Vec<Cart>, RepositoryError>;
    async fn get_cart(&mut self, id: Uuid) -> Result<Option<Cart>, RepositoryError>;

    /// Finds the user's cart in `status`, locking it for the rest of the
    /// session.
    async fn find_cart_by_status(
        &mut self,
        user_id: Uuid,
        status: CartStatus,
    ) -> Result<Option<Cart>, RepositoryError>;
    async fn insert_cart(&mut self, cart: &Cart) -> Result<(), RepositoryError>;

    /// Persists status, subtotal and timestamps. Lines are written through
    /// the line methods below.
    async fn update_cart(&mut self, cart: &Cart) -> Result<(), RepositoryError>;
    async fn insert_cart_line(&mut self, line: &CartLine) -> Result<(), RepositoryError>;
    async fn update_cart_line(&mut self, line: &CartLine) -> Result<(), RepositoryError>;
    async fn delete_cart_line(&mut self, id: Uuid) -> Result<bool, RepositoryError>;
    async fn clear_cart_lines(&mut self, cart_id: Uuid) -> Result<(), RepositoryError>;
}

/// # OrdersRepository
///
/// Orders are returned with their lines loaded; lines are written once, by
/// `insert_order`, and never updated.
#[async_trait]
pub trait OrdersRepository: Send {
    async fn list_orders(&mut self) -> Result<Vec<Order>, RepositoryError>;
    async fn orders_for_user(&mut self, user_id: Uuid) -> Result<Vec<Order>, RepositoryError>;
    async fn get_order(&mut self, id: Uuid) -> Result<Option<Order>, RepositoryError>;
    async fn insert_order(&mut self, order: &Order) -> Result<(), RepositoryError>;
    async fn update_order_status(
        &mut self,
        id: Uuid,
        status: OrderStatus,
    ) -> Result<(), RepositoryError>;
}

/// # PaymentsRepository
#[async_trait]
pub trait PaymentsRepository: Send {
    async fn list_payments(&mut self) -> Result<Vec<Payment>, RepositoryError>;
    async fn get_payment(&mut self, id: Uuid) -> Result<Option<Payment>, RepositoryError>;

    /// Finds the payment of an order, locking it for the rest of the session.
    async fn find_payment_by_order(
        &mut self,
        order_id: Uuid,
    ) -> Result<Option<Payment>, RepositoryError>;

    /// A second payment for the same order is rejected with
    /// [`RepositoryError::Conflict`].
    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), RepositoryError>;
    async fn update_payment(&mut self, payment: &Payment) -> Result<(), RepositoryError>;
}

/// # DeliveriesRepository
#[async_trait]
pub trait DeliveriesRepository: Send {
    async fn list_deliveries(&mut self) -> Result<Vec<Delivery>, RepositoryError>;
    async fn get_delivery(&mut self, id: Uuid) -> Result<Option<Delivery>, RepositoryError>;
    async fn find_delivery_by_order(
        &mut self,
        order_id: Uuid,
    ) -> Result<Option<Delivery>, RepositoryError>;

    /// A second delivery for the same order is rejected with
    /// [`RepositoryError::Conflict`].
    async fn insert_delivery(&mut self, delivery: &Delivery) -> Result<(), RepositoryError>;
    async fn update_delivery(&mut self, delivery: &Delivery) -> Result<(), RepositoryError>;
}
