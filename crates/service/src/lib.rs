//! Business logic layer of the bakery backend.
//!
//! Each area is exposed as an async trait (`CatalogService`, `AccountService`,
//! `CartService`, `OrderService`, `PaymentService`, `DeliveryService`) with a
//! generic implementation over any [`repository::Store`].
//!
//! # Features
//! - Every operation runs inside a single store session and commits once, so a
//!   failed step leaves no partial writes behind.
//! - The order lifecycle (`CREATED` → `PREPARING` → `EN_ROUTE` → `COMPLETED`)
//!   is enforced here; payment confirmation and delivery dispatch move orders
//!   forward as side effects.
//! - Role checks are made against the [`Caller`] passed to every operation.
//! - Well-typed error handling via [`ServiceError`].

pub mod access;
pub mod accounts;
pub mod cart;
pub mod catalog;
pub mod delivery;
pub mod error;
pub mod order;
pub mod payment;

#[cfg(test)]
mod testing;

pub use access::Caller;
pub use accounts::{
    Account, AccountService, AccountServiceImpl, PasswordChange, PasswordHasher, ProfilePatch,
    SaltedSha256, SignUp,
};
pub use cart::{CartService, CartServiceImpl};
pub use catalog::{
    CatalogService, CatalogServiceImpl, CategoryPatch, NewCategory, NewProduct, ProductPatch,
};
pub use delivery::{DeliveryService, DeliveryServiceImpl};
pub use error::ServiceError;
pub use order::{OrderDetails, OrderService, OrderServiceImpl};
pub use payment::{PaymentService, PaymentServiceImpl};
