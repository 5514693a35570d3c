//! Domain entities of the bakery shop: catalog, identity, cart, order,
//! payment and delivery records, plus the status enums that drive the
//! order lifecycle.
//!
//! Status enums are stored as Postgres enum types, hence the
//! `ToSql`/`FromSql` derives next to the serde ones.

mod cart;
mod catalog;
mod identity;
mod order;
mod pricing;
mod shipping;

pub use cart::{Cart, CartLine, CartStatus};
pub use catalog::{Category, Product};
pub use identity::{Credential, Role, User};
pub use order::{Order, OrderLine, OrderStatus};
pub use pricing::{DEFAULT_DELIVERY_FEE, OrderTotals, TAX_RATE};
pub use shipping::{Delivery, DeliveryStatus, Payment, PaymentMethod, PaymentStatus};
