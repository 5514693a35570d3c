use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cart::CartLine;
use crate::pricing::OrderTotals;

/// Lifecycle of an order.
///
/// ```text
/// CREATED -> PREPARING -> EN_ROUTE -> COMPLETED
///    |           |            \-> DELIVERY_FAILED
///    \-----------+-> CANCELLED
/// any -> DELETED (admin soft delete)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[postgres(name = "order_status")]
pub enum OrderStatus {
    #[postgres(name = "CREATED")]
    Created,
    #[postgres(name = "PREPARING")]
    Preparing,
    #[postgres(name = "EN_ROUTE")]
    EnRoute,
    #[postgres(name = "COMPLETED")]
    Completed,
    #[postgres(name = "CANCELLED")]
    Cancelled,
    #[postgres(name = "DELIVERY_FAILED")]
    DeliveryFailed,
    #[postgres(name = "DELETED")]
    Deleted,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::EnRoute => "EN_ROUTE",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::DeliveryFailed => "DELIVERY_FAILED",
            OrderStatus::Deleted => "DELETED",
        }
    }

    /// Guarded transition table used by the regular workflow. The admin
    /// force path deliberately ignores it.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Deleted, _) => false,
            (_, Deleted) => true,
            (Created, Preparing) | (Created, Cancelled) => true,
            (Preparing, EnRoute) | (Preparing, Cancelled) => true,
            (EnRoute, Completed) | (EnRoute, DeliveryFailed) => true,
            _ => false,
        }
    }

    /// An order can be cancelled by its owner until it has been dispatched.
    pub fn is_cancellable(self) -> bool {
        matches!(self, OrderStatus::Created | OrderStatus::Preparing)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OrderLine: immutable snapshot of a cart line taken at checkout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderLine {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

/// Order: the aggregate created from a cart on checkout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub delivery_fee: Decimal,
    pub total: Decimal,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a `CREATED` order from cart lines, copying quantities and the
    /// frozen unit prices.
    pub fn from_cart_lines(user_id: Uuid, lines: &[CartLine], delivery_fee: Decimal) -> Self {
        let id = Uuid::new_v4();
        let lines: Vec<OrderLine> = lines
            .iter()
            .map(|l| OrderLine {
                id: Uuid::new_v4(),
                order_id: id,
                product_id: l.product_id,
                quantity: l.quantity,
                unit_price: l.unit_price,
                subtotal: l.unit_price * Decimal::from(l.quantity),
            })
            .collect();
        let subtotal = lines.iter().map(|l| l.subtotal).sum();
        let totals = OrderTotals::compute(subtotal, delivery_fee);
        let now = Utc::now();

        Self {
            id,
            user_id,
            subtotal: totals.subtotal,
            discount: totals.discount,
            tax: totals.tax,
            delivery_fee: totals.delivery_fee,
            total: totals.total,
            status: OrderStatus::Created,
            lines,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::DEFAULT_DELIVERY_FEE;

    #[test]
    fn order_from_cart_lines_matches_totals_invariant() {
        let cart_id = Uuid::new_v4();
        let lines = vec![
            CartLine::new(cart_id, Uuid::new_v4(), 2, Decimal::from(10)),
            CartLine::new(cart_id, Uuid::new_v4(), 1, Decimal::from(20)),
        ];

        let order = Order::from_cart_lines(Uuid::new_v4(), &lines, DEFAULT_DELIVERY_FEE);

        assert_eq!(order.status, OrderStatus::Created);
        assert_eq!(order.lines.len(), 2);
        assert!(order.lines.iter().all(|l| l.order_id == order.id));
        assert_eq!(order.subtotal, Decimal::from(40));
        assert_eq!(order.tax, Decimal::new(760, 2));
        assert_eq!(order.delivery_fee, Decimal::from(4000));
        assert_eq!(
            order.total,
            order.subtotal + order.tax + order.delivery_fee - order.discount
        );
    }

    #[test]
    fn cancellation_only_before_dispatch() {
        assert!(OrderStatus::Created.is_cancellable());
        assert!(OrderStatus::Preparing.is_cancellable());
        assert!(!OrderStatus::EnRoute.is_cancellable());
        assert!(!OrderStatus::Completed.is_cancellable());
        assert!(!OrderStatus::Cancelled.is_cancellable());
    }

    #[test]
    fn transition_table() {
        use OrderStatus::*;
        assert!(Created.can_transition_to(Preparing));
        assert!(Preparing.can_transition_to(EnRoute));
        assert!(EnRoute.can_transition_to(Completed));
        assert!(EnRoute.can_transition_to(DeliveryFailed));
        assert!(Completed.can_transition_to(Deleted));

        assert!(!Created.can_transition_to(EnRoute));
        assert!(!Cancelled.can_transition_to(Preparing));
        assert!(!EnRoute.can_transition_to(Cancelled));
        assert!(!Deleted.can_transition_to(Created));
    }

    #[test]
    fn status_serializes_screaming_snake() {
        let json = serde_json::to_string(&OrderStatus::DeliveryFailed).unwrap();
        assert_eq!(json, "\"DELIVERY_FAILED\"");
        let parsed: OrderStatus = serde_json::from_str("\"EN_ROUTE\"").unwrap();
        assert_eq!(parsed, OrderStatus::EnRoute);
    }
}
