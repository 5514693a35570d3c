use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[postgres(name = "cart_status")]
pub enum CartStatus {
    #[postgres(name = "ACTIVE")]
    Active,
    #[postgres(name = "INACTIVE")]
    Inactive,
    #[postgres(name = "COMPLETED")]
    Completed,
}

/// CartLine: one product/quantity pair with the unit price frozen at add-time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartLine {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

impl CartLine {
    pub fn new(cart_id: Uuid, product_id: Uuid, quantity: i32, unit_price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            cart_id,
            product_id,
            quantity,
            unit_price,
            subtotal: unit_price * Decimal::from(quantity),
        }
    }

    /// Changes the quantity and keeps `subtotal == quantity * unit_price`.
    pub fn set_quantity(&mut self, quantity: i32) {
        self.quantity = quantity;
        self.subtotal = self.unit_price * Decimal::from(quantity);
    }
}

/// Cart: the user's basket. At most one cart per user is `Active`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subtotal: Decimal,
    pub status: CartStatus,
    pub lines: Vec<CartLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            subtotal: Decimal::ZERO,
            status: CartStatus::Active,
            lines: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn line(&self, line_id: Uuid) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.id == line_id)
    }

    pub fn line_for_product(&self, product_id: Uuid) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    /// Recomputes the subtotal from the current lines. Must run after every
    /// line mutation.
    pub fn recompute_subtotal(&mut self) {
        self.subtotal = self.lines.iter().map(|l| l.subtotal).sum();
        self.updated_at = Utc::now();
    }

    /// Removes every line and zeroes the subtotal so the cart can be reused.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.recompute_subtotal();
    }
}
