use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category — группа товаров каталога.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

impl Category {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Product: a sellable catalog item.
///
/// `active == false` is the soft-deleted state: such products are hidden from
/// the public catalog and cannot be added to carts, but existing order lines
/// keep referencing them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    pub id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub stock: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(
        category_id: Uuid,
        name: impl Into<String>,
        description: impl Into<String>,
        price: Decimal,
        stock: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            category_id,
            name: name.into(),
            description: description.into(),
            price,
            stock,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when the product is listed and has at least `quantity` units.
    pub fn can_supply(&self, quantity: i32) -> bool {
        self.active && quantity <= self.stock
    }
}
