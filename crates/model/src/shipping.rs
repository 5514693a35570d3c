use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[postgres(name = "payment_method")]
pub enum PaymentMethod {
    #[postgres(name = "CASH")]
    Cash,
    #[postgres(name = "CARD")]
    Card,
    #[postgres(name = "PSE")]
    Pse,
    #[postgres(name = "NEQUI")]
    Nequi,
    #[postgres(name = "DAVIPLATA")]
    Daviplata,
}

/// PENDING is the only non-absorbing payment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[postgres(name = "payment_status")]
pub enum PaymentStatus {
    #[postgres(name = "PENDING")]
    Pending,
    #[postgres(name = "CONFIRMED")]
    Confirmed,
    #[postgres(name = "FAILED")]
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Confirmed => "CONFIRMED",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment — информация об оплате заказа. One per order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn pending(order_id: Uuid, amount: Decimal, method: PaymentMethod) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            amount,
            method,
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[postgres(name = "delivery_status")]
pub enum DeliveryStatus {
    #[postgres(name = "SENT")]
    Sent,
    #[postgres(name = "EN_ROUTE")]
    EnRoute,
    #[postgres(name = "DELIVERED")]
    Delivered,
    #[postgres(name = "DELIVERY_FAILED")]
    DeliveryFailed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "SENT",
            DeliveryStatus::EnRoute => "EN_ROUTE",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::DeliveryFailed => "DELIVERY_FAILED",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery — информация о доставке заказа. Address and phone are copied
/// from the customer's profile at dispatch time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Delivery {
    pub id: Uuid,
    pub order_id: Uuid,
    pub delivery_date: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub address: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    pub fn dispatch(order_id: Uuid, address: impl Into<String>, phone: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            delivery_date: now,
            status: DeliveryStatus::Sent,
            address: address.into(),
            phone: phone.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_payment_from_json() {
        let json = r#"
        {
           "id": "5b0a6a8e-2b47-4c1e-9a53-3f4f0e3c2f10",
           "order_id": "9c1d1b4e-7f3a-4d2b-8e6f-0a1b2c3d4e5f",
           "amount": "4047.60",
           "method": "NEQUI",
           "status": "PENDING",
           "created_at": "2025-03-01T10:00:00Z",
           "updated_at": "2025-03-01T10:00:00Z"
        }
        "#;
        let payment: Payment = serde_json::from_str(json).unwrap();
        assert_eq!(payment.method, PaymentMethod::Nequi);
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount, Decimal::new(404760, 2));
    }

    #[test]
    fn dispatch_starts_as_sent() {
        let delivery = Delivery::dispatch(Uuid::new_v4(), "Calle 10 #5-20", "+573000000000");
        assert_eq!(delivery.status, DeliveryStatus::Sent);
        assert_eq!(delivery.address, "Calle 10 #5-20");
    }
}
