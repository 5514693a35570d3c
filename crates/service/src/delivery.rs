//! Delivery dispatch and tracking.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use model::{Delivery, DeliveryStatus, OrderStatus, PaymentStatus};
use repository::{DeliveriesRepository, OrdersRepository, PaymentsRepository, Store, UsersRepository};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::access::Caller;
use crate::error::{ServiceError, invalid, not_found};
use crate::order::{advance, require_order};

#[async_trait]
pub trait DeliveryService: Send + Sync {
    /// Dispatches a paid order to the customer's address and moves the order
    /// `EN_ROUTE`. Admin only.
    async fn register(&self, caller: &Caller, order_id: Uuid) -> Result<Delivery, ServiceError>;

    /// Updates the delivery status. `DELIVERED` completes the order and
    /// `DELIVERY_FAILED` marks it failed; re-sending a status re-applies it
    /// to the order. Admin only.
    async fn update_status(
        &self,
        caller: &Caller,
        delivery_id: Uuid,
        status: DeliveryStatus,
    ) -> Result<Delivery, ServiceError>;

    async fn get(&self, caller: &Caller, delivery_id: Uuid) -> Result<Delivery, ServiceError>;
    async fn list_all(&self, caller: &Caller) -> Result<Vec<Delivery>, ServiceError>;
}

pub struct DeliveryServiceImpl<S> {
    store: Arc<S>,
}

impl<S: Store> DeliveryServiceImpl<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

/// Order status a delivery status carries over to, if any.
fn order_status_for(status: DeliveryStatus) -> Option<OrderStatus> {
    match status {
        DeliveryStatus::Delivered => Some(OrderStatus::Completed),
        DeliveryStatus::DeliveryFailed => Some(OrderStatus::DeliveryFailed),
        DeliveryStatus::Sent | DeliveryStatus::EnRoute => None,
    }
}

#[async_trait]
impl<S: Store> DeliveryService for DeliveryServiceImpl<S> {
    #[instrument(skip(self))]
    async fn register(&self, caller: &Caller, order_id: Uuid) -> Result<Delivery, ServiceError> {
        caller.require_admin()?;
        let mut s = self.store.begin().await?;
        let mut order = require_order(s.as_mut(), order_id).await?;
        let user = s
            .get_user(order.user_id)
            .await?
            .ok_or_else(|| invalid("order has no customer associated"))?;

        let payment = s
            .find_payment_by_order(order_id)
            .await?
            .ok_or_else(|| invalid("cannot dispatch: the order has no payment associated"))?;
        if payment.status != PaymentStatus::Confirmed {
            return Err(invalid("cannot dispatch: the order's payment is not confirmed"));
        }
        if s.find_delivery_by_order(order_id).await?.is_some() {
            return Err(invalid("the order already has a delivery"));
        }
        let Some(address) = user.address.filter(|a| !a.trim().is_empty()) else {
            return Err(invalid("the customer has no address registered"));
        };

        let delivery = Delivery::dispatch(order.id, address, user.phone);
        s.insert_delivery(&delivery).await?;
        advance(s.as_mut(), &mut order, OrderStatus::EnRoute).await?;
        s.commit().await?;

        info!(delivery_id = %delivery.id, order_id = %order_id, "Delivery dispatched");
        Ok(delivery)
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        caller: &Caller,
        delivery_id: Uuid,
        status: DeliveryStatus,
    ) -> Result<Delivery, ServiceError> {
        caller.require_admin()?;
        let mut s = self.store.begin().await?;
        let mut delivery = s
            .get_delivery(delivery_id)
            .await?
            .ok_or_else(|| not_found("delivery", delivery_id))?;
        delivery.status = status;
        delivery.updated_at = Utc::now();
        s.update_delivery(&delivery).await?;

        if let Some(next) = order_status_for(status) {
            let order = require_order(s.as_mut(), delivery.order_id).await?;
            if !order.status.can_transition_to(next) {
                debug!(order_id = %order.id, from = %order.status, to = %next, "Order status mirrored outside the transition table");
            }
            s.update_order_status(order.id, next).await?;
        }
        s.commit().await?;

        info!(delivery_id = %delivery_id, status = %status, "Delivery status updated");
        Ok(delivery)
    }

    #[instrument(skip(self))]
    async fn get(&self, caller: &Caller, delivery_id: Uuid) -> Result<Delivery, ServiceError> {
        let mut s = self.store.begin().await?;
        let delivery = s
            .get_delivery(delivery_id)
            .await?
            .ok_or_else(|| not_found("delivery", delivery_id))?;
        if !caller.is_admin() {
            let order = require_order(s.as_mut(), delivery.order_id).await?;
            caller.require_owner_or_admin(order.user_id)?;
        }
        Ok(delivery)
    }

    #[instrument(skip(self))]
    async fn list_all(&self, caller: &Caller) -> Result<Vec<Delivery>, ServiceError> {
        caller.require_admin()?;
        let mut s = self.store.begin().await?;
        Ok(s.list_deliveries().await?)
    }
}
