//! Orders: checkout from the cart, cancellation, history and the admin
//! overrides.
//!
//! Status changes driven by payments and deliveries go through
//! [`advance`], which enforces [`OrderStatus::can_transition_to`].
//! `force_status` is the only path that bypasses the table.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use model::{CartStatus, Delivery, Order, OrderStatus, Payment};
use repository::{
    CartsRepository, DeliveriesRepository, OrdersRepository, PaymentsRepository,
    ProductsRepository, Session, Store,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::access::Caller;
use crate::error::{ServiceError, conflict, invalid, not_found};

/// An order with its payment and delivery, when they exist.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub payment: Option<Payment>,
    pub delivery: Option<Delivery>,
}

#[async_trait]
pub trait OrderService: Send + Sync {
    /// Turns the caller's active cart into a `CREATED` order and empties the
    /// cart, atomically.
    async fn checkout(&self, caller: &Caller) -> Result<Order, ServiceError>;

    /// Cancels one of the caller's own orders while it is still `CREATED`
    /// or `PREPARING`.
    async fn cancel(&self, caller: &Caller, order_id: Uuid) -> Result<Order, ServiceError>;

    /// The caller's orders, newest first.
    async fn history(&self, caller: &Caller) -> Result<Vec<Order>, ServiceError>;
    async fn get(&self, caller: &Caller, order_id: Uuid) -> Result<OrderDetails, ServiceError>;
    async fn list_all(&self, caller: &Caller) -> Result<Vec<Order>, ServiceError>;

    /// Sets any status, ignoring the transition table. Admin only.
    async fn force_status(
        &self,
        caller: &Caller,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<Order, ServiceError>;

    /// Soft delete: marks the order `DELETED`. Admin only.
    async fn delete(&self, caller: &Caller, order_id: Uuid) -> Result<Order, ServiceError>;
}

pub struct OrderServiceImpl<S> {
    store: Arc<S>,
    delivery_fee: Decimal,
}

impl<S: Store> OrderServiceImpl<S> {
    pub fn new(store: Arc<S>, delivery_fee: Decimal) -> Self {
        Self { store, delivery_fee }
    }
}

pub(crate) async fn require_order(
    session: &mut dyn Session,
    id: Uuid,
) -> Result<Order, ServiceError> {
    session
        .get_order(id)
        .await?
        .ok_or_else(|| not_found("order", id))
}

/// Moves `order` to `next` if the transition table allows it.
pub(crate) async fn advance(
    session: &mut dyn Session,
    order: &mut Order,
    next: OrderStatus,
) -> Result<(), ServiceError> {
    if !order.status.can_transition_to(next) {
        return Err(invalid(format!(
            "order {} cannot move from {} to {}",
            order.id, order.status, next
        )));
    }
    session.update_order_status(order.id, next).await?;
    order.status = next;
    order.updated_at = Utc::now();
    Ok(())
}

/// Takes every line's quantity out of stock and moves the order to
/// `PREPARING`.
///
/// Stops at the first line the stock cannot cover; the caller drops the
/// session so nothing from the earlier lines is kept.
pub(crate) async fn prepare_order(
    session: &mut dyn Session,
    order: &mut Order,
) -> Result<(), ServiceError> {
    if !order.status.can_transition_to(OrderStatus::Preparing) {
        return Err(invalid(format!(
            "order {} is {} and cannot be prepared",
            order.id, order.status
        )));
    }
    for line in &order.lines {
        if !session.decrement_stock(line.product_id, line.quantity).await? {
            let product = session
                .get_product(line.product_id)
                .await?
                .ok_or_else(|| not_found("product", line.product_id))?;
            warn!(order_id = %order.id, product_id = %product.id, "Not enough stock to prepare order");
            return Err(ServiceError::InsufficientStock {
                product: product.name,
                available: product.stock,
                requested: line.quantity,
            });
        }
    }
    advance(session, order, OrderStatus::Preparing).await
}

#[async_trait]
impl<S: Store> OrderService for OrderServiceImpl<S> {
    #[instrument(skip(self))]
    async fn checkout(&self, caller: &Caller) -> Result<Order, ServiceError> {
        let mut s = self.store.begin().await?;
        let mut cart = s
            .find_cart_by_status(caller.user_id, CartStatus::Active)
            .await?
            .filter(|c| !c.lines.is_empty())
            .ok_or_else(|| invalid("cart is empty; cannot create an order"))?;

        let order = Order::from_cart_lines(caller.user_id, &cart.lines, self.delivery_fee);
        s.insert_order(&order).await?;

        s.clear_cart_lines(cart.id).await?;
        cart.clear();
        cart.status = CartStatus::Completed;
        s.update_cart(&cart).await?;
        s.commit().await?;

        info!(order_id = %order.id, total = %order.total, "Order created");
        Ok(order)
    }

    #[instrument(skip(self))]
    async fn cancel(&self, caller: &Caller, order_id: Uuid) -> Result<Order, ServiceError> {
        let mut s = self.store.begin().await?;
        let mut order = require_order(s.as_mut(), order_id).await?;
        if order.user_id != caller.user_id {
            return Err(ServiceError::Forbidden("cannot cancel an order you do not own".into()));
        }
        if order.status == OrderStatus::Cancelled {
            return Err(conflict("order is already cancelled"));
        }
        if !order.status.is_cancellable() {
            return Err(invalid(format!(
                "order is {} and can no longer be cancelled",
                order.status
            )));
        }
        advance(s.as_mut(), &mut order, OrderStatus::Cancelled).await?;
        s.commit().await?;

        info!(order_id = %order_id, "Order cancelled");
        Ok(order)
    }

    #[instrument(skip(self))]
    async fn history(&self, caller: &Caller) -> Result<Vec<Order>, ServiceError> {
        let mut s = self.store.begin().await?;
        Ok(s.orders_for_user(caller.user_id).await?)
    }

    #[instrument(skip(self))]
    async fn get(&self, caller: &Caller, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let mut s = self.store.begin().await?;
        let order = require_order(s.as_mut(), order_id).await?;
        caller.require_owner_or_admin(order.user_id)?;
        let payment = s.find_payment_by_order(order_id).await?;
        let delivery = s.find_delivery_by_order(order_id).await?;
        Ok(OrderDetails {
            order,
            payment,
            delivery,
        })
    }

    #[instrument(skip(self))]
    async fn list_all(&self, caller: &Caller) -> Result<Vec<Order>, ServiceError> {
        caller.require_admin()?;
        let mut s = self.store.begin().await?;
        Ok(s.list_orders().await?)
    }

    #[instrument(skip(self))]
    async fn force_status(
        &self,
        caller: &Caller,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<Order, ServiceError> {
        caller.require_admin()?;
        let mut s = self.store.begin().await?;
        let mut order = require_order(s.as_mut(), order_id).await?;
        s.update_order_status(order_id, status).await?;
        s.commit().await?;

        warn!(order_id = %order_id, from = %order.status, to = %status, "Order status forced");
        order.status = status;
        order.updated_at = Utc::now();
        Ok(order)
    }

    #[instrument(skip(self))]
    async fn delete(&self, caller: &Caller, order_id: Uuid) -> Result<Order, ServiceError> {
        caller.require_admin()?;
        let mut s = self.store.begin().await?;
        let mut order = require_order(s.as_mut(), order_id).await?;
        if order.status == OrderStatus::Deleted {
            return Err(conflict("order is already deleted"));
        }
        advance(s.as_mut(), &mut order, OrderStatus::Deleted).await?;
        s.commit().await?;
        Ok(order)
    }
}
