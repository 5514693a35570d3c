//! Payments. One per order; confirmation is what releases the order for
//! preparation and takes its quantities out of stock.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use model::{OrderStatus, Payment, PaymentMethod, PaymentStatus};
use repository::{PaymentsRepository, Session, Store};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::access::Caller;
use crate::error::{ServiceError, conflict, invalid, not_found};
use crate::order::{prepare_order, require_order};

#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Registers a `PENDING` payment for one of the caller's orders, for the
    /// order's total.
    async fn register(
        &self,
        caller: &Caller,
        order_id: Uuid,
        method: PaymentMethod,
    ) -> Result<Payment, ServiceError>;

    /// Confirms the order's payment, decrements stock for every order line
    /// and moves the order to `PREPARING`, all or nothing. Admin only.
    async fn confirm(&self, caller: &Caller, order_id: Uuid) -> Result<Payment, ServiceError>;

    /// Manual status change. Confirmed payments cannot be changed here, and
    /// a change to `CONFIRMED` runs the full confirmation. Admin only.
    async fn update_status(
        &self,
        caller: &Caller,
        order_id: Uuid,
        status: PaymentStatus,
    ) -> Result<Payment, ServiceError>;

    /// Marks a pending payment `FAILED`. Admin only.
    async fn mark_failed(&self, caller: &Caller, order_id: Uuid) -> Result<Payment, ServiceError>;

    async fn get(&self, caller: &Caller, payment_id: Uuid) -> Result<Payment, ServiceError>;
    async fn for_order(&self, caller: &Caller, order_id: Uuid) -> Result<Payment, ServiceError>;
    async fn list_all(&self, caller: &Caller) -> Result<Vec<Payment>, ServiceError>;
}

pub struct PaymentServiceImpl<S> {
    store: Arc<S>,
}

impl<S: Store> PaymentServiceImpl<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

/// Looks the payment up by order and locks it for the session.
async fn payment_of(session: &mut dyn Session, order_id: Uuid) -> Result<Payment, ServiceError> {
    session
        .find_payment_by_order(order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("payment for order {order_id}")))
}

async fn confirm_locked(session: &mut dyn Session, mut payment: Payment) -> Result<Payment, ServiceError> {
    let mut order = require_order(session, payment.order_id).await?;
    prepare_order(session, &mut order).await?;

    payment.status = PaymentStatus::Confirmed;
    payment.updated_at = Utc::now();
    session.update_payment(&payment).await?;
    Ok(payment)
}

#[async_trait]
impl<S: Store> PaymentService for PaymentServiceImpl<S> {
    #[instrument(skip(self))]
    async fn register(
        &self,
        caller: &Caller,
        order_id: Uuid,
        method: PaymentMethod,
    ) -> Result<Payment, ServiceError> {
        let mut s = self.store.begin().await?;
        let order = require_order(s.as_mut(), order_id).await?;
        if order.user_id != caller.user_id {
            return Err(ServiceError::Forbidden("cannot pay for an order you do not own".into()));
        }
        if matches!(order.status, OrderStatus::Cancelled | OrderStatus::Deleted) {
            return Err(invalid(format!("order is {} and cannot be paid", order.status)));
        }
        if s.find_payment_by_order(order_id).await?.is_some() {
            return Err(conflict("payment already exists for this order"));
        }

        let payment = Payment::pending(order.id, order.total, method);
        s.insert_payment(&payment).await?;
        s.commit().await?;

        info!(payment_id = %payment.id, order_id = %order_id, "Payment registered");
        Ok(payment)
    }

    #[instrument(skip(self))]
    async fn confirm(&self, caller: &Caller, order_id: Uuid) -> Result<Payment, ServiceError> {
        caller.require_admin()?;
        let mut s = self.store.begin().await?;
        let payment = payment_of(s.as_mut(), order_id).await?;
        match payment.status {
            PaymentStatus::Confirmed => return Err(conflict("payment is already confirmed")),
            PaymentStatus::Failed => return Err(invalid("payment has failed and cannot be confirmed")),
            PaymentStatus::Pending => {}
        }
        let payment = confirm_locked(s.as_mut(), payment).await?;
        s.commit().await?;

        info!(payment_id = %payment.id, order_id = %order_id, "Payment confirmed");
        Ok(payment)
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        caller: &Caller,
        order_id: Uuid,
        status: PaymentStatus,
    ) -> Result<Payment, ServiceError> {
        caller.require_admin()?;
        let mut s = self.store.begin().await?;
        let mut payment = payment_of(s.as_mut(), order_id).await?;
        if payment.status == status {
            return Err(conflict(format!("payment is already {status}")));
        }
        if payment.status == PaymentStatus::Confirmed {
            return Err(conflict("a confirmed payment cannot change status"));
        }

        let payment = if status == PaymentStatus::Confirmed {
            confirm_locked(s.as_mut(), payment).await?
        } else {
            payment.status = status;
            payment.updated_at = Utc::now();
            s.update_payment(&payment).await?;
            payment
        };
        s.commit().await?;

        info!(payment_id = %payment.id, status = %status, "Payment status updated");
        Ok(payment)
    }

    #[instrument(skip(self))]
    async fn mark_failed(&self, caller: &Caller, order_id: Uuid) -> Result<Payment, ServiceError> {
        caller.require_admin()?;
        let mut s = self.store.begin().await?;
        let mut payment = payment_of(s.as_mut(), order_id).await?;
        match payment.status {
            PaymentStatus::Failed => return Err(conflict("payment is already marked as failed")),
            PaymentStatus::Confirmed => return Err(conflict("a confirmed payment cannot fail")),
            PaymentStatus::Pending => {}
        }
        payment.status = PaymentStatus::Failed;
        payment.updated_at = Utc::now();
        s.update_payment(&payment).await?;
        s.commit().await?;
        Ok(payment)
    }

    #[instrument(skip(self))]
    async fn get(&self, caller: &Caller, payment_id: Uuid) -> Result<Payment, ServiceError> {
        let mut s = self.store.begin().await?;
        let payment = s
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| not_found("payment", payment_id))?;
        if !caller.is_admin() {
            let order = require_order(s.as_mut(), payment.order_id).await?;
            caller.require_owner_or_admin(order.user_id)?;
        }
        Ok(payment)
    }

    #[instrument(skip(self))]
    async fn for_order(&self, caller: &Caller, order_id: Uuid) -> Result<Payment, ServiceError> {
        let mut s = self.store.begin().await?;
        let order = require_order(s.as_mut(), order_id).await?;
        caller.require_owner_or_admin(order.user_id)?;
        payment_of(s.as_mut(), order_id).await
    }

    #[instrument(skip(self))]
    async fn list_all(&self, caller: &Caller) -> Result<Vec<Payment>, ServiceError> {
        caller.require_admin()?;
        let mut s = self.store.begin().await?;
        Ok(s.list_payments().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{CartService, CartServiceImpl};
    use crate::order::{OrderService, OrderServiceImpl};
    use crate::testing::{admin, seed_customer, seed_product, stock_of};
    use memstore::MemoryStore;
    use model::{DEFAULT_DELIVERY_FEE, Order};
    use repository::ProductsRepository;
    use rust_decimal::Decimal;

    struct Fixture {
        store: Arc<MemoryStore>,
        carts: CartServiceImpl<MemoryStore>,
        orders: OrderServiceImpl<MemoryStore>,
        payments: PaymentServiceImpl<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        Fixture {
            carts: CartServiceImpl::new(store.clone()),
            orders: OrderServiceImpl::new(store.clone(), DEFAULT_DELIVERY_FEE),
            payments: PaymentServiceImpl::new(store.clone()),
            store,
        }
    }

    async fn place_order(f: &Fixture, caller: &Caller, lines: &[(Uuid, i32)]) -> Order {
        for (product_id, qty) in lines {
            f.carts.add_line(caller, *product_id, *qty).await.unwrap();
        }
        f.orders.checkout(caller).await.unwrap()
    }

    #[tokio::test]
    async fn test_confirm_decrements_stock_once() {
        let f = fixture();
        let caller = seed_customer(&f.store, None).await;
        let bread = seed_product(&f.store, "Pan", Decimal::from(10), 5).await;
        let order = place_order(&f, &caller, &[(bread.id, 2)]).await;

        let payment = f
            .payments
            .register(&caller, order.id, PaymentMethod::Nequi)
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount, order.total);

        assert!(matches!(
            f.payments.confirm(&caller, order.id).await,
            Err(ServiceError::Forbidden(_))
        ));
        let confirmed = f.payments.confirm(&admin(), order.id).await.unwrap();
        assert_eq!(confirmed.status, PaymentStatus::Confirmed);
        assert_eq!(stock_of(&f.store, bread.id).await, 3);
        assert_eq!(
            f.orders.get(&caller, order.id).await.unwrap().order.status,
            OrderStatus::Preparing
        );

        // Re-confirming is a conflict and leaves stock alone.
        assert!(matches!(
            f.payments.confirm(&admin(), order.id).await,
            Err(ServiceError::Conflict(_))
        ));
        assert_eq!(stock_of(&f.store, bread.id).await, 3);
    }

    // Scenario C
    #[tokio::test]
    async fn test_insufficient_stock_rolls_everything_back() {
        let f = fixture();
        let caller = seed_customer(&f.store, None).await;
        let plenty = seed_product(&f.store, "Pan", Decimal::from(10), 10).await;
        let scarce = seed_product(&f.store, "Torta", Decimal::from(20), 2).await;
        let order = place_order(&f, &caller, &[(plenty.id, 3), (scarce.id, 2)]).await;
        f.payments
            .register(&caller, order.id, PaymentMethod::Cash)
            .await
            .unwrap();

        // Stock drops below the ordered quantity after checkout.
        let mut s = f.store.begin().await.unwrap();
        assert!(s.decrement_stock(scarce.id, 1).await.unwrap());
        s.commit().await.unwrap();
        drop(s);

        let err = f.payments.confirm(&admin(), order.id).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InsufficientStock { available: 1, requested: 2, ref product } if product == "Torta"
        ));
        assert_eq!(stock_of(&f.store, plenty.id).await, 10);
        assert_eq!(stock_of(&f.store, scarce.id).await, 1);
        assert_eq!(
            f.payments.for_order(&caller, order.id).await.unwrap().status,
            PaymentStatus::Pending
        );
        assert_eq!(
            f.orders.get(&caller, order.id).await.unwrap().order.status,
            OrderStatus::Created
        );
    }

    // Scenario F
    #[tokio::test]
    async fn test_second_payment_is_a_conflict() {
        let f = fixture();
        let caller = seed_customer(&f.store, None).await;
        let other = seed_customer(&f.store, None).await;
        let bread = seed_product(&f.store, "Pan", Decimal::from(10), 5).await;
        let order = place_order(&f, &caller, &[(bread.id, 1)]).await;

        assert!(matches!(
            f.payments.register(&other, order.id, PaymentMethod::Card).await,
            Err(ServiceError::Forbidden(_))
        ));
        f.payments
            .register(&caller, order.id, PaymentMethod::Card)
            .await
            .unwrap();
        assert!(matches!(
            f.payments.register(&caller, order.id, PaymentMethod::Pse).await,
            Err(ServiceError::Conflict(_))
        ));
        assert_eq!(f.payments.list_all(&admin()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_order_cannot_be_paid() {
        let f = fixture();
        let caller = seed_customer(&f.store, None).await;
        let bread = seed_product(&f.store, "Pan", Decimal::from(10), 5).await;
        let order = place_order(&f, &caller, &[(bread.id, 1)]).await;
        f.orders.cancel(&caller, order.id).await.unwrap();

        assert!(matches!(
            f.payments.register(&caller, order.id, PaymentMethod::Cash).await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_manual_status_updates() {
        let f = fixture();
        let caller = seed_customer(&f.store, None).await;
        let bread = seed_product(&f.store, "Pan", Decimal::from(10), 5).await;
        let order = place_order(&f, &caller, &[(bread.id, 2)]).await;
        f.payments
            .register(&caller, order.id, PaymentMethod::Daviplata)
            .await
            .unwrap();
        let admin = admin();

        assert!(matches!(
            f.payments.update_status(&admin, order.id, PaymentStatus::Pending).await,
            Err(ServiceError::Conflict(_))
        ));

        let failed = f.payments.mark_failed(&admin, order.id).await.unwrap();
        assert_eq!(failed.status, PaymentStatus::Failed);
        assert!(matches!(
            f.payments.mark_failed(&admin, order.id).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            f.payments.confirm(&admin, order.id).await,
            Err(ServiceError::InvalidState(_))
        ));

        // Confirming through the manual path still takes stock.
        let confirmed = f
            .payments
            .update_status(&admin, order.id, PaymentStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(confirmed.status, PaymentStatus::Confirmed);
        assert_eq!(stock_of(&f.store, bread.id).await, 3);

        assert!(matches!(
            f.payments.update_status(&admin, order.id, PaymentStatus::Failed).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            f.payments.mark_failed(&admin, order.id).await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_payment_visibility() {
        let f = fixture();
        let caller = seed_customer(&f.store, None).await;
        let other = seed_customer(&f.store, None).await;
        let bread = seed_product(&f.store, "Pan", Decimal::from(10), 5).await;
        let order = place_order(&f, &caller, &[(bread.id, 1)]).await;
        let payment = f
            .payments
            .register(&caller, order.id, PaymentMethod::Cash)
            .await
            .unwrap();

        assert_eq!(f.payments.get(&caller, payment.id).await.unwrap(), payment);
        assert!(matches!(
            f.payments.get(&other, payment.id).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            f.payments.for_order(&other, order.id).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            f.payments.get(&admin(), Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
