//! Shopping cart.
//!
//! Every customer has at most one `ACTIVE` cart. It is created on first
//! access and replaced by a fresh one after checkout.

use std::sync::Arc;

use async_trait::async_trait;
use model::{Cart, CartLine, CartStatus, Product};
use repository::{CartsRepository, ProductsRepository, Session, Store, UsersRepository};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::access::Caller;
use crate::error::{ServiceError, conflict, invalid, not_found};

#[async_trait]
pub trait CartService: Send + Sync {
    /// Returns the caller's active cart, creating an empty one if needed.
    async fn get_active_cart(&self, caller: &Caller) -> Result<Cart, ServiceError>;

    /// Adds `quantity` units of a product. Adding a product already in the
    /// cart increases that line's quantity.
    async fn add_line(
        &self,
        caller: &Caller,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<Cart, ServiceError>;
    async fn update_line_quantity(
        &self,
        caller: &Caller,
        line_id: Uuid,
        quantity: i32,
    ) -> Result<Cart, ServiceError>;
    async fn remove_line(&self, caller: &Caller, line_id: Uuid) -> Result<Cart, ServiceError>;
    /// Removes every line from the active cart.
    async fn clear(&self, caller: &Caller) -> Result<Cart, ServiceError>;

    async fn list_all(&self, caller: &Caller) -> Result<Vec<Cart>, ServiceError>;
    async fn get(&self, caller: &Caller, cart_id: Uuid) -> Result<Cart, ServiceError>;
}

pub struct CartServiceImpl<S> {
    store: Arc<S>,
}

impl<S: Store> CartServiceImpl<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

/// Finds the user's active cart or opens a new one.
pub(crate) async fn active_cart(
    session: &mut dyn Session,
    user_id: Uuid,
) -> Result<Cart, ServiceError> {
    if let Some(cart) = session.find_cart_by_status(user_id, CartStatus::Active).await? {
        return Ok(cart);
    }
    let user = session
        .get_user(user_id)
        .await?
        .ok_or_else(|| not_found("user", user_id))?;
    if !user.active {
        return Err(conflict("profile is deactivated"));
    }
    let cart = Cart::new(user.id);
    session.insert_cart(&cart).await?;
    debug!(cart_id = %cart.id, "Opened a new cart");
    Ok(cart)
}

async fn existing_active_cart(
    session: &mut dyn Session,
    user_id: Uuid,
) -> Result<Cart, ServiceError> {
    session
        .find_cart_by_status(user_id, CartStatus::Active)
        .await?
        .ok_or_else(|| ServiceError::NotFound("active cart".into()))
}

fn positive(quantity: i32) -> Result<i32, ServiceError> {
    if quantity < 1 {
        return Err(ServiceError::Validation("quantity must be at least 1".into()));
    }
    Ok(quantity)
}

fn ensure_supply(product: &Product, requested: i32) -> Result<(), ServiceError> {
    if requested > product.stock {
        return Err(ServiceError::InsufficientStock {
            product: product.name.clone(),
            available: product.stock,
            requested,
        });
    }
    Ok(())
}

async fn require_product(session: &mut dyn Session, id: Uuid) -> Result<Product, ServiceError> {
    session
        .get_product(id)
        .await?
        .ok_or_else(|| not_found("product", id))
}

#[async_trait]
impl<S: Store> CartService for CartServiceImpl<S> {
    #[instrument(skip(self))]
    async fn get_active_cart(&self, caller: &Caller) -> Result<Cart, ServiceError> {
        let mut s = self.store.begin().await?;
        let cart = active_cart(s.as_mut(), caller.user_id).await?;
        s.commit().await?;
        Ok(cart)
    }

    #[instrument(skip(self))]
    async fn add_line(
        &self,
        caller: &Caller,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<Cart, ServiceError> {
        let quantity = positive(quantity)?;
        let mut s = self.store.begin().await?;
        let mut cart = active_cart(s.as_mut(), caller.user_id).await?;
        let product = require_product(s.as_mut(), product_id).await?;
        if !product.active {
            return Err(invalid(format!("product {} is not available", product.name)));
        }

        match cart.lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => {
                let total = line.quantity.checked_add(quantity).ok_or_else(|| {
                    ServiceError::InsufficientStock {
                        product: product.name.clone(),
                        available: product.stock,
                        requested: i32::MAX,
                    }
                })?;
                ensure_supply(&product, total)?;
                line.set_quantity(total);
                s.update_cart_line(line).await?;
            }
            None => {
                ensure_supply(&product, quantity)?;
                let line = CartLine::new(cart.id, product.id, quantity, product.price);
                s.insert_cart_line(&line).await?;
                cart.lines.push(line);
            }
        }
        cart.recompute_subtotal();
        s.update_cart(&cart).await?;
        s.commit().await?;
        Ok(cart)
    }

    #[instrument(skip(self))]
    async fn update_line_quantity(
        &self,
        caller: &Caller,
        line_id: Uuid,
        quantity: i32,
    ) -> Result<Cart, ServiceError> {
        let quantity = positive(quantity)?;
        let mut s = self.store.begin().await?;
        let mut cart = existing_active_cart(s.as_mut(), caller.user_id).await?;
        let product_id = cart
            .line(line_id)
            .map(|l| l.product_id)
            .ok_or_else(|| not_found("cart line", line_id))?;
        let product = require_product(s.as_mut(), product_id).await?;
        ensure_supply(&product, quantity)?;

        if let Some(line) = cart.lines.iter_mut().find(|l| l.id == line_id) {
            line.set_quantity(quantity);
            s.update_cart_line(line).await?;
        }
        cart.recompute_subtotal();
        s.update_cart(&cart).await?;
        s.commit().await?;
        Ok(cart)
    }

    #[instrument(skip(self))]
    async fn remove_line(&self, caller: &Caller, line_id: Uuid) -> Result<Cart, ServiceError> {
        let mut s = self.store.begin().await?;
        let mut cart = existing_active_cart(s.as_mut(), caller.user_id).await?;
        if cart.line(line_id).is_none() {
            return Err(not_found("cart line", line_id));
        }
        s.delete_cart_line(line_id).await?;
        cart.lines.retain(|l| l.id != line_id);
        cart.recompute_subtotal();
        s.update_cart(&cart).await?;
        s.commit().await?;
        Ok(cart)
    }

    #[instrument(skip(self))]
    async fn clear(&self, caller: &Caller) -> Result<Cart, ServiceError> {
        let mut s = self.store.begin().await?;
        let mut cart = existing_active_cart(s.as_mut(), caller.user_id).await?;
        s.clear_cart_lines(cart.id).await?;
        cart.clear();
        s.update_cart(&cart).await?;
        s.commit().await?;
        Ok(cart)
    }

    #[instrument(skip(self))]
    async fn list_all(&self, caller: &Caller) -> Result<Vec<Cart>, ServiceError> {
        caller.require_admin()?;
        let mut s = self.store.begin().await?;
        Ok(s.list_carts().await?)
    }

    #[instrument(skip(self))]
    async fn get(&self, caller: &Caller, cart_id: Uuid) -> Result<Cart, ServiceError> {
        let mut s = self.store.begin().await?;
        let cart = s
            .get_cart(cart_id)
            .await?
            .ok_or_else(|| not_found("cart", cart_id))?;
        caller.require_owner_or_admin(cart.user_id)?;
        Ok(cart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{admin, seed_customer, seed_product};
    use memstore::MemoryStore;
    use rust_decimal::Decimal;

    fn subtotal_matches_lines(cart: &Cart) -> bool {
        let sum: Decimal = cart
            .lines
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum();
        cart.subtotal == sum
    }

    #[tokio::test]
    async fn test_cart_is_created_lazily_once() {
        let store = Arc::new(MemoryStore::new());
        let svc = CartServiceImpl::new(store.clone());
        let caller = seed_customer(&store, None).await;

        let first = svc.get_active_cart(&caller).await.unwrap();
        let second = svc.get_active_cart(&caller).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.status, CartStatus::Active);
        assert_eq!(svc.list_all(&admin()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_subtotal_follows_every_mutation() {
        let store = Arc::new(MemoryStore::new());
        let svc = CartServiceImpl::new(store.clone());
        let caller = seed_customer(&store, None).await;
        let bread = seed_product(&store, "Pan", Decimal::from(10), 5).await;
        let cake = seed_product(&store, "Torta", Decimal::from(20), 5).await;

        svc.add_line(&caller, bread.id, 1).await.unwrap();
        let cart = svc.add_line(&caller, bread.id, 1).await.unwrap();
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.lines[0].quantity, 2);

        let cart = svc.add_line(&caller, cake.id, 1).await.unwrap();
        assert_eq!(cart.subtotal, Decimal::from(40));
        assert!(subtotal_matches_lines(&cart));

        let cake_line = cart.line_for_product(cake.id).unwrap().id;
        let cart = svc.update_line_quantity(&caller, cake_line, 3).await.unwrap();
        assert_eq!(cart.subtotal, Decimal::from(80));
        assert!(subtotal_matches_lines(&cart));

        let cart = svc.remove_line(&caller, cake_line).await.unwrap();
        assert_eq!(cart.subtotal, Decimal::from(20));
        assert!(subtotal_matches_lines(&cart));

        let cart = svc.clear(&caller).await.unwrap();
        assert!(cart.lines.is_empty());
        assert_eq!(cart.subtotal, Decimal::ZERO);

        let stored = svc.get_active_cart(&caller).await.unwrap();
        assert_eq!(stored, cart);
    }

    #[tokio::test]
    async fn test_quantity_bounded_by_stock() {
        let store = Arc::new(MemoryStore::new());
        let svc = CartServiceImpl::new(store.clone());
        let caller = seed_customer(&store, None).await;
        let bread = seed_product(&store, "Pan", Decimal::from(10), 2).await;

        assert!(matches!(
            svc.add_line(&caller, bread.id, 0).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            svc.add_line(&caller, bread.id, 3).await,
            Err(ServiceError::InsufficientStock { available: 2, requested: 3, .. })
        ));

        svc.add_line(&caller, bread.id, 2).await.unwrap();
        assert!(matches!(
            svc.add_line(&caller, bread.id, 1).await,
            Err(ServiceError::InsufficientStock { requested: 3, .. })
        ));
        assert!(matches!(
            svc.add_line(&caller, Uuid::new_v4(), 1).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_repeated_add_cannot_overflow_quantity() {
        let store = Arc::new(MemoryStore::new());
        let svc = CartServiceImpl::new(store.clone());
        let caller = seed_customer(&store, None).await;
        let bread = seed_product(&store, "Pan", Decimal::from(10), 5).await;

        svc.add_line(&caller, bread.id, 1).await.unwrap();
        assert!(matches!(
            svc.add_line(&caller, bread.id, i32::MAX).await,
            Err(ServiceError::InsufficientStock { available: 5, .. })
        ));

        let cart = svc.get_active_cart(&caller).await.unwrap();
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.lines[0].quantity, 1);
        assert_eq!(cart.subtotal, Decimal::from(10));
    }

    #[tokio::test]
    async fn test_update_quantity_bounded_by_stock() {
        let store = Arc::new(MemoryStore::new());
        let svc = CartServiceImpl::new(store.clone());
        let caller = seed_customer(&store, None).await;
        let other = seed_customer(&store, None).await;
        let bread = seed_product(&store, "Pan", Decimal::from(10), 3).await;

        let cart = svc.add_line(&caller, bread.id, 2).await.unwrap();
        let line_id = cart.lines[0].id;
        svc.add_line(&other, bread.id, 1).await.unwrap();

        let unchanged = |cart: &Cart| {
            assert_eq!(cart.lines.len(), 1);
            assert_eq!(cart.lines[0].quantity, 2);
            assert_eq!(cart.subtotal, Decimal::from(20));
        };

        assert!(matches!(
            svc.update_line_quantity(&caller, line_id, 4).await,
            Err(ServiceError::InsufficientStock { available: 3, requested: 4, .. })
        ));
        unchanged(&svc.get_active_cart(&caller).await.unwrap());

        assert!(matches!(
            svc.update_line_quantity(&caller, line_id, 0).await,
            Err(ServiceError::Validation(_))
        ));
        unchanged(&svc.get_active_cart(&caller).await.unwrap());

        assert!(matches!(
            svc.update_line_quantity(&other, line_id, 1).await,
            Err(ServiceError::NotFound(_))
        ));
        unchanged(&svc.get_active_cart(&caller).await.unwrap());

        let cart = svc.update_line_quantity(&caller, line_id, 3).await.unwrap();
        assert_eq!(cart.lines[0].quantity, 3);
        assert_eq!(cart.subtotal, Decimal::from(30));
    }

    #[tokio::test]
    async fn test_foreign_cart_is_forbidden() {
        let store = Arc::new(MemoryStore::new());
        let svc = CartServiceImpl::new(store.clone());
        let ana = seed_customer(&store, None).await;
        let bob = seed_customer(&store, None).await;

        let cart = svc.get_active_cart(&ana).await.unwrap();
        assert!(matches!(
            svc.get(&bob, cart.id).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert_eq!(svc.get(&admin(), cart.id).await.unwrap().id, cart.id);
        assert!(matches!(
            svc.remove_line(&bob, Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
