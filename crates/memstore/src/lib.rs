//! In-memory store with the same transactional contract as the Postgres one.
//!
//! Sessions are serialized: [`MemoryStore::begin`] takes the table lock and
//! hands the session a working copy. `commit` writes the copy back; dropping
//! the session releases the lock and the copy with it. Uniqueness and
//! reference constraints of the SQL schema are checked here as well, so
//! service code sees the same [`RepositoryError::Conflict`]s on both backends.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use model::{
    Cart, CartLine, CartStatus, Category, Credential, Delivery, Order, OrderStatus, Payment,
    Product, User,
};
use repository::{
    CartsRepository, CategoriesRepository, CredentialsRepository, DeliveriesRepository,
    OrdersRepository, PaymentsRepository, ProductsRepository, RepositoryError, Session, Store,
    UsersRepository,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default, Clone)]
struct Tables {
    categories: HashMap<Uuid, Category>,
    products: HashMap<Uuid, Product>,
    credentials: HashMap<Uuid, Credential>,
    users: HashMap<Uuid, User>,
    carts: HashMap<Uuid, Cart>,
    orders: HashMap<Uuid, Order>,
    payments: HashMap<Uuid, Payment>,
    deliveries: HashMap<Uuid, Delivery>,
}

/// Thread-safe in-memory store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Session>, RepositoryError> {
        let guard = self.tables.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemorySession {
            guard: Some(guard),
            work,
        }))
    }
}

/// Working copy of the tables, owned by one session.
pub struct MemorySession {
    guard: Option<OwnedMutexGuard<Tables>>,
    work: Tables,
}

impl MemorySession {
    fn tables(&mut self) -> Result<&mut Tables, RepositoryError> {
        if self.guard.is_none() {
            return Err(RepositoryError::Closed);
        }
        Ok(&mut self.work)
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn commit(&mut self) -> Result<(), RepositoryError> {
        let mut guard = self.guard.take().ok_or(RepositoryError::Closed)?;
        *guard = std::mem::take(&mut self.work);
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if self.guard.is_some() {
            debug!("Session rolled back");
        }
    }
}

fn exists(what: &str) -> RepositoryError {
    RepositoryError::Conflict(format!("{what} already exists"))
}

fn related(what: &str) -> RepositoryError {
    RepositoryError::Conflict(format!("{what} conflicts with related records"))
}

fn newest_first<T>(mut rows: Vec<T>, created: impl Fn(&T) -> chrono::DateTime<Utc>) -> Vec<T> {
    rows.sort_by_key(|r| std::cmp::Reverse(created(r)));
    rows
}

#[async_trait]
impl CategoriesRepository for MemorySession {
    async fn list_categories(&mut self) -> Result<Vec<Category>, RepositoryError> {
        let mut rows: Vec<Category> = self.tables()?.categories.values().cloned().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn get_category(&mut self, id: Uuid) -> Result<Option<Category>, RepositoryError> {
        Ok(self.tables()?.categories.get(&id).cloned())
    }

    async fn insert_category(&mut self, category: &Category) -> Result<(), RepositoryError> {
        let t = self.tables()?;
        if t.categories.contains_key(&category.id)
            || t.categories.values().any(|c| c.name == category.name)
        {
            return Err(exists("category"));
        }
        t.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn update_category(&mut self, category: &Category) -> Result<(), RepositoryError> {
        let t = self.tables()?;
        if t.categories
            .values()
            .any(|c| c.id != category.id && c.name == category.name)
        {
            return Err(exists("category"));
        }
        let row = t.categories.get_mut(&category.id).ok_or(RepositoryError::NotFound)?;
        *row = category.clone();
        Ok(())
    }

    async fn delete_category(&mut self, id: Uuid) -> Result<bool, RepositoryError> {
        let t = self.tables()?;
        if t.products.values().any(|p| p.category_id == id) {
            return Err(related("category"));
        }
        Ok(t.categories.remove(&id).is_some())
    }
}

#[async_trait]
impl ProductsRepository for MemorySession {
    async fn list_products(&mut self, include_inactive: bool) -> Result<Vec<Product>, RepositoryError> {
        let mut rows: Vec<Product> = self
            .tables()?
            .products
            .values()
            .filter(|p| p.active || include_inactive)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn get_product(&mut self, id: Uuid) -> Result<Option<Product>, RepositoryError> {
        Ok(self.tables()?.products.get(&id).cloned())
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), RepositoryError> {
        let t = self.tables()?;
        if t.products.contains_key(&product.id) {
            return Err(exists("product"));
        }
        if !t.categories.contains_key(&product.category_id) {
            return Err(related("product"));
        }
        t.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> Result<(), RepositoryError> {
        let t = self.tables()?;
        if !t.categories.contains_key(&product.category_id) {
            return Err(related("product"));
        }
        let row = t.products.get_mut(&product.id).ok_or(RepositoryError::NotFound)?;
        *row = product.clone();
        Ok(())
    }

    async fn decrement_stock(&mut self, id: Uuid, quantity: i32) -> Result<bool, RepositoryError> {
        match self.tables()?.products.get_mut(&id) {
            Some(p) if p.stock >= quantity => {
                p.stock -= quantity;
                p.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl CredentialsRepository for MemorySession {
    async fn list_credentials(&mut self) -> Result<Vec<Credential>, RepositoryError> {
        let rows = self.tables()?.credentials.values().cloned().collect();
        Ok(newest_first(rows, |c: &Credential| c.created_at))
    }

    async fn get_credential(&mut self, id: Uuid) -> Result<Option<Credential>, RepositoryError> {
        Ok(self.tables()?.credentials.get(&id).cloned())
    }

    async fn find_credential_by_username(
        &mut self,
        username: &str,
    ) -> Result<Option<Credential>, RepositoryError> {
        Ok(self
            .tables()?
            .credentials
            .values()
            .find(|c| c.username == username)
            .cloned())
    }

    async fn insert_credential(&mut self, credential: &Credential) -> Result<(), RepositoryError> {
        let t = self.tables()?;
        if t.credentials.contains_key(&credential.id)
            || t.credentials.values().any(|c| c.username == credential.username)
        {
            return Err(exists("username"));
        }
        t.credentials.insert(credential.id, credential.clone());
        Ok(())
    }

    async fn update_credential(&mut self, credential: &Credential) -> Result<(), RepositoryError> {
        let t = self.tables()?;
        if t.credentials
            .values()
            .any(|c| c.id != credential.id && c.username == credential.username)
        {
            return Err(exists("username"));
        }
        let row = t
            .credentials
            .get_mut(&credential.id)
            .ok_or(RepositoryError::NotFound)?;
        *row = credential.clone();
        Ok(())
    }
}

fn same_email(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[async_trait]
impl UsersRepository for MemorySession {
    async fn list_users(&mut self) -> Result<Vec<User>, RepositoryError> {
        let rows = self.tables()?.users.values().cloned().collect();
        Ok(newest_first(rows, |u: &User| u.created_at))
    }

    async fn get_user(&mut self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        Ok(self.tables()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .tables()?
            .users
            .values()
            .find(|u| same_email(&u.email, email))
            .cloned())
    }

    async fn find_user_by_credential(
        &mut self,
        credential_id: Uuid,
    ) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .tables()?
            .users
            .values()
            .find(|u| u.credential_id == credential_id)
            .cloned())
    }

    async fn insert_user(&mut self, user: &User) -> Result<(), RepositoryError> {
        let t = self.tables()?;
        if !t.credentials.contains_key(&user.credential_id) {
            return Err(related("email"));
        }
        if t.users.contains_key(&user.id)
            || t.users.values().any(|u| {
                u.credential_id == user.credential_id || same_email(&u.email, &user.email)
            })
        {
            return Err(exists("email"));
        }
        t.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&mut self, user: &User) -> Result<(), RepositoryError> {
        let t = self.tables()?;
        if t.users
            .values()
            .any(|u| u.id != user.id && same_email(&u.email, &user.email))
        {
            return Err(exists("email"));
        }
        let row = t.users.get_mut(&user.id).ok_or(RepositoryError::NotFound)?;
        // credential_id is immutable, like in the SQL update.
        let credential_id = row.credential_id;
        *row = user.clone();
        row.credential_id = credential_id;
        Ok(())
    }
}

fn second_active_cart(t: &Tables, cart: &Cart) -> bool {
    cart.status == CartStatus::Active
        && t.carts.values().any(|c| {
            c.id != cart.id && c.user_id == cart.user_id && c.status == CartStatus::Active
        })
}

#[async_trait]
impl CartsRepository for MemorySession {
    async fn list_carts(&mut self) -> Result<Vec<Cart>, RepositoryError> {
        let rows = self.tables()?.carts.values().cloned().collect();
        Ok(newest_first(rows, |c: &Cart| c.created_at))
    }

    async fn get_cart(&mut self, id: Uuid) -> Result<Option<Cart>, RepositoryError> {
        Ok(self.tables()?.carts.get(&id).cloned())
    }

    async fn find_cart_by_status(
        &mut self,
        user_id: Uuid,
        status: CartStatus,
    ) -> Result<Option<Cart>, RepositoryError> {
        Ok(self
            .tables()?
            .carts
            .values()
            .filter(|c| c.user_id == user_id && c.status == status)
            .max_by_key(|c| c.updated_at)
            .cloned())
    }

    async fn insert_cart(&mut self, cart: &Cart) -> Result<(), RepositoryError> {
        let t = self.tables()?;
        if !t.users.contains_key(&cart.user_id) {
            return Err(related("active cart"));
        }
        if t.carts.contains_key(&cart.id) || second_active_cart(t, cart) {
            return Err(exists("active cart"));
        }
        let mut row = cart.clone();
        row.lines.clear();
        t.carts.insert(row.id, row);
        Ok(())
    }

    async fn update_cart(&mut self, cart: &Cart) -> Result<(), RepositoryError> {
        let t = self.tables()?;
        if second_active_cart(t, cart) {
            return Err(exists("active cart"));
        }
        let row = t.carts.get_mut(&cart.id).ok_or(RepositoryError::NotFound)?;
        row.subtotal = cart.subtotal;
        row.status = cart.status;
        row.updated_at = cart.updated_at;
        Ok(())
    }

    async fn insert_cart_line(&mut self, line: &CartLine) -> Result<(), RepositoryError> {
        let t = self.tables()?;
        if !t.products.contains_key(&line.product_id) {
            return Err(related("cart line"));
        }
        let cart = t.carts.get_mut(&line.cart_id).ok_or_else(|| related("cart line"))?;
        if cart
            .lines
            .iter()
            .any(|l| l.id == line.id || l.product_id == line.product_id)
        {
            return Err(exists("cart line"));
        }
        cart.lines.push(line.clone());
        Ok(())
    }

    async fn update_cart_line(&mut self, line: &CartLine) -> Result<(), RepositoryError> {
        let row = self
            .tables()?
            .carts
            .values_mut()
            .flat_map(|c| c.lines.iter_mut())
            .find(|l| l.id == line.id)
            .ok_or(RepositoryError::NotFound)?;
        row.quantity = line.quantity;
        row.unit_price = line.unit_price;
        row.subtotal = line.subtotal;
        Ok(())
    }

    async fn delete_cart_line(&mut self, id: Uuid) -> Result<bool, RepositoryError> {
        for cart in self.tables()?.carts.values_mut() {
            let before = cart.lines.len();
            cart.lines.retain(|l| l.id != id);
            if cart.lines.len() != before {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn clear_cart_lines(&mut self, cart_id: Uuid) -> Result<(), RepositoryError> {
        if let Some(cart) = self.tables()?.carts.get_mut(&cart_id) {
            cart.lines.clear();
        }
        Ok(())
    }
}

#[async_trait]
impl OrdersRepository for MemorySession {
    async fn list_orders(&mut self) -> Result<Vec<Order>, RepositoryError> {
        let rows = self.tables()?.orders.values().cloned().collect();
        Ok(newest_first(rows, |o: &Order| o.created_at))
    }

    async fn orders_for_user(&mut self, user_id: Uuid) -> Result<Vec<Order>, RepositoryError> {
        let rows = self
            .tables()?
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |o: &Order| o.created_at))
    }

    async fn get_order(&mut self, id: Uuid) -> Result<Option<Order>, RepositoryError> {
        Ok(self.tables()?.orders.get(&id).cloned())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), RepositoryError> {
        let t = self.tables()?;
        if t.orders.contains_key(&order.id) {
            return Err(exists("order"));
        }
        if !t.users.contains_key(&order.user_id) {
            return Err(related("order"));
        }
        if order.lines.iter().any(|l| !t.products.contains_key(&l.product_id)) {
            return Err(related("order line"));
        }
        t.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_order_status(
        &mut self,
        id: Uuid,
        status: OrderStatus,
    ) -> Result<(), RepositoryError> {
        let row = self
            .tables()?
            .orders
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        row.status = status;
        row.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl PaymentsRepository for MemorySession {
    async fn list_payments(&mut self) -> Result<Vec<Payment>, RepositoryError> {
        let rows = self.tables()?.payments.values().cloned().collect();
        Ok(newest_first(rows, |p: &Payment| p.created_at))
    }

    async fn get_payment(&mut self, id: Uuid) -> Result<Option<Payment>, RepositoryError> {
        Ok(self.tables()?.payments.get(&id).cloned())
    }

    async fn find_payment_by_order(
        &mut self,
        order_id: Uuid,
    ) -> Result<Option<Payment>, RepositoryError> {
        Ok(self
            .tables()?
            .payments
            .values()
            .find(|p| p.order_id == order_id)
            .cloned())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), RepositoryError> {
        let t = self.tables()?;
        if !t.orders.contains_key(&payment.order_id) {
            return Err(related("payment for this order"));
        }
        if t.payments.contains_key(&payment.id)
            || t.payments.values().any(|p| p.order_id == payment.order_id)
        {
            return Err(exists("payment for this order"));
        }
        t.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<(), RepositoryError> {
        let row = self
            .tables()?
            .payments
            .get_mut(&payment.id)
            .ok_or(RepositoryError::NotFound)?;
        row.amount = payment.amount;
        row.method = payment.method;
        row.status = payment.status;
        row.updated_at = payment.updated_at;
        Ok(())
    }
}

#[async_trait]
impl DeliveriesRepository for MemorySession {
    async fn list_deliveries(&mut self) -> Result<Vec<Delivery>, RepositoryError> {
        let rows = self.tables()?.deliveries.values().cloned().collect();
        Ok(newest_first(rows, |d: &Delivery| d.created_at))
    }

    async fn get_delivery(&mut self, id: Uuid) -> Result<Option<Delivery>, RepositoryError> {
        Ok(self.tables()?.deliveries.get(&id).cloned())
    }

    async fn find_delivery_by_order(
        &mut self,
        order_id: Uuid,
    ) -> Result<Option<Delivery>, RepositoryError> {
        Ok(self
            .tables()?
            .deliveries
            .values()
            .find(|d| d.order_id == order_id)
            .cloned())
    }

    async fn insert_delivery(&mut self, delivery: &Delivery) -> Result<(), RepositoryError> {
        let t = self.tables()?;
        if !t.orders.contains_key(&delivery.order_id) {
            return Err(related("delivery for this order"));
        }
        if t.deliveries.contains_key(&delivery.id)
            || t.deliveries.values().any(|d| d.order_id == delivery.order_id)
        {
            return Err(exists("delivery for this order"));
        }
        t.deliveries.insert(delivery.id, delivery.clone());
        Ok(())
    }

    async fn update_delivery(&mut self, delivery: &Delivery) -> Result<(), RepositoryError> {
        let row = self
            .tables()?
            .deliveries
            .get_mut(&delivery.id)
            .ok_or(RepositoryError::NotFound)?;
        let (id, order_id, created_at) = (row.id, row.order_id, row.created_at);
        *row = delivery.clone();
        row.id = id;
        row.order_id = order_id;
        row.created_at = created_at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{PaymentMethod, Role};
    use rust_decimal::Decimal;

    async fn seed_product(store: &MemoryStore, stock: i32) -> Product {
        let category = Category::new("Panes", "Pan fresco");
        let product = Product::new(category.id, "Pan de bono", "", Decimal::from(10), stock);
        let mut s = store.begin().await.unwrap();
        s.insert_category(&category).await.unwrap();
        s.insert_product(&product).await.unwrap();
        s.commit().await.unwrap();
        product
    }

    async fn seed_user(store: &MemoryStore, email: &str) -> User {
        let credential = Credential::new(email, "hash", Role::User);
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            credential_id: credential.id,
            name: "Ana".into(),
            last_name: "Gómez".into(),
            email: email.into(),
            phone: "3000000000".into(),
            address: Some("Calle 1".into()),
            active: true,
            created_at: now,
            updated_at: now,
        };
        let mut s = store.begin().await.unwrap();
        s.insert_credential(&credential).await.unwrap();
        s.insert_user(&user).await.unwrap();
        s.commit().await.unwrap();
        user
    }

    #[tokio::test]
    async fn test_dropped_session_discards_writes() {
        let store = MemoryStore::new();
        let product = seed_product(&store, 5).await;

        {
            let mut s = store.begin().await.unwrap();
            assert!(s.decrement_stock(product.id, 3).await.unwrap());
        }

        let mut s = store.begin().await.unwrap();
        let stored = s.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 5);
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        let product = seed_product(&store, 5).await;

        let mut s = store.begin().await.unwrap();
        assert!(s.decrement_stock(product.id, 3).await.unwrap());
        assert!(!s.decrement_stock(product.id, 3).await.unwrap());
        s.commit().await.unwrap();
        assert!(matches!(s.commit().await, Err(RepositoryError::Closed)));
        drop(s);

        let mut s = store.begin().await.unwrap();
        assert_eq!(s.get_product(product.id).await.unwrap().unwrap().stock, 2);
    }

    #[tokio::test]
    async fn test_duplicate_payment_is_a_conflict() {
        let store = MemoryStore::new();
        let product = seed_product(&store, 5).await;
        let user = seed_user(&store, "ana@example.com").await;

        let cart_lines = vec![CartLine::new(Uuid::new_v4(), product.id, 1, product.price)];
        let order = Order::from_cart_lines(user.id, &cart_lines, Decimal::from(4000));

        let mut s = store.begin().await.unwrap();
        s.insert_order(&order).await.unwrap();
        s.insert_payment(&Payment::pending(order.id, order.total, PaymentMethod::Cash))
            .await
            .unwrap();
        let second = s
            .insert_payment(&Payment::pending(order.id, order.total, PaymentMethod::Card))
            .await;
        assert!(matches!(second, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_one_active_cart_per_user() {
        let store = MemoryStore::new();
        let user = seed_user(&store, "ana@example.com").await;

        let mut s = store.begin().await.unwrap();
        s.insert_cart(&Cart::new(user.id)).await.unwrap();
        let second = s.insert_cart(&Cart::new(user.id)).await;
        assert!(matches!(second, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_email_is_unique_ignoring_case() {
        let store = MemoryStore::new();
        seed_user(&store, "ana@example.com").await;

        let mut s = store.begin().await.unwrap();
        let found = s.find_user_by_email("ANA@example.com").await.unwrap();
        assert!(found.is_some());

        let credential = Credential::new("other", "hash", Role::User);
        s.insert_credential(&credential).await.unwrap();
        let mut clash = found.unwrap();
        clash.id = Uuid::new_v4();
        clash.credential_id = credential.id;
        clash.email = "Ana@Example.com".into();
        assert!(matches!(
            s.insert_user(&clash).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_category_in_use_cannot_be_deleted() {
        let store = MemoryStore::new();
        let product = seed_product(&store, 1).await;

        let mut s = store.begin().await.unwrap();
        let deleted = s.delete_category(product.category_id).await;
        assert!(matches!(deleted, Err(RepositoryError::Conflict(_))));
        assert!(!s.delete_category(Uuid::new_v4()).await.unwrap());
    }
}
