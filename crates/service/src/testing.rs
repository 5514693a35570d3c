//! Fixtures shared by the service tests.

use chrono::Utc;
use memstore::MemoryStore;
use model::{Category, Credential, Product, Role, User};
use repository::{
    CategoriesRepository, CredentialsRepository, ProductsRepository, Store, UsersRepository,
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::access::Caller;

pub fn admin() -> Caller {
    Caller {
        user_id: Uuid::new_v4(),
        credential_id: Uuid::new_v4(),
        role: Role::Admin,
    }
}

/// A caller with no stored profile behind it.
pub fn customer() -> Caller {
    Caller {
        user_id: Uuid::new_v4(),
        credential_id: Uuid::new_v4(),
        role: Role::User,
    }
}

/// Stores a credential and profile and returns the caller acting as them.
pub async fn seed_customer(store: &MemoryStore, address: Option<&str>) -> Caller {
    let credential = Credential::new(format!("user-{}", Uuid::new_v4()), "hash", Role::User);
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        credential_id: credential.id,
        name: "Ana".into(),
        last_name: "Gómez".into(),
        email: format!("{}@example.com", credential.username),
        phone: "3001234567".into(),
        address: address.map(str::to_string),
        active: true,
        created_at: now,
        updated_at: now,
    };

    let mut s = store.begin().await.unwrap();
    s.insert_credential(&credential).await.unwrap();
    s.insert_user(&user).await.unwrap();
    s.commit().await.unwrap();

    Caller {
        user_id: user.id,
        credential_id: credential.id,
        role: Role::User,
    }
}

pub async fn seed_product(store: &MemoryStore, name: &str, price: Decimal, stock: i32) -> Product {
    let category = Category::new(format!("{name} category"), "");
    let product = Product::new(category.id, name, "", price, stock);

    let mut s = store.begin().await.unwrap();
    s.insert_category(&category).await.unwrap();
    s.insert_product(&product).await.unwrap();
    s.commit().await.unwrap();
    product
}

pub async fn stock_of(store: &MemoryStore, product_id: Uuid) -> i32 {
    let mut s = store.begin().await.unwrap();
    s.get_product(product_id).await.unwrap().unwrap().stock
}
