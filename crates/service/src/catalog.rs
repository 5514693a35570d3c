//! Catalog management: categories and products.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use model::{Category, Product};
use repository::{CategoriesRepository, ProductsRepository, Session, Store};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::access::Caller;
use crate::error::{ServiceError, conflict, not_found};

#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub category_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    pub stock: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
    pub category_id: Option<Uuid>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
    pub active: Option<bool>,
}

/// Catalog: public browsing plus admin maintenance.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Active products only.
    async fn list_products(&self) -> Result<Vec<Product>, ServiceError>;
    /// Every product, inactive ones included. Admin only.
    async fn list_all_products(&self, caller: &Caller) -> Result<Vec<Product>, ServiceError>;
    /// Inactive products are reported as missing.
    async fn get_product(&self, id: Uuid) -> Result<Product, ServiceError>;
    async fn create_product(&self, caller: &Caller, input: NewProduct) -> Result<Product, ServiceError>;
    async fn update_product(
        &self,
        caller: &Caller,
        id: Uuid,
        patch: ProductPatch,
    ) -> Result<Product, ServiceError>;
    /// Soft delete: the product leaves the catalog but keeps its history.
    async fn deactivate_product(&self, caller: &Caller, id: Uuid) -> Result<Product, ServiceError>;

    async fn list_categories(&self) -> Result<Vec<Category>, ServiceError>;
    async fn get_category(&self, id: Uuid) -> Result<Category, ServiceError>;
    async fn create_category(&self, caller: &Caller, input: NewCategory) -> Result<Category, ServiceError>;
    async fn update_category(
        &self,
        caller: &Caller,
        id: Uuid,
        patch: CategoryPatch,
    ) -> Result<Category, ServiceError>;
    /// Fails with `Conflict` while products still belong to the category.
    async fn delete_category(&self, caller: &Caller, id: Uuid) -> Result<(), ServiceError>;
}

pub struct CatalogServiceImpl<S> {
    store: Arc<S>,
}

impl<S: Store> CatalogServiceImpl<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

fn required_text(field: &str, value: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn check_price(price: Decimal) -> Result<Decimal, ServiceError> {
    if price.is_sign_negative() {
        return Err(ServiceError::Validation("price must not be negative".into()));
    }
    Ok(price.round_dp(2))
}

fn check_stock(stock: i32) -> Result<i32, ServiceError> {
    if stock < 0 {
        return Err(ServiceError::Validation("stock must not be negative".into()));
    }
    Ok(stock)
}

async fn require_category(session: &mut dyn Session, id: Uuid) -> Result<Category, ServiceError> {
    session
        .get_category(id)
        .await?
        .ok_or_else(|| not_found("category", id))
}

#[async_trait]
impl<S: Store> CatalogService for CatalogServiceImpl<S> {
    #[instrument(skip(self))]
    async fn list_products(&self) -> Result<Vec<Product>, ServiceError> {
        let mut s = self.store.begin().await?;
        Ok(s.list_products(false).await?)
    }

    #[instrument(skip(self))]
    async fn list_all_products(&self, caller: &Caller) -> Result<Vec<Product>, ServiceError> {
        caller.require_admin()?;
        let mut s = self.store.begin().await?;
        Ok(s.list_products(true).await?)
    }

    #[instrument(skip(self))]
    async fn get_product(&self, id: Uuid) -> Result<Product, ServiceError> {
        let mut s = self.store.begin().await?;
        s.get_product(id)
            .await?
            .filter(|p| p.active)
            .ok_or_else(|| not_found("product", id))
    }

    #[instrument(skip(self))]
    async fn create_product(&self, caller: &Caller, input: NewProduct) -> Result<Product, ServiceError> {
        caller.require_admin()?;
        let product = Product::new(
            input.category_id,
            required_text("name", &input.name)?,
            input.description.trim(),
            check_price(input.price)?,
            check_stock(input.stock)?,
        );

        let mut s = self.store.begin().await?;
        require_category(s.as_mut(), product.category_id).await?;
        s.insert_product(&product).await?;
        s.commit().await?;

        info!(product_id = %product.id, "Product created");
        Ok(product)
    }

    #[instrument(skip(self))]
    async fn update_product(
        &self,
        caller: &Caller,
        id: Uuid,
        patch: ProductPatch,
    ) -> Result<Product, ServiceError> {
        caller.require_admin()?;
        let mut s = self.store.begin().await?;
        let mut product = s.get_product(id).await?.ok_or_else(|| not_found("product", id))?;

        if let Some(category_id) = patch.category_id {
            require_category(s.as_mut(), category_id).await?;
            product.category_id = category_id;
        }
        if let Some(name) = patch.name {
            product.name = required_text("name", &name)?;
        }
        if let Some(description) = patch.description {
            product.description = description.trim().to_string();
        }
        if let Some(price) = patch.price {
            product.price = check_price(price)?;
        }
        if let Some(stock) = patch.stock {
            product.stock = check_stock(stock)?;
        }
        if let Some(active) = patch.active {
            product.active = active;
        }
        product.updated_at = Utc::now();

        s.update_product(&product).await?;
        s.commit().await?;
        Ok(product)
    }

    #[instrument(skip(self))]
    async fn deactivate_product(&self, caller: &Caller, id: Uuid) -> Result<Product, ServiceError> {
        caller.require_admin()?;
        let mut s = self.store.begin().await?;
        let mut product = s.get_product(id).await?.ok_or_else(|| not_found("product", id))?;
        if !product.active {
            return Err(conflict("product is already inactive"));
        }
        product.active = false;
        product.updated_at = Utc::now();
        s.update_product(&product).await?;
        s.commit().await?;

        info!(product_id = %id, "Product deactivated");
        Ok(product)
    }

    #[instrument(skip(self))]
    async fn list_categories(&self) -> Result<Vec<Category>, ServiceError> {
        let mut s = self.store.begin().await?;
        Ok(s.list_categories().await?)
    }

    #[instrument(skip(self))]
    async fn get_category(&self, id: Uuid) -> Result<Category, ServiceError> {
        let mut s = self.store.begin().await?;
        require_category(s.as_mut(), id).await
    }

    #[instrument(skip(self))]
    async fn create_category(&self, caller: &Caller, input: NewCategory) -> Result<Category, ServiceError> {
        caller.require_admin()?;
        let category = Category::new(required_text("name", &input.name)?, input.description.trim());

        let mut s = self.store.begin().await?;
        s.insert_category(&category).await?;
        s.commit().await?;
        Ok(category)
    }

    #[instrument(skip(self))]
    async fn update_category(
        &self,
        caller: &Caller,
        id: Uuid,
        patch: CategoryPatch,
    ) -> Result<Category, ServiceError> {
        caller.require_admin()?;
        let mut s = self.store.begin().await?;
        let mut category = require_category(s.as_mut(), id).await?;
        if let Some(name) = patch.name {
            category.name = required_text("name", &name)?;
        }
        if let Some(description) = patch.description {
            category.description = description.trim().to_string();
        }
        s.update_category(&category).await?;
        s.commit().await?;
        Ok(category)
    }

    #[instrument(skip(self))]
    async fn delete_category(&self, caller: &Caller, id: Uuid) -> Result<(), ServiceError> {
        caller.require_admin()?;
        let mut s = self.store.begin().await?;
        if !s.delete_category(id).await? {
            return Err(not_found("category", id));
        }
        s.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{admin, customer};
    use memstore::MemoryStore;

    fn service() -> CatalogServiceImpl<MemoryStore> {
        CatalogServiceImpl::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_inactive_products_leave_the_catalog() {
        let svc = service();
        let admin = admin();
        let category = svc
            .create_category(&admin, NewCategory { name: "Panes".into(), description: String::new() })
            .await
            .unwrap();
        let product = svc
            .create_product(&admin, NewProduct {
                category_id: category.id,
                name: "Croissant".into(),
                description: String::new(),
                price: Decimal::new(350050, 2),
                stock: 4,
            })
            .await
            .unwrap();

        assert_eq!(svc.list_products().await.unwrap().len(), 1);
        svc.deactivate_product(&admin, product.id).await.unwrap();

        assert!(svc.list_products().await.unwrap().is_empty());
        assert_eq!(svc.list_all_products(&admin).await.unwrap().len(), 1);
        assert!(matches!(
            svc.get_product(product.id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            svc.deactivate_product(&admin, product.id).await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_only_and_validation() {
        let svc = service();
        let input = NewCategory { name: "Tortas".into(), description: String::new() };
        assert!(matches!(
            svc.create_category(&customer(), input.clone()).await,
            Err(ServiceError::Forbidden(_))
        ));

        let category = svc.create_category(&admin(), input).await.unwrap();
        let negative = svc
            .create_product(&admin(), NewProduct {
                category_id: category.id,
                name: "Torta".into(),
                description: String::new(),
                price: Decimal::from(-1),
                stock: 1,
            })
            .await;
        assert!(matches!(negative, Err(ServiceError::Validation(_))));

        let orphan = svc
            .create_product(&admin(), NewProduct {
                category_id: Uuid::new_v4(),
                name: "Torta".into(),
                description: String::new(),
                price: Decimal::from(1),
                stock: 1,
            })
            .await;
        assert!(matches!(orphan, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_category_with_products_cannot_be_deleted() {
        let svc = service();
        let admin = admin();
        let category = svc
            .create_category(&admin, NewCategory { name: "Galletas".into(), description: String::new() })
            .await
            .unwrap();
        svc.create_product(&admin, NewProduct {
            category_id: category.id,
            name: "Galleta".into(),
            description: String::new(),
            price: Decimal::from(2),
            stock: 10,
        })
        .await
        .unwrap();

        assert!(matches!(
            svc.delete_category(&admin, category.id).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            svc.delete_category(&admin, Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
