use async_trait::async_trait;
use model::{Category, Product};
use tokio_postgres::Row;
use uuid::Uuid;

use super::{PgSession, constraint_error, expect_one};
use crate::{CategoriesRepository, ProductsRepository, RepositoryError};

fn category_from_row(row: &Row) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
    }
}

fn product_from_row(row: &Row) -> Product {
    Product {
        id: row.get("id"),
        category_id: row.get("category_id"),
        name: row.get("name"),
        description: row.get("description"),
        price: row.get("price"),
        stock: row.get("stock"),
        active: row.get("active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl CategoriesRepository for PgSession {
    async fn list_categories(&mut self) -> Result<Vec<Category>, RepositoryError> {
        let rows = self
            .db()?
            .query("SELECT id, name, description FROM categories ORDER BY name", &[])
            .await?;
        Ok(rows.iter().map(category_from_row).collect())
    }

    async fn get_category(&mut self, id: Uuid) -> Result<Option<Category>, RepositoryError> {
        let row = self
            .db()?
            .query_opt("SELECT id, name, description FROM categories WHERE id = $1", &[&id])
            .await?;
        Ok(row.as_ref().map(category_from_row))
    }

    async fn insert_category(&mut self, category: &Category) -> Result<(), RepositoryError> {
        self.db()?
            .execute(
                "INSERT INTO categories (id, name, description) VALUES ($1, $2, $3)",
                &[&category.id, &category.name, &category.description],
            )
            .await
            .map_err(|e| constraint_error(e, "category"))?;
        Ok(())
    }

    async fn update_category(&mut self, category: &Category) -> Result<(), RepositoryError> {
        let affected = self
            .db()?
            .execute(
                "UPDATE categories SET name = $2, description = $3 WHERE id = $1",
                &[&category.id, &category.name, &category.description],
            )
            .await
            .map_err(|e| constraint_error(e, "category"))?;
        expect_one(affected)
    }

    async fn delete_category(&mut self, id: Uuid) -> Result<bool, RepositoryError> {
        let affected = self
            .db()?
            .execute("DELETE FROM categories WHERE id = $1", &[&id])
            .await
            .map_err(|e| constraint_error(e, "category"))?;
        Ok(affected > 0)
    }
}

const PRODUCT_COLUMNS: &str =
    "id, category_id, name, description, price, stock, active, created_at, updated_at";

#[async_trait]
impl ProductsRepository for PgSession {
    async fn list_products(&mut self, include_inactive: bool) -> Result<Vec<Product>, RepositoryError> {
        let query = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE active OR $1 ORDER BY name"
        );
        let rows = self.db()?.query(query.as_str(), &[&include_inactive]).await?;
        Ok(rows.iter().map(product_from_row).collect())
    }

    async fn get_product(&mut self, id: Uuid) -> Result<Option<Product>, RepositoryError> {
        let query = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = self.db()?.query_opt(query.as_str(), &[&id]).await?;
        Ok(row.as_ref().map(product_from_row))
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), RepositoryError> {
        let query = r#"
            INSERT INTO products (id, category_id, name, description, price, stock, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#;
        self.db()?
            .execute(query, &[
                &product.id,
                &product.category_id,
                &product.name,
                &product.description,
                &product.price,
                &product.stock,
                &product.active,
                &product.created_at,
                &product.updated_at,
            ])
            .await
            .map_err(|e| constraint_error(e, "product"))?;
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> Result<(), RepositoryError> {
        let query = r#"
            UPDATE products
            SET category_id = $2, name = $3, description = $4, price = $5,
                stock = $6, active = $7, updated_at = $8
            WHERE id = $1
        "#;
        let affected = self
            .db()?
            .execute(query, &[
                &product.id,
                &product.category_id,
                &product.name,
                &product.description,
                &product.price,
                &product.stock,
                &product.active,
                &product.updated_at,
            ])
            .await
            .map_err(|e| constraint_error(e, "product"))?;
        expect_one(affected)
    }

    async fn decrement_stock(&mut self, id: Uuid, quantity: i32) -> Result<bool, RepositoryError> {
        let affected = self
            .db()?
            .execute(
                "UPDATE products SET stock = stock - $2, updated_at = now() WHERE id = $1 AND stock >= $2",
                &[&id, &quantity],
            )
            .await?;
        Ok(affected == 1)
    }
}
