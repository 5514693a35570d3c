use std::collections::HashMap;

use async_trait::async_trait;
use model::{Cart, CartLine, CartStatus};
use tokio_postgres::{Client, Row};
use uuid::Uuid;

use super::{PgSession, constraint_error, expect_one};
use crate::{CartsRepository, RepositoryError};

const CART_COLUMNS: &str = "id, user_id, subtotal, status, created_at, updated_at";

fn cart_from_row(row: &Row) -> Cart {
    Cart {
        id: row.get("id"),
        user_id: row.get("user_id"),
        subtotal: row.get("subtotal"),
        status: row.get("status"),
        lines: Vec::new(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn line_from_row(row: &Row) -> CartLine {
    CartLine {
        id: row.get("id"),
        cart_id: row.get("cart_id"),
        product_id: row.get("product_id"),
        quantity: row.get("quantity"),
        unit_price: row.get("unit_price"),
        subtotal: row.get("subtotal"),
    }
}

/// Loads the lines of every cart in one round trip, in insertion order.
async fn with_lines(client: &Client, mut carts: Vec<Cart>) -> Result<Vec<Cart>, RepositoryError> {
    if carts.is_empty() {
        return Ok(carts);
    }
    let ids: Vec<Uuid> = carts.iter().map(|c| c.id).collect();
    let rows = client
        .query(
            r#"
            SELECT id, cart_id, product_id, quantity, unit_price, subtotal
            FROM cart_lines
            WHERE cart_id = ANY($1)
            ORDER BY created_at, id
            "#,
            &[&ids],
        )
        .await?;

    let mut by_cart: HashMap<Uuid, Vec<CartLine>> = HashMap::new();
    for row in &rows {
        let line = line_from_row(row);
        by_cart.entry(line.cart_id).or_default().push(line);
    }
    for cart in &mut carts {
        cart.lines = by_cart.remove(&cart.id).unwrap_or_default();
    }
    Ok(carts)
}

#[async_trait]
impl CartsRepository for PgSession {
    async fn list_carts(&mut self) -> Result<Vec<Cart>, RepositoryError> {
        let query = format!("SELECT {CART_COLUMNS} FROM carts ORDER BY created_at DESC");
        let client = self.db()?;
        let rows = client.query(query.as_str(), &[]).await?;
        with_lines(client, rows.iter().map(cart_from_row).collect()).await
    }

    async fn get_cart(&mut self, id: Uuid) -> Result<Option<Cart>, RepositoryError> {
        let query = format!("SELECT {CART_COLUMNS} FROM carts WHERE id = $1");
        let client = self.db()?;
        let row = client.query_opt(query.as_str(), &[&id]).await?;
        let carts = row.as_ref().map(cart_from_row).into_iter().collect();
        Ok(with_lines(client, carts).await?.pop())
    }

    async fn find_cart_by_status(
        &mut self,
        user_id: Uuid,
        status: CartStatus,
    ) -> Result<Option<Cart>, RepositoryError> {
        let query = format!(
            r#"
            SELECT {CART_COLUMNS} FROM carts
            WHERE user_id = $1 AND status = $2
            ORDER BY updated_at DESC
            LIMIT 1
            FOR UPDATE
            "#
        );
        let client = self.db()?;
        let row = client.query_opt(query.as_str(), &[&user_id, &status]).await?;
        let carts = row.as_ref().map(cart_from_row).into_iter().collect();
        Ok(with_lines(client, carts).await?.pop())
    }

    async fn insert_cart(&mut self, cart: &Cart) -> Result<(), RepositoryError> {
        self.db()?
            .execute(
                r#"
                INSERT INTO carts (id, user_id, subtotal, status, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
                &[
                    &cart.id,
                    &cart.user_id,
                    &cart.subtotal,
                    &cart.status,
                    &cart.created_at,
                    &cart.updated_at,
                ],
            )
            .await
            .map_err(|e| constraint_error(e, "active cart"))?;
        Ok(())
    }

    async fn update_cart(&mut self, cart: &Cart) -> Result<(), RepositoryError> {
        let affected = self
            .db()?
            .execute(
                "UPDATE carts SET subtotal = $2, status = $3, updated_at = $4 WHERE id = $1",
                &[&cart.id, &cart.subtotal, &cart.status, &cart.updated_at],
            )
            .await
            .map_err(|e| constraint_error(e, "active cart"))?;
        expect_one(affected)
    }

    async fn insert_cart_line(&mut self, line: &CartLine) -> Result<(), RepositoryError> {
        self.db()?
            .execute(
                r#"
                INSERT INTO cart_lines (id, cart_id, product_id, quantity, unit_price, subtotal)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
                &[
                    &line.id,
                    &line.cart_id,
                    &line.product_id,
                    &line.quantity,
                    &line.unit_price,
                    &line.subtotal,
                ],
            )
            .await
            .map_err(|e| constraint_error(e, "cart line"))?;
        Ok(())
    }

    async fn update_cart_line(&mut self, line: &CartLine) -> Result<(), RepositoryError> {
        let affected = self
            .db()?
            .execute(
                "UPDATE cart_lines SET quantity = $2, unit_price = $3, subtotal = $4 WHERE id = $1",
                &[&line.id, &line.quantity, &line.unit_price, &line.subtotal],
            )
            .await?;
        expect_one(affected)
    }

    async fn delete_cart_line(&mut self, id: Uuid) -> Result<bool, RepositoryError> {
        let affected = self
            .db()?
            .execute("DELETE FROM cart_lines WHERE id = $1", &[&id])
            .await?;
        Ok(affected > 0)
    }

    async fn clear_cart_lines(&mut self, cart_id: Uuid) -> Result<(), RepositoryError> {
        self.db()?
            .execute("DELETE FROM cart_lines WHERE cart_id = $1", &[&cart_id])
            .await?;
        Ok(())
    }
}
