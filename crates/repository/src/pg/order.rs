use std::collections::HashMap;

use async_trait::async_trait;
use model::{Delivery, Order, OrderLine, OrderStatus, Payment};
use tokio_postgres::{Client, Row};
use uuid::Uuid;

use super::{PgSession, constraint_error, expect_one};
use crate::{DeliveriesRepository, OrdersRepository, PaymentsRepository, RepositoryError};

const ORDER_COLUMNS: &str =
    "id, user_id, subtotal, discount, tax, delivery_fee, total, status, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, order_id, amount, method, status, created_at, updated_at";

const DELIVERY_COLUMNS: &str =
    "id, order_id, delivery_date, status, address, phone, created_at, updated_at";

fn order_from_row(row: &Row) -> Order {
    Order {
        id: row.get("id"),
        user_id: row.get("user_id"),
        subtotal: row.get("subtotal"),
        discount: row.get("discount"),
        tax: row.get("tax"),
        delivery_fee: row.get("delivery_fee"),
        total: row.get("total"),
        status: row.get("status"),
        lines: Vec::new(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn order_line_from_row(row: &Row) -> OrderLine {
    OrderLine {
        id: row.get("id"),
        order_id: row.get("order_id"),
        product_id: row.get("product_id"),
        quantity: row.get("quantity"),
        unit_price: row.get("unit_price"),
        subtotal: row.get("subtotal"),
    }
}

fn payment_from_row(row: &Row) -> Payment {
    Payment {
        id: row.get("id"),
        order_id: row.get("order_id"),
        amount: row.get("amount"),
        method: row.get("method"),
        status: row.get("status"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn delivery_from_row(row: &Row) -> Delivery {
    Delivery {
        id: row.get("id"),
        order_id: row.get("order_id"),
        delivery_date: row.get("delivery_date"),
        status: row.get("status"),
        address: row.get("address"),
        phone: row.get("phone"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

async fn with_lines(client: &Client, mut orders: Vec<Order>) -> Result<Vec<Order>, RepositoryError> {
    if orders.is_empty() {
        return Ok(orders);
    }
    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let rows = client
        .query(
            r#"
            SELECT id, order_id, product_id, quantity, unit_price, subtotal
            FROM order_lines
            WHERE order_id = ANY($1)
            ORDER BY position
            "#,
            &[&ids],
        )
        .await?;

    let mut by_order: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
    for row in &rows {
        let line = order_line_from_row(row);
        by_order.entry(line.order_id).or_default().push(line);
    }
    for order in &mut orders {
        order.lines = by_order.remove(&order.id).unwrap_or_default();
    }
    Ok(orders)
}

#[async_trait]
impl OrdersRepository for PgSession {
    async fn list_orders(&mut self) -> Result<Vec<Order>, RepositoryError> {
        let query = format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC");
        let client = self.db()?;
        let rows = client.query(query.as_str(), &[]).await?;
        with_lines(client, rows.iter().map(order_from_row).collect()).await
    }

    async fn orders_for_user(&mut self, user_id: Uuid) -> Result<Vec<Order>, RepositoryError> {
        let query = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        );
        let client = self.db()?;
        let rows = client.query(query.as_str(), &[&user_id]).await?;
        with_lines(client, rows.iter().map(order_from_row).collect()).await
    }

    async fn get_order(&mut self, id: Uuid) -> Result<Option<Order>, RepositoryError> {
        let query = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        let client = self.db()?;
        let row = client.query_opt(query.as_str(), &[&id]).await?;
        let orders = row.as_ref().map(order_from_row).into_iter().collect();
        Ok(with_lines(client, orders).await?.pop())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), RepositoryError> {
        let client = self.db()?;
        client
            .execute(
                r#"
                INSERT INTO orders (id, user_id, subtotal, discount, tax, delivery_fee, total, status, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
                &[
                    &order.id,
                    &order.user_id,
                    &order.subtotal,
                    &order.discount,
                    &order.tax,
                    &order.delivery_fee,
                    &order.total,
                    &order.status,
                    &order.created_at,
                    &order.updated_at,
                ],
            )
            .await
            .map_err(|e| constraint_error(e, "order"))?;

        let insert_line = client
            .prepare(
                r#"
                INSERT INTO order_lines (id, order_id, product_id, quantity, unit_price, subtotal, position)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .await?;
        for (position, line) in order.lines.iter().enumerate() {
            let position = position as i32;
            client
                .execute(&insert_line, &[
                    &line.id,
                    &line.order_id,
                    &line.product_id,
                    &line.quantity,
                    &line.unit_price,
                    &line.subtotal,
                    &position,
                ])
                .await
                .map_err(|e| constraint_error(e, "order line"))?;
        }
        Ok(())
    }

    async fn update_order_status(
        &mut self,
        id: Uuid,
        status: OrderStatus,
    ) -> Result<(), RepositoryError> {
        let affected = self
            .db()?
            .execute(
                "UPDATE orders SET status = $2, updated_at = now() WHERE id = $1",
                &[&id, &status],
            )
            .await?;
        expect_one(affected)
    }
}

#[async_trait]
impl PaymentsRepository for PgSession {
    async fn list_payments(&mut self) -> Result<Vec<Payment>, RepositoryError> {
        let query = format!("SELECT {PAYMENT_COLUMNS} FROM payments ORDER BY created_at DESC");
        let rows = self.db()?.query(query.as_str(), &[]).await?;
        Ok(rows.iter().map(payment_from_row).collect())
    }

    async fn get_payment(&mut self, id: Uuid) -> Result<Option<Payment>, RepositoryError> {
        let query = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1");
        let row = self.db()?.query_opt(query.as_str(), &[&id]).await?;
        Ok(row.as_ref().map(payment_from_row))
    }

    async fn find_payment_by_order(
        &mut self,
        order_id: Uuid,
    ) -> Result<Option<Payment>, RepositoryError> {
        let query = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 FOR UPDATE");
        let row = self.db()?.query_opt(query.as_str(), &[&order_id]).await?;
        Ok(row.as_ref().map(payment_from_row))
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), RepositoryError> {
        self.db()?
            .execute(
                r#"
                INSERT INTO payments (id, order_id, amount, method, status, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
                &[
                    &payment.id,
                    &payment.order_id,
                    &payment.amount,
                    &payment.method,
                    &payment.status,
                    &payment.created_at,
                    &payment.updated_at,
                ],
            )
            .await
            .map_err(|e| constraint_error(e, "payment for this order"))?;
        Ok(())
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<(), RepositoryError> {
        let affected = self
            .db()?
            .execute(
                "UPDATE payments SET amount = $2, method = $3, status = $4, updated_at = $5 WHERE id = $1",
                &[
                    &payment.id,
                    &payment.amount,
                    &payment.method,
                    &payment.status,
                    &payment.updated_at,
                ],
            )
            .await?;
        expect_one(affected)
    }
}

#[async_trait]
impl DeliveriesRepository for PgSession {
    async fn list_deliveries(&mut self) -> Result<Vec<Delivery>, RepositoryError> {
        let query = format!("SELECT {DELIVERY_COLUMNS} FROM deliveries ORDER BY created_at DESC");
        let rows = self.db()?.query(query.as_str(), &[]).await?;
        Ok(rows.iter().map(delivery_from_row).collect())
    }

    async fn get_delivery(&mut self, id: Uuid) -> Result<Option<Delivery>, RepositoryError> {
        let query = format!("SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE id = $1 FOR UPDATE");
        let row = self.db()?.query_opt(query.as_str(), &[&id]).await?;
        Ok(row.as_ref().map(delivery_from_row))
    }

    async fn find_delivery_by_order(
        &mut self,
        order_id: Uuid,
    ) -> Result<Option<Delivery>, RepositoryError> {
        let query = format!("SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE order_id = $1");
        let row = self.db()?.query_opt(query.as_str(), &[&order_id]).await?;
        Ok(row.as_ref().map(delivery_from_row))
    }

    async fn insert_delivery(&mut self, delivery: &Delivery) -> Result<(), RepositoryError> {
        self.db()?
            .execute(
                r#"
                INSERT INTO deliveries (id, order_id, delivery_date, status, address, phone, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
                &[
                    &delivery.id,
                    &delivery.order_id,
                    &delivery.delivery_date,
                    &delivery.status,
                    &delivery.address,
                    &delivery.phone,
                    &delivery.created_at,
                    &delivery.updated_at,
                ],
            )
            .await
            .map_err(|e| constraint_error(e, "delivery for this order"))?;
        Ok(())
    }

    async fn update_delivery(&mut self, delivery: &Delivery) -> Result<(), RepositoryError> {
        let affected = self
            .db()?
            .execute(
                r#"
                UPDATE deliveries
                SET delivery_date = $2, status = $3, address = $4, phone = $5, updated_at = $6
                WHERE id = $1
                "#,
                &[
                    &delivery.id,
                    &delivery.delivery_date,
                    &delivery.status,
                    &delivery.address,
                    &delivery.phone,
                    &delivery.updated_at,
                ],
            )
            .await?;
        expect_one(affected)
    }
}
