//! Order queries (external order store, dispatch columns only)

use std::collections::HashMap;

use anyhow::Result;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::types::{EligibleOrderFilter, LineItem, Order, OrderStatus};

const ORDER_COLUMNS: &str = r#"
    id, order_number, customer_name, customer_phone, delivery_address,
    delivery_lat, delivery_lng, delivery_method, status
"#;

/// Orders ready for delivery that need a driver, oldest first
pub async fn list_eligible(pool: &PgPool, filter: &EligibleOrderFilter) -> Result<Vec<Order>> {
    let query = format!(
        r#"
        SELECT {ORDER_COLUMNS}
        FROM orders
        WHERE status = 'READY_FOR_DELIVERY'
          AND delivery_method <> 'pickup'
          AND ($1::uuid[] IS NULL OR id = ANY($1))
        ORDER BY created_at, order_number
        "#
    );

    let ids = (!filter.order_ids.is_empty()).then_some(filter.order_ids.as_slice());
    let mut orders = sqlx::query_as::<_, Order>(&query)
        .bind(ids)
        .fetch_all(pool)
        .await?;

    let mut conn = pool.acquire().await?;
    load_items(&mut conn, &mut orders).await?;
    Ok(orders)
}

/// Lock the given orders for the rest of the transaction.
/// Rows are locked in id order so concurrent callers cannot deadlock.
pub async fn lock_orders(conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<Order>> {
    let query = format!(
        r#"
        SELECT {ORDER_COLUMNS}
        FROM orders
        WHERE id = ANY($1)
        ORDER BY id
        FOR UPDATE
        "#
    );

    let orders = sqlx::query_as::<_, Order>(&query)
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;

    Ok(orders)
}

/// Orders among `ids` linked to a route that is still assigned or in progress
pub async fn actively_routed(conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT ro.order_id
        FROM route_orders ro
        JOIN route_assignments r ON r.id = ro.route_id
        WHERE ro.order_id = ANY($1)
          AND r.status IN ('assigned', 'in_progress')
        "#
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Move orders from one status to another. Only rows still in `from`
/// change; the affected row count is returned.
pub async fn transition_status(
    conn: &mut PgConnection,
    ids: &[Uuid],
    from: OrderStatus,
    to: OrderStatus,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE orders
        SET status = $3, updated_at = NOW()
        WHERE id = ANY($1) AND status = $2
        "#
    )
    .bind(ids)
    .bind(from)
    .bind(to)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    order_id: Uuid,
    sku: String,
    name: String,
    quantity: i32,
    unit_price: f64,
}

/// Fill `items` for the given orders
pub async fn load_items(conn: &mut PgConnection, orders: &mut [Order]) -> Result<()> {
    if orders.is_empty() {
        return Ok(());
    }

    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let rows = sqlx::query_as::<_, ItemRow>(
        "SELECT order_id, sku, name, quantity, unit_price FROM order_items WHERE order_id = ANY($1) ORDER BY sku"
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_order: HashMap<Uuid, Vec<LineItem>> = HashMap::new();
    for row in rows {
        by_order.entry(row.order_id).or_default().push(LineItem {
            sku: row.sku,
            name: row.name,
            quantity: row.quantity,
            unit_price: row.unit_price,
        });
    }

    for order in orders.iter_mut() {
        order.items = by_order.remove(&order.id).unwrap_or_default();
    }

    Ok(())
}

