//! Route assignment queries

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::types::{
    NewRoute, NewRouteStop, RouteAssignment, RouteOrder, RouteOrderStatus, RouteStatus,
    RouteStop, StopStatus,
};

const ROUTE_COLUMNS: &str = r#"
    id, driver_id, driver_name, route_date, departure_time, status,
    total_distance_km, total_duration_minutes, total_driving_minutes,
    estimated_fuel_cost, route_efficiency, optimization_method, notes,
    created_at, updated_at, completed_at, cancelled_at
"#;

const STOP_COLUMNS: &str = r#"
    id, route_id, stop_order, address, lat, lng,
    estimated_arrival, actual_arrival,
    estimated_travel_time_minutes, actual_travel_time_minutes,
    estimated_distance_km, actual_distance_km,
    cumulative_time_minutes, cumulative_distance_km, status
"#;

/// Insert the route header
pub async fn insert_header(conn: &mut PgConnection, route: &NewRoute) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO route_assignments (
            id, driver_id, driver_name, route_date, departure_time, status,
            total_distance_km, total_duration_minutes, total_driving_minutes,
            estimated_fuel_cost, route_efficiency, optimization_method, notes
        )
        VALUES ($1, $2, $3, $4, $5, 'assigned', $6, $7, $8, $9, $10, $11, $12)
        "#
    )
    .bind(route.id)
    .bind(route.driver_id)
    .bind(&route.driver_name)
    .bind(route.route_date)
    .bind(route.departure_time)
    .bind(route.total_distance_km)
    .bind(route.total_duration_minutes)
    .bind(route.total_driving_minutes)
    .bind(route.estimated_fuel_cost)
    .bind(route.route_efficiency)
    .bind(&route.optimization_method)
    .bind(&route.notes)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Insert one stop
pub async fn insert_stop(conn: &mut PgConnection, route_id: Uuid, stop: &NewRouteStop) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO route_stops (
            id, route_id, stop_order, address, lat, lng, estimated_arrival,
            estimated_travel_time_minutes, estimated_distance_km,
            cumulative_time_minutes, cumulative_distance_km, status
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'pending')
        "#
    )
    .bind(stop.id)
    .bind(route_id)
    .bind(stop.stop_order)
    .bind(&stop.address)
    .bind(stop.lat)
    .bind(stop.lng)
    .bind(stop.estimated_arrival)
    .bind(stop.estimated_travel_time_minutes)
    .bind(stop.estimated_distance_km)
    .bind(stop.cumulative_time_minutes)
    .bind(stop.cumulative_distance_km)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Insert an order link with its customer snapshot
pub async fn insert_route_order(conn: &mut PgConnection, link: &RouteOrder) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO route_orders (
            id, route_id, stop_id, order_id, order_number, customer_name, customer_phone, delivery_status
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#
    )
    .bind(link.id)
    .bind(link.route_id)
    .bind(link.stop_id)
    .bind(link.order_id)
    .bind(&link.order_number)
    .bind(&link.customer_name)
    .bind(&link.customer_phone)
    .bind(link.delivery_status)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Get a route header
pub async fn get_route<'e>(executor: impl PgExecutor<'e>, route_id: Uuid) -> Result<Option<RouteAssignment>> {
    let query = format!("SELECT {ROUTE_COLUMNS} FROM route_assignments WHERE id = $1");

    let route = sqlx::query_as::<_, RouteAssignment>(&query)
        .bind(route_id)
        .fetch_optional(executor)
        .await?;

    Ok(route)
}

/// Get a route header and hold its row lock until the transaction ends
pub async fn lock_route(conn: &mut PgConnection, route_id: Uuid) -> Result<Option<RouteAssignment>> {
    let query = format!("SELECT {ROUTE_COLUMNS} FROM route_assignments WHERE id = $1 FOR UPDATE");

    let route = sqlx::query_as::<_, RouteAssignment>(&query)
        .bind(route_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(route)
}

/// Routes for a date
pub async fn list_routes_for_date<'e>(executor: impl PgExecutor<'e>, date: NaiveDate) -> Result<Vec<RouteAssignment>> {
    let query = format!(
        "SELECT {ROUTE_COLUMNS} FROM route_assignments WHERE route_date = $1 ORDER BY departure_time, created_at"
    );

    let routes = sqlx::query_as::<_, RouteAssignment>(&query)
        .bind(date)
        .fetch_all(executor)
        .await?;

    Ok(routes)
}

/// Stops of a route by stop_order
pub async fn get_route_stops<'e>(executor: impl PgExecutor<'e>, route_id: Uuid) -> Result<Vec<RouteStop>> {
    let query = format!("SELECT {STOP_COLUMNS} FROM route_stops WHERE route_id = $1 ORDER BY stop_order");

    let stops = sqlx::query_as::<_, RouteStop>(&query)
        .bind(route_id)
        .fetch_all(executor)
        .await?;

    Ok(stops)
}

/// Order links of a route, grouped by stop
pub async fn get_route_orders<'e>(executor: impl PgExecutor<'e>, route_id: Uuid) -> Result<Vec<RouteOrder>> {
    let orders = sqlx::query_as::<_, RouteOrder>(
        r#"
        SELECT ro.id, ro.route_id, ro.stop_id, ro.order_id, ro.order_number,
               ro.customer_name, ro.customer_phone, ro.delivery_status, ro.delivered_at
        FROM route_orders ro
        JOIN route_stops rs ON rs.id = ro.stop_id
        WHERE ro.route_id = $1
        ORDER BY rs.stop_order, ro.order_number
        "#
    )
    .bind(route_id)
    .fetch_all(executor)
    .await?;

    Ok(orders)
}

/// Set status, stamping completed_at / cancelled_at only when moving into
/// that status
pub async fn set_route_status(
    conn: &mut PgConnection,
    route_id: Uuid,
    status: RouteStatus,
    notes: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE route_assignments
        SET status = $2,
            notes = COALESCE($3, notes),
            completed_at = CASE WHEN $2 = 'completed'::route_status THEN NOW() ELSE completed_at END,
            cancelled_at = CASE WHEN $2 = 'cancelled'::route_status THEN NOW() ELSE cancelled_at END,
            updated_at = NOW()
        WHERE id = $1
        "#
    )
    .bind(route_id)
    .bind(status)
    .bind(notes)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Replace the assigned driver
pub async fn set_route_driver(
    conn: &mut PgConnection,
    route_id: Uuid,
    driver_id: Uuid,
    driver_name: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE route_assignments
        SET driver_id = $2, driver_name = $3, updated_at = NOW()
        WHERE id = $1
        "#
    )
    .bind(route_id)
    .bind(driver_id)
    .bind(driver_name)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Move this route's order links from one delivery status to another
pub async fn transition_route_orders(
    conn: &mut PgConnection,
    route_id: Uuid,
    from: &[RouteOrderStatus],
    to: RouteOrderStatus,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE route_orders
        SET delivery_status = $3,
            delivered_at = CASE WHEN $3 = 'delivered'::route_order_status THEN NOW() ELSE delivered_at END
        WHERE route_id = $1 AND delivery_status = ANY($2)
        "#
    )
    .bind(route_id)
    .bind(from)
    .bind(to)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Record stop progress
pub async fn update_stop(
    conn: &mut PgConnection,
    stop_id: Uuid,
    status: StopStatus,
    actual_arrival: Option<NaiveDateTime>,
    actual_travel_time_minutes: Option<i32>,
    actual_distance_km: Option<f64>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE route_stops
        SET status = $2,
            actual_arrival = COALESCE($3, actual_arrival),
            actual_travel_time_minutes = COALESCE($4, actual_travel_time_minutes),
            actual_distance_km = COALESCE($5, actual_distance_km)
        WHERE id = $1
        "#
    )
    .bind(stop_id)
    .bind(status)
    .bind(actual_arrival)
    .bind(actual_travel_time_minutes)
    .bind(actual_distance_km)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Touch the header after a stop change
pub async fn touch_route(conn: &mut PgConnection, route_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE route_assignments SET updated_at = NOW() WHERE id = $1")
        .bind(route_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Delete a route; stops and order links cascade
pub async fn delete_route(conn: &mut PgConnection, route_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM route_assignments WHERE id = $1")
        .bind(route_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}
