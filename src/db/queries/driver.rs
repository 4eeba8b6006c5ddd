//! Driver queries (read-only reference data)

use anyhow::Result;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::types::Driver;

/// Get a driver by id
pub async fn get_driver<'e>(executor: impl PgExecutor<'e>, id: Uuid) -> Result<Option<Driver>> {
    let driver = sqlx::query_as::<_, Driver>(
        r#"
        SELECT id, name, phone, email, vehicle_type, license_plate, driver_class, is_active
        FROM drivers
        WHERE id = $1
        "#
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(driver)
}
