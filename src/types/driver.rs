use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Vehicle used for a trip; selects the routing profile and fuel factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "vehicle_type", rename_all = "snake_case")]
pub enum VehicleType {
    #[default]
    Car,
    Van,
    Truck,
    Motorcycle,
    Bicycle,
}

impl VehicleType {
    pub const fn as_str(self) -> &'static str {
        match self {
            VehicleType::Car => "car",
            VehicleType::Van => "van",
            VehicleType::Truck => "truck",
            VehicleType::Motorcycle => "motorcycle",
            VehicleType::Bicycle => "bicycle",
        }
    }

    /// Valhalla costing model for this vehicle
    pub const fn costing(self) -> &'static str {
        match self {
            VehicleType::Car | VehicleType::Van => "auto",
            VehicleType::Truck => "truck",
            VehicleType::Motorcycle => "motorcycle",
            VehicleType::Bicycle => "bicycle",
        }
    }

    /// Multiplier applied to the per-km fuel rate
    pub const fn fuel_factor(self) -> f64 {
        match self {
            VehicleType::Car => 1.0,
            VehicleType::Van => 1.3,
            VehicleType::Truck => 2.1,
            VehicleType::Motorcycle => 0.55,
            VehicleType::Bicycle => 0.0,
        }
    }
}

impl std::str::FromStr for VehicleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "car" => Ok(VehicleType::Car),
            "van" => Ok(VehicleType::Van),
            "truck" => Ok(VehicleType::Truck),
            "motorcycle" => Ok(VehicleType::Motorcycle),
            "bicycle" => Ok(VehicleType::Bicycle),
            other => Err(format!("unknown vehicle type '{}'", other)),
        }
    }
}

/// Where a driver is allowed to deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "driver_class", rename_all = "snake_case")]
pub enum DriverClass {
    Local,
    Overstate,
}

/// Driver reference data (read-only for dispatch)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub vehicle_type: VehicleType,
    pub license_plate: Option<String>,
    pub driver_class: DriverClass,
    pub is_active: bool,
}
