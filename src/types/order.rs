//! Order types (read-only view of the external order store)

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::Coordinates;

/// Order status as kept by the order store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    ReadyForDelivery,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::ReadyForDelivery => "READY_FOR_DELIVERY",
            OrderStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

/// How the customer receives the order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "delivery_method", rename_all = "snake_case")]
pub enum DeliveryMethod {
    Pickup,
    LocalDelivery,
    OverstateDelivery,
}

impl DeliveryMethod {
    /// Whether the order has to be carried by one of our drivers
    pub const fn requires_dispatch(self) -> bool {
        !matches!(self, DeliveryMethod::Pickup)
    }
}

/// Line item on an order
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub sku: String,
    pub name: String,
    pub quantity: i32,
    pub unit_price: f64,
}

/// Order as seen by the dispatch subsystem
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub delivery_address: String,
    pub delivery_lat: Option<f64>,
    pub delivery_lng: Option<f64>,
    pub delivery_method: DeliveryMethod,
    pub status: OrderStatus,
    #[sqlx(skip)]
    #[serde(default)]
    pub items: Vec<LineItem>,
}

impl Order {
    /// Coordinates already resolved by the order store, if any
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.delivery_lat, self.delivery_lng) {
            (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
            _ => None,
        }
    }

    /// Ready for delivery and needs a driver
    pub fn is_eligible(&self) -> bool {
        self.status == OrderStatus::ReadyForDelivery && self.delivery_method.requires_dispatch()
    }

    pub fn item_count(&self) -> i32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Snapshot of the customer details carried on the route sheet
    pub fn to_ref(&self) -> OrderRef {
        OrderRef {
            order_id: self.id,
            order_number: self.order_number.clone(),
            customer_name: self.customer_name.clone(),
            customer_phone: self.customer_phone.clone(),
            item_count: self.item_count(),
        }
    }
}

/// Order reference carried through aggregation and optimization.
///
/// Only `order_id` and stop membership are trusted when a route is
/// created; the link snapshots number and customer fields from the order
/// row at assignment time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRef {
    pub order_id: Uuid,
    pub order_number: String,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub item_count: i32,
}

/// Filter for listing eligible orders
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibleOrderFilter {
    /// Restrict to these orders (all eligible orders when empty)
    #[serde(default)]
    pub order_ids: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(status: OrderStatus, method: DeliveryMethod) -> Order {
        Order {
            id: Uuid::new_v4(),
            order_number: "ORD-1001".to_string(),
            customer_name: "Ada Lovelace".to_string(),
            customer_phone: Some("555-0101".to_string()),
            delivery_address: "1 Analytical Way".to_string(),
            delivery_lat: None,
            delivery_lng: None,
            delivery_method: method,
            status,
            items: vec![
                LineItem { sku: "A".into(), name: "Gear".into(), quantity: 2, unit_price: 3.5 },
                LineItem { sku: "B".into(), name: "Crank".into(), quantity: 1, unit_price: 9.0 },
            ],
        }
    }

    #[test]
    fn test_ready_local_delivery_is_eligible() {
        assert!(order(OrderStatus::ReadyForDelivery, DeliveryMethod::LocalDelivery).is_eligible());
        assert!(order(OrderStatus::ReadyForDelivery, DeliveryMethod::OverstateDelivery).is_eligible());
    }

    #[test]
    fn test_pickup_or_dispatched_is_not_eligible() {
        assert!(!order(OrderStatus::ReadyForDelivery, DeliveryMethod::Pickup).is_eligible());
        assert!(!order(OrderStatus::OutForDelivery, DeliveryMethod::LocalDelivery).is_eligible());
    }

    #[test]
    fn test_order_status_serializes_screaming() {
        let json = serde_json::to_string(&OrderStatus::ReadyForDelivery).unwrap();
        assert_eq!(json, "\"READY_FOR_DELIVERY\"");
        assert_eq!(OrderStatus::OutForDelivery.as_str(), "OUT_FOR_DELIVERY");
    }

    #[test]
    fn test_to_ref_snapshots_customer() {
        let o = order(OrderStatus::ReadyForDelivery, DeliveryMethod::LocalDelivery);
        let r = o.to_ref();
        assert_eq!(r.order_id, o.id);
        assert_eq!(r.customer_name, "Ada Lovelace");
        assert_eq!(r.item_count, 3);
    }
}
