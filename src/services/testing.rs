//! Shared fixtures for service tests

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use crate::db::MemoryRouteStore;
use crate::services::dispatch::DispatchService;
use crate::services::geocoding::MockGeocoder;
use crate::services::optimizer::{AdaptiveOptimizer, OptimizerSettings};
use crate::services::resolver::LocationResolver;
use crate::services::routing::{MockRoutingService, RoutingService};
use crate::services::trip::TripManager;
use crate::types::{
    DeliveryMethod, Driver, DriverClass, LineItem, Order, OrderStatus, PlanRouteRequest, VehicleType,
};

pub fn route_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

pub fn departure() -> NaiveDateTime {
    route_date().and_time(NaiveTime::from_hms_opt(8, 30, 0).unwrap())
}

pub fn driver(name: &str) -> Driver {
    Driver {
        id: Uuid::new_v4(),
        name: name.to_string(),
        phone: Some("555-0100".to_string()),
        email: None,
        vehicle_type: VehicleType::Van,
        license_plate: Some("DSP-001".to_string()),
        driver_class: DriverClass::Local,
        is_active: true,
    }
}

pub fn order(number: &str, address: &str) -> Order {
    Order {
        id: Uuid::new_v4(),
        order_number: number.to_string(),
        customer_name: format!("Customer {}", number),
        customer_phone: Some("555-0199".to_string()),
        delivery_address: address.to_string(),
        delivery_lat: None,
        delivery_lng: None,
        delivery_method: DeliveryMethod::LocalDelivery,
        status: OrderStatus::ReadyForDelivery,
        items: vec![LineItem {
            sku: "SKU-1".to_string(),
            name: "Crate".to_string(),
            quantity: 2,
            unit_price: 12.5,
        }],
    }
}

pub fn plan_request(order_ids: Vec<Uuid>) -> PlanRouteRequest {
    PlanRouteRequest {
        start_address: "1 Depot Way".to_string(),
        order_ids,
        vehicle_type: Some(VehicleType::Van),
        consider_traffic: false,
        departure_time: departure(),
        max_stops_per_route: None,
        service_time_per_stop: None,
    }
}

/// Store, dispatch service and trip manager wired over in-memory mocks
pub struct Harness {
    pub store: Arc<MemoryRouteStore>,
    pub dispatch: DispatchService,
    pub trips: TripManager,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_services(MockGeocoder::new(), Arc::new(MockRoutingService::new()))
    }

    pub fn with_services(geocoder: MockGeocoder, routing: Arc<dyn RoutingService>) -> Self {
        let settings = OptimizerSettings::default();
        let store = Arc::new(MemoryRouteStore::new());
        let resolver = Arc::new(LocationResolver::new(Arc::new(geocoder), Duration::from_secs(1)));
        let optimizer = Arc::new(AdaptiveOptimizer::with_routing(routing, settings.clone()));

        Self {
            dispatch: DispatchService::new(store.clone(), resolver, optimizer, settings),
            trips: TripManager::new(store.clone()),
            store,
        }
    }

    pub fn add_driver(&self, name: &str) -> Driver {
        let d = driver(name);
        self.store.insert_driver(d.clone());
        d
    }

    pub fn add_order(&self, number: &str, address: &str) -> Order {
        let o = order(number, address);
        self.store.insert_order(o.clone());
        o
    }
}
