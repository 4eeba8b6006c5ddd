//! Dispatch Worker - delivery route assignment and trip lifecycle service
//!
//! This worker connects to NATS and handles dispatch requests from the admin
//! frontend.

mod cli;
mod config;
mod db;
mod error;
mod handlers;
mod services;
mod types;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command, OptimizeArgs};
use crate::config::Config;
use crate::db::{MemoryRouteStore, PgRouteStore, RouteStore};
use crate::services::dispatch::DispatchService;
use crate::services::geocoding::{create_geocoder, Geocoder};
use crate::services::optimizer::{optimize_addresses, AdaptiveOptimizer};
use crate::services::resolver::LocationResolver;
use crate::services::routing::{create_routing_service_with_fallback, RoutingService};
use crate::services::trip::TripManager;
use crate::types::OptimizeOptions;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs directory - use LOGS_DIR env var or default to ../logs (relative to worker)
    let logs_dir = std::env::var("LOGS_DIR")
        .unwrap_or_else(|_| "../logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        &logs_dir,
        "dispatch-worker.log",
    );
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Initialize logging - both stdout and file
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,dispatch_worker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    info!("Configuration loaded");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Migrate => migrate(config).await,
        Command::Optimize(args) => optimize(config, args).await,
    }
}

async fn migrate(config: Config) -> Result<()> {
    let pool = db::create_pool(config.require_database_url()?).await?;
    info!("Connected to PostgreSQL");

    db::run_migrations(&pool).await
}

/// Geocoder wrapped in the timeout-bounded resolver
fn build_resolver(config: &Config) -> Result<Arc<LocationResolver>> {
    let timeout = config.optimizer.geocode_timeout();
    let geocoder: Arc<dyn Geocoder> = Arc::from(create_geocoder(
        &config.geocoder_backend,
        &config.nominatim_url,
        config.nominatim_country_codes.clone(),
        timeout,
    )?);
    info!("Geocoder initialized: {}", geocoder.name());

    Ok(Arc::new(LocationResolver::new(geocoder, timeout)))
}

async fn build_optimizer(config: &Config) -> Arc<AdaptiveOptimizer> {
    let settings = &config.optimizer;
    let routing: Arc<dyn RoutingService> = Arc::from(
        create_routing_service_with_fallback(
            config.valhalla_url.clone(),
            settings.provider_timeout_secs,
            settings.traffic_peak_factor,
        )
        .await,
    );
    info!("Routing service initialized: {}", routing.name());

    Arc::new(AdaptiveOptimizer::with_routing(routing, settings.clone()))
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting Dispatch Worker...");

    let store: Arc<dyn RouteStore> = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url).await?;
            info!("Connected to PostgreSQL");

            db::run_migrations(&pool).await?;
            Arc::new(PgRouteStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, routes are kept in memory and lost on restart");
            Arc::new(MemoryRouteStore::new())
        }
    };
    info!("Route store: {}", store.name());

    let resolver = build_resolver(&config)?;
    let optimizer = build_optimizer(&config).await;

    let dispatch = Arc::new(DispatchService::new(
        store.clone(),
        resolver,
        optimizer,
        config.optimizer.clone(),
    ));
    let trips = Arc::new(TripManager::new(store));

    // Connect to NATS (supports optional NATS_USER/NATS_PASSWORD auth).
    let nats_client = match (std::env::var("NATS_USER"), std::env::var("NATS_PASSWORD")) {
        (Ok(user), Ok(password)) if !user.is_empty() => {
            async_nats::ConnectOptions::new()
                .user_and_password(user, password)
                .connect(&config.nats_url)
                .await?
        }
        _ => async_nats::connect(&config.nats_url).await?,
    };
    info!("Connected to NATS at {}", config.nats_url);

    if let Err(e) = handlers::start_handlers(nats_client, dispatch, trips).await {
        error!("Handler error: {}", e);
        return Err(e);
    }

    Ok(())
}

/// Run the optimizer over plain addresses and print the plan
async fn optimize(config: Config, args: OptimizeArgs) -> Result<()> {
    let resolver = build_resolver(&config)?;
    let optimizer = build_optimizer(&config).await;

    let options = OptimizeOptions {
        vehicle_type: args.vehicle,
        consider_traffic: args.traffic,
        departure_time: args
            .departure
            .unwrap_or_else(|| chrono::Local::now().naive_local()),
        max_stops_per_route: args.max_stops.unwrap_or(config.optimizer.max_stops_per_route),
        service_time_per_stop: args
            .service_minutes
            .unwrap_or(config.optimizer.service_minutes_per_stop),
    };

    let plan = optimize_addresses(&resolver, optimizer.as_ref(), &args.start, &args.stops, options).await?;
    println!("{}", serde_json::to_string_pretty(&plan)?);

    Ok(())
}
