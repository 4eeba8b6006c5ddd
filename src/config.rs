//! Configuration management

use anyhow::{Context, Result};

use crate::services::optimizer::OptimizerSettings;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// NATS server URL
    pub nats_url: String,

    /// PostgreSQL connection string (serve falls back to the in-memory store
    /// when unset, migrate refuses to run)
    pub database_url: Option<String>,

    /// Nominatim API URL (for geocoding)
    pub nominatim_url: String,

    /// Comma separated ISO codes restricting Nominatim searches
    pub nominatim_country_codes: Option<String>,

    /// Valhalla routing engine URL (optional, falls back to mock if unavailable)
    pub valhalla_url: Option<String>,

    /// "mock" or "nominatim"
    pub geocoder_backend: String,

    pub optimizer: OptimizerSettings,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let nats_url = std::env::var("NATS_URL")
            .unwrap_or_else(|_| "nats://localhost:4222".to_string());

        let database_url = non_empty_var("DATABASE_URL");

        let nominatim_url = std::env::var("NOMINATIM_URL")
            .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string());

        let nominatim_country_codes = non_empty_var("NOMINATIM_COUNTRY_CODES");

        let valhalla_url = non_empty_var("VALHALLA_URL");

        let geocoder_backend = std::env::var("GEOCODER_BACKEND")
            .unwrap_or_else(|_| "mock".to_string())
            .to_ascii_lowercase();

        let optimizer = OptimizerSettings::from_env().context("Invalid optimizer settings")?;

        Ok(Self {
            nats_url,
            database_url,
            nominatim_url,
            nominatim_country_codes,
            valhalla_url,
            geocoder_backend,
            optimizer,
        })
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url.as_deref().context("DATABASE_URL must be set")
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
