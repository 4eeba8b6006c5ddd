//! Nominatim geocoding client

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use crate::types::Coordinates;

/// Nominatim API response
#[derive(Debug, Deserialize)]
pub struct NominatimResult {
    pub lat: String,
    pub lon: String,
    pub display_name: String,
}

/// Parsed search hit
#[derive(Debug, Clone)]
pub struct NominatimMatch {
    pub coordinates: Coordinates,
    pub display_name: String,
}

/// Nominatim geocoding client
pub struct NominatimClient {
    base_url: String,
    country_codes: Option<String>,
    client: reqwest::Client,
}

impl NominatimClient {
    /// Create a new client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("dispatch-worker/0.1")
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            country_codes: None,
            client,
        })
    }

    /// Restrict searches to a comma separated list of ISO country codes
    pub fn with_country_codes(mut self, codes: Option<String>) -> Self {
        self.country_codes = codes.filter(|c| !c.trim().is_empty());
        self
    }

    /// Build the search URL for a free-text address
    fn search_url(&self, address: &str) -> String {
        let mut url = format!(
            "{}/search?q={}&format=json&limit=1",
            self.base_url,
            urlencoding::encode(address)
        );
        if let Some(codes) = &self.country_codes {
            url.push_str("&countrycodes=");
            url.push_str(&urlencoding::encode(codes));
        }
        url
    }

    /// Geocode a free-text address
    pub async fn geocode(&self, address: &str) -> Result<Option<NominatimMatch>> {
        let response = self.client
            .get(self.search_url(address))
            .send()
            .await
            .context("Failed to send geocoding request")?;

        if !response.status().is_success() {
            anyhow::bail!("Nominatim returned status {}", response.status());
        }

        let results: Vec<NominatimResult> = response
            .json()
            .await
            .context("Failed to parse geocoding response")?;

        match results.into_iter().next() {
            Some(result) => {
                let lat: f64 = result.lat.parse().context("Invalid latitude")?;
                let lng: f64 = result.lon.parse().context("Invalid longitude")?;

                Ok(Some(NominatimMatch {
                    coordinates: Coordinates { lat, lng },
                    display_name: result.display_name,
                }))
            }
            None => Ok(None),
        }
    }
}
