//! Valhalla routing engine client
//!
//! Valhalla API documentation:
//! https://valhalla.github.io/valhalla/api/matrix/api-reference/

use async_trait::async_trait;
use anyhow::{Result, Context};
use chrono::NaiveDateTime;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::Coordinates;
use super::{RoutingService, DistanceTimeMatrices, MatrixOptions, UNREACHABLE};

/// Valhalla client configuration
#[derive(Debug, Clone)]
pub struct ValhallaConfig {
    /// Base URL of Valhalla server (e.g., "http://localhost:8002")
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for ValhallaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8002".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl ValhallaConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

/// Valhalla routing client
pub struct ValhallaClient {
    client: Client,
    config: ValhallaConfig,
}

impl ValhallaClient {
    pub fn new(config: ValhallaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    /// Build the sources_to_targets request
    fn build_matrix_request(&self, locations: &[Coordinates], options: &MatrixOptions) -> MatrixRequest {
        let locs: Vec<ValhallaLocation> = locations
            .iter()
            .map(|c| ValhallaLocation {
                lat: c.lat,
                lon: c.lng,
                // Geocoded points are often building centroids, not road edges
                radius: Some(500),
            })
            .collect();

        MatrixRequest {
            sources: locs.clone(),
            targets: locs,
            costing: options.vehicle_type.costing().to_string(),
            units: "kilometers".to_string(),
            date_time: options.departure.map(DateTimeOption::depart_at),
        }
    }
}

#[async_trait]
impl RoutingService for ValhallaClient {
    async fn get_matrices(
        &self,
        locations: &[Coordinates],
        options: &MatrixOptions,
    ) -> Result<DistanceTimeMatrices> {
        let n = locations.len();

        if n == 0 {
            return Ok(DistanceTimeMatrices::empty());
        }

        if n == 1 {
            return Ok(DistanceTimeMatrices {
                distances: vec![vec![0]],
                durations: vec![vec![0]],
                size: 1,
            });
        }

        let request = self.build_matrix_request(locations, options);
        let url = format!("{}/sources_to_targets", self.config.base_url);

        debug!("Requesting distance matrix from Valhalla for {} locations", n);

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Valhalla")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Valhalla returned error {}: {}", status, body);
        }

        let matrix_response: MatrixResponse = response
            .json()
            .await
            .context("Failed to parse Valhalla response")?;

        let matrices = matrices_from_response(matrix_response, n)?;
        debug!("Received distance matrix from Valhalla: {}x{}", n, n);

        Ok(matrices)
    }

    fn name(&self) -> &str {
        "Valhalla"
    }
}

/// Convert a sources_to_targets response into meter/second matrices. A
/// response that is not exactly `n` rows of `n` cells is an error; missing
/// values inside a full row become `UNREACHABLE`.
fn matrices_from_response(response: MatrixResponse, n: usize) -> Result<DistanceTimeMatrices> {
    let rows = &response.sources_to_targets;
    if rows.len() != n || rows.iter().any(|row| row.len() != n) {
        anyhow::bail!(
            "Valhalla returned a {}-row matrix (row sizes {:?}) for {} locations",
            rows.len(),
            rows.iter().map(Vec::len).collect::<Vec<_>>(),
            n
        );
    }

    let mut distances = vec![vec![0u64; n]; n];
    let mut durations = vec![vec![0u64; n]; n];

    for (i, row) in rows.iter().enumerate() {
        for (j, cell) in row.iter().enumerate() {
            // km -> m
            distances[i][j] = cell.distance
                .map(|d| (d * 1000.0) as u64)
                .unwrap_or_else(|| {
                    warn!("No distance for route {} -> {}", i, j);
                    UNREACHABLE
                });

            durations[i][j] = cell.time
                .map(|t| t as u64)
                .unwrap_or_else(|| {
                    warn!("No duration for route {} -> {}", i, j);
                    UNREACHABLE
                });
        }
    }

    Ok(DistanceTimeMatrices {
        distances,
        durations,
        size: n,
    })
}

// Valhalla API types

#[derive(Debug, Serialize)]
struct MatrixRequest {
    sources: Vec<ValhallaLocation>,
    targets: Vec<ValhallaLocation>,
    costing: String,
    units: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_time: Option<DateTimeOption>,
}

/// Time-dependent costing; type 1 = depart at `value` (local time)
#[derive(Debug, Serialize)]
struct DateTimeOption {
    #[serde(rename = "type")]
    kind: u8,
    value: String,
}

impl DateTimeOption {
    fn depart_at(departure: NaiveDateTime) -> Self {
        Self {
            kind: 1,
            value: departure.format("%Y-%m-%dT%H:%M").to_string(),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
struct ValhallaLocation {
    lat: f64,
    lon: f64,
    /// Radius in meters for snapping to roads
    #[serde(skip_serializing_if = "Option::is_none")]
    radius: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    sources_to_targets: Vec<Vec<MatrixCell>>,
}

#[derive(Debug, Deserialize)]
struct MatrixCell {
    /// Distance in kilometers (when units="kilometers")
    distance: Option<f64>,
    /// Time in seconds
    time: Option<f64>,
}
