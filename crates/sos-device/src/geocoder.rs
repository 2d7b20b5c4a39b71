//! Nominatim reverse geocoder

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use sos_core::geo::shorten_address;
use sos_core::{LookupError, ReverseGeocoder};
use sos_types::Coord;
use tracing::instrument;

use crate::error::{DeviceError, DeviceResult};

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    display_name: Option<String>,
}

/// Reverse geocoding against a Nominatim-compatible `/reverse` endpoint
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    endpoint: String,
}

impl NominatimGeocoder {
    pub fn new(
        endpoint: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
    ) -> DeviceResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| DeviceError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    #[instrument(skip_all, fields(lat = coord.lat, lng = coord.lng))]
    async fn reverse(&self, coord: Coord) -> Result<String, LookupError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("format", "json".to_string()),
                ("lat", coord.lat.to_string()),
                ("lon", coord.lng.to_string()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LookupError::LookupFailed(e.to_string()))?;

        let body: ReverseResponse = response
            .json()
            .await
            .map_err(|e| LookupError::LookupFailed(e.to_string()))?;

        body.display_name
            .filter(|name| !name.trim().is_empty())
            .map(|name| shorten_address(&name))
            .ok_or_else(|| LookupError::LookupFailed("response has no display name".to_string()))
    }
}
