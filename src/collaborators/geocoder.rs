//! Nominatim reverse geocoder

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{check_status, CollaboratorError, Geocoder};
use crate::matching::location::shape_address;

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    display_name: Option<String>,
    error: Option<String>,
}

pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CollaboratorError> {
        // Nominatim's usage policy requires an identifying agent
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hustlr/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

fn place_from(response: ReverseResponse) -> Result<String, CollaboratorError> {
    match (response.display_name, response.error) {
        (Some(address), _) if !address.trim().is_empty() => Ok(shape_address(&address)),
        (_, Some(error)) => Err(CollaboratorError::Unexpected(error)),
        _ => Err(CollaboratorError::Unexpected("no address for coordinates".into())),
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> Result<String, CollaboratorError> {
        let url = format!("{}/reverse", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("accept-language", "en".to_string()),
            ])
            .send()
            .await?;
        let response: ReverseResponse = check_status(response).await?.json().await?;
        let place = place_from(response)?;
        tracing::debug!(latitude, longitude, place = %place, "Reverse geocoded");
        Ok(place)
    }
}
