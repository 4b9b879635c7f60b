use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use super::{Address, GeocodeError, ReverseGeocoder};
use crate::error::{Error, Result};

pub const DEFAULT_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_USER_AGENT: &str = concat!("fotosort/", env!("CARGO_PKG_VERSION"));

/// Body of a Nominatim `/reverse` response.
#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    error: Option<String>,
}

/// Reverse geocoding through a Nominatim server.
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::GeocoderUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl ReverseGeocoder for NominatimGeocoder {
    fn reverse(&self, latitude: f64, longitude: f64) -> std::result::Result<Address, GeocodeError> {
        if !valid_coordinates(latitude, longitude) {
            return Err(GeocodeError::InvalidInput(format!("{},{}", latitude, longitude)));
        }

        let response = self
            .client
            .get(format!("{}/reverse", self.base_url))
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("addressdetails", "1".to_string()),
            ])
            .send()
            .map_err(|e| GeocodeError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            return Err(GeocodeError::InvalidInput(format!(
                "{},{} rejected with HTTP {}",
                latitude, longitude, status
            )));
        }
        if !status.is_success() {
            return Err(GeocodeError::Unavailable(format!("HTTP {}", status)));
        }

        let body: ReverseResponse = response
            .json()
            .map_err(|e| GeocodeError::Unavailable(format!("unreadable response: {}", e)))?;
        into_address(body)
    }
}

fn valid_coordinates(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}

/// Keep the string-valued address components of a response.
fn into_address(body: ReverseResponse) -> std::result::Result<Address, GeocodeError> {
    if let Some(error) = body.error {
        return Err(GeocodeError::InvalidInput(error));
    }
    let Some(address) = body.address else {
        return Err(GeocodeError::InvalidInput("response has no address".to_string()));
    };

    Ok(address
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(s) => Some((key, s)),
            _ => None,
        })
        .collect())
}
