//! Nominatim geocoding client
//!
//! HTTP adapter behind the [`GeocodingProvider`] port. Uses the public
//! Nominatim endpoints: `/search` for forward geocoding and `/reverse` for
//! place candidates. Nominatim usage policy requires an identifying
//! User-Agent.

use crate::geo::GeocodingProvider;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use veriloc_common::config::GeoConfig;
use veriloc_common::{Coordinate, Error, PlaceCandidate, Result};

const NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org";
const USER_AGENT: &str = "veriloc/0.1.0 (location capture pipeline)";

/// Forward geocoding response entry (`/search`)
#[derive(Debug, Deserialize)]
struct SearchEntry {
    /// Latitude as a decimal string, per the Nominatim wire format
    lat: String,
    /// Longitude as a decimal string
    lon: String,
}

/// Reverse geocoding response (`/reverse`)
#[derive(Debug, Deserialize)]
struct ReverseEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<ReverseAddress>,
}

#[derive(Debug, Default, Deserialize)]
struct ReverseAddress {
    #[serde(default)]
    road: Option<String>,
    #[serde(default)]
    house_number: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    town: Option<String>,
    #[serde(default)]
    village: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    postcode: Option<String>,
}

impl ReverseEntry {
    fn into_candidate(self) -> PlaceCandidate {
        let address = self.address.unwrap_or_default();
        let street = match (&address.house_number, &address.road) {
            (Some(number), Some(road)) => Some(format!("{} {}", number, road)),
            (None, Some(road)) => Some(road.clone()),
            _ => None,
        };
        PlaceCandidate {
            name: self.name.filter(|n| !n.is_empty()),
            street,
            city: address.city.or(address.town).or(address.village),
            region: address.state,
            postal_code: address.postcode,
        }
    }
}

/// Nominatim API client
pub struct NominatimClient {
    http_client: reqwest::Client,
    base_url: String,
    max_candidates: usize,
}

impl NominatimClient {
    pub fn new(config: &GeoConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| Error::ProviderUnavailable(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: NOMINATIM_BASE_URL.to_string(),
            max_candidates: config.max_candidates,
        })
    }

    /// Point the client at a different Nominatim instance
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        tracing::debug!(url = %url, "Querying geocoding provider");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ProviderUnavailable(format!(
                "geocoding provider returned {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("unparseable response: {}", e)))
    }
}

#[async_trait]
impl GeocodingProvider for NominatimClient {
    async fn forward_geocode(&self, query: &str) -> Result<Option<Coordinate>> {
        let url = format!(
            "{}/search?q={}&format=jsonv2&limit=1",
            self.base_url,
            urlencode(query)
        );
        let entries: Vec<SearchEntry> = self.get_json(&url).await?;

        let Some(entry) = entries.into_iter().next() else {
            tracing::debug!(query = %query, "Forward geocode found nothing");
            return Ok(None);
        };

        let latitude: f64 = entry
            .lat
            .parse()
            .map_err(|_| Error::ProviderUnavailable(format!("bad latitude: {}", entry.lat)))?;
        let longitude: f64 = entry
            .lon
            .parse()
            .map_err(|_| Error::ProviderUnavailable(format!("bad longitude: {}", entry.lon)))?;

        let coordinate = Coordinate::new(latitude, longitude)
            .map_err(|e| Error::ProviderUnavailable(e.to_string()))?;

        tracing::info!(
            query = %query,
            latitude,
            longitude,
            "Forward geocode resolved"
        );
        Ok(Some(coordinate))
    }

    async fn reverse_geocode(&self, coordinate: Coordinate) -> Result<Vec<PlaceCandidate>> {
        let url = format!(
            "{}/reverse?lat={}&lon={}&format=jsonv2",
            self.base_url, coordinate.latitude, coordinate.longitude
        );
        let entry: ReverseEntry = self.get_json(&url).await?;

        let candidate = entry.into_candidate();
        // Nominatim's reverse endpoint yields a single best match; keep the
        // list shape the port promises, capped like any other candidate list
        let candidates: Vec<PlaceCandidate> = std::iter::once(candidate)
            .filter(|c| *c != PlaceCandidate::default())
            .take(self.max_candidates)
            .collect();

        tracing::debug!(
            latitude = coordinate.latitude,
            longitude = coordinate.longitude,
            candidates = candidates.len(),
            "Reverse geocode resolved"
        );
        Ok(candidates)
    }
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
