use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::config::GeocodingConfig;
use crate::domain::{fold_diacritics, Coordinates};
use crate::error::{IntegrationError, Result};

/// Address -> coordinate lookup over a network, consumed through this
/// narrow interface. Provider identity is a deployment concern.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn lookup(&self, query: &str) -> Result<Option<Coordinates>>;
}

/// Builds the configured provider, wrapped in the rate-limit floor.
pub fn build_geocoder(config: &GeocodingConfig) -> Result<Arc<dyn Geocoder>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .build()?;

    let inner: Box<dyn Geocoder> = match config.provider.as_str() {
        "nominatim" => Box::new(NominatimGeocoder { client }),
        "opencage" => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                IntegrationError::Config(
                    "geocoding provider 'opencage' requires an api_key".to_string(),
                )
            })?;
            Box::new(OpenCageGeocoder { client, api_key })
        }
        "disabled" => return Ok(Arc::new(DisabledGeocoder)),
        other => {
            return Err(IntegrationError::Config(format!(
                "unknown geocoding provider '{}'. Valid providers: nominatim, opencage, disabled",
                other
            )))
        }
    };

    Ok(Arc::new(RateLimitedGeocoder::new(
        inner,
        Duration::from_millis(config.delay_ms),
    )))
}

/// Mobile units and agricultural service points have no fixed address;
/// looking them up would geocode the depot town at best.
pub fn is_mobile_or_agricultural(address: &str) -> bool {
    let folded = fold_diacritics(&address.to_lowercase());
    folded.contains("movil") || folded.contains("agricola")
}

/// Chooses whether and how to look up coordinates for a station.
///
/// Full address first, municipality fallback second; every provider failure
/// degrades to a miss.
pub async fn resolve_coordinates(
    geocoder: &dyn Geocoder,
    address: Option<&str>,
    municipality: Option<&str>,
    province: Option<&str>,
) -> Option<Coordinates> {
    if let Some(address) = address {
        if is_mobile_or_agricultural(address) {
            debug!(address, "skipping lookup for mobile/agricultural unit");
            return None;
        }
    }

    let street = address.map(str::trim).filter(|a| !a.is_empty());
    let town = municipality.map(str::trim).filter(|m| !m.is_empty());

    if let Some(street) = street {
        let query = build_query(Some(street), town, province);
        match geocoder.lookup(&query).await {
            Ok(Some(coords)) => return Some(coords),
            Ok(None) => warn!(%query, "no coordinates found for street address"),
            Err(e) => warn!(%query, error = %e, "lookup failed, treating as miss"),
        }
    }

    let town = town?;
    debug!(municipality = town, "falling back to municipality lookup");
    let query = build_query(None, Some(town), province);
    match geocoder.lookup(&query).await {
        Ok(coords) => coords,
        Err(e) => {
            warn!(%query, error = %e, "fallback lookup failed, treating as miss");
            None
        }
    }
}

fn build_query(address: Option<&str>, municipality: Option<&str>, province: Option<&str>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(address) = address {
        parts.push(address);
    }
    if let Some(municipality) = municipality.map(str::trim).filter(|m| !m.is_empty()) {
        parts.push(municipality);
    }
    if let Some(province) = province.map(str::trim).filter(|p| !p.is_empty()) {
        parts.push(province);
    }
    parts.push("España");
    parts.join(", ")
}

/// Enforces a fixed delay floor between successive provider calls.
pub struct RateLimitedGeocoder {
    inner: Box<dyn Geocoder>,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimitedGeocoder {
    pub fn new(inner: Box<dyn Geocoder>, min_interval: Duration) -> Self {
        Self {
            inner,
            min_interval,
            last_call: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Geocoder for RateLimitedGeocoder {
    async fn lookup(&self, query: &str) -> Result<Option<Coordinates>> {
        {
            let mut last_call = self.last_call.lock().await;
            if let Some(last) = *last_call {
                let elapsed = last.elapsed();
                if elapsed < self.min_interval {
                    tokio::time::sleep(self.min_interval - elapsed).await;
                }
            }
            *last_call = Some(Instant::now());
        }
        self.inner.lookup(query).await
    }
}

/// Free OpenStreetMap geocoder, no API key required.
pub struct NominatimGeocoder {
    client: reqwest::Client,
}

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";

#[derive(Debug, Deserialize)]
struct NominatimResult {
    lat: String,
    lon: String,
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn lookup(&self, query: &str) -> Result<Option<Coordinates>> {
        let results: Vec<NominatimResult> = self
            .client
            .get(NOMINATIM_URL)
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await?
            .json()
            .await?;

        let Some(first) = results.first() else {
            return Ok(None);
        };

        let latitude = first.lat.parse::<f64>().map_err(|e| {
            IntegrationError::Geocoding(format!("unparseable latitude '{}': {}", first.lat, e))
        })?;
        let longitude = first.lon.parse::<f64>().map_err(|e| {
            IntegrationError::Geocoding(format!("unparseable longitude '{}': {}", first.lon, e))
        })?;

        Ok(Some(Coordinates {
            latitude,
            longitude,
        }))
    }
}

/// OpenCage geocoder. Free tier: 2,500 requests/day, 1 request/second.
pub struct OpenCageGeocoder {
    client: reqwest::Client,
    api_key: String,
}

const OPENCAGE_URL: &str = "https://api.opencagedata.com/geocode/v1/json";

#[derive(Debug, Deserialize)]
struct OpenCageResponse {
    status: OpenCageStatus,
    #[serde(default)]
    results: Vec<OpenCageResult>,
}

#[derive(Debug, Deserialize)]
struct OpenCageStatus {
    code: u16,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct OpenCageResult {
    geometry: OpenCageGeometry,
}

#[derive(Debug, Deserialize)]
struct OpenCageGeometry {
    lat: f64,
    lng: f64,
}

#[async_trait]
impl Geocoder for OpenCageGeocoder {
    async fn lookup(&self, query: &str) -> Result<Option<Coordinates>> {
        let response: OpenCageResponse = self
            .client
            .get(OPENCAGE_URL)
            .query(&[
                ("q", query),
                ("key", self.api_key.as_str()),
                ("countrycode", "es"),
                ("limit", "1"),
                ("no_annotations", "1"),
                ("language", "es"),
            ])
            .send()
            .await?
            .json()
            .await?;

        match response.status.code {
            200 => Ok(response.results.first().map(|r| Coordinates {
                latitude: r.geometry.lat,
                longitude: r.geometry.lng,
            })),
            402 => {
                error!("OpenCage daily request quota exceeded");
                Ok(None)
            }
            403 => {
                error!("OpenCage API key invalid or access denied");
                Ok(None)
            }
            429 => {
                warn!("OpenCage per-second rate limit hit");
                Ok(None)
            }
            code => {
                warn!(code, message = %response.status.message, "OpenCage returned an error status");
                Ok(None)
            }
        }
    }
}

/// No-op geocoder for offline runs; every lookup is a miss.
pub struct DisabledGeocoder;

#[async_trait]
impl Geocoder for DisabledGeocoder {
    async fn lookup(&self, _query: &str) -> Result<Option<Coordinates>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedGeocoder {
        answer: Option<Coordinates>,
    }

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn lookup(&self, _query: &str) -> Result<Option<Coordinates>> {
            Ok(self.answer)
        }
    }

    struct FailingGeocoder;

    #[async_trait]
    impl Geocoder for FailingGeocoder {
        async fn lookup(&self, _query: &str) -> Result<Option<Coordinates>> {
            Err(IntegrationError::Geocoding("provider down".to_string()))
        }
    }

    #[test]
    fn detects_mobile_and_agricultural_addresses() {
        assert!(is_mobile_or_agricultural("Unidad MÓVIL comarca norte"));
        assert!(is_mobile_or_agricultural("servicio agrícola itinerante"));
        assert!(is_mobile_or_agricultural("ITV movil"));
        assert!(!is_mobile_or_agricultural("Calle Mayor 3"));
    }

    #[test]
    fn query_joins_parts_with_country_suffix() {
        assert_eq!(
            build_query(Some("Calle Mayor 3"), Some("Silla"), Some("Valencia")),
            "Calle Mayor 3, Silla, Valencia, España"
        );
        assert_eq!(build_query(None, Some("Silla"), None), "Silla, España");
    }

    #[tokio::test]
    async fn mobile_address_skips_lookup_entirely() {
        let geocoder = FixedGeocoder {
            answer: Some(Coordinates {
                latitude: 39.0,
                longitude: -0.4,
            }),
        };
        let coords = resolve_coordinates(
            &geocoder,
            Some("Unidad móvil agrícola"),
            Some("Silla"),
            Some("Valencia"),
        )
        .await;
        assert!(coords.is_none());
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_miss() {
        let coords = resolve_coordinates(
            &FailingGeocoder,
            Some("Calle Mayor 3"),
            Some("Silla"),
            Some("Valencia"),
        )
        .await;
        assert!(coords.is_none());
    }

    #[tokio::test]
    async fn missing_address_falls_back_to_municipality() {
        let geocoder = FixedGeocoder {
            answer: Some(Coordinates {
                latitude: 39.363,
                longitude: -0.411,
            }),
        };
        let coords = resolve_coordinates(&geocoder, None, Some("Silla"), Some("Valencia")).await;
        assert_eq!(coords.unwrap().latitude, 39.363);
    }
}
