// src/services/geocoder.rs

//! Geocoder capability and backends.
//!
//! `Ok(None)` means the geocoder answered but found nothing; `Err` means the
//! lookup itself failed. The location resolver caches the former and only
//! counts the latter.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Coordinates;

/// Resolves a free-text location to coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, location: &str) -> Result<Option<Coordinates>>;
}

/// Adapts a plain closure into a [`Geocoder`].
pub struct GeocoderFn<F>(F);

impl<F> GeocoderFn<F>
where
    F: Fn(&str) -> Result<Option<Coordinates>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> Geocoder for GeocoderFn<F>
where
    F: Fn(&str) -> Result<Option<Coordinates>> + Send + Sync,
{
    async fn geocode(&self, location: &str) -> Result<Option<Coordinates>> {
        (self.0)(location)
    }
}

#[cfg(feature = "geocode")]
pub use http::HttpGeocoder;

#[cfg(feature = "geocode")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde::Deserialize;
    use url::Url;

    use super::Geocoder;
    use crate::error::{AppError, Result};
    use crate::models::{Coordinates, GeocoderConfig};

    /// One hit from a Nominatim-style `search` response.
    #[derive(Debug, Deserialize)]
    struct SearchHit {
        lat: String,
        lon: String,
    }

    /// Geocoder backed by a Nominatim-compatible HTTP endpoint.
    pub struct HttpGeocoder {
        client: reqwest::Client,
        endpoint: Url,
    }

    impl HttpGeocoder {
        pub fn new(config: &GeocoderConfig) -> Result<Self> {
            let endpoint = config
                .endpoint
                .as_deref()
                .ok_or_else(|| AppError::config("geocoder.endpoint is not set"))?;
            let endpoint = Url::parse(endpoint)
                .map_err(|e| AppError::config(format!("invalid geocoder endpoint: {e}")))?;

            let client = reqwest::Client::builder()
                .user_agent(&config.user_agent)
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .map_err(|e| AppError::config(format!("failed to build HTTP client: {e}")))?;

            Ok(Self { client, endpoint })
        }

        fn search_url(&self, location: &str) -> Url {
            let mut url = self.endpoint.clone();
            url.query_pairs_mut()
                .append_pair("format", "json")
                .append_pair("limit", "1")
                .append_pair("q", location);
            url
        }
    }

    #[async_trait]
    impl Geocoder for HttpGeocoder {
        async fn geocode(&self, location: &str) -> Result<Option<Coordinates>> {
            let failed = |e: reqwest::Error| AppError::geocode(location, e);
            let hits: Vec<SearchHit> = self
                .client
                .get(self.search_url(location))
                .send()
                .await
                .map_err(failed)?
                .error_for_status()
                .map_err(failed)?
                .json()
                .await
                .map_err(failed)?;

            let Some(hit) = hits.into_iter().next() else {
                log::debug!("Geocoder found nothing for '{location}'");
                return Ok(None);
            };

            let lat = hit
                .lat
                .parse::<f64>()
                .map_err(|e| AppError::geocode(location, format!("bad latitude: {e}")))?;
            let lng = hit
                .lon
                .parse::<f64>()
                .map_err(|e| AppError::geocode(location, format!("bad longitude: {e}")))?;
            Ok(Some(Coordinates::new(lat, lng)))
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[tokio::test]
    async fn test_closure_geocoder() {
        let geocoder = GeocoderFn::new(|location: &str| match location {
            "chicago" => Ok(Some(Coordinates::new(41.8781, -87.6298))),
            "atlantis" => Ok(None),
            other => Err(AppError::geocode(other, "unreachable")),
        });

        assert_eq!(
            geocoder.geocode("chicago").await.unwrap(),
            Some(Coordinates::new(41.8781, -87.6298))
        );
        assert_eq!(geocoder.geocode("atlantis").await.unwrap(), None);
        assert!(geocoder.geocode("mars").await.is_err());
    }
}
