//! Forward geocoding against a Mapbox-style places endpoint.

use crate::error::{Result, SourceError};
use crate::http::{build_client, ensure_success};
use crate::record::Coordinates;
use crate::source::Geocoder;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use url::Url;

pub const DEFAULT_GEOCODING_ENDPOINT: &str = "https://api.mapbox.com/geocoding/v5/mapbox.places/";

/// Request shaping for the geocoding service.
#[derive(Debug, Clone)]
pub struct GeocoderOptions {
    pub endpoint: Url,
    /// Bias results towards this point.
    pub proximity: Option<Coordinates>,
    /// Comma-separated ISO country codes.
    pub country: Option<String>,
    pub limit: Option<u8>,
    pub timeout_secs: u64,
}

impl GeocoderOptions {
    pub fn new() -> Result<Self> {
        let endpoint = Url::parse(DEFAULT_GEOCODING_ENDPOINT)
            .map_err(|e| SourceError::InvalidUrl(format!("{}: {}", DEFAULT_GEOCODING_ENDPOINT, e)))?;
        Ok(Self {
            endpoint,
            proximity: None,
            country: None,
            limit: None,
            timeout_secs: 10,
        })
    }

    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_proximity(mut self, proximity: Coordinates) -> Self {
        self.proximity = Some(proximity);
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_limit(mut self, limit: u8) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One candidate returned by the service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodeCandidate {
    pub label: Option<String>,
    pub center: Coordinates,
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    center: Option<[f64; 2]>,
    #[serde(default)]
    place_name: Option<String>,
}

#[derive(Clone)]
pub struct MapboxGeocoder {
    client: Client,
    token: String,
    options: GeocoderOptions,
}

impl fmt::Debug for MapboxGeocoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapboxGeocoder")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl MapboxGeocoder {
    pub fn new(token: impl Into<String>, options: GeocoderOptions) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(SourceError::MissingCredentials(
                "geocoding access token is empty".to_string(),
            ));
        }
        let client = build_client(options.timeout_secs)?;
        Ok(Self {
            client,
            token,
            options,
        })
    }

    fn query_url(&self, query: &str) -> Result<Url> {
        let mut url = self.options.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                SourceError::InvalidUrl(format!("{} cannot be a base", self.options.endpoint))
            })?
            .pop_if_empty()
            .push(&format!("{}.json", query));
        Ok(url)
    }

    /// All candidates for a free-text query, best first.
    pub async fn search(&self, query: &str) -> Result<Vec<GeocodeCandidate>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.query_url(query)?;
        let mut params: Vec<(&str, String)> = vec![("access_token", self.token.clone())];
        if let Some(p) = self.options.proximity {
            params.push(("proximity", format!("{},{}", p.longitude, p.latitude)));
        }
        if let Some(ref country) = self.options.country {
            params.push(("country", country.clone()));
        }
        if let Some(limit) = self.options.limit {
            params.push(("limit", limit.to_string()));
        }

        debug!("Geocoding '{}'", query);
        let response = self.client.get(url).query(&params).send().await?;
        let collection: FeatureCollection = ensure_success(response)?.json().await?;

        let candidates: Vec<GeocodeCandidate> = collection
            .features
            .into_iter()
            .filter_map(|feature| {
                let [lng, lat] = feature.center?;
                let center = Coordinates::new(lng, lat);
                center.is_finite().then_some(GeocodeCandidate {
                    label: feature.place_name,
                    center,
                })
            })
            .collect();

        debug!("'{}' produced {} candidates", query, candidates.len());
        Ok(candidates)
    }
}

impl Geocoder for MapboxGeocoder {
    async fn forward(&self, address: &str) -> Result<Option<Coordinates>> {
        let candidates = self.search(address).await?;
        Ok(candidates.into_iter().next().map(|c| c.center))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path, query_param},
    };

    async fn geocoder_for(server: &MockServer) -> MapboxGeocoder {
        let endpoint = Url::parse(&format!("{}/geocoding/v5/mapbox.places/", server.uri())).unwrap();
        let options = GeocoderOptions::new()
            .unwrap()
            .with_endpoint(endpoint)
            .with_country("us")
            .with_proximity(Coordinates::new(-74.006, 40.7128));
        MapboxGeocoder::new("pk.test", options).unwrap()
    }

    #[tokio::test]
    async fn test_forward_takes_first_candidate() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/geocoding/v5/mapbox.places/1%20Main%20St.json"))
            .and(query_param("access_token", "pk.test"))
            .and(query_param("country", "us"))
            .and(query_param("proximity", "-74.006,40.7128"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "features": [
                    {"place_name": "1 Main St, Queens", "center": [-73.5, 40.6]},
                    {"place_name": "1 Main St, Elsewhere", "center": [-80.0, 35.0]}
                ]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let geocoder = geocoder_for(&mock_server).await;
        let coordinates = geocoder.forward("1 Main St").await.unwrap();

        assert_eq!(coordinates, Some(Coordinates::new(-73.5, 40.6)));
    }

    #[tokio::test]
    async fn test_forward_without_candidates() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"features": []})))
            .mount(&mock_server)
            .await;

        let geocoder = geocoder_for(&mock_server).await;

        assert_eq!(geocoder.forward("Nowhere").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_forward_service_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let geocoder = geocoder_for(&mock_server).await;
        let err = geocoder.forward("1 Main St").await.unwrap_err();

        match err {
            SourceError::Status { url, status } => {
                assert_eq!(status, 401);
                assert!(!url.contains("pk.test"), "token leaked into error: {}", url);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_blank_query_skips_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&mock_server)
            .await;

        let geocoder = geocoder_for(&mock_server).await;

        assert!(geocoder.search("   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_hides_token() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint =
            Url::parse(&format!("http://127.0.0.1:{}/geocoding/v5/mapbox.places/", port)).unwrap();
        let options = GeocoderOptions::new().unwrap().with_endpoint(endpoint);
        let geocoder = MapboxGeocoder::new("pk.SECRET", options).unwrap();

        let err = geocoder.search("1 Main St").await.unwrap_err();

        assert!(matches!(err, SourceError::HttpError(_)));
        assert!(!err.to_string().contains("pk.SECRET"), "token leaked: {}", err);
        assert!(!format!("{:?}", err).contains("pk.SECRET"));
    }

    #[tokio::test]
    async fn test_decode_error_hides_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&mock_server)
            .await;

        let geocoder = geocoder_for(&mock_server).await;
        let err = geocoder.forward("1 Main St").await.unwrap_err();

        assert!(matches!(err, SourceError::HttpError(_)));
        assert!(!err.to_string().contains("pk.test"), "token leaked: {}", err);
    }

    #[tokio::test]
    async fn test_debug_output_omits_token() {
        let mock_server = MockServer::start().await;
        let geocoder = geocoder_for(&mock_server).await;
        let copy = geocoder.clone();

        let rendered = format!("{:?}", copy);
        assert!(rendered.starts_with("MapboxGeocoder"));
        assert!(!rendered.contains("pk.test"));
    }
}
