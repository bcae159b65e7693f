use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use shared::SearchResult;

use crate::error::ServiceError;

/// Free-text place lookup.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ServiceError>;
}

/// Nominatim-compatible `/search?format=json` client.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct RawPlace {
    display_name: String,
    lat: String,
    lon: String,
}

impl NominatimGeocoder {
    pub fn new(client: Client, base_url: impl Into<String>, limit: usize) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limit: limit.max(1),
        }
    }

    fn search_url(&self, query: &str) -> Result<Url, ServiceError> {
        let limit = self.limit.to_string();
        Url::parse_with_params(
            &format!("{}/search", self.base_url),
            &[("q", query), ("format", "json"), ("limit", limit.as_str())],
        )
        .map_err(|err| ServiceError::Malformed(format!("invalid geocoder url: {err}")))
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ServiceError> {
        let url = self.search_url(query)?;
        tracing::debug!("geocoding {query:?}");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status(status));
        }
        let body = response.text().await?;
        parse_places(&body)
    }
}

/// Parse a ranked Nominatim result array; coordinates arrive as decimal strings.
pub fn parse_places(body: &str) -> Result<Vec<SearchResult>, ServiceError> {
    let raw: Vec<RawPlace> =
        serde_json::from_str(body).map_err(|err| ServiceError::Malformed(err.to_string()))?;
    raw.into_iter()
        .map(|place| {
            let lat = parse_degrees(&place.lat, &place.display_name)?;
            let lon = parse_degrees(&place.lon, &place.display_name)?;
            Ok(SearchResult {
                display_name: place.display_name,
                lat,
                lon,
            })
        })
        .collect()
}

fn parse_degrees(value: &str, place: &str) -> Result<f64, ServiceError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ServiceError::Malformed(format!("bad coordinate {value:?} for {place}")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTicket {
    pub token: u64,
    pub query: String,
}

/// Debounced query state. Every keystroke gets a new token; only the newest
/// token may fire a request or apply results.
#[derive(Debug, Clone)]
pub struct SearchResolver {
    min_chars: usize,
    query: String,
    token: u64,
    pending: Option<u64>,
    results: Vec<SearchResult>,
}

impl SearchResolver {
    pub fn new(min_chars: usize) -> Self {
        Self {
            min_chars,
            query: String::new(),
            token: 0,
            pending: None,
            results: Vec::new(),
        }
    }

    /// Register new input. Returns a ticket to debounce when the query is long enough.
    pub fn input(&mut self, query: &str) -> Option<SearchTicket> {
        self.token += 1;
        self.query = query.to_string();
        let trimmed = query.trim();
        if trimmed.chars().count() < self.min_chars {
            self.pending = None;
            self.results.clear();
            return None;
        }
        self.pending = Some(self.token);
        Some(SearchTicket {
            token: self.token,
            query: trimmed.to_string(),
        })
    }

    /// Debounce timer for `token` expired. Returns the query to send if it is still current.
    pub fn debounce_elapsed(&self, token: u64) -> Option<String> {
        (self.pending == Some(token)).then(|| self.query.trim().to_string())
    }

    /// Apply a geocoder response. Returns `false` when the response was superseded.
    pub fn resolve(&mut self, token: u64, result: Result<Vec<SearchResult>, ServiceError>) -> bool {
        if self.pending != Some(token) {
            tracing::debug!("discarding search response for superseded token {token}");
            return false;
        }
        self.pending = None;
        match result {
            Ok(results) => {
                tracing::debug!("search {:?} returned {} result(s)", self.query, results.len());
                self.results = results;
            }
            Err(err) => {
                tracing::warn!("search {:?} failed: {err}", self.query);
                self.results.clear();
            }
        }
        true
    }

    pub fn select(&self, index: usize) -> Option<&SearchResult> {
        self.results.get(index)
    }

    pub fn clear(&mut self) {
        self.token += 1;
        self.query.clear();
        self.pending = None;
        self.results.clear();
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }
}
