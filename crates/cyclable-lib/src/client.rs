//! HTTP access to the landmark source and the bike routing service
//!
//! The routing service answers with a GeoJSON document whose first feature carries
//! a `messages` table: one header row followed by one row per grouped way, each
//! row a fixed-arity tuple of stringly-typed cells.

use crate::landmark::OsmDocument;
use crate::utils::Coordinate;
use crate::{PipelineError, Result};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

const COLUMN_LONGITUDE: usize = 0;
const COLUMN_LATITUDE: usize = 1;
const COLUMN_ELEVATION: usize = 2;
const COLUMN_DISTANCE: usize = 3;
const COLUMN_WAY_TAGS: usize = 9;
const MIN_COLUMNS: usize = COLUMN_WAY_TAGS + 1;

/// Characters left as-is in a URI component; everything else is percent-encoded
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// One data row of the routing service's message table
#[derive(Clone, Debug, PartialEq)]
pub struct RouteRow {
    /// Longitude in micro-degrees
    pub lon_e6: i64,
    /// Latitude in micro-degrees
    pub lat_e6: i64,
    /// Elevation in meters (0 when the service has none)
    pub elevation: f64,
    /// Distance in meters of the way group ending at this row
    pub distance: f64,
    /// `key=value` way tags
    pub tags: Vec<String>,
}

impl RouteRow {
    #[inline]
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::from_scaled(self.lon_e6, self.lat_e6)
    }

    /// Parse a raw row; `index` is only used for error messages
    pub fn from_cells(index: usize, cells: &[Value]) -> Result<Self> {
        if cells.len() < MIN_COLUMNS {
            return Err(PipelineError::MalformedResponse(format!(
                "row {index} has {} columns, expected at least {MIN_COLUMNS}",
                cells.len()
            )));
        }

        let malformed = |column: &str| {
            PipelineError::MalformedResponse(format!("row {index}: invalid {column}"))
        };

        Ok(Self {
            lon_e6: cell_i64(&cells[COLUMN_LONGITUDE]).ok_or_else(|| malformed("longitude"))?,
            lat_e6: cell_i64(&cells[COLUMN_LATITUDE]).ok_or_else(|| malformed("latitude"))?,
            elevation: match &cells[COLUMN_ELEVATION] {
                Value::String(s) if s.trim().is_empty() => 0.0,
                Value::Null => 0.0,
                cell => cell_f64(cell).ok_or_else(|| malformed("elevation"))?,
            },
            distance: cell_f64(&cells[COLUMN_DISTANCE]).ok_or_else(|| malformed("distance"))?,
            tags: cell_tags(&cells[COLUMN_WAY_TAGS]),
        })
    }
}

fn cell_i64(cell: &Value) -> Option<i64> {
    match cell {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn cell_f64(cell: &Value) -> Option<f64> {
    match cell {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn cell_tags(cell: &Value) -> Vec<String> {
    match cell {
        Value::String(s) => s.split_whitespace().map(str::to_string).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Decoded message table of a routing response
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteResponseTable {
    /// Column names from the header row
    pub header: Vec<String>,
    /// Data rows, header excluded
    pub rows: Vec<RouteRow>,
}

#[derive(Deserialize)]
struct RouteDocument {
    #[serde(default)]
    features: Vec<RouteFeature>,
}

#[derive(Deserialize)]
struct RouteFeature {
    properties: RouteProperties,
}

#[derive(Deserialize)]
struct RouteProperties {
    #[serde(default)]
    messages: Vec<Vec<Value>>,
}

impl RouteResponseTable {
    /// Build a table from raw message rows, the first of which is the header
    pub fn from_messages(messages: &[Vec<Value>]) -> Result<Self> {
        let Some((header, data)) = messages.split_first() else {
            return Ok(Self::default());
        };

        let header = header
            .iter()
            .map(|cell| cell.as_str().unwrap_or_default().to_string())
            .collect();
        let rows = data
            .iter()
            .enumerate()
            .map(|(i, cells)| RouteRow::from_cells(i + 1, cells))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { header, rows })
    }

    /// Decode a full routing response body
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let document: RouteDocument = serde_json::from_slice(body)?;
        let feature = document.features.first().ok_or_else(|| {
            PipelineError::MalformedResponse("response has no features".to_string())
        })?;
        Self::from_messages(&feature.properties.messages)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Anything able to route a bike between two coordinates
pub trait RouteSource: Send + Sync + 'static {
    fn route(
        &self,
        from: Coordinate,
        to: Coordinate,
    ) -> impl Future<Output = Result<RouteResponseTable>> + Send;
}

/// Routing query path segment: `"<fromLon>,<fromLat>|<toLon>,<toLat>"`
pub fn route_query(from: Coordinate, to: Coordinate) -> String {
    format!("{},{}|{},{}", from.lon, from.lat, to.lon, to.lat)
}

/// Client for the project API, which fronts both the landmark source and the router
#[derive(Clone, Debug)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpClient {
    /// Create a client; every request is bounded by `timeout`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PipelineError::RoutingService(format!("invalid base URL: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::RoutingService(e.to_string()))?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                PipelineError::RoutingService(format!("base URL {} cannot be a base", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `bikeRouter/<query>` with the query escaped as a single URI component
    pub fn route_url(&self, from: Coordinate, to: Coordinate) -> Result<Url> {
        let mut url = self.endpoint(&["bikeRouter"])?;
        let query = utf8_percent_encode(&route_query(from, to), URI_COMPONENT).to_string();
        // Already escaped, so it bypasses the segment encoder
        let path = format!("{}/{}", url.path(), query);
        url.set_path(&path);
        Ok(url)
    }

    pub fn city_url(&self, city: &str) -> Result<Url> {
        self.endpoint(&["points", city])
    }

    async fn get(&self, url: Url) -> reqwest::Result<Vec<u8>> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Fetch the raw landmark records of a city
    pub async fn fetch_city(&self, city: &str) -> Result<OsmDocument> {
        let url = self.city_url(city)?;
        tracing::info!("Fetching landmarks from {}", url);
        let body = self
            .get(url)
            .await
            .map_err(|e| PipelineError::LandmarkSource(e.to_string()))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl RouteSource for HttpClient {
    async fn route(&self, from: Coordinate, to: Coordinate) -> Result<RouteResponseTable> {
        let url = self.route_url(from, to)?;
        tracing::debug!("Routing request {}", url);
        let body = self
            .get(url)
            .await
            .map_err(|e| PipelineError::RoutingService(e.to_string()))?;
        RouteResponseTable::from_json(&body)
    }
}
