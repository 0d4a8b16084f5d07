//! Path segments reconstructed from a routing response table

use crate::client::RouteResponseTable;
use crate::safety::SafetyClassifier;
use crate::utils::Coordinate;
use serde::Serialize;
use serde_json::{Value, json};

/// A straight piece of a routed path with the attributes of its way group
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PathSegment {
    pub start: Coordinate,
    pub end: Coordinate,
    /// Distance in meters
    pub distance: f64,
    /// Elevation in meters at the end row
    pub elevation: f64,
    pub tags: Vec<String>,
    /// Whether the tags denote protected infrastructure
    pub safe: bool,
}

impl PathSegment {
    /// GeoJSON LineString feature, colored blue when safe and red otherwise
    pub fn to_geojson(&self) -> Value {
        json!({
            "type": "Feature",
            "properties": {
                "tags": self.tags.join(" "),
                "distance": self.distance,
                "elevation": self.elevation,
                "safe": self.safe,
                "color": if self.safe { "blue" } else { "red" },
                "weight": 3,
                "opacity": 0.8,
            },
            "geometry": {
                "type": "LineString",
                "coordinates": [self.start.to_lon_lat(), self.end.to_lon_lat()],
            },
        })
    }
}

/// Distances summed over every data row of a route, in meters
///
/// Unlike the segments, this counts the first row after the header, whose metrics
/// describe the stretch leading to the first reported point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct RouteTotals {
    pub distance: f64,
    pub safe_distance: f64,
}

/// Turns a response table into path segments
///
/// The service reports one row per group of ways, so segments are coarser than the
/// actual path geometry. Each row's metrics describe the stretch ending at that row,
/// hence a segment takes its attributes from its second row.
#[derive(Clone, Debug, Default)]
pub struct RouteSegmenter {
    classifier: SafetyClassifier,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RouteSegmenter {
    pub fn new(classifier: SafetyClassifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &SafetyClassifier {
        &self.classifier
    }

    /// One segment per adjacent pair of data rows; the last row never starts one
    pub fn segments(&self, table: &RouteResponseTable) -> Vec<PathSegment> {
        table
            .rows
            .windows(2)
            .map(|pair| {
                let (start, end) = (&pair[0], &pair[1]);
                PathSegment {
                    start: start.coordinate(),
                    end: end.coordinate(),
                    distance: end.distance,
                    elevation: end.elevation,
                    tags: end.tags.clone(),
                    safe: self.classifier.is_safe(&end.tags),
                }
            })
            .collect()
    }

    /// Total and safe distance over all data rows
    pub fn totals(&self, table: &RouteResponseTable) -> RouteTotals {
        table
            .rows
            .iter()
            .fold(RouteTotals::default(), |mut totals, row| {
                totals.distance += row.distance;
                if self.classifier.is_safe(&row.tags) {
                    totals.safe_distance += row.distance;
                }
                totals
            })
    }
}
