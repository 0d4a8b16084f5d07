//! Geographic coordinate type and geometry primitives

use crate::{PipelineError, Result};
use geo::{Centroid, Contains, LineString, MultiPoint, Point, Polygon};
use serde::{Deserialize, Serialize};

/// Earth's mean radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Scale factor of the integer coordinates used by the routing service
pub const COORDINATE_SCALE: f64 = 1_000_000.0;

/// Approximate ring of mainland France as (longitude, latitude) vertices.
///
/// Corsica and overseas territories fall outside.
pub const METROPOLITAN_FRANCE: [(f64, f64); 4] = [
    (3.117332261403533, 42.310950518868566),
    (8.62616012109811, 48.98439932416892),
    (2.6058486182378147, 51.30150608949904),
    (-5.353852828534542, 48.42923941831151),
];

/// A WGS84 position in degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    #[inline]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Build a coordinate from the routing service's micro-degree integers
    #[inline]
    pub fn from_scaled(lon_e6: i64, lat_e6: i64) -> Self {
        Self {
            lat: lat_e6 as f64 / COORDINATE_SCALE,
            lon: lon_e6 as f64 / COORDINATE_SCALE,
        }
    }

    /// Convert to a `geo` point (x = longitude, y = latitude)
    #[inline]
    pub fn to_point(self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }

    /// `[lon, lat]` ordering used by GeoJSON
    #[inline]
    pub fn to_lon_lat(self) -> [f64; 2] {
        [self.lon, self.lat]
    }
}

impl From<Point<f64>> for Coordinate {
    fn from(point: Point<f64>) -> Self {
        Self::new(point.y(), point.x())
    }
}

/// Great-circle distance in kilometers (Haversine formula)
#[inline]
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lon = (b.lon - a.lon).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Arithmetic centroid of a set of coordinates
///
/// Returns [`PipelineError::EmptyInput`] when `points` is empty.
pub fn centroid(points: &[Coordinate]) -> Result<Coordinate> {
    let multi: MultiPoint<f64> = points.iter().map(|c| c.to_point()).collect();
    multi
        .centroid()
        .map(Coordinate::from)
        .ok_or(PipelineError::EmptyInput)
}

/// Point-in-polygon test over a ring given as (lon, lat) vertices.
///
/// The ring is closed implicitly. Points exactly on an edge may go either way.
pub fn contains_point(ring: &[(f64, f64)], p: Coordinate) -> bool {
    let polygon = Polygon::new(LineString::from(ring.to_vec()), vec![]);
    polygon.contains(&p.to_point())
}

/// Fixed containment boundary for landmark filtering
#[derive(Clone, Debug)]
pub struct Boundary {
    polygon: Polygon<f64>,
}

impl Boundary {
    /// Build a boundary from (lon, lat) vertices
    pub fn from_ring(ring: &[(f64, f64)]) -> Self {
        Self {
            polygon: Polygon::new(LineString::from(ring.to_vec()), vec![]),
        }
    }

    pub fn metropolitan_france() -> Self {
        Self::from_ring(&METROPOLITAN_FRANCE)
    }

    #[inline]
    pub fn contains(&self, p: Coordinate) -> bool {
        self.polygon.contains(&p.to_point())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARIS: Coordinate = Coordinate::new(48.8566, 2.3522);
    const RENNES: Coordinate = Coordinate::new(48.1113, -1.6800);
    const NEW_YORK: Coordinate = Coordinate::new(40.7128, -74.0060);

    #[test]
    fn test_distance_symmetric() {
        let ab = distance_km(PARIS, RENNES);
        let ba = distance_km(RENNES, PARIS);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn test_distance_zero_on_same_point() {
        assert_eq!(distance_km(PARIS, PARIS), 0.0);
        assert!(distance_km(PARIS, RENNES) > 0.0);
    }

    #[test]
    fn test_distance_paris_rennes() {
        // Roughly 308 km as the crow flies
        let d = distance_km(PARIS, RENNES);
        assert!(d > 290.0 && d < 320.0, "unexpected distance {d}");
    }

    #[test]
    fn test_centroid_empty_fails() {
        assert!(matches!(centroid(&[]), Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn test_centroid_within_hull() {
        let points = [
            Coordinate::new(48.0, -2.0),
            Coordinate::new(48.0, -1.0),
            Coordinate::new(49.0, -1.0),
            Coordinate::new(49.0, -2.0),
            Coordinate::new(48.2, -1.9),
        ];
        let c = centroid(&points).unwrap();
        assert!(c.lat > 48.0 && c.lat < 49.0);
        assert!(c.lon > -2.0 && c.lon < -1.0);
    }

    #[test]
    fn test_centroid_single_point() {
        let c = centroid(&[PARIS]).unwrap();
        assert!((c.lat - PARIS.lat).abs() < 1e-12);
        assert!((c.lon - PARIS.lon).abs() < 1e-12);
    }

    #[test]
    fn test_contains_point_france() {
        assert!(contains_point(&METROPOLITAN_FRANCE, PARIS));
        assert!(contains_point(&METROPOLITAN_FRANCE, RENNES));
        assert!(!contains_point(&METROPOLITAN_FRANCE, NEW_YORK));
    }

    #[test]
    fn test_contains_point_explicitly_closed_ring() {
        let mut ring = METROPOLITAN_FRANCE.to_vec();
        ring.push(ring[0]);
        assert!(contains_point(&ring, PARIS));
        assert!(!contains_point(&ring, NEW_YORK));
    }

    #[test]
    fn test_boundary_excludes_corsica() {
        let ajaccio = Coordinate::new(41.9192, 8.7386);
        assert!(!Boundary::metropolitan_france().contains(ajaccio));
    }

    #[test]
    fn test_from_scaled() {
        let c = Coordinate::from_scaled(-1_680_000, 48_111_300);
        assert!((c.lon - -1.68).abs() < 1e-9);
        assert!((c.lat - 48.1113).abs() < 1e-9);
    }
}
