//! JSON report printed at the end of a run

use cyclable_lib::{CollectionInfo, Coordinate, Landmark, OsmId, PipelineReport};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RouteSummary {
    pub from_id: OsmId,
    pub from_name: Option<String>,
    pub to_id: OsmId,
    pub to_name: Option<String>,
    /// As the crow flies
    pub distance_km: f64,
    /// Routed distance
    pub route_meters: f64,
    pub safe_percentage: u8,
}

#[derive(Debug, Serialize)]
pub struct FailureSummary {
    pub from_id: OsmId,
    pub to_id: OsmId,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub city: String,
    pub landmarks: usize,
    pub unresolved_landmarks: usize,
    pub landmarks_outside_boundary: usize,
    pub center: Option<Coordinate>,
    pub dispatched: usize,
    pub info: CollectionInfo,
    /// None when nothing could be routed
    pub safe_percentage: Option<u8>,
    pub routes: Vec<RouteSummary>,
    pub failures: Vec<FailureSummary>,
}

fn name_of(landmarks: &[Landmark], index: usize) -> Option<String> {
    landmarks
        .get(index)
        .and_then(Landmark::name)
        .map(str::to_string)
}

impl Report {
    pub fn new(city: &str, pipeline: &PipelineReport, unresolved: usize, outside: usize) -> Self {
        let safe_percentage = match pipeline.results.overall_safe_percentage() {
            Ok(percentage) => Some(percentage),
            Err(e) => {
                tracing::warn!("No overall safety percentage: {}", e);
                None
            }
        };

        let mut routes: Vec<RouteSummary> = pipeline
            .results
            .results()
            .iter()
            .map(|result| RouteSummary {
                from_id: result.from_id,
                from_name: name_of(&pipeline.landmarks, result.pair.from),
                to_id: result.to_id,
                to_name: name_of(&pipeline.landmarks, result.pair.to),
                distance_km: result.pair.distance_km,
                route_meters: result.total_distance(),
                safe_percentage: result.safe_percentage,
            })
            .collect();
        // Completion order is arbitrary
        routes.sort_by_key(|r| (r.from_id, r.to_id));

        let failures = pipeline
            .failures
            .iter()
            .map(|failure| FailureSummary {
                from_id: failure.from_id,
                to_id: failure.to_id,
                error: failure.error.to_string(),
            })
            .collect();

        Self {
            city: city.to_string(),
            landmarks: pipeline.landmarks.len(),
            unresolved_landmarks: unresolved,
            landmarks_outside_boundary: outside,
            center: pipeline.center().ok(),
            dispatched: pipeline.dispatched,
            info: pipeline.results.info(),
            safe_percentage,
            routes,
            failures,
        }
    }
}
