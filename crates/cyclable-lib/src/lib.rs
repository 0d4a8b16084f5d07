//! Cyclable Library - Core Pipeline for Municipal Cyclability Scoring
//!
//! This library estimates how cyclable a municipality is. It routes bikes between
//! nearby town halls through an external routing service and measures how much of
//! each routed path runs on protected cycling infrastructure.
//!
//! # Architecture
//!
//! - **[`utils`]**: Coordinate type and geometry primitives (distance, centroid, containment)
//! - **[`LandmarkFilter`]**: Resolves raw OSM records into town-hall [`Landmark`]s inside the boundary
//! - **[`NeighborPairing`]**: K-nearest-neighbor pairing of landmarks
//! - **[`RouteSource`]** / **[`HttpClient`]**: Routing and landmark service access
//! - **[`RouteSegmenter`]**: Decodes a [`RouteResponseTable`] into [`PathSegment`]s
//! - **[`SafetyClassifier`]**: Tag rule for protected infrastructure, plus the percentage aggregate
//! - **[`PairingOrchestrator`]**: Concurrent dispatch of route calls into a [`ResultCollection`]
//!
//! # Pipeline
//!
//! ```ignore
//! let client = Arc::new(HttpClient::new(api_url, config.request_timeout)?);
//! let document = client.fetch_city("rennes").await?;
//! let landmarks = LandmarkFilter::france().filter(&document);
//! let report = PairingOrchestrator::new(client, config).run(landmarks.landmarks).await;
//! println!("{:?}", report.results.overall_safe_percentage());
//! ```

mod client;
mod collection;
mod landmark;
mod pairing;
mod safety;
mod segment;
pub mod utils;

// Public API exports
pub use client::{HttpClient, RouteResponseTable, RouteRow, RouteSource, route_query};
pub use collection::{
    CollectionInfo, Config, DispatchPolicy, PairFailure, PairingOrchestrator, PipelineReport,
    ResultCollection, RouteResult,
};
pub use landmark::{
    ElementKind, FilterOutcome, Landmark, LandmarkFilter, OsmDocument, OsmElement, OsmId,
    OsmMember, SourceKind, Tags, landmarks_centroid,
};
pub use pairing::{LandmarkPair, NEAREST_POINTS_LIMIT, NeighborPairing, dedup_pairs};
pub use safety::{SafetyClassifier, distance_percentage, is_safe, safety_percentage};
pub use segment::{PathSegment, RouteSegmenter, RouteTotals};
pub use utils::Coordinate;

/// Error types for the pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Record {record} references missing element {missing}")]
    UnresolvableReference { record: u64, missing: u64 },

    #[error("Routing service error: {0}")]
    RoutingService(String),

    #[error("Malformed service response: {0}")]
    MalformedResponse(String),

    #[error("Malformed landmark record: {0}")]
    MalformedRecord(String),

    #[error("Landmark source error: {0}")]
    LandmarkSource(String),

    #[error("Empty input")]
    EmptyInput,

    #[error("Route has no distance")]
    NoDistance,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
