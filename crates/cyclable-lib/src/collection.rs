//! ResultCollection and PairingOrchestrator - Route dispatch and result accumulation
//!
//! The orchestrator pairs landmarks, issues one routing request per pair under a
//! dispatch policy, and funnels every completed computation through a channel to a
//! single collector task that owns the [`ResultCollection`].

use crate::client::RouteSource;
use crate::landmark::{Landmark, OsmId, landmarks_centroid};
use crate::pairing::{LandmarkPair, NEAREST_POINTS_LIMIT, NeighborPairing, dedup_pairs};
use crate::safety::{SafetyClassifier, distance_percentage, safety_percentage};
use crate::segment::{PathSegment, RouteSegmenter, RouteTotals};
use crate::utils::Coordinate;
use crate::{PipelineError, Result};

use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};

/// How route requests are released to the routing service
#[derive(Clone, Debug, PartialEq)]
pub enum DispatchPolicy {
    /// At most `max_in_flight` outstanding requests, issued `interval` apart
    Bounded {
        max_in_flight: usize,
        interval: Duration,
    },
    /// Every request is scheduled up front; the one for neighbor `rank` of
    /// landmark `from` waits `stagger * (from + rank)`
    Staggered { stagger: Duration },
}

impl DispatchPolicy {
    /// Delay of a pair under the staggered schedule
    pub fn staggered_delay(stagger: Duration, pair: &LandmarkPair) -> Duration {
        stagger.saturating_mul((pair.from + pair.rank) as u32)
    }
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self::Bounded {
            max_in_flight: 4,
            interval: Duration::from_millis(100),
        }
    }
}

/// Configuration for a pipeline run
#[derive(Debug, Clone)]
pub struct Config {
    /// Neighbors routed from each landmark (default 4)
    pub nearest_points_limit: usize,
    /// Request release policy
    pub dispatch: DispatchPolicy,
    /// Per-request timeout applied by the HTTP client
    pub request_timeout: Duration,
    /// Route each unordered pair once instead of once per direction
    pub deduplicate_pairs: bool,
    /// Skip neighbors farther apart than this, in kilometers
    pub max_pair_distance_km: Option<f64>,
    /// Tag rule for protected infrastructure
    pub safety: SafetyClassifier,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nearest_points_limit: NEAREST_POINTS_LIMIT,
            dispatch: DispatchPolicy::default(),
            request_timeout: Duration::from_secs(30),
            deduplicate_pairs: false,
            max_pair_distance_km: None,
            safety: SafetyClassifier::default(),
        }
    }
}

/// Routed path between two landmarks with its safety score
#[derive(Clone, Debug, Serialize)]
pub struct RouteResult {
    pub pair: LandmarkPair,
    pub from_id: OsmId,
    pub to_id: OsmId,
    pub segments: Vec<PathSegment>,
    /// Safe share of the segment distance, 0-100
    pub safe_percentage: u8,
    /// Distances over every data row, first row included
    pub totals: RouteTotals,
}

impl RouteResult {
    #[inline]
    pub fn total_distance(&self) -> f64 {
        self.totals.distance
    }

    #[inline]
    pub fn safe_distance(&self) -> f64 {
        self.totals.safe_distance
    }

    /// Segments as a GeoJSON FeatureCollection
    pub fn to_geojson(&self) -> Value {
        json!({
            "type": "FeatureCollection",
            "features": self.segments.iter().map(PathSegment::to_geojson).collect::<Vec<_>>(),
        })
    }
}

/// A pair whose route could not be turned into a result
#[derive(Debug)]
pub struct PairFailure {
    pub pair: LandmarkPair,
    pub from_id: OsmId,
    pub to_id: OsmId,
    pub error: PipelineError,
}

/// Information about the result collection
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionInfo {
    /// Number of routed pairs
    pub route_count: usize,
    /// Number of path segments across all routes
    pub segment_count: usize,
    /// Total routed distance in meters
    pub total_distance_meters: f64,
    /// Distance on protected infrastructure in meters
    pub safe_distance_meters: f64,
}

/// Cached statistics, updated on every append
#[derive(Debug, Clone, Default)]
struct CachedStats {
    segment_count: usize,
    total_distance: f64,
    safe_distance: f64,
}

/// Append-only accumulator of route results
///
/// Results arrive in completion order; consumers must not rely on it.
#[derive(Clone, Debug, Default)]
pub struct ResultCollection {
    results: Vec<RouteResult>,
    cached_stats: CachedStats,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ResultCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: RouteResult) {
        self.cached_stats.segment_count += result.segments.len();
        self.cached_stats.total_distance += result.total_distance();
        self.cached_stats.safe_distance += result.safe_distance();
        self.results.push(result);
    }

    #[inline]
    pub fn results(&self) -> &[RouteResult] {
        &self.results
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Get collection information
    ///
    /// This is O(1) as all values are cached.
    #[inline]
    pub fn info(&self) -> CollectionInfo {
        CollectionInfo {
            route_count: self.results.len(),
            segment_count: self.cached_stats.segment_count,
            total_distance_meters: self.cached_stats.total_distance,
            safe_distance_meters: self.cached_stats.safe_distance,
        }
    }

    /// Distance-weighted safe percentage over every data row of every route
    pub fn overall_safe_percentage(&self) -> Result<u8> {
        distance_percentage(
            self.cached_stats.safe_distance,
            self.cached_stats.total_distance,
        )
    }

    /// All segments of all routes as one GeoJSON FeatureCollection
    pub fn to_geojson(&self) -> Value {
        let features: Vec<Value> = self
            .results
            .iter()
            .flat_map(|r| r.segments.iter().map(PathSegment::to_geojson))
            .collect();
        json!({ "type": "FeatureCollection", "features": features })
    }
}

/// Everything a run produced
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Landmarks the pairs index into
    pub landmarks: Vec<Landmark>,
    pub results: ResultCollection,
    pub failures: Vec<PairFailure>,
    /// Number of pairs that were dispatched
    pub dispatched: usize,
}

impl PipelineReport {
    /// Map-centering point over the run's landmarks
    pub fn center(&self) -> Result<Coordinate> {
        landmarks_centroid(&self.landmarks)
    }
}

enum Outcome {
    Routed(RouteResult),
    Failed(PairFailure),
}

/// Drives route computations over all landmark pairs
pub struct PairingOrchestrator<S> {
    source: Arc<S>,
    config: Config,
}

impl<S: RouteSource> PairingOrchestrator<S> {
    pub fn new(source: Arc<S>, config: Config) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Candidate pairs for a landmark set, after the optional cut-off and deduplication
    pub fn plan(&self, landmarks: &[Landmark]) -> Vec<LandmarkPair> {
        #[cfg(feature = "profiling")]
        profiling::scope!("orchestrator::plan");

        let pairs = NeighborPairing::new(self.config.nearest_points_limit)
            .with_max_distance(self.config.max_pair_distance_km)
            .pairs(landmarks);
        if self.config.deduplicate_pairs {
            dedup_pairs(pairs, landmarks)
        } else {
            pairs
        }
    }

    /// Route every planned pair and gather the results
    ///
    /// Per-pair failures are logged and reported, never fatal to the run.
    pub async fn run(&self, landmarks: Vec<Landmark>) -> PipelineReport {
        let pairs = self.plan(&landmarks);
        let dispatched = pairs.len();
        tracing::info!(
            "Dispatching {} route requests for {} landmarks",
            dispatched,
            landmarks.len()
        );

        let landmarks = Arc::new(landmarks);
        let segmenter = Arc::new(RouteSegmenter::new(self.config.safety.clone()));
        let (tx, rx) = mpsc::unbounded_channel();
        let collector = tokio::spawn(collect(rx));

        match &self.config.dispatch {
            DispatchPolicy::Bounded {
                max_in_flight,
                interval,
            } => {
                let semaphore = Arc::new(Semaphore::new((*max_in_flight).max(1)));
                for (seq, pair) in pairs.into_iter().enumerate() {
                    if seq > 0 && !interval.is_zero() {
                        tokio::time::sleep(*interval).await;
                    }
                    let Ok(permit) = semaphore.clone().acquire_owned().await else {
                        break;
                    };
                    let task = route_and_send(
                        self.source.clone(),
                        landmarks.clone(),
                        segmenter.clone(),
                        pair,
                        tx.clone(),
                    );
                    tokio::spawn(async move {
                        task.await;
                        drop(permit);
                    });
                }
            }
            DispatchPolicy::Staggered { stagger } => {
                for pair in pairs {
                    let delay = DispatchPolicy::staggered_delay(*stagger, &pair);
                    let task = route_and_send(
                        self.source.clone(),
                        landmarks.clone(),
                        segmenter.clone(),
                        pair,
                        tx.clone(),
                    );
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        task.await;
                    });
                }
            }
        }
        drop(tx);

        let (results, failures) = match collector.await {
            Ok(collected) => collected,
            Err(err) => {
                tracing::error!("Result collector stopped: {}", err);
                (ResultCollection::new(), Vec::new())
            }
        };
        tracing::info!(
            "Collected {} routes, {} failed pairs",
            results.len(),
            failures.len()
        );

        let landmarks = Arc::try_unwrap(landmarks).unwrap_or_else(|shared| (*shared).clone());
        PipelineReport {
            landmarks,
            results,
            failures,
            dispatched,
        }
    }
}

/// Compute one pair and send its outcome to the collector
async fn route_and_send<S: RouteSource>(
    source: Arc<S>,
    landmarks: Arc<Vec<Landmark>>,
    segmenter: Arc<RouteSegmenter>,
    pair: LandmarkPair,
    tx: mpsc::UnboundedSender<Outcome>,
) {
    let from_id = landmarks[pair.from].id;
    let to_id = landmarks[pair.to].id;
    tracing::debug!("Routing {} -> {} (rank {})", from_id, to_id, pair.rank);

    let outcome = match route_pair(source.as_ref(), &segmenter, &landmarks, pair).await {
        Ok(result) => Outcome::Routed(result),
        Err(error) => {
            tracing::warn!("No route for {} -> {}: {}", from_id, to_id, error);
            Outcome::Failed(PairFailure {
                pair,
                from_id,
                to_id,
                error,
            })
        }
    };
    // The collector only goes away once every sender is dropped
    let _ = tx.send(outcome);
}

async fn route_pair<S: RouteSource>(
    source: &S,
    segmenter: &RouteSegmenter,
    landmarks: &[Landmark],
    pair: LandmarkPair,
) -> Result<RouteResult> {
    let from = &landmarks[pair.from];
    let to = &landmarks[pair.to];
    let table = source.route(from.coordinate, to.coordinate).await?;
    let segments = segmenter.segments(&table);
    let safe_percentage = safety_percentage(&segments)?;
    Ok(RouteResult {
        pair,
        from_id: from.id,
        to_id: to.id,
        segments,
        safe_percentage,
        totals: segmenter.totals(&table),
    })
}

async fn collect(mut rx: mpsc::UnboundedReceiver<Outcome>) -> (ResultCollection, Vec<PairFailure>) {
    let mut results = ResultCollection::new();
    let mut failures = Vec::new();
    while let Some(outcome) = rx.recv().await {
        match outcome {
            Outcome::Routed(result) => results.push(result),
            Outcome::Failed(failure) => failures.push(failure),
        }
    }
    (results, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{RouteResponseTable, RouteRow};
    use crate::landmark::SourceKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn landmarks(count: usize) -> Vec<Landmark> {
        (0..count)
            .map(|i| Landmark {
                id: 100 + i as u64,
                coordinate: Coordinate::new(48.0, -2.0 + i as f64 * 0.01),
                tags: Default::default(),
                source_kind: SourceKind::Simple,
            })
            .collect()
    }

    fn scaled(value: f64) -> i64 {
        (value * 1_000_000.0).round() as i64
    }

    fn row(at: Coordinate, distance: f64, tag: &str) -> RouteRow {
        RouteRow {
            lon_e6: scaled(at.lon),
            lat_e6: scaled(at.lat),
            elevation: 0.0,
            distance,
            tags: vec![tag.to_string()],
        }
    }

    /// In-process router: `lead_in` meters of cycleway up to the start point, then
    /// 100 m of cycleway and 300 m of primary road
    #[derive(Default)]
    struct FakeRouter {
        fail_on: Option<Coordinate>,
        zero_distance: bool,
        lead_in: f64,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl RouteSource for FakeRouter {
        async fn route(&self, from: Coordinate, to: Coordinate) -> Result<RouteResponseTable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_on.is_some_and(|c| c == from || c == to) {
                return Err(PipelineError::RoutingService("timed out".to_string()));
            }

            let scale = if self.zero_distance { 0.0 } else { 1.0 };
            let middle = Coordinate::new((from.lat + to.lat) / 2.0, (from.lon + to.lon) / 2.0);
            Ok(RouteResponseTable {
                header: vec!["Longitude".to_string()],
                rows: vec![
                    row(from, self.lead_in * scale, "highway=cycleway"),
                    row(middle, 100.0 * scale, "highway=cycleway"),
                    row(to, 300.0 * scale, "highway=primary"),
                ],
            })
        }
    }

    fn fast_config(max_in_flight: usize) -> Config {
        Config {
            dispatch: DispatchPolicy::Bounded {
                max_in_flight,
                interval: Duration::ZERO,
            },
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_run_routes_every_pair() {
        let router = Arc::new(FakeRouter::default());
        let orchestrator = PairingOrchestrator::new(router.clone(), fast_config(2));

        let report = orchestrator.run(landmarks(5)).await;

        assert_eq!(report.dispatched, 20);
        assert_eq!(report.results.len(), 20);
        assert!(report.failures.is_empty());
        assert_eq!(report.landmarks.len(), 5);
        assert_eq!(router.calls.load(Ordering::SeqCst), 20);
        assert!(router.max_in_flight.load(Ordering::SeqCst) <= 2);

        for result in report.results.results() {
            assert_eq!(result.segments.len(), 2);
            assert_eq!(result.safe_percentage, 25);
            assert_ne!(result.from_id, result.to_id);
        }
        assert_eq!(report.results.overall_safe_percentage().unwrap(), 25);
    }

    #[tokio::test]
    async fn test_overall_percentage_counts_first_rows() {
        let router = Arc::new(FakeRouter {
            lead_in: 300.0,
            ..FakeRouter::default()
        });
        let orchestrator = PairingOrchestrator::new(router, fast_config(4));

        let report = orchestrator.run(landmarks(2)).await;

        assert_eq!(report.results.len(), 2);
        for result in report.results.results() {
            // Segments start at the first row, so its distance only shows in the totals
            assert_eq!(result.safe_percentage, 25);
            assert_eq!(result.total_distance(), 700.0);
            assert_eq!(result.safe_distance(), 400.0);
        }
        let info = report.results.info();
        assert_eq!(info.total_distance_meters, 1400.0);
        assert_eq!(info.safe_distance_meters, 800.0);
        assert_eq!(report.results.overall_safe_percentage().unwrap(), 57);
    }

    #[test]
    fn test_overall_percentage_from_row_totals() {
        let table = RouteResponseTable {
            header: vec!["Longitude".to_string()],
            rows: vec![
                row(Coordinate::new(48.0, -2.0), 300.0, "highway=cycleway"),
                row(Coordinate::new(48.0, -1.99), 100.0, "highway=primary"),
            ],
        };
        let segmenter = RouteSegmenter::default();
        let segments = segmenter.segments(&table);
        let mut collection = ResultCollection::new();
        collection.push(RouteResult {
            pair: LandmarkPair {
                from: 0,
                to: 1,
                rank: 0,
                distance_km: 0.7,
            },
            from_id: 1,
            to_id: 2,
            safe_percentage: safety_percentage(&segments).unwrap(),
            segments,
            totals: segmenter.totals(&table),
        });

        assert_eq!(collection.results()[0].safe_percentage, 0);
        assert_eq!(collection.overall_safe_percentage().unwrap(), 75);
        assert_eq!(collection.info().total_distance_meters, 400.0);
        assert_eq!(collection.info().safe_distance_meters, 300.0);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let sites = landmarks(5);
        let router = Arc::new(FakeRouter {
            fail_on: Some(sites[2].coordinate),
            ..FakeRouter::default()
        });
        let orchestrator = PairingOrchestrator::new(router, fast_config(3));

        let report = orchestrator.run(sites).await;

        // Landmark 2 is a neighbor of all four others and has four neighbors itself
        assert_eq!(report.failures.len(), 8);
        assert_eq!(report.results.len(), 12);
        assert!(report.failures.iter().all(|f| f.from_id == 102 || f.to_id == 102));
        assert!(
            report
                .failures
                .iter()
                .all(|f| matches!(f.error, PipelineError::RoutingService(_)))
        );
    }

    #[tokio::test]
    async fn test_zero_distance_is_reported() {
        let router = Arc::new(FakeRouter {
            zero_distance: true,
            ..FakeRouter::default()
        });
        let orchestrator = PairingOrchestrator::new(router, fast_config(4));

        let report = orchestrator.run(landmarks(2)).await;

        assert!(report.results.is_empty());
        assert_eq!(report.failures.len(), 2);
        assert!(
            report
                .failures
                .iter()
                .all(|f| matches!(f.error, PipelineError::NoDistance))
        );
    }

    #[tokio::test]
    async fn test_deduplicated_pairs() {
        let router = Arc::new(FakeRouter::default());
        let config = Config {
            deduplicate_pairs: true,
            ..fast_config(4)
        };
        let orchestrator = PairingOrchestrator::new(router.clone(), config);

        let report = orchestrator.run(landmarks(5)).await;

        assert_eq!(report.dispatched, 10);
        assert_eq!(report.results.len(), 10);
        assert_eq!(router.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_staggered_dispatch() {
        let router = Arc::new(FakeRouter::default());
        let config = Config {
            dispatch: DispatchPolicy::Staggered {
                stagger: Duration::from_millis(1),
            },
            ..Config::default()
        };
        let orchestrator = PairingOrchestrator::new(router, config);

        let report = orchestrator.run(landmarks(4)).await;

        assert_eq!(report.dispatched, 12);
        assert_eq!(report.results.len(), 12);
    }

    #[tokio::test]
    async fn test_empty_landmarks() {
        let orchestrator =
            PairingOrchestrator::new(Arc::new(FakeRouter::default()), fast_config(1));
        let report = orchestrator.run(Vec::new()).await;

        assert_eq!(report.dispatched, 0);
        assert!(report.results.is_empty());
        assert!(matches!(report.center(), Err(PipelineError::EmptyInput)));
        assert!(matches!(
            report.results.overall_safe_percentage(),
            Err(PipelineError::NoDistance)
        ));
    }

    #[test]
    fn test_staggered_delay() {
        let pair = LandmarkPair {
            from: 3,
            to: 5,
            rank: 2,
            distance_km: 1.0,
        };
        assert_eq!(
            DispatchPolicy::staggered_delay(Duration::from_millis(100), &pair),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.nearest_points_limit, 4);
        assert!(!config.deduplicate_pairs);
        assert_eq!(config.max_pair_distance_km, None);
        assert_eq!(config.safety, SafetyClassifier::default());
    }

    #[test]
    fn test_collection_stats_and_geojson() {
        let segment = |distance: f64, safe: bool| PathSegment {
            start: Coordinate::new(48.0, -2.0),
            end: Coordinate::new(48.0, -1.99),
            distance,
            elevation: 0.0,
            tags: Vec::new(),
            safe,
        };
        let pair = LandmarkPair {
            from: 0,
            to: 1,
            rank: 0,
            distance_km: 0.7,
        };

        let mut collection = ResultCollection::new();
        collection.push(RouteResult {
            pair,
            from_id: 1,
            to_id: 2,
            segments: vec![segment(10.0, true), segment(20.0, false)],
            safe_percentage: 33,
            totals: RouteTotals {
                distance: 30.0,
                safe_distance: 10.0,
            },
        });
        collection.push(RouteResult {
            pair,
            from_id: 2,
            to_id: 1,
            segments: vec![segment(30.0, true)],
            safe_percentage: 100,
            totals: RouteTotals {
                distance: 30.0,
                safe_distance: 30.0,
            },
        });

        let info = collection.info();
        assert_eq!(info.route_count, 2);
        assert_eq!(info.segment_count, 3);
        assert_eq!(info.total_distance_meters, 60.0);
        assert_eq!(info.safe_distance_meters, 40.0);
        assert_eq!(collection.overall_safe_percentage().unwrap(), 67);

        let geojson = collection.to_geojson();
        assert_eq!(geojson["type"], "FeatureCollection");
        assert_eq!(geojson["features"].as_array().map(Vec::len), Some(3));
        assert_eq!(
            collection.results()[0].to_geojson()["features"][1]["properties"]["color"],
            "red"
        );
    }
}
