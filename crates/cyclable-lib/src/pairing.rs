//! Nearest-neighbor pairing of landmarks

use crate::Landmark;
use crate::landmark::OsmId;
use crate::utils::distance_km;
use rayon::prelude::*;
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::HashSet;

/// Number of neighbors paired with each landmark (think of a compass)
pub const NEAREST_POINTS_LIMIT: usize = 4;

type Neighbors = SmallVec<[(usize, f64); NEAREST_POINTS_LIMIT]>;

/// Directed pair of landmarks, referenced by index into the landmark slice
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LandmarkPair {
    /// Index of the source landmark
    pub from: usize,
    /// Index of the neighbor
    pub to: usize,
    /// Position of `to` in the source's neighbor list (0 = nearest)
    pub rank: usize,
    /// Great-circle distance between both landmarks
    pub distance_km: f64,
}

impl LandmarkPair {
    /// Order-independent key made of both landmark ids
    pub fn canonical_key(&self, landmarks: &[Landmark]) -> (OsmId, OsmId) {
        let a = landmarks[self.from].id;
        let b = landmarks[self.to].id;
        (a.min(b), a.max(b))
    }
}

/// K-nearest-neighbor pairing
///
/// Brute force over all landmarks; counts stay in the low hundreds per city.
#[derive(Clone, Debug)]
pub struct NeighborPairing {
    limit: usize,
    max_distance_km: Option<f64>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl NeighborPairing {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            max_distance_km: None,
        }
    }

    /// Drop neighbors farther than `km` after the nearest ones are selected
    pub fn with_max_distance(mut self, km: Option<f64>) -> Self {
        self.max_distance_km = km;
        self
    }

    /// Nearest neighbors of every landmark, as (index, distance) sorted ascending
    ///
    /// Ties keep input order.
    pub fn neighbors(&self, landmarks: &[Landmark]) -> Vec<Neighbors> {
        (0..landmarks.len())
            .into_par_iter()
            .map(|i| {
                let origin = landmarks[i].coordinate;
                let mut others: Vec<(usize, f64)> = landmarks
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(j, other)| (j, distance_km(origin, other.coordinate)))
                    .collect();
                others.sort_by(|a, b| a.1.total_cmp(&b.1));

                others
                    .into_iter()
                    .take(self.limit)
                    .filter(|(_, d)| self.max_distance_km.is_none_or(|max| *d <= max))
                    .collect::<Neighbors>()
            })
            .collect()
    }

    /// Flattened directed pairs, grouped by source landmark then by rank
    pub fn pairs(&self, landmarks: &[Landmark]) -> Vec<LandmarkPair> {
        self.neighbors(landmarks)
            .into_iter()
            .enumerate()
            .flat_map(|(from, neighbors)| {
                neighbors
                    .into_iter()
                    .enumerate()
                    .map(move |(rank, (to, distance_km))| LandmarkPair {
                        from,
                        to,
                        rank,
                        distance_km,
                    })
            })
            .collect()
    }
}

impl Default for NeighborPairing {
    fn default() -> Self {
        Self::new(NEAREST_POINTS_LIMIT)
    }
}

/// Keep only the first occurrence of every unordered landmark pair
pub fn dedup_pairs(pairs: Vec<LandmarkPair>, landmarks: &[Landmark]) -> Vec<LandmarkPair> {
    let mut seen = HashSet::with_capacity(pairs.len());
    pairs
        .into_iter()
        .filter(|pair| seen.insert(pair.canonical_key(landmarks)))
        .collect()
}
