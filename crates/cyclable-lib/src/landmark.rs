//! Landmark extraction and filtering
//!
//! This module turns the raw OSM record set returned by the landmark source into
//! [`Landmark`]s: one representative coordinate per town hall, kept only when it
//! falls inside the containment boundary.

use crate::utils::{self, Boundary, Coordinate};
use crate::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub type OsmId = u64;
pub type Tags = BTreeMap<String, String>;

/// Raw landmark source document (`{ "elements": [...] }`)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OsmDocument {
    #[serde(default)]
    pub elements: Vec<OsmElement>,
}

/// A single OSM record as returned by an Overpass-style query
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OsmElement {
    Node {
        id: OsmId,
        lat: f64,
        lon: f64,
        #[serde(default)]
        tags: Tags,
    },
    Way {
        id: OsmId,
        #[serde(default)]
        nodes: Vec<OsmId>,
        #[serde(default)]
        tags: Tags,
    },
    Relation {
        id: OsmId,
        #[serde(default)]
        members: Vec<OsmMember>,
        #[serde(default)]
        tags: Tags,
    },
    #[serde(other)]
    Other,
}

/// Member of a relation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OsmMember {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    #[serde(rename = "ref")]
    pub reference: OsmId,
    #[serde(default)]
    pub role: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

impl OsmElement {
    fn key(&self) -> Option<(ElementKind, OsmId)> {
        match self {
            Self::Node { id, .. } => Some((ElementKind::Node, *id)),
            Self::Way { id, .. } => Some((ElementKind::Way, *id)),
            Self::Relation { id, .. } => Some((ElementKind::Relation, *id)),
            Self::Other => None,
        }
    }

    fn tags(&self) -> Option<&Tags> {
        match self {
            Self::Node { tags, .. } | Self::Way { tags, .. } | Self::Relation { tags, .. } => {
                Some(tags)
            }
            Self::Other => None,
        }
    }
}

/// How a landmark's coordinate was obtained
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    /// The record carries its own coordinate
    Simple,
    /// First node of a way
    WayReference,
    /// First node of the first member of a relation
    RelationReference,
}

/// A resolved point of interest used as a routing endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: OsmId,
    pub coordinate: Coordinate,
    pub tags: Tags,
    pub source_kind: SourceKind,
}

impl Landmark {
    /// Display name from the `name` tag, if any
    pub fn name(&self) -> Option<&str> {
        self.tags.get("name").map(String::as_str)
    }
}

/// Result of filtering a record set
#[derive(Debug, Default)]
pub struct FilterOutcome {
    /// Resolved landmarks inside the boundary, in input order
    pub landmarks: Vec<Landmark>,
    /// Per-record resolution failures (those records are dropped)
    pub errors: Vec<PipelineError>,
    /// Number of resolved landmarks rejected by the boundary
    pub outside: usize,
}

/// Lookup table over the record set, keyed by element kind and id
struct ElementIndex<'a> {
    elements: HashMap<(ElementKind, OsmId), &'a OsmElement>,
}

impl<'a> ElementIndex<'a> {
    fn build(document: &'a OsmDocument) -> Self {
        let elements = document
            .elements
            .iter()
            .filter_map(|element| element.key().map(|key| (key, element)))
            .collect();
        Self { elements }
    }

    fn node_coordinate(&self, record: OsmId, node: OsmId) -> Result<Coordinate> {
        match self.elements.get(&(ElementKind::Node, node)) {
            Some(OsmElement::Node { lat, lon, .. }) => Ok(Coordinate::new(*lat, *lon)),
            _ => Err(PipelineError::UnresolvableReference {
                record,
                missing: node,
            }),
        }
    }

    fn first_way_node(&self, record: OsmId, way: OsmId, nodes: &[OsmId]) -> Result<Coordinate> {
        let first = nodes.first().ok_or_else(|| {
            PipelineError::MalformedRecord(format!("way {way} has no nodes"))
        })?;
        self.node_coordinate(record, *first)
    }

    /// Resolve a record's representative coordinate, following at most two
    /// levels of indirection
    fn resolve(&self, element: &OsmElement) -> Result<(OsmId, Coordinate, SourceKind)> {
        match element {
            OsmElement::Node { id, lat, lon, .. } => {
                Ok((*id, Coordinate::new(*lat, *lon), SourceKind::Simple))
            }
            OsmElement::Way { id, nodes, .. } => {
                let coordinate = self.first_way_node(*id, *id, nodes)?;
                Ok((*id, coordinate, SourceKind::WayReference))
            }
            OsmElement::Relation { id, members, .. } => {
                let member = members.first().ok_or_else(|| {
                    PipelineError::MalformedRecord(format!("relation {id} has no members"))
                })?;
                let target = self
                    .elements
                    .get(&(member.kind, member.reference))
                    .ok_or(PipelineError::UnresolvableReference {
                        record: *id,
                        missing: member.reference,
                    })?;
                let coordinate = match target {
                    OsmElement::Node { lat, lon, .. } => Coordinate::new(*lat, *lon),
                    OsmElement::Way {
                        id: way, nodes, ..
                    } => self.first_way_node(*id, *way, nodes)?,
                    _ => {
                        return Err(PipelineError::MalformedRecord(format!(
                            "relation {id} starts with unsupported member {}",
                            member.reference
                        )));
                    }
                };
                Ok((*id, coordinate, SourceKind::RelationReference))
            }
            OsmElement::Other => Err(PipelineError::MalformedRecord(
                "unsupported element type".to_string(),
            )),
        }
    }
}

/// Selects landmark records, resolves their coordinates and applies the boundary
#[derive(Clone, Debug)]
pub struct LandmarkFilter {
    boundary: Boundary,
    category_key: String,
    category_value: String,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl LandmarkFilter {
    /// Town halls inside mainland France
    pub fn france() -> Self {
        Self {
            boundary: Boundary::metropolitan_france(),
            category_key: "amenity".to_string(),
            category_value: "townhall".to_string(),
        }
    }

    pub fn with_boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_category(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.category_key = key.into();
        self.category_value = value.into();
        self
    }

    fn is_landmark(&self, element: &OsmElement) -> bool {
        element
            .tags()
            .and_then(|tags| tags.get(&self.category_key))
            .is_some_and(|value| *value == self.category_value)
    }

    /// Filter a record set into landmarks
    ///
    /// Records that fail to resolve are reported in [`FilterOutcome::errors`] and
    /// skipped; the remaining records are still returned.
    pub fn filter(&self, document: &OsmDocument) -> FilterOutcome {
        let index = ElementIndex::build(document);
        let mut outcome = FilterOutcome::default();

        for element in document.elements.iter().filter(|e| self.is_landmark(e)) {
            let (id, coordinate, source_kind) = match index.resolve(element) {
                Ok(resolved) => resolved,
                Err(err) => {
                    tracing::warn!("Dropping landmark record: {}", err);
                    outcome.errors.push(err);
                    continue;
                }
            };

            if !self.boundary.contains(coordinate) {
                tracing::debug!(
                    "Landmark {} outside boundary: ({}, {})",
                    id,
                    coordinate.lat,
                    coordinate.lon
                );
                outcome.outside += 1;
                continue;
            }

            outcome.landmarks.push(Landmark {
                id,
                coordinate,
                tags: element.tags().cloned().unwrap_or_default(),
                source_kind,
            });
        }

        tracing::info!(
            "Kept {} landmarks ({} unresolved, {} outside boundary)",
            outcome.landmarks.len(),
            outcome.errors.len(),
            outcome.outside
        );
        outcome
    }
}

impl Default for LandmarkFilter {
    fn default() -> Self {
        Self::france()
    }
}

/// Map-centering point over a landmark set
pub fn landmarks_centroid(landmarks: &[Landmark]) -> Result<Coordinate> {
    let points: Vec<Coordinate> = landmarks.iter().map(|l| l.coordinate).collect();
    utils::centroid(&points)
}
