//! Protected-infrastructure classification and safety percentage

use crate::segment::PathSegment;
use crate::{PipelineError, Result};
use serde::{Deserialize, Serialize};

const LIVING_STREET: &str = "highway=living_street";
const CYCLEWAY: &str = "highway=cycleway";

/// Default rule: living streets and dedicated cycleways
pub fn is_safe(tags: &[String]) -> bool {
    tags.iter().any(|tag| tag == LIVING_STREET || tag == CYCLEWAY)
}

/// Configurable tag predicate
///
/// A tag sequence is safe when it contains every marker of at least one rule.
/// Segregated shared paths (`highway=path`, `bicycle=designated`,
/// `foot=designated`, `segregated=yes`) are left out of the default set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SafetyClassifier {
    rules: Vec<Vec<String>>,
}

impl Default for SafetyClassifier {
    fn default() -> Self {
        Self {
            rules: vec![vec![LIVING_STREET.to_string()], vec![CYCLEWAY.to_string()]],
        }
    }
}

impl SafetyClassifier {
    /// Classifier with no rules (nothing is safe)
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Add a rule made of markers that must all be present
    pub fn with_rule<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rule: Vec<String> = markers.into_iter().map(Into::into).collect();
        if !rule.is_empty() {
            self.rules.push(rule);
        }
        self
    }

    /// Add a rule written as comma-separated markers, e.g. `highway=path,segregated=yes`
    pub fn with_rule_str(self, rule: &str) -> Self {
        self.with_rule(
            rule.split(',')
                .map(str::trim)
                .filter(|marker| !marker.is_empty()),
        )
    }

    pub fn rules(&self) -> &[Vec<String>] {
        &self.rules
    }

    pub fn is_safe(&self, tags: &[String]) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.iter().all(|marker| tags.contains(marker)))
    }
}

/// Share of the total distance that is safe, rounded to an integer percentage
///
/// Fails with [`PipelineError::NoDistance`] when the segments add up to no distance.
pub fn safety_percentage<'a, I>(segments: I) -> Result<u8>
where
    I: IntoIterator<Item = &'a PathSegment>,
{
    let (safe, total) = segments
        .into_iter()
        .fold((0.0_f64, 0.0_f64), |(safe, total), segment| {
            let safe = if segment.safe {
                safe + segment.distance
            } else {
                safe
            };
            (safe, total + segment.distance)
        });

    distance_percentage(safe, total)
}

/// `safe / total` as a rounded integer percentage, clamped to 0-100
pub fn distance_percentage(safe: f64, total: f64) -> Result<u8> {
    if total <= 0.0 {
        return Err(PipelineError::NoDistance);
    }

    Ok((safe / total * 100.0).round().clamp(0.0, 100.0) as u8)
}
