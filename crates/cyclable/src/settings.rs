use clap::Parser;
use cyclable_lib::{Config, DispatchPolicy, SafetyClassifier};
use std::path::PathBuf;
use std::time::Duration;

/// Used when neither `--api-url` nor `CYCLABLE_API_URL` is set
pub const DEFAULT_API_URL: &str = "http://localhost:3000/";

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Cyclable - Routes bikes between neighboring town halls and measures how much of the ride is on protected infrastructure
pub struct Settings {
    /// City whose town halls are paired and routed
    pub city: String,

    /// Base URL of the API serving `points/<city>` and `bikeRouter/<query>` (falls back to $CYCLABLE_API_URL)
    #[clap(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// Neighbors routed from each town hall
    #[clap(short = 'k', long, default_value = "4")]
    pub nearest: usize,

    /// Maximum number of routing requests in flight
    #[clap(long, default_value = "4")]
    pub max_in_flight: usize,

    /// Delay between two dispatched requests, in milliseconds
    #[clap(long, default_value = "100")]
    pub interval_ms: u64,

    /// Schedule every request up front, neighbor j of town hall i waiting interval * (i + j)
    #[clap(long)]
    pub staggered: bool,

    /// Per-request timeout in seconds
    #[clap(long, default_value = "30")]
    pub timeout_secs: u64,

    /// Route each pair of town halls once instead of once per direction
    #[clap(long)]
    pub dedup: bool,

    /// Ignore neighbors farther apart than this many kilometers
    #[clap(long, value_name = "KM")]
    pub max_pair_distance_km: Option<f64>,

    /// Extra safe-infrastructure rule as comma-separated tags that must all match (repeatable)
    #[clap(long = "safe-rule", value_name = "TAGS")]
    pub safe_rules: Vec<String>,

    /// Write all routed segments to this file as GeoJSON
    #[clap(long, value_name = "FILE")]
    pub geojson: Option<PathBuf>,
}

impl Settings {
    pub fn from_cli() -> Self {
        match Settings::try_parse() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    pub fn api_url(&self) -> String {
        self.api_url
            .clone()
            .or_else(|| get_env("CYCLABLE_API_URL"))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// Pipeline configuration from the command line
    pub fn config(&self) -> Config {
        let interval = Duration::from_millis(self.interval_ms);
        let dispatch = if self.staggered {
            DispatchPolicy::Staggered { stagger: interval }
        } else {
            DispatchPolicy::Bounded {
                max_in_flight: self.max_in_flight,
                interval,
            }
        };

        let safety = self
            .safe_rules
            .iter()
            .fold(SafetyClassifier::default(), |classifier, rule| {
                classifier.with_rule_str(rule)
            });

        Config {
            nearest_points_limit: self.nearest,
            dispatch,
            request_timeout: Duration::from_secs(self.timeout_secs),
            deduplicate_pairs: self.dedup,
            max_pair_distance_km: self.max_pair_distance_km,
            safety,
        }
    }
}

/// Get an environment variable, parsed to the desired type
pub fn get_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
