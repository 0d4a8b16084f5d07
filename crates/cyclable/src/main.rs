//! Cyclable - headless runner
//!
//! Fetches the town halls of a city, routes bikes between neighbors and prints a
//! JSON report on stdout. Logs go to stderr.

mod logging;
mod report;
mod settings;

use cyclable_lib::{HttpClient, LandmarkFilter, PairingOrchestrator, PipelineError};
use report::Report;
use settings::Settings;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

async fn run(settings: Settings) -> Result<Report, RunError> {
    let config = settings.config();
    let client = Arc::new(HttpClient::new(&settings.api_url(), config.request_timeout)?);

    let document = client.fetch_city(&settings.city).await?;
    let filtered = LandmarkFilter::france().filter(&document);
    let unresolved = filtered.errors.len();
    let outside = filtered.outside;

    let orchestrator = PairingOrchestrator::new(client, config);
    let pipeline = orchestrator.run(filtered.landmarks).await;

    if let Some(path) = &settings.geojson {
        let geojson = serde_json::to_vec_pretty(&pipeline.results.to_geojson())?;
        std::fs::write(path, geojson)?;
        tracing::info!("Wrote segments to {}", path.display());
    }

    Ok(Report::new(&settings.city, &pipeline, unresolved, outside))
}

fn main() -> ExitCode {
    let settings = Settings::from_cli();
    logging::setup_logging();
    logging::log_version_info();

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let report = match rt.block_on(run(settings)) {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Failed to encode report: {}", e);
            ExitCode::FAILURE
        }
    }
}
