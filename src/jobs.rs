//! Job Lifecycle Manager
//!
//! Tracks each uploaded file from spool to final report. The first pass
//! runs capped so callers get a result within seconds; when the cap
//! truncated the input, one background task finishes the uncapped run and
//! writes the terminal state exactly once.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::Result;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::Config;
use crate::pipeline::analyze_csv;
use crate::report::AnalysisReport;

/// Where a job currently stands. `Done` and `Error` are terminal.
#[derive(Debug, Clone)]
pub enum JobState {
    Uploading,
    Processing,
    Done(Arc<AnalysisReport>),
    Error(String),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done(_) | JobState::Error(_))
    }

    /// Status string surfaced by the polling endpoint
    pub fn status_str(&self) -> &'static str {
        match self {
            JobState::Uploading => "uploading",
            JobState::Processing => "processing",
            JobState::Done(_) => "done",
            JobState::Error(_) => "error",
        }
    }
}

/// Shared job registry, cloned into every handler
#[derive(Clone, Default)]
pub struct JobTable {
    jobs: Arc<Mutex<HashMap<String, JobState>>>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, id: &str, state: JobState) {
        self.jobs.lock().await.insert(id.to_string(), state);
    }

    pub async fn get(&self, id: &str) -> Option<JobState> {
        self.jobs.lock().await.get(id).cloned()
    }
}

/// Run the capped first pass and settle the job's next state.
///
/// Returns the first-pass report. When that report already covers the whole
/// file the job lands in `Done` immediately; otherwise it moves to
/// `Processing` and a background task takes over. A first-pass failure is
/// terminal so pollers see the error instead of waiting forever.
pub async fn submit(
    table: &JobTable,
    file_id: &str,
    path: &Path,
    config: &Config,
) -> Result<AnalysisReport> {
    table.set(file_id, JobState::Uploading).await;

    let limit = Some(config.partial_row_limit);
    let report = match run_analysis(path.to_path_buf(), limit, config.clone()).await {
        Ok(report) => report,
        Err(e) => {
            table
                .set(file_id, JobState::Error(format!("{:#}", e)))
                .await;
            return Err(e);
        }
    };

    if report.summary.is_partial {
        spawn_full(table.clone(), file_id.to_string(), path.to_path_buf(), config.clone()).await;
    } else {
        table
            .set(file_id, JobState::Done(Arc::new(report.clone())))
            .await;
    }

    Ok(report)
}

/// Run the capped first pass without settling any job state.
///
/// The chunked upload path uses this directly: chunk zero wants a quick
/// preview while the rest of the file is still in flight.
pub async fn run_capped(path: PathBuf, config: Config) -> Result<AnalysisReport> {
    let limit = Some(config.partial_row_limit);
    run_analysis(path, limit, config).await
}

/// Mark the job `Processing` and finish the uncapped run in the background.
pub async fn spawn_full(table: JobTable, file_id: String, path: PathBuf, config: Config) {
    table.set(&file_id, JobState::Processing).await;

    tokio::spawn(async move {
        info!("Full analysis started for job {}", file_id);
        match run_analysis(path, None, config).await {
            Ok(report) => {
                info!("✓ Full analysis done for job {}", file_id);
                table
                    .set(&file_id, JobState::Done(Arc::new(report)))
                    .await;
            }
            Err(e) => {
                error!("Full analysis failed for job {}: {:#}", file_id, e);
                table
                    .set(&file_id, JobState::Error(format!("{:#}", e)))
                    .await;
            }
        }
    });
}

/// The pipeline is CPU-bound, so it runs on the blocking pool.
async fn run_analysis(
    path: PathBuf,
    limit: Option<usize>,
    config: Config,
) -> Result<AnalysisReport> {
    tokio::task::spawn_blocking(move || -> Result<AnalysisReport> {
        let file = File::open(&path)?;
        Ok(analyze_csv(BufReader::new(file), limit, &config)?)
    })
    .await?
}
