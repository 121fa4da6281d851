//! Parallel execution of one batch of runs with deterministic retries.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uq_collate::{CollationBuilder, RunOutcome};
use uq_core::{ErrorInfo, RunDescriptor, RunId, RunStatus, SeedSequence, UqError};

use crate::app::App;
use crate::executor::RunContext;

/// Options governing batch execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOptions {
    /// Number of runs executed in parallel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Attempts per run, the first one included; at least one is always made.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_concurrency() -> usize {
    1
}

fn default_max_attempts() -> u32 {
    2
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Terminal status of one run in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Run the report describes.
    pub run_id: RunId,
    /// Either completed or failed.
    pub status: RunStatus,
    /// Number of execution attempts made.
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Failure reason for failed runs.
    pub error: Option<String>,
}

impl RunReport {
    fn success(run_id: RunId, attempts: u32) -> Self {
        Self {
            run_id,
            status: RunStatus::Completed,
            attempts,
            error: None,
        }
    }

    fn failed(run_id: RunId, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            run_id,
            status: RunStatus::Failed,
            attempts,
            error: Some(error.into()),
        }
    }
}

/// Reports of every run of a batch, in run id order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchReport {
    /// Per-run reports.
    pub runs: Vec<RunReport>,
}

impl BatchReport {
    /// Number of completed runs.
    pub fn completed(&self) -> usize {
        self.runs
            .iter()
            .filter(|run| run.status == RunStatus::Completed)
            .count()
    }

    /// Reports of failed runs.
    pub fn failed(&self) -> impl Iterator<Item = &RunReport> {
        self.runs
            .iter()
            .filter(|run| run.status == RunStatus::Failed)
    }
}

/// Executes `runs` of `app` in parallel and collates each outcome.
///
/// Returns once every run is terminal and recorded in `builder`. Row-level
/// failures (encoding, execution, decoding, schema mismatch) are recorded as
/// failed runs; only builder conflicts abort the batch.
pub fn execute_batch(
    app: &App,
    runs: &[RunDescriptor],
    builder: &CollationBuilder,
    work_dir: &Path,
    seeds: SeedSequence,
    opts: &DispatchOptions,
) -> Result<BatchReport, UqError> {
    let runs_dir = app.runs_dir(work_dir);
    fs::create_dir_all(&runs_dir).map_err(|err| {
        UqError::Serde(
            ErrorInfo::new("runs-dir", err.to_string())
                .with_context("path", runs_dir.display().to_string()),
        )
    })?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.concurrency.max(1))
        .build()
        .map_err(|err| UqError::Execution(ErrorInfo::new("thread-pool", err.to_string())))?;

    let results: Result<Vec<RunReport>, UqError> = pool.install(|| {
        runs.par_iter()
            .map(|run| {
                let run_dir = runs_dir.join(run.run_id.to_string());
                let seed = seeds.child(run.run_id.as_raw()).master();
                process_run(app, run, run_dir, seed, builder, opts.max_attempts)
            })
            .collect()
    });

    let mut reports = results?;
    reports.sort_by_key(|report| report.run_id);
    let report = BatchReport { runs: reports };
    info!(
        app = %app.name,
        runs = report.runs.len(),
        completed = report.completed(),
        failed = report.failed().count(),
        "batch collated"
    );
    Ok(report)
}

fn process_run(
    app: &App,
    run: &RunDescriptor,
    run_dir: PathBuf,
    seed: u64,
    builder: &CollationBuilder,
    max_attempts: u32,
) -> Result<RunReport, UqError> {
    let (outcome, attempts) = match prepare_and_execute(app, run, &run_dir, seed, max_attempts) {
        Ok(attempts) => match app.decoder.decode(&run_dir) {
            Ok(decoded) => (RunOutcome::Completed(decoded), attempts),
            Err(err) => (RunOutcome::failed(err.to_string()), attempts),
        },
        Err(failure) => (RunOutcome::failed(failure.error), failure.attempts),
    };

    if let RunOutcome::Failed { reason } = &outcome {
        warn!(run = %run.run_id, attempts, reason = %reason, "run failed");
    }
    let failure = match &outcome {
        RunOutcome::Failed { reason } => Some(reason.clone()),
        RunOutcome::Completed(_) => None,
    };
    match builder.add_run(run, outcome) {
        Ok(_) => Ok(match failure {
            Some(reason) => RunReport::failed(run.run_id, attempts, reason),
            None => RunReport::success(run.run_id, attempts),
        }),
        Err(err) if err.is_row_level() => Ok(RunReport::failed(run.run_id, attempts, err.to_string())),
        Err(err) => Err(err),
    }
}

fn prepare_and_execute(
    app: &App,
    run: &RunDescriptor,
    run_dir: &Path,
    seed: u64,
    max_attempts: u32,
) -> Result<u32, RunFailure> {
    fs::create_dir_all(run_dir).map_err(|err| RunFailure {
        attempts: 0,
        error: format!("cannot create run directory: {err}"),
    })?;
    if let Some(encoder) = &app.encoder {
        encoder.encode(&run.params, run_dir).map_err(|err| RunFailure {
            attempts: 0,
            error: err.to_string(),
        })?;
    }
    execute_with_retries(app, run, run_dir, seed, max_attempts)
}

fn execute_with_retries(
    app: &App,
    run: &RunDescriptor,
    run_dir: &Path,
    seed: u64,
    max_attempts: u32,
) -> Result<u32, RunFailure> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let ctx = RunContext {
            run,
            run_dir,
            attempt,
            seed: derive_seed(seed, attempt),
        };
        match app.executor.execute(&ctx) {
            Ok(()) => return Ok(attempt),
            Err(err) if attempt < max_attempts.max(1) => {
                warn!(run = %run.run_id, attempt, error = %err, "attempt failed, retrying");
                continue;
            }
            Err(err) => {
                return Err(RunFailure {
                    attempts: attempt,
                    error: err.to_string(),
                })
            }
        }
    }
}

fn derive_seed(seed: u64, attempt: u32) -> u64 {
    if attempt <= 1 {
        seed
    } else {
        seed ^ ((attempt - 1) as u64).wrapping_mul(0x9e3779b97f4a7c15)
    }
}

struct RunFailure {
    attempts: u32,
    error: String,
}
