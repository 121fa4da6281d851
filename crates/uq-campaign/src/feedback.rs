//! The adaptive sampling loop.
//!
//! The loop alternates two phases. Sampling draws one batch from the active
//! sampler and returns only once every run of the batch is terminal and
//! collated. Analyzing snapshots the full accumulated table, runs the attached
//! analysis, hands the fresh result to the sampler's refinement step when
//! feedback is enabled, and applies the runs the sampler excludes. The loop
//! stops when the sampler is exhausted or the round limit is reached.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uq_core::{ErrorInfo, UqError};

use crate::campaign::Campaign;
use crate::dispatch::BatchReport;

/// Options of [`Campaign::run_loop`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopOptions {
    /// Maximum number of rounds; `None` runs until the sampler is exhausted.
    #[serde(default)]
    pub max_rounds: Option<usize>,
    /// Pass each fresh analysis result to the sampler's refinement step.
    #[serde(default = "default_feedback")]
    pub feedback: bool,
    /// Persist tables and manifest after every round.
    #[serde(default = "default_save")]
    pub save_every_round: bool,
}

fn default_feedback() -> bool {
    true
}

fn default_save() -> bool {
    true
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            max_rounds: None,
            feedback: default_feedback(),
            save_every_round: default_save(),
        }
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    /// The sampler reported it would emit no further points.
    Exhausted,
    /// The configured round limit was reached.
    RoundLimit,
}

/// Summary of one Sampling/Analyzing cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundReport {
    /// Round number, starting at 1 for the first round of the campaign.
    pub round: usize,
    /// Runs executed in the round.
    pub runs: usize,
    /// Runs that completed.
    pub completed: usize,
    /// Runs that failed.
    pub failed: usize,
    /// Runs the sampler excluded after the round.
    pub ignored: usize,
    /// Kind of the analysis result produced, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Why the analysis pass failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<String>,
}

/// Outcome of [`Campaign::run_loop`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopReport {
    /// Rounds run by this call.
    pub rounds: Vec<RoundReport>,
    /// Why the loop stopped.
    pub stop: StopReason,
}

enum Phase {
    Sampling,
    Analyzing(BatchReport),
}

impl Campaign {
    /// Runs the adaptive loop on the active app.
    ///
    /// A failed analysis pass aborts only that pass: it is logged and recorded
    /// in the round report, the previous result stays current, and the sampler
    /// refines without feedback.
    pub fn run_loop(&mut self, opts: &LoopOptions) -> Result<LoopReport, UqError> {
        let mut phase = Phase::Sampling;
        let mut rounds = Vec::new();
        let mut empty_streak = 0usize;
        let mut stale = false;

        let stop = loop {
            phase = match phase {
                Phase::Sampling => {
                    if self.sampler_exhausted()? {
                        break StopReason::Exhausted;
                    }
                    if opts.max_rounds.map_or(false, |max| rounds.len() >= max) {
                        break StopReason::RoundLimit;
                    }
                    let batch = self.run_batch()?;
                    if batch.runs.is_empty() {
                        empty_streak += 1;
                        if empty_streak > 1 {
                            return Err(UqError::Sampling(
                                ErrorInfo::new("sampler-stalled", "sampler emits no points but is not exhausted")
                                    .with_context("round", (self.rounds + 1).to_string()),
                            ));
                        }
                    } else {
                        empty_streak = 0;
                    }
                    Phase::Analyzing(batch)
                }
                Phase::Analyzing(batch) => {
                    let report = self.analysing_phase(&batch, opts.feedback)?;
                    stale = report.ignored > 0;
                    info!(
                        round = report.round,
                        runs = report.runs,
                        failed = report.failed,
                        ignored = report.ignored,
                        "round finished"
                    );
                    rounds.push(report);
                    if opts.save_every_round {
                        self.save()?;
                    }
                    Phase::Sampling
                }
            };
        };

        // Runs excluded after the last analysis are not reflected in it yet.
        if stale {
            if let Err(err) = self.analyse() {
                warn!(error = %err, "final analysis pass failed");
            }
            if opts.save_every_round {
                self.save()?;
            }
        }
        info!(rounds = rounds.len(), stop = ?stop, "adaptive loop stopped");
        Ok(LoopReport { rounds, stop })
    }

    fn analysing_phase(&mut self, batch: &BatchReport, feedback: bool) -> Result<RoundReport, UqError> {
        let (result, analysis_error) = match self.analyse() {
            Ok(result) => (result, None),
            Err(err) => {
                warn!(error = %err, "analysis pass failed");
                (None, Some(err.to_string()))
            }
        };
        let previous = if feedback { result.as_ref() } else { None };
        let refinement = self.refine_sampler(previous)?;
        self.rounds += 1;
        Ok(RoundReport {
            round: self.rounds,
            runs: batch.runs.len(),
            completed: batch.completed(),
            failed: batch.failed().count(),
            ignored: refinement.ignored_runs.len(),
            result: result.map(|result| result.kind().to_string()),
            analysis_error,
        })
    }
}
