//! Posterior reconstruction from chain-tagged runs.
//!
//! A Metropolis-type sampler only records the states it accepts: a run tagged
//! with `(chain, iteration)` is the state the chain moved to at that step, and
//! the chain stays there until the next recorded iteration. Reconstruction
//! therefore expands each recorded state by the gap to the next one.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uq_collate::{CollationTable, RunRow};
use uq_core::{ErrorInfo, RunStatus, UqError, Value};

use crate::element::AnalysisElement;
use crate::result::AnalysisResult;
use crate::stat::{histogram_auto, Histogram};

/// Bin count used when a caller does not choose one.
pub const DEFAULT_BINS: usize = 20;

/// Treatment of the last recorded state of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TailPolicy {
    /// The last state only closes the previous gap and is not emitted itself.
    #[default]
    Exclude,
    /// The last state is emitted exactly once.
    Single,
    /// The last state is repeated until the trajectory reaches the given length.
    PadTo(usize),
}

/// Reconstructed trajectory of one chain: rows are steps, columns parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    /// Chain identifier.
    pub chain_id: String,
    /// Parameter names, in column order.
    pub parameters: Vec<String>,
    /// Distinct recorded iterations, ascending.
    pub iterations: Vec<u64>,
    steps: usize,
    columns: Vec<Vec<f64>>,
}

impl Trajectory {
    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps
    }

    /// Whether the trajectory has no steps.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values of one parameter over all steps.
    pub fn column(&self, parameter: &str) -> Option<&[f64]> {
        self.parameters
            .iter()
            .position(|name| name == parameter)
            .map(|idx| self.columns[idx].as_slice())
    }

    /// State at step `index`, in parameter order.
    pub fn step(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.len() {
            return None;
        }
        Some(self.columns.iter().map(|column| column[index]).collect())
    }
}

/// Posterior chains keyed by chain id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct McmcChains {
    /// Input parameters reconstructed for every chain.
    pub inputs: Vec<String>,
    /// Tail policy the chains were built with.
    pub tail: TailPolicy,
    chains: BTreeMap<String, Trajectory>,
}

impl McmcChains {
    /// Chain identifiers in ascending order.
    pub fn chain_ids(&self) -> impl Iterator<Item = &str> {
        self.chains.keys().map(String::as_str)
    }

    /// Trajectory of one chain.
    pub fn chain(&self, chain_id: &str) -> Option<&Trajectory> {
        self.chains.get(chain_id)
    }

    /// Trajectories in chain id order.
    pub fn iter(&self) -> impl Iterator<Item = &Trajectory> {
        self.chains.values()
    }

    /// Number of chains.
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Whether no chain was reconstructed.
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Trace of `parameter` with the first `skip` steps dropped.
    ///
    /// With `chain` set the trace is that chain alone; otherwise the traces of
    /// all chains, each with its own burn-in removed, are concatenated in chain
    /// id order.
    pub fn trace(
        &self,
        parameter: &str,
        chain: Option<&str>,
        skip: usize,
    ) -> Result<Vec<f64>, UqError> {
        if !self.inputs.iter().any(|name| name == parameter) {
            return Err(UqError::MissingParameter(
                ErrorInfo::new("unknown-parameter", "parameter was not reconstructed")
                    .with_context("param", parameter),
            ));
        }
        let selected: Vec<&Trajectory> = match chain {
            Some(chain_id) => vec![self.chains.get(chain_id).ok_or_else(|| {
                UqError::EmptyChain(
                    ErrorInfo::new("unknown-chain", "no chain with this id")
                        .with_context("chain", chain_id),
                )
            })?],
            None => self.chains.values().collect(),
        };
        let mut trace = Vec::new();
        for trajectory in selected {
            if let Some(column) = trajectory.column(parameter) {
                trace.extend(column.iter().skip(skip).copied());
            }
        }
        Ok(trace)
    }

    /// Histogram of the trace selected as in [`McmcChains::trace`], over the
    /// sample range.
    pub fn histogram(
        &self,
        parameter: &str,
        chain: Option<&str>,
        skip: usize,
        bins: usize,
    ) -> Result<Histogram, UqError> {
        if bins == 0 {
            return Err(UqError::Config(
                ErrorInfo::new("histogram-bins", "histogram needs at least one bin")
                    .with_hint(format!("the default is {DEFAULT_BINS}")),
            ));
        }
        let trace = self.trace(parameter, chain, skip)?;
        Ok(histogram_auto(&trace, bins))
    }
}

/// MCMC posterior reconstruction.
#[derive(Debug, Clone)]
pub struct McmcAnalysis {
    inputs: Vec<String>,
    tail: TailPolicy,
}

impl McmcAnalysis {
    /// Reconstructs the given input parameters with [`TailPolicy::Exclude`].
    pub fn new<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            tail: TailPolicy::default(),
        }
    }

    /// Selects how the last state of each chain is treated.
    pub fn with_tail(mut self, tail: TailPolicy) -> Self {
        self.tail = tail;
        self
    }

    /// Parameters this analysis reconstructs.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Reconstructs every chain in `table`.
    pub fn reconstruct(&self, table: &CollationTable) -> Result<McmcChains, UqError> {
        if self.inputs.is_empty() {
            return Err(UqError::Config(ErrorInfo::new(
                "mcmc-no-inputs",
                "posterior reconstruction needs at least one input parameter",
            )));
        }
        for name in &self.inputs {
            if !table.has_param(name) {
                return Err(UqError::MissingParameter(
                    ErrorInfo::new("param-missing", "declared input is not a table column")
                        .with_context("param", name.clone())
                        .with_context("app", table.app()),
                ));
            }
        }

        let mut partitions: BTreeMap<&str, Vec<&RunRow>> = BTreeMap::new();
        for row in table.rows() {
            let Some(chain) = row.lineage.chain.as_ref() else {
                continue;
            };
            let rows = partitions.entry(chain.chain_id.as_str()).or_default();
            if row.status == RunStatus::Completed {
                rows.push(row);
            }
        }
        if partitions.is_empty() {
            return Err(UqError::EmptyChain(
                ErrorInfo::new("no-chains", "table holds no chain-tagged runs")
                    .with_context("app", table.app()),
            ));
        }

        let partitions: Vec<(&str, Vec<&RunRow>)> = partitions.into_iter().collect();
        let reconstructed: Vec<Result<Trajectory, UqError>> = partitions
            .par_iter()
            .map(|(chain_id, rows)| reconstruct_chain(chain_id, rows, &self.inputs, self.tail))
            .collect();

        let mut chains = BTreeMap::new();
        for trajectory in reconstructed {
            let trajectory = trajectory?;
            debug!(chain = %trajectory.chain_id, steps = trajectory.len(), "chain reconstructed");
            chains.insert(trajectory.chain_id.clone(), trajectory);
        }
        info!(app = table.app(), chains = chains.len(), "posterior reconstructed");
        Ok(McmcChains {
            inputs: self.inputs.clone(),
            tail: self.tail,
            chains,
        })
    }
}

impl AnalysisElement for McmcAnalysis {
    fn name(&self) -> &str {
        "mcmc"
    }

    fn analyse(&self, table: &CollationTable) -> Result<AnalysisResult, UqError> {
        self.reconstruct(table).map(AnalysisResult::Mcmc)
    }
}

fn reconstruct_chain(
    chain_id: &str,
    rows: &[&RunRow],
    inputs: &[String],
    tail: TailPolicy,
) -> Result<Trajectory, UqError> {
    let states = average_states(chain_id, rows, inputs)?;
    let (Some((first, _)), Some((last, last_state))) = (states.first(), states.last()) else {
        return Err(UqError::EmptyChain(
            ErrorInfo::new("empty-chain", "chain has no completed iterations")
                .with_context("chain", chain_id),
        ));
    };

    let expanded = (last - first) as usize;
    let len = match tail {
        TailPolicy::Exclude => expanded,
        TailPolicy::Single => expanded + 1,
        TailPolicy::PadTo(target) if target >= expanded => target,
        TailPolicy::PadTo(target) => {
            return Err(UqError::Config(
                ErrorInfo::new("chain-length-too-short", "pad target is below the expanded length")
                    .with_context("chain", chain_id)
                    .with_context("target", target.to_string())
                    .with_context("expanded", expanded.to_string()),
            ))
        }
    };

    let mut columns = vec![vec![0.0; len]; inputs.len()];
    let mut position = 0usize;
    for pair in states.windows(2) {
        let (from, state) = &pair[0];
        let (to, _) = &pair[1];
        for _ in 0..(to - from) {
            for (column, value) in columns.iter_mut().zip(state) {
                column[position] = *value;
            }
            position += 1;
        }
    }
    while position < len {
        for (column, value) in columns.iter_mut().zip(last_state) {
            column[position] = *value;
        }
        position += 1;
    }

    Ok(Trajectory {
        chain_id: chain_id.to_string(),
        parameters: inputs.to_vec(),
        iterations: states.iter().map(|(iteration, _)| *iteration).collect(),
        steps: len,
        columns,
    })
}

/// Groups rows by iteration and averages repeated rows column-wise.
fn average_states(
    chain_id: &str,
    rows: &[&RunRow],
    inputs: &[String],
) -> Result<Vec<(u64, Vec<f64>)>, UqError> {
    let mut sums: BTreeMap<u64, (Vec<f64>, usize)> = BTreeMap::new();
    for row in rows {
        let Some(position) = row.lineage.chain.as_ref() else {
            continue;
        };
        let mut state = Vec::with_capacity(inputs.len());
        for name in inputs {
            match row.param(name).and_then(Value::as_f64) {
                Some(value) => state.push(value),
                None => {
                    return Err(UqError::MissingParameter(
                        ErrorInfo::new("param-missing", "chain state lacks a numeric value")
                            .with_context("chain", chain_id)
                            .with_context("param", name.clone())
                            .with_context("run", row.run_id.to_string()),
                    ))
                }
            }
        }
        let entry = sums
            .entry(position.iteration)
            .or_insert_with(|| (vec![0.0; inputs.len()], 0));
        for (sum, value) in entry.0.iter_mut().zip(&state) {
            *sum += value;
        }
        entry.1 += 1;
    }
    Ok(sums
        .into_iter()
        .map(|(iteration, (sum, count))| {
            let mean = sum.into_iter().map(|s| s / count as f64).collect();
            (iteration, mean)
        })
        .collect())
}
