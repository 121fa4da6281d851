//! Random-walk Metropolis chains evaluated through the campaign.
//!
//! Each chain starts with its initial state at iteration 0. Every later batch
//! carries one proposal per live chain, tagged with the step it was made at.
//! After evaluation the proposal is accepted or rejected from the
//! log-likelihood QoI; rejected proposal runs are reported back as ignored, so
//! the table keeps only accepted states in the chain and the gaps between their
//! iterations encode the rejections. Proposals that leave the parameter bounds
//! are rejected without being run.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::{debug, info, warn};
use uq_analysis::AnalysisResult;
use uq_collate::{CollationTable, ColumnKey};
use uq_core::{ErrorInfo, Lineage, ParameterPoint, RunId, RunStatus, SeedSequence, UqError, Value};

use crate::sampler::{Refinement, Sampler};

/// Proposal and bounds of one varied parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProposalSpec {
    /// Standard deviation of the Gaussian random-walk step.
    pub width: f64,
    /// Lower bound of the support.
    pub lower: f64,
    /// Upper bound of the support.
    pub upper: f64,
}

#[derive(Debug)]
struct Chain {
    id: String,
    state: BTreeMap<String, f64>,
    log_likelihood: Option<f64>,
    step: u64,
    pending: Option<Pending>,
    accepted: u64,
    proposed: u64,
    rng: StdRng,
}

#[derive(Debug, Clone)]
struct Pending {
    iteration: u64,
    state: BTreeMap<String, f64>,
}

/// Metropolis random-walk sampler running several chains side by side.
#[derive(Debug)]
pub struct MetropolisSampler {
    name: String,
    params: BTreeMap<String, ProposalSpec>,
    likelihood: String,
    n_steps: u64,
    chains: Vec<Chain>,
}

impl MetropolisSampler {
    /// Creates one chain per starting point.
    ///
    /// `likelihood` names the QoI holding the log-likelihood of a run and
    /// `n_steps` bounds the number of steps each chain takes.
    pub fn new(
        params: BTreeMap<String, ProposalSpec>,
        starts: Vec<BTreeMap<String, f64>>,
        likelihood: impl Into<String>,
        n_steps: u64,
        seeds: SeedSequence,
    ) -> Result<Self, UqError> {
        if params.is_empty() || starts.is_empty() {
            return Err(UqError::Config(ErrorInfo::new(
                "mcmc-setup",
                "Metropolis sampler needs varied parameters and at least one chain",
            )));
        }
        for (name, spec) in &params {
            if !(spec.width > 0.0 && spec.lower < spec.upper) {
                return Err(UqError::Config(
                    ErrorInfo::new("mcmc-proposal", "proposal width or bounds are invalid")
                        .with_context("param", name.clone()),
                ));
            }
        }
        let name = "mcmc".to_string();
        let streams = seeds.labelled(&name);
        let mut chains = Vec::with_capacity(starts.len());
        for (index, start) in starts.into_iter().enumerate() {
            for (param, spec) in &params {
                let value = start.get(param).copied().ok_or_else(|| {
                    UqError::Config(
                        ErrorInfo::new("mcmc-start", "starting point misses a varied parameter")
                            .with_context("chain", index.to_string())
                            .with_context("param", param.clone()),
                    )
                })?;
                if value < spec.lower || value > spec.upper {
                    return Err(UqError::Config(
                        ErrorInfo::new("mcmc-start", "starting point outside the bounds")
                            .with_context("chain", index.to_string())
                            .with_context("param", param.clone()),
                    ));
                }
            }
            chains.push(Chain {
                id: format!("chain_{index}"),
                state: start,
                log_likelihood: None,
                step: 0,
                pending: None,
                accepted: 0,
                proposed: 0,
                rng: streams.child(index as u64).rng(),
            });
        }
        Ok(Self {
            name,
            params,
            likelihood: likelihood.into(),
            n_steps,
            chains,
        })
    }

    /// Chain identifiers in creation order.
    pub fn chain_ids(&self) -> Vec<String> {
        self.chains.iter().map(|chain| chain.id.clone()).collect()
    }

    /// Fraction of proposals accepted per chain.
    pub fn acceptance_rates(&self) -> BTreeMap<String, f64> {
        self.chains
            .iter()
            .map(|chain| {
                let rate = if chain.proposed == 0 {
                    0.0
                } else {
                    chain.accepted as f64 / chain.proposed as f64
                };
                (chain.id.clone(), rate)
            })
            .collect()
    }

    fn point(&self, chain_id: &str, iteration: u64, state: &BTreeMap<String, f64>) -> ParameterPoint {
        let values = state
            .iter()
            .map(|(name, value)| (name.clone(), Value::Float(*value)))
            .collect();
        ParameterPoint::new(values).with_lineage(Lineage::chain(chain_id, iteration))
    }

    fn propose(&mut self, chain_index: usize) -> Result<Option<Pending>, UqError> {
        let params = &self.params;
        let chain = &mut self.chains[chain_index];
        while chain.step < self.n_steps {
            chain.step += 1;
            chain.proposed += 1;
            let mut proposal = BTreeMap::new();
            let mut inside = true;
            for (name, spec) in params {
                let current = chain.state.get(name).copied().unwrap_or_default();
                let walk = Normal::new(current, spec.width).map_err(|err| {
                    UqError::Sampling(
                        ErrorInfo::new("mcmc-proposal", err.to_string())
                            .with_context("param", name.clone()),
                    )
                })?;
                let value = walk.sample(&mut chain.rng);
                inside &= value >= spec.lower && value <= spec.upper;
                proposal.insert(name.clone(), value);
            }
            if inside {
                return Ok(Some(Pending {
                    iteration: chain.step,
                    state: proposal,
                }));
            }
            debug!(chain = %chain.id, step = chain.step, "proposal outside the support rejected");
        }
        Ok(None)
    }

    fn likelihood_of(
        &self,
        table: &CollationTable,
        chain_id: &str,
        iteration: u64,
    ) -> Result<(Option<f64>, Vec<RunId>), UqError> {
        let key = ColumnKey::scalar(self.likelihood.clone());
        let mut values = Vec::new();
        let mut runs = Vec::new();
        let mut seen = false;
        for row in table.rows() {
            let Some(position) = row.lineage.chain.as_ref() else {
                continue;
            };
            if position.chain_id != chain_id || position.iteration != iteration {
                continue;
            }
            seen = true;
            if row.status != RunStatus::Completed {
                continue;
            }
            match row.qoi(&key).and_then(Value::as_f64) {
                Some(value) => {
                    values.push(value);
                    runs.push(row.run_id);
                }
                None => {
                    return Err(UqError::MissingParameter(
                        ErrorInfo::new("likelihood-missing", "run lacks the log-likelihood QoI")
                            .with_context("run", row.run_id.to_string())
                            .with_context("qoi", self.likelihood.clone()),
                    ))
                }
            }
        }
        if !seen {
            return Err(UqError::Sampling(
                ErrorInfo::new("proposal-missing", "no run recorded for a pending chain state")
                    .with_context("chain", chain_id)
                    .with_context("iteration", iteration.to_string()),
            ));
        }
        let mean = (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64);
        Ok((mean, runs))
    }
}

impl Sampler for MetropolisSampler {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<String> {
        self.params.keys().cloned().collect()
    }

    fn next_batch(&mut self) -> Result<Vec<ParameterPoint>, UqError> {
        let mut batch = Vec::new();
        for index in 0..self.chains.len() {
            if self.chains[index].pending.is_some() {
                continue;
            }
            let pending = if self.chains[index].log_likelihood.is_none() {
                // The starting state has not been evaluated yet.
                Some(Pending {
                    iteration: 0,
                    state: self.chains[index].state.clone(),
                })
            } else {
                self.propose(index)?
            };
            if let Some(pending) = pending {
                let chain = &self.chains[index];
                batch.push(self.point(&chain.id, pending.iteration, &pending.state));
                self.chains[index].pending = Some(pending);
            }
        }
        debug!(sampler = %self.name, points = batch.len(), "chain batch");
        Ok(batch)
    }

    fn exhausted(&self) -> bool {
        self.chains.iter().all(|chain| {
            chain.pending.is_none() && chain.log_likelihood.is_some() && chain.step >= self.n_steps
        })
    }

    fn refine(
        &mut self,
        table: &CollationTable,
        _previous: Option<&AnalysisResult>,
    ) -> Result<Refinement, UqError> {
        let mut refinement = Refinement::default();
        for index in 0..self.chains.len() {
            let Some(pending) = self.chains[index].pending.clone() else {
                continue;
            };
            let chain_id = self.chains[index].id.clone();
            let (log_likelihood, runs) = self.likelihood_of(table, &chain_id, pending.iteration)?;
            let chain = &mut self.chains[index];
            chain.pending = None;

            let Some(current) = chain.log_likelihood else {
                match log_likelihood {
                    Some(value) => chain.log_likelihood = Some(value),
                    None => {
                        return Err(UqError::Sampling(
                            ErrorInfo::new("chain-start-failed", "starting state could not be evaluated")
                                .with_context("chain", chain_id),
                        ))
                    }
                }
                continue;
            };

            let accepted = match log_likelihood {
                Some(proposed) if proposed.is_finite() => {
                    let ratio = (proposed - current).min(0.0).exp();
                    chain.rng.gen::<f64>() < ratio
                }
                Some(_) => false,
                None => {
                    warn!(chain = %chain_id, iteration = pending.iteration, "proposal failed, treated as rejected");
                    false
                }
            };
            if accepted {
                chain.state = pending.state;
                chain.log_likelihood = log_likelihood;
                chain.accepted += 1;
            } else {
                refinement.ignored_runs.extend(runs);
            }
        }
        info!(
            sampler = %self.name,
            rejected = refinement.ignored_runs.len(),
            "chains updated"
        );
        Ok(refinement)
    }
}
