//! YAML campaign configuration and the builders turning it into a campaign.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uq_analysis::{AnalysisElement, BasicStats, CollocationWeights, McmcAnalysis, SensitivityAnalysis, TailPolicy};
use uq_collate::stable_hash_string;
use uq_core::{ErrorInfo, ParamSpace, SeedSequence, UqError};
use uq_sampling::{
    CollocationSampler, Marginal, MetropolisSampler, ProposalSpec, RandomSampler, ReplicaSampler, Sampler,
};

use crate::app::{App, CsvDecoder, Encoder, TemplateEncoder};
use crate::campaign::Campaign;
use crate::dispatch::DispatchOptions;
use crate::executor::LocalExecutor;
use crate::feedback::{LoopOptions, LoopReport};

/// Top-level campaign configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Campaign name.
    pub name: String,
    /// Work directory, relative to the configuration file.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Master seed for every sampler stream.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// The simulated application.
    pub app: AppConfig,
    /// Sampler driving the campaign.
    pub sampler: SamplerConfig,
    /// Analysis run after every round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisConfig>,
    /// Loop limits and feedback.
    #[serde(default, rename = "loop")]
    pub run: LoopOptions,
    /// Batch execution settings.
    #[serde(default)]
    pub dispatch: DispatchOptions,
    /// Directory the configuration was loaded from.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("campaign")
}

fn default_seed() -> u64 {
    SeedSequence::default().master()
}

/// Application section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name.
    pub name: String,
    /// Declared parameters.
    pub params: ParamSpace,
    /// Template encoder, if the command reads an input file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoder: Option<EncoderConfig>,
    /// CSV decoder for the outputs.
    pub decoder: DecoderConfig,
    /// Command run in each run directory.
    pub command: CommandConfig,
}

/// Template encoder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Template file, relative to the configuration file.
    pub template: PathBuf,
    /// File written into each run directory.
    pub target: String,
}

/// CSV decoder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Output file inside each run directory.
    pub filename: String,
    /// Columns read as QoIs.
    pub columns: Vec<String>,
}

/// External command settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Program to execute.
    pub program: String,
    /// Arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Sampler section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Sampling scheme.
    #[serde(flatten)]
    pub kind: SamplerKind,
    /// Evaluations of every point, for stochastic models.
    #[serde(default = "default_replicas")]
    pub replicas: u32,
}

fn default_replicas() -> u32 {
    1
}

/// Supported sampling schemes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SamplerKind {
    /// Independent draws from per-parameter marginals.
    Random {
        /// Marginal of each varied parameter.
        vary: BTreeMap<String, Marginal>,
        /// Total number of draws; unbounded when absent.
        #[serde(default)]
        max_num: Option<usize>,
        /// Draws per round.
        #[serde(default = "default_batch_size")]
        batch_size: usize,
    },
    /// Dimension-adaptive stochastic collocation.
    SparseGrid {
        /// Bounds of each varied (uniform) parameter.
        vary: BTreeMap<String, Bounds>,
        /// Starting level of every parameter.
        #[serde(default = "default_initial_level")]
        initial_level: u32,
        /// Highest level any parameter is refined to.
        #[serde(default = "default_max_level")]
        max_level: u32,
    },
    /// Metropolis random-walk chains.
    Mcmc {
        /// Proposal and bounds of each varied parameter.
        vary: BTreeMap<String, ProposalConfig>,
        /// Starting point of each chain.
        starts: Vec<BTreeMap<String, f64>>,
        /// QoI holding the log-likelihood.
        likelihood: String,
        /// Steps per chain.
        n_steps: u64,
    },
}

fn default_batch_size() -> usize {
    16
}

fn default_initial_level() -> u32 {
    1
}

fn default_max_level() -> u32 {
    4
}

/// Bounds of a uniform parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Lower bound.
    pub lower: f64,
    /// Upper bound.
    pub upper: f64,
}

/// Random-walk proposal of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProposalConfig {
    /// Proposal standard deviation.
    pub width: f64,
    /// Lower bound of the support.
    pub lower: f64,
    /// Upper bound of the support.
    pub upper: f64,
}

/// Supported analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AnalysisConfig {
    /// Moments of QoI columns; every numeric QoI when `qois` is empty.
    BasicStats {
        /// QoIs to summarise.
        #[serde(default)]
        qois: Vec<String>,
    },
    /// Collocation moments and first-order indices; needs a sparse-grid sampler.
    Sensitivity {
        /// QoIs to analyse.
        qois: Vec<String>,
    },
    /// Posterior reconstruction; defaults to the sampler's parameters.
    Mcmc {
        /// Parameters to reconstruct.
        #[serde(default)]
        inputs: Vec<String>,
        /// Treatment of each chain's last state.
        #[serde(default)]
        tail: TailPolicy,
    },
}

/// Loads a campaign configuration from a YAML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CampaignConfig, UqError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|err| {
        UqError::Config(
            ErrorInfo::new("config-read", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    })?;
    let mut config: CampaignConfig = serde_yaml::from_slice(&bytes).map_err(|err| {
        UqError::Config(
            ErrorInfo::new("config-parse", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    })?;
    config.base_dir = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    Ok(config)
}

/// A sampler built from configuration plus the quadrature view of its grid,
/// when it has one.
pub struct BuiltSampler {
    /// The sampler, wrapped in replicas when configured.
    pub sampler: Box<dyn Sampler>,
    /// Grid weights of a sparse-grid sampler.
    pub weights: Option<Arc<dyn CollocationWeights>>,
}

impl CampaignConfig {
    /// Hash of the configuration, recorded in the campaign manifest.
    pub fn config_hash(&self) -> Result<String, UqError> {
        stable_hash_string(self)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Builds the application.
    pub fn build_app(&self) -> Result<App, UqError> {
        let app = &self.app;
        let executor = Arc::new(LocalExecutor::new(
            app.command.program.clone(),
            app.command.args.clone(),
        ));
        let decoder = Arc::new(CsvDecoder::new(
            app.decoder.filename.clone(),
            app.decoder.columns.clone(),
        ));
        let mut built = App::new(app.name.clone(), app.params.clone(), executor, decoder);
        if let Some(encoder) = &app.encoder {
            let template = TemplateEncoder::from_file(&self.resolve(&encoder.template), encoder.target.clone())?;
            let encoder: Arc<dyn Encoder> = Arc::new(template);
            built = built.with_encoder(encoder);
        }
        Ok(built)
    }

    /// Builds the sampler with streams derived from `seeds`.
    pub fn build_sampler(&self, seeds: SeedSequence) -> Result<BuiltSampler, UqError> {
        let (sampler, weights): (Box<dyn Sampler>, Option<Arc<dyn CollocationWeights>>) =
            match &self.sampler.kind {
                SamplerKind::Random {
                    vary,
                    max_num,
                    batch_size,
                } => (
                    Box::new(RandomSampler::new(vary.clone(), *max_num, *batch_size, seeds)?),
                    None,
                ),
                SamplerKind::SparseGrid {
                    vary,
                    initial_level,
                    max_level,
                } => {
                    let bounds = vary
                        .iter()
                        .map(|(name, b)| (name.clone(), (b.lower, b.upper)))
                        .collect();
                    let grid = CollocationSampler::new(bounds, *initial_level, *max_level)?;
                    let weights = grid.weights();
                    (Box::new(grid), Some(weights))
                }
                SamplerKind::Mcmc {
                    vary,
                    starts,
                    likelihood,
                    n_steps,
                } => {
                    let params = vary
                        .iter()
                        .map(|(name, p)| {
                            (
                                name.clone(),
                                ProposalSpec {
                                    width: p.width,
                                    lower: p.lower,
                                    upper: p.upper,
                                },
                            )
                        })
                        .collect();
                    let chains = MetropolisSampler::new(params, starts.clone(), likelihood.clone(), *n_steps, seeds)?;
                    (Box::new(chains), None)
                }
            };
        let sampler: Box<dyn Sampler> = if self.sampler.replicas > 1 {
            Box::new(ReplicaSampler::new(sampler, self.sampler.replicas)?)
        } else {
            sampler
        };
        Ok(BuiltSampler { sampler, weights })
    }

    /// Builds the configured analysis, if any.
    pub fn build_analysis(&self, sampler: &BuiltSampler) -> Result<Option<Box<dyn AnalysisElement>>, UqError> {
        let Some(analysis) = &self.analysis else {
            return Ok(None);
        };
        let element: Box<dyn AnalysisElement> = match analysis {
            AnalysisConfig::BasicStats { qois } => Box::new(BasicStats::for_qois(qois.clone())),
            AnalysisConfig::Sensitivity { qois } => {
                let weights = sampler.weights.clone().ok_or_else(|| {
                    UqError::Config(
                        ErrorInfo::new("sensitivity-needs-grid", "sensitivity analysis needs a sparse-grid sampler")
                            .with_hint("set sampler.kind to sparse-grid"),
                    )
                })?;
                Box::new(SensitivityAnalysis::new(qois.clone(), weights))
            }
            AnalysisConfig::Mcmc { inputs, tail } => {
                let inputs = if inputs.is_empty() {
                    sampler.sampler.inputs()
                } else {
                    inputs.clone()
                };
                Box::new(McmcAnalysis::new(inputs).with_tail(*tail))
            }
        };
        Ok(Some(element))
    }

    /// Builds a ready-to-run campaign.
    pub fn build(&self) -> Result<Campaign, UqError> {
        let mut campaign = Campaign::new(self.name.clone(), self.resolve(&self.work_dir), self.seed)?
            .with_config_hash(self.config_hash()?);
        campaign.set_dispatch(self.dispatch.clone());
        campaign.add_app(self.build_app()?)?;
        let built = self.build_sampler(campaign.seeds())?;
        if let Some(analysis) = self.build_analysis(&built)? {
            campaign.set_analysis(analysis)?;
        }
        campaign.set_sampler(built.sampler)?;
        Ok(campaign)
    }
}

/// Loads a configuration, builds the campaign and runs its loop.
pub fn run_config<P: AsRef<Path>>(path: P) -> Result<(Campaign, LoopReport), UqError> {
    let config = load_config(path)?;
    let mut campaign = config.build()?;
    info!(campaign = %config.name, app = %config.app.name, "campaign built");
    let report = campaign.run_loop(&config.run)?;
    Ok((campaign, report))
}
