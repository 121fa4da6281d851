#![deny(missing_docs)]
#![doc = "Statistical reducers over collation table snapshots: moments, MCMC posterior reconstruction and stochastic-collocation sensitivity indices."]

/// Moments and quantiles per QoI column.
pub mod basic_stats;
/// The analysis capability shared by every reducer.
pub mod element;
pub mod mcmc;
/// Closed set of analysis results.
pub mod result;
pub mod sensitivity;
/// Statistical aggregation primitives.
pub mod stat;

pub use basic_stats::{BasicStats, BasicStatsResult, ColumnStats};
pub use element::AnalysisElement;
pub use mcmc::{McmcAnalysis, McmcChains, TailPolicy, Trajectory, DEFAULT_BINS};
pub use result::AnalysisResult;
pub use sensitivity::{
    CollocationNode, CollocationWeights, ColumnSensitivity, SensitivityAnalysis,
    SensitivityResult,
};
pub use stat::{Histogram, Moments, Quantiles};
