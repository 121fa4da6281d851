use serde::Serialize;

use crate::basic_stats::BasicStatsResult;
use crate::mcmc::McmcChains;
use crate::sensitivity::SensitivityResult;

/// Derived data produced by one analysis pass. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "result", rename_all = "kebab-case")]
pub enum AnalysisResult {
    /// Per-column moments and quantiles.
    BasicStats(BasicStatsResult),
    /// Collocation moments and first-order sensitivity indices.
    Sensitivity(SensitivityResult),
    /// Reconstructed posterior chains.
    Mcmc(McmcChains),
}

impl AnalysisResult {
    /// Stable label of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisResult::BasicStats(_) => "basic-stats",
            AnalysisResult::Sensitivity(_) => "sensitivity",
            AnalysisResult::Mcmc(_) => "mcmc",
        }
    }

    /// Moments, when this is a basic-stats result.
    pub fn as_basic_stats(&self) -> Option<&BasicStatsResult> {
        match self {
            AnalysisResult::BasicStats(result) => Some(result),
            _ => None,
        }
    }

    /// Sensitivity indices, when this is a collocation result.
    pub fn as_sensitivity(&self) -> Option<&SensitivityResult> {
        match self {
            AnalysisResult::Sensitivity(result) => Some(result),
            _ => None,
        }
    }

    /// Posterior chains, when this is an MCMC result.
    pub fn as_mcmc(&self) -> Option<&McmcChains> {
        match self {
            AnalysisResult::Mcmc(result) => Some(result),
            _ => None,
        }
    }
}
