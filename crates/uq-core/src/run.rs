use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Identifier of a run within a campaign. Issued sequentially, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(u64);

impl RunId {
    /// Creates a new identifier from its raw integer representation.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw integer representation of the identifier.
    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run_{}", self.0)
    }
}

/// Position of a run within a Markov chain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChainPosition {
    /// Chain identifier.
    pub chain_id: String,
    /// Step at which the recorded state was accepted.
    pub iteration: u64,
}

/// Run-lineage metadata emitted by a sampler and carried verbatim into the table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Lineage {
    /// Chain membership for MCMC samplers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<ChainPosition>,
    /// Refinement level for adaptive grid samplers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinement_level: Option<u32>,
    /// Repetition index when one design point is evaluated several times.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica: Option<u32>,
}

impl Lineage {
    /// Lineage for a chain state.
    pub fn chain(chain_id: impl Into<String>, iteration: u64) -> Self {
        Self {
            chain: Some(ChainPosition {
                chain_id: chain_id.into(),
                iteration,
            }),
            ..Self::default()
        }
    }

    /// Lineage for a point introduced at a refinement level.
    pub fn level(refinement_level: u32) -> Self {
        Self {
            refinement_level: Some(refinement_level),
            ..Self::default()
        }
    }

    /// Returns a copy tagged with a replica index.
    pub fn with_replica(mut self, replica: u32) -> Self {
        self.replica = Some(replica);
        self
    }
}

/// A sample point emitted by a sampler, before it becomes a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParameterPoint {
    /// Values of the varied parameters.
    pub values: BTreeMap<String, Value>,
    /// Lineage metadata describing where the point came from.
    #[serde(default)]
    pub lineage: Lineage,
}

impl ParameterPoint {
    /// Creates a point without lineage metadata.
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        Self {
            values,
            lineage: Lineage::default(),
        }
    }

    /// Attaches lineage metadata to the point.
    pub fn with_lineage(mut self, lineage: Lineage) -> Self {
        self.lineage = lineage;
        self
    }
}

/// Execution status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    /// Created but not yet executed.
    Pending,
    /// Executed and decoded successfully.
    Completed,
    /// Execution or decoding failed.
    Failed,
    /// Completed but excluded by its sampler (e.g. a rejected MCMC proposal).
    Ignored,
}

impl RunStatus {
    /// Whether the run has reached a final status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Pending)
    }

    /// Stable label used in persisted tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Ignored => "ignored",
        }
    }

    /// Parses a label produced by [`RunStatus::as_str`].
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "pending" => Some(RunStatus::Pending),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            "ignored" => Some(RunStatus::Ignored),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of a run: who asked for it and with which parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDescriptor {
    /// Campaign-unique identifier.
    pub run_id: RunId,
    /// Application the run belongs to.
    pub app: String,
    /// Sampler that emitted the point.
    pub sampler: String,
    /// Full parameter assignment (varied values completed with defaults).
    pub params: BTreeMap<String, Value>,
    /// Lineage metadata copied from the sample point.
    #[serde(default)]
    pub lineage: Lineage,
}
