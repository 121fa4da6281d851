use uq_analysis::AnalysisResult;
use uq_collate::CollationTable;
use uq_core::{ParameterPoint, RunId, UqError};

/// Changes a sampler asks the campaign to apply after a refinement step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Refinement {
    /// Completed runs the sampler excludes from further analysis, such as
    /// rejected Metropolis proposals. Their rows stay in the table.
    pub ignored_runs: Vec<RunId>,
}

/// Source of parameter points for a campaign.
///
/// Points carry their lineage (chain position, refinement level, replica)
/// verbatim into the run descriptors and from there into the table.
pub trait Sampler: Send {
    /// Stable name of the scheme; a campaign derives the sampler id it records
    /// against every emitted run from it.
    fn name(&self) -> &str;

    /// Parameters the sampler varies.
    fn inputs(&self) -> Vec<String>;

    /// Emits the next batch of points. An exhausted sampler returns an empty batch.
    fn next_batch(&mut self) -> Result<Vec<ParameterPoint>, UqError>;

    /// Whether the sampler will emit no further points.
    fn exhausted(&self) -> bool;

    /// Updates the sampler from the runs it emitted and, when feedback is
    /// enabled, the latest analysis result.
    fn refine(
        &mut self,
        _table: &CollationTable,
        _previous: Option<&AnalysisResult>,
    ) -> Result<Refinement, UqError> {
        Ok(Refinement::default())
    }
}

impl<S: Sampler + ?Sized> Sampler for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn inputs(&self) -> Vec<String> {
        (**self).inputs()
    }

    fn next_batch(&mut self) -> Result<Vec<ParameterPoint>, UqError> {
        (**self).next_batch()
    }

    fn exhausted(&self) -> bool {
        (**self).exhausted()
    }

    fn refine(
        &mut self,
        table: &CollationTable,
        previous: Option<&AnalysisResult>,
    ) -> Result<Refinement, UqError> {
        (**self).refine(table, previous)
    }
}
