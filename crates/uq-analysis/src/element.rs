use uq_collate::CollationTable;
use uq_core::UqError;

use crate::result::AnalysisResult;

/// A statistical reducer over a collation table snapshot.
///
/// Implementations must be pure functions of the snapshot they receive: they
/// never see the live table and hold no locks while running.
pub trait AnalysisElement: Send + Sync {
    /// Short stable name used in logs and persisted manifests.
    fn name(&self) -> &str;

    /// Reduces `table` into a result.
    fn analyse(&self, table: &CollationTable) -> Result<AnalysisResult, UqError>;
}
