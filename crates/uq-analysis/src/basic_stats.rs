use serde::Serialize;
use tracing::debug;
use uq_collate::{CollationTable, ColumnKey};
use uq_core::{ErrorInfo, UqError, ValueKind};

use crate::element::AnalysisElement;
use crate::result::AnalysisResult;
use crate::stat::{quantiles, Moments, Quantiles};

/// Summary statistics of one QoI column over completed runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStats {
    /// Column the statistics describe.
    pub column: ColumnKey,
    /// Number of completed runs carrying a value.
    pub count: usize,
    /// Completed or failed runs lacking a value.
    pub missing: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Unbiased sample variance.
    pub variance: f64,
    /// Sample standard deviation.
    pub std: f64,
    /// Standard error of the mean.
    pub sem: f64,
    /// Adjusted sample skewness.
    pub skewness: f64,
    /// Adjusted excess kurtosis.
    pub kurtosis: f64,
    /// 5/50/95 percentiles.
    pub quantiles: Quantiles,
}

/// Result of a [`BasicStats`] pass, ordered by column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasicStatsResult {
    /// Per-column statistics.
    pub columns: Vec<ColumnStats>,
}

impl BasicStatsResult {
    /// Statistics of one column.
    pub fn get(&self, column: &ColumnKey) -> Option<&ColumnStats> {
        self.columns
            .binary_search_by(|stats| stats.column.cmp(column))
            .ok()
            .map(|idx| &self.columns[idx])
    }

    /// Statistics of a scalar QoI.
    pub fn scalar(&self, qoi: &str) -> Option<&ColumnStats> {
        self.get(&ColumnKey::scalar(qoi))
    }
}

/// Moments and quantiles of numeric QoI columns.
#[derive(Debug, Clone, Default)]
pub struct BasicStats {
    qois: Vec<String>,
}

impl BasicStats {
    /// Summarises every numeric QoI column of the table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Summarises only the named QoIs (every index of each).
    pub fn for_qois<I, S>(qois: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            qois: qois.into_iter().map(Into::into).collect(),
        }
    }

    fn selected_columns(&self, table: &CollationTable) -> Result<Vec<ColumnKey>, UqError> {
        if self.qois.is_empty() {
            return Ok(table
                .qoi_columns()
                .filter(|key| table.qoi_kind(&key.name) == Some(ValueKind::Numeric))
                .cloned()
                .collect());
        }
        let mut columns = Vec::new();
        for qoi in &self.qois {
            match table.qoi_kind(qoi) {
                None => {
                    return Err(UqError::MissingParameter(
                        ErrorInfo::new("qoi-missing", "QoI not present in the table")
                            .with_context("qoi", qoi.clone())
                            .with_context("app", table.app()),
                    ))
                }
                Some(ValueKind::Numeric) => {}
                Some(kind) => {
                    return Err(UqError::Config(
                        ErrorInfo::new("qoi-not-numeric", "statistics need a numeric QoI")
                            .with_context("qoi", qoi.clone())
                            .with_context("kind", kind.to_string()),
                    ))
                }
            }
            columns.extend(table.qoi_columns_for(qoi).cloned());
        }
        columns.sort();
        columns.dedup();
        Ok(columns)
    }
}

impl AnalysisElement for BasicStats {
    fn name(&self) -> &str {
        "basic-stats"
    }

    fn analyse(&self, table: &CollationTable) -> Result<AnalysisResult, UqError> {
        let mut columns = Vec::new();
        for column in self.selected_columns(table)? {
            let (values, missing) = table.numeric_column(&column);
            let moments = Moments::of(&values);
            columns.push(ColumnStats {
                count: moments.count,
                missing,
                mean: moments.mean,
                variance: moments.variance,
                std: moments.variance.sqrt(),
                sem: moments.std_error(),
                skewness: moments.skewness,
                kurtosis: moments.kurtosis,
                quantiles: quantiles(&values),
                column,
            });
        }
        debug!(app = table.app(), columns = columns.len(), "basic statistics computed");
        Ok(AnalysisResult::BasicStats(BasicStatsResult { columns }))
    }
}
