//! Collocation moments and first-order sensitivity indices.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};
use uq_collate::{CollationTable, ColumnKey};
use uq_core::{ErrorInfo, UqError, Value, ValueKind};

use crate::element::AnalysisElement;
use crate::result::AnalysisResult;

/// Quadrature node a run's parameter point maps to.
#[derive(Debug, Clone, PartialEq)]
pub struct CollocationNode {
    /// Quadrature weight of the node; the weights of a grid sum to one.
    pub weight: f64,
    /// Per-parameter node index, in [`CollocationWeights::parameters`] order.
    pub multi_index: Vec<u32>,
}

/// Quadrature description of a tensor collocation grid, provided by the sampler
/// that built it.
///
/// The weights must factor over parameters (a product rule), which is what
/// makes conditional means along one parameter recoverable from the grid.
pub trait CollocationWeights: Send + Sync {
    /// Varied parameters, in multi-index order.
    fn parameters(&self) -> Vec<String>;

    /// Node of the current grid at `point`, or `None` when the point is not a
    /// node of the grid.
    fn node(&self, point: &BTreeMap<String, Value>) -> Option<CollocationNode>;

    /// Number of nodes in the current grid.
    fn node_count(&self) -> usize;
}

/// Collocation statistics of one QoI column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSensitivity {
    /// Column described.
    pub column: ColumnKey,
    /// Quadrature mean.
    pub mean: f64,
    /// Quadrature variance.
    pub variance: f64,
    /// First-order Sobol index per parameter.
    pub first_order: BTreeMap<String, f64>,
}

/// Result of a [`SensitivityAnalysis`] pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityResult {
    /// Parameters the indices are reported for.
    pub parameters: Vec<String>,
    /// Grid nodes the quadrature used.
    pub nodes: usize,
    /// Per-column statistics, ordered by column.
    pub columns: Vec<ColumnSensitivity>,
}

impl SensitivityResult {
    /// Statistics of one column.
    pub fn get(&self, column: &ColumnKey) -> Option<&ColumnSensitivity> {
        self.columns
            .binary_search_by(|entry| entry.column.cmp(column))
            .ok()
            .map(|idx| &self.columns[idx])
    }

    /// First-order index of `parameter` for the scalar QoI `qoi`.
    pub fn first_order(&self, qoi: &str, parameter: &str) -> Option<f64> {
        self.get(&ColumnKey::scalar(qoi))
            .and_then(|entry| entry.first_order.get(parameter).copied())
    }

    /// First-order indices summed over all columns, per parameter.
    pub fn total_first_order(&self) -> BTreeMap<String, f64> {
        let mut totals: BTreeMap<String, f64> = self
            .parameters
            .iter()
            .map(|name| (name.clone(), 0.0))
            .collect();
        for entry in &self.columns {
            for (name, index) in &entry.first_order {
                if index.is_finite() {
                    *totals.entry(name.clone()).or_insert(0.0) += index;
                }
            }
        }
        totals
    }
}

/// Stochastic collocation analysis over a sampler-provided grid.
#[derive(Clone)]
pub struct SensitivityAnalysis {
    qois: Vec<String>,
    weights: Arc<dyn CollocationWeights>,
}

impl std::fmt::Debug for SensitivityAnalysis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensitivityAnalysis")
            .field("qois", &self.qois)
            .field("parameters", &self.weights.parameters())
            .finish()
    }
}

impl SensitivityAnalysis {
    /// Analyses the named QoIs on the grid described by `weights`.
    pub fn new<I, S>(qois: I, weights: Arc<dyn CollocationWeights>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            qois: qois.into_iter().map(Into::into).collect(),
            weights,
        }
    }

    fn columns(&self, table: &CollationTable) -> Result<Vec<ColumnKey>, UqError> {
        let mut columns = Vec::new();
        for qoi in &self.qois {
            match table.qoi_kind(qoi) {
                Some(ValueKind::Numeric) => columns.extend(table.qoi_columns_for(qoi).cloned()),
                Some(_) => {
                    return Err(UqError::Config(
                        ErrorInfo::new("qoi-not-numeric", "sensitivity needs a numeric QoI")
                            .with_context("qoi", qoi.clone()),
                    ))
                }
                None => {
                    return Err(UqError::MissingParameter(
                        ErrorInfo::new("qoi-missing", "QoI not present in the table")
                            .with_context("qoi", qoi.clone()),
                    ))
                }
            }
        }
        columns.sort();
        columns.dedup();
        Ok(columns)
    }
}

impl AnalysisElement for SensitivityAnalysis {
    fn name(&self) -> &str {
        "sensitivity"
    }

    fn analyse(&self, table: &CollationTable) -> Result<AnalysisResult, UqError> {
        let parameters = self.weights.parameters();
        let columns = self.columns(table)?;

        // Node multi-index -> (weight, summed value per column, rows seen).
        let mut nodes: BTreeMap<Vec<u32>, NodeSum> = BTreeMap::new();
        for row in table.completed_rows() {
            let Some(node) = self.weights.node(&row.params) else {
                continue;
            };
            let entry = nodes.entry(node.multi_index).or_insert_with(|| NodeSum {
                weight: node.weight,
                sums: vec![0.0; columns.len()],
                counts: vec![0; columns.len()],
            });
            for (idx, column) in columns.iter().enumerate() {
                if let Some(value) = row.qoi(column).and_then(Value::as_f64) {
                    entry.sums[idx] += value;
                    entry.counts[idx] += 1;
                }
            }
        }

        let expected = self.weights.node_count();
        if nodes.is_empty() || nodes.len() < expected {
            warn!(covered = nodes.len(), expected, "collocation grid not fully evaluated");
            return Err(UqError::Sampling(
                ErrorInfo::new("grid-incomplete", "not every grid node has a completed run")
                    .with_context("covered", nodes.len().to_string())
                    .with_context("expected", expected.to_string()),
            ));
        }

        let mut result_columns = Vec::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            let mut values = Vec::with_capacity(nodes.len());
            for (multi_index, node) in &nodes {
                if node.counts[idx] == 0 {
                    return Err(UqError::Sampling(
                        ErrorInfo::new("grid-incomplete", "grid node lacks a value for the column")
                            .with_context("column", column.to_string())
                            .with_context("node", format!("{multi_index:?}")),
                    ));
                }
                values.push((
                    multi_index.as_slice(),
                    node.weight,
                    node.sums[idx] / node.counts[idx] as f64,
                ));
            }
            result_columns.push(column_sensitivity(column.clone(), &parameters, &values));
        }
        debug!(nodes = nodes.len(), columns = result_columns.len(), "collocation indices computed");
        Ok(AnalysisResult::Sensitivity(SensitivityResult {
            parameters,
            nodes: nodes.len(),
            columns: result_columns,
        }))
    }
}

struct NodeSum {
    weight: f64,
    sums: Vec<f64>,
    counts: Vec<usize>,
}

fn column_sensitivity(
    column: ColumnKey,
    parameters: &[String],
    values: &[(&[u32], f64, f64)],
) -> ColumnSensitivity {
    let total_weight: f64 = values.iter().map(|(_, w, _)| w).sum();
    let mean = values.iter().map(|(_, w, f)| w * f).sum::<f64>() / total_weight;
    let variance = values
        .iter()
        .map(|(_, w, f)| w * (f - mean) * (f - mean))
        .sum::<f64>()
        / total_weight;

    let mut first_order = BTreeMap::new();
    for (dim, name) in parameters.iter().enumerate() {
        // Marginal weight and weighted sum of f along this parameter's nodes.
        let mut marginal: BTreeMap<u32, (f64, f64)> = BTreeMap::new();
        for (multi_index, weight, value) in values {
            let key = multi_index.get(dim).copied().unwrap_or_default();
            let slot = marginal.entry(key).or_insert((0.0, 0.0));
            slot.0 += weight;
            slot.1 += weight * value;
        }
        let conditional_variance = marginal
            .values()
            .map(|(weight, sum)| {
                let conditional_mean = sum / weight;
                weight * (conditional_mean - mean) * (conditional_mean - mean)
            })
            .sum::<f64>()
            / total_weight;
        let index = if variance > 0.0 {
            conditional_variance / variance
        } else {
            0.0
        };
        first_order.insert(name.clone(), index);
    }

    ColumnSensitivity {
        column,
        mean,
        variance,
        first_order,
    }
}
