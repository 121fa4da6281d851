use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uq_core::{Lineage, RunId, RunStatus, Value, ValueKind};

/// Metadata columns present in every table, in persisted order.
pub const META_COLUMNS: [&str; 9] = [
    "run_id",
    "app",
    "sampler",
    "status",
    "chain_id",
    "iteration",
    "refinement_level",
    "replica",
    "failure",
];

/// Two-level column name: the variable and the element index within it.
///
/// Scalar QoIs and every parameter live at index 0. A decoder that reports
/// several values for one variable (a profile, or repeated stochastic draws at
/// one design point) produces indices `0..n`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnKey {
    /// Variable name.
    pub name: String,
    /// Element index within the variable.
    pub index: u32,
}

impl ColumnKey {
    /// Creates a key for element `index` of `name`.
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }

    /// Key for a scalar variable.
    pub fn scalar(name: impl Into<String>) -> Self {
        Self::new(name, 0)
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.name, self.index)
    }
}

/// Column partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Partition {
    /// Run metadata and lineage.
    Meta,
    /// Input parameter.
    Param,
    /// Decoded quantity of interest.
    Qoi,
}

impl Partition {
    /// Label used in the persisted header.
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Meta => "meta",
            Partition::Param => "param",
            Partition::Qoi => "qoi",
        }
    }

    /// Parses a persisted header label.
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "meta" => Some(Partition::Meta),
            "param" => Some(Partition::Param),
            "qoi" => Some(Partition::Qoi),
            _ => None,
        }
    }
}

/// A fully qualified table column.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Column {
    /// Partition the column belongs to.
    pub partition: Partition,
    /// Two-level column name.
    pub key: ColumnKey,
}

/// One row of the table: a single run and everything recorded about it.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRow {
    /// Run identifier.
    pub run_id: RunId,
    /// Owning application.
    pub app: String,
    /// Sampler that emitted the run.
    pub sampler: String,
    /// Terminal status of the run.
    pub status: RunStatus,
    /// Lineage carried from the sample point.
    pub lineage: Lineage,
    /// Input parameter values.
    pub params: BTreeMap<String, Value>,
    /// Decoded QoI cells; empty for failed runs.
    pub qois: BTreeMap<ColumnKey, Value>,
    /// Failure reason for failed runs.
    pub failure: Option<String>,
}

impl RunRow {
    /// Value of an input parameter.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Value of a QoI cell.
    pub fn qoi(&self, key: &ColumnKey) -> Option<&Value> {
        self.qois.get(key)
    }

    /// Value of a metadata column, if present for this row.
    pub fn meta(&self, name: &str) -> Option<Value> {
        match name {
            "run_id" => Some(Value::Int(self.run_id.as_raw() as i64)),
            "app" => Some(Value::Text(self.app.clone())),
            "sampler" => Some(Value::Text(self.sampler.clone())),
            "status" => Some(Value::Text(self.status.as_str().to_string())),
            "chain_id" => self
                .lineage
                .chain
                .as_ref()
                .map(|chain| Value::Text(chain.chain_id.clone())),
            "iteration" => self
                .lineage
                .chain
                .as_ref()
                .map(|chain| Value::Int(chain.iteration as i64)),
            "refinement_level" => self.lineage.refinement_level.map(|l| Value::Int(l as i64)),
            "replica" => self.lineage.replica.map(|r| Value::Int(r as i64)),
            "failure" => self.failure.clone().map(Value::Text),
            _ => None,
        }
    }

    /// Value of any column, or `None` when the cell is absent.
    pub fn cell(&self, column: &Column) -> Option<Value> {
        match column.partition {
            Partition::Meta => self.meta(&column.key.name),
            Partition::Param if column.key.index == 0 => self.param(&column.key.name).cloned(),
            Partition::Param => None,
            Partition::Qoi => self.qoi(&column.key).cloned(),
        }
    }

    pub(crate) fn same_descriptor(&self, other: &RunRow) -> bool {
        self.app == other.app
            && self.sampler == other.sampler
            && self.lineage == other.lineage
            && same_cells(&self.params, &other.params)
    }

    pub(crate) fn same_qois(&self, other: &RunRow) -> bool {
        same_cells(&self.qois, &other.qois)
    }
}

fn same_cells<K: Ord>(a: &BTreeMap<K, Value>, b: &BTreeMap<K, Value>) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b.iter())
            .all(|((ka, va), (kb, vb))| ka == kb && va.same(vb))
}

/// A run that failed, with the recorded reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRun {
    /// Run identifier.
    pub run_id: RunId,
    /// Recorded failure reason.
    pub reason: String,
}

/// Canonical results table of one application.
///
/// Every run appears exactly once, keyed by run id. The QoI column set is the
/// union of every column any decoder produced for the app; cells a run did not
/// produce are absent rather than zero. Rows are shared behind `Arc`, so
/// cloning a table (a snapshot) never copies row payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct CollationTable {
    pub(crate) app: String,
    pub(crate) rows: BTreeMap<RunId, Arc<RunRow>>,
    pub(crate) params: BTreeSet<String>,
    pub(crate) qoi_columns: BTreeSet<ColumnKey>,
    pub(crate) qoi_kinds: BTreeMap<String, ValueKind>,
}

impl CollationTable {
    /// Creates an empty table for `app`.
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            rows: BTreeMap::new(),
            params: BTreeSet::new(),
            qoi_columns: BTreeSet::new(),
            qoi_kinds: BTreeMap::new(),
        }
    }

    /// Application the table belongs to.
    pub fn app(&self) -> &str {
        &self.app
    }

    /// Number of rows (runs) in the table.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows ordered by run id.
    pub fn rows(&self) -> impl Iterator<Item = &RunRow> {
        self.rows.values().map(Arc::as_ref)
    }

    /// Rows with [`RunStatus::Completed`].
    pub fn completed_rows(&self) -> impl Iterator<Item = &RunRow> {
        self.rows()
            .filter(|row| row.status == RunStatus::Completed)
    }

    /// Looks up the row of a run.
    pub fn row(&self, run_id: RunId) -> Option<&RunRow> {
        self.rows.get(&run_id).map(Arc::as_ref)
    }

    /// Whether the table holds a row for `run_id`.
    pub fn contains(&self, run_id: RunId) -> bool {
        self.rows.contains_key(&run_id)
    }

    /// Names of the input parameter columns.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(String::as_str)
    }

    /// Whether `name` is an input parameter column.
    pub fn has_param(&self, name: &str) -> bool {
        self.params.contains(name)
    }

    /// QoI columns in (name, index) order.
    pub fn qoi_columns(&self) -> impl Iterator<Item = &ColumnKey> {
        self.qoi_columns.iter()
    }

    /// QoI columns that belong to the variable `name`.
    pub fn qoi_columns_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ColumnKey> {
        self.qoi_columns.iter().filter(move |key| key.name == name)
    }

    /// Value class recorded for a QoI variable.
    pub fn qoi_kind(&self, name: &str) -> Option<ValueKind> {
        self.qoi_kinds.get(name).copied()
    }

    /// All columns in persisted order: metadata, parameters, QoIs.
    pub fn columns(&self) -> Vec<Column> {
        let meta = META_COLUMNS.iter().map(|name| Column {
            partition: Partition::Meta,
            key: ColumnKey::scalar(*name),
        });
        let params = self.params.iter().map(|name| Column {
            partition: Partition::Param,
            key: ColumnKey::scalar(name.clone()),
        });
        let qois = self.qoi_columns.iter().map(|key| Column {
            partition: Partition::Qoi,
            key: key.clone(),
        });
        meta.chain(params).chain(qois).collect()
    }

    /// Value of one cell, `None` when the run is unknown or the cell is absent.
    pub fn cell(&self, run_id: RunId, column: &Column) -> Option<Value> {
        self.row(run_id).and_then(|row| row.cell(column))
    }

    /// Failed runs and their recorded reasons.
    pub fn failed_runs(&self) -> Vec<FailedRun> {
        self.rows()
            .filter(|row| row.status == RunStatus::Failed)
            .map(|row| FailedRun {
                run_id: row.run_id,
                reason: row.failure.clone().unwrap_or_default(),
            })
            .collect()
    }

    /// Number of rows per status.
    pub fn status_counts(&self) -> BTreeMap<RunStatus, usize> {
        let mut counts = BTreeMap::new();
        for row in self.rows() {
            *counts.entry(row.status).or_insert(0) += 1;
        }
        counts
    }

    /// Numeric values of a QoI column over completed rows.
    ///
    /// Returns the present values and the number of completed or failed rows
    /// that lack the cell, so callers can report missing data.
    pub fn numeric_column(&self, key: &ColumnKey) -> (Vec<f64>, usize) {
        let mut values = Vec::new();
        let mut missing = 0usize;
        for row in self.rows() {
            match row.status {
                RunStatus::Completed => match row.qoi(key).and_then(Value::as_f64) {
                    Some(value) => values.push(value),
                    None => missing += 1,
                },
                RunStatus::Failed => missing += 1,
                RunStatus::Pending | RunStatus::Ignored => {}
            }
        }
        (values, missing)
    }

    /// Returns a table restricted to the rows matching `keep`.
    ///
    /// The column set is preserved so absent cells stay visible.
    pub fn restrict<F>(&self, keep: F) -> CollationTable
    where
        F: Fn(&RunRow) -> bool,
    {
        let rows = self
            .rows
            .iter()
            .filter(|(_, row)| keep(row))
            .map(|(id, row)| (*id, Arc::clone(row)))
            .collect();
        CollationTable {
            app: self.app.clone(),
            rows,
            params: self.params.clone(),
            qoi_columns: self.qoi_columns.clone(),
            qoi_kinds: self.qoi_kinds.clone(),
        }
    }

    /// Rows emitted by one sampler.
    pub fn for_sampler(&self, sampler: &str) -> CollationTable {
        self.restrict(|row| row.sampler == sampler)
    }

    pub(crate) fn register_columns(&mut self, row: &RunRow) {
        for name in row.params.keys() {
            self.params.insert(name.clone());
        }
        for (key, value) in &row.qois {
            self.qoi_columns.insert(key.clone());
            self.qoi_kinds.entry(key.name.clone()).or_insert(value.kind());
        }
    }

    pub(crate) fn put_row(&mut self, row: RunRow) {
        self.register_columns(&row);
        self.rows.insert(row.run_id, Arc::new(row));
    }
}
