use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::{debug, warn};
use uq_core::{ErrorInfo, RunDescriptor, RunId, RunStatus, UqError, Value, ValueKind};

use crate::table::{CollationTable, ColumnKey, RunRow, META_COLUMNS};

/// Decoder output for one run: QoI name mapped to its value(s).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedOutput {
    values: BTreeMap<String, Vec<Value>>,
}

impl DecodedOutput {
    /// Creates an empty output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a scalar QoI.
    pub fn with_scalar(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), vec![value.into()]);
        self
    }

    /// Adds a multi-valued QoI, stored at indices `0..values.len()`.
    pub fn with_values(mut self, name: impl Into<String>, values: Vec<Value>) -> Self {
        self.values.insert(name.into(), values);
        self
    }

    /// Appends one value to a QoI, creating it when needed.
    pub fn push(&mut self, name: &str, value: Value) {
        self.values.entry(name.to_string()).or_default().push(value);
    }

    /// Iterates QoI names and their values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.values
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Whether the output carries no QoIs.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<BTreeMap<String, Vec<Value>>> for DecodedOutput {
    fn from(values: BTreeMap<String, Vec<Value>>) -> Self {
        Self { values }
    }
}

/// Terminal result of one run as reported to the builder.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Execution and decoding succeeded.
    Completed(DecodedOutput),
    /// Execution or decoding failed; QoI cells stay absent.
    Failed {
        /// Human readable reason recorded against the run.
        reason: String,
    },
}

impl RunOutcome {
    /// Failed outcome with a reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        RunOutcome::Failed {
            reason: reason.into(),
        }
    }
}

/// What an `add_run` call did to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new row was appended.
    Inserted,
    /// The report repeated what the table already holds.
    Unchanged,
    /// A failed row was replaced by a later successful report.
    Upgraded,
}

/// Live, concurrently appendable collation table of one application.
///
/// `add_run` is an idempotent upsert keyed by run id and may be called from
/// many threads. Analyses never see the live table, only [`snapshot`]s.
///
/// [`snapshot`]: CollationBuilder::snapshot
#[derive(Debug)]
pub struct CollationBuilder {
    table: RwLock<CollationTable>,
}

impl CollationBuilder {
    /// Creates an empty builder for `app`.
    pub fn new(app: impl Into<String>) -> Self {
        Self::from_table(CollationTable::new(app))
    }

    /// Resumes collation on top of a previously persisted table.
    pub fn from_table(table: CollationTable) -> Self {
        Self {
            table: RwLock::new(table),
        }
    }

    /// Application this builder collates.
    pub fn app(&self) -> String {
        self.table.read().app.clone()
    }

    /// Number of rows currently recorded.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Whether no rows have been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    /// Returns a point-in-time, read-only copy of the table.
    pub fn snapshot(&self) -> CollationTable {
        self.table.read().clone()
    }

    /// Records the terminal outcome of a run.
    ///
    /// Reapplying an identical report is a no-op, and a successful report
    /// replaces an earlier failure. A completed output whose QoI types clash
    /// with the recorded schema fails with `SchemaMismatch`; the run is then
    /// recorded as failed so it is never dropped from the table.
    pub fn add_run(&self, run: &RunDescriptor, outcome: RunOutcome) -> Result<AddOutcome, UqError> {
        let mut table = self.table.write();
        if run.app != table.app {
            return Err(UqError::Conflict(
                ErrorInfo::new("app-mismatch", "run belongs to a different application")
                    .with_context("run", run.run_id.to_string())
                    .with_context("run_app", run.app.clone())
                    .with_context("table_app", table.app.clone()),
            ));
        }

        let candidate = match outcome {
            RunOutcome::Completed(decoded) => match collate_qois(&table, run, &decoded) {
                Ok(qois) => row_for(run, RunStatus::Completed, qois, None),
                Err(err) => {
                    warn!(run = %run.run_id, error = %err, "rejecting decoded output");
                    if !table.rows.contains_key(&run.run_id) {
                        let reason = Some(err.to_string());
                        table.put_row(row_for(run, RunStatus::Failed, BTreeMap::new(), reason));
                    }
                    return Err(err);
                }
            },
            RunOutcome::Failed { reason } => {
                row_for(run, RunStatus::Failed, BTreeMap::new(), Some(reason))
            }
        };

        let Some(existing) = table.rows.get(&run.run_id).cloned() else {
            debug!(run = %run.run_id, status = %candidate.status, "collated run");
            table.put_row(candidate);
            return Ok(AddOutcome::Inserted);
        };

        if !existing.same_descriptor(&candidate) {
            return Err(UqError::Conflict(
                ErrorInfo::new("run-descriptor-changed", "run reported with different parameters")
                    .with_context("run", run.run_id.to_string()),
            ));
        }

        match (existing.status, candidate.status) {
            (RunStatus::Failed, RunStatus::Completed) => {
                debug!(run = %run.run_id, "failed run superseded by a successful report");
                table.put_row(candidate);
                Ok(AddOutcome::Upgraded)
            }
            (_, RunStatus::Failed) => Ok(AddOutcome::Unchanged),
            (_, _) if existing.same_qois(&candidate) => Ok(AddOutcome::Unchanged),
            _ => Err(UqError::Conflict(
                ErrorInfo::new("conflicting-run", "run reported twice with different output")
                    .with_context("run", run.run_id.to_string())
                    .with_hint("decoders must be deterministic for a given run directory"),
            )),
        }
    }

    /// Marks a completed run as excluded by its sampler.
    ///
    /// The row and its cells stay in the table; analyses skip it. Failed runs
    /// keep their failed status.
    pub fn mark_ignored(&self, run_id: RunId) -> Result<(), UqError> {
        let mut table = self.table.write();
        let Some(existing) = table.rows.get(&run_id).cloned() else {
            return Err(UqError::Conflict(
                ErrorInfo::new("unknown-run", "cannot ignore a run that was never collated")
                    .with_context("run", run_id.to_string()),
            ));
        };
        if existing.status == RunStatus::Completed {
            let mut row = existing.as_ref().clone();
            row.status = RunStatus::Ignored;
            table.put_row(row);
        }
        Ok(())
    }
}

fn row_for(
    run: &RunDescriptor,
    status: RunStatus,
    qois: BTreeMap<ColumnKey, Value>,
    failure: Option<String>,
) -> RunRow {
    RunRow {
        run_id: run.run_id,
        app: run.app.clone(),
        sampler: run.sampler.clone(),
        status,
        lineage: run.lineage.clone(),
        params: run.params.clone(),
        qois,
        failure,
    }
}

fn collate_qois(
    table: &CollationTable,
    run: &RunDescriptor,
    decoded: &DecodedOutput,
) -> Result<BTreeMap<ColumnKey, Value>, UqError> {
    for name in run.params.keys() {
        if table.qoi_kinds.contains_key(name) || META_COLUMNS.contains(&name.as_str()) {
            return Err(collision(run, name));
        }
    }

    let mut cells = BTreeMap::new();
    for (name, values) in decoded.iter() {
        if META_COLUMNS.contains(&name) || table.params.contains(name) || run.params.contains_key(name)
        {
            return Err(collision(run, name));
        }
        let mut expected: Option<ValueKind> = table.qoi_kind(name);
        for (index, value) in values.iter().enumerate() {
            let found = value.kind();
            match expected {
                Some(kind) if kind != found => {
                    return Err(UqError::SchemaMismatch(
                        ErrorInfo::new("schema-mismatch", "QoI type differs from recorded values")
                            .with_context("run", run.run_id.to_string())
                            .with_context("column", name)
                            .with_context("index", index.to_string())
                            .with_context("expected", kind.to_string())
                            .with_context("found", found.to_string()),
                    ))
                }
                Some(_) => {}
                None => expected = Some(found),
            }
            cells.insert(ColumnKey::new(name, index as u32), value.clone());
        }
    }
    Ok(cells)
}

fn collision(run: &RunDescriptor, name: &str) -> UqError {
    UqError::SchemaMismatch(
        ErrorInfo::new(
            "column-collision",
            "name is used by more than one column partition",
        )
        .with_context("run", run.run_id.to_string())
        .with_context("column", name),
    )
}
