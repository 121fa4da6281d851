//! Flat-file persistence of collation tables.
//!
//! Layout: a `# app=<name>` comment line, then three header records (variable
//! name, element index, partition) followed by one record per run. Cells are
//! typed by their spelling: integers as plain digits, floats in round-trip
//! form that always carries a `.`, exponent or `inf`/`NaN`, booleans as
//! `true`/`false`, text as a JSON string literal. An empty field is an absent
//! cell.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use uq_core::{serde_error, ChainPosition, ErrorInfo, Lineage, RunId, RunStatus, UqError, Value};

use crate::table::{CollationTable, Column, ColumnKey, Partition, RunRow, META_COLUMNS};

const APP_PREFIX: &str = "# app=";

/// Writes `table` to `out` in the two-level header CSV layout.
pub fn write_csv<W: Write>(table: &CollationTable, mut out: W) -> Result<(), UqError> {
    writeln!(out, "{APP_PREFIX}{}", table.app()).map_err(|err| serde_error("csv-write", err))?;
    let columns = table.columns();
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(out);
    let csv_error = |err: csv::Error| serde_error("csv-write", err);
    writer
        .write_record(columns.iter().map(|column| column.key.name.as_str()))
        .map_err(csv_error)?;
    writer
        .write_record(columns.iter().map(|column| column.key.index.to_string()))
        .map_err(csv_error)?;
    writer
        .write_record(columns.iter().map(|column| column.partition.as_str()))
        .map_err(csv_error)?;
    for row in table.rows() {
        writer
            .write_record(
                columns
                    .iter()
                    .map(|column| encode_cell(row.cell(column).as_ref())),
            )
            .map_err(csv_error)?;
    }
    writer.flush().map_err(|err| serde_error("csv-write", err))
}

/// Serializes `table` into CSV bytes.
pub fn to_csv_bytes(table: &CollationTable) -> Result<Vec<u8>, UqError> {
    let mut bytes = Vec::new();
    write_csv(table, &mut bytes)?;
    Ok(bytes)
}

/// Writes `table` to a file, creating parent directories as needed.
pub fn save_csv(table: &CollationTable, path: &Path) -> Result<(), UqError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            UqError::Serde(
                ErrorInfo::new("csv-mkdir", err.to_string())
                    .with_context("path", parent.display().to_string()),
            )
        })?;
    }
    let file = File::create(path).map_err(|err| {
        UqError::Serde(
            ErrorInfo::new("csv-create", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    })?;
    write_csv(table, BufWriter::new(file))
}

/// Loads a table previously written by [`save_csv`].
pub fn load_csv(path: &Path) -> Result<CollationTable, UqError> {
    let file = File::open(path).map_err(|err| {
        UqError::Serde(
            ErrorInfo::new("csv-open", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    })?;
    read_csv(file)
}

/// Reads a table from the two-level header CSV layout.
pub fn read_csv<R: Read>(mut input: R) -> Result<CollationTable, UqError> {
    let mut text = String::new();
    input
        .read_to_string(&mut text)
        .map_err(|err| serde_error("csv-read", err))?;
    let (first_line, body) = text.split_once('\n').unwrap_or((text.as_str(), ""));
    let app = first_line
        .trim_end_matches('\r')
        .strip_prefix(APP_PREFIX)
        .ok_or_else(|| format_error("missing `# app=` line"))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(body.as_bytes());
    let mut records = reader.records();
    let mut next_header = |label: &str| -> Result<csv::StringRecord, UqError> {
        records
            .next()
            .ok_or_else(|| format_error(format!("missing {label} header")))?
            .map_err(|err| serde_error("csv-read", err))
    };
    let names = next_header("name")?;
    let indices = next_header("index")?;
    let partitions = next_header("partition")?;

    let mut columns = Vec::with_capacity(names.len());
    for ((name, index), partition) in names.iter().zip(indices.iter()).zip(partitions.iter()) {
        let index = index
            .parse::<u32>()
            .map_err(|_| format_error(format!("bad column index `{index}`")))?;
        let partition = Partition::parse(partition)
            .ok_or_else(|| format_error(format!("bad partition `{partition}`")))?;
        columns.push(Column {
            partition,
            key: ColumnKey::new(name, index),
        });
    }
    for meta in META_COLUMNS {
        if !columns
            .iter()
            .any(|c| c.partition == Partition::Meta && c.key.name == meta)
        {
            return Err(format_error(format!("missing metadata column `{meta}`")));
        }
    }

    let mut table = CollationTable::new(app);
    for column in &columns {
        match column.partition {
            Partition::Param => {
                table.params.insert(column.key.name.clone());
            }
            Partition::Qoi => {
                table.qoi_columns.insert(column.key.clone());
            }
            Partition::Meta => {}
        }
    }

    for record in records {
        let record = record.map_err(|err| serde_error("csv-read", err))?;
        let mut meta = BTreeMap::new();
        let mut params = BTreeMap::new();
        let mut qois = BTreeMap::new();
        for (column, field) in columns.iter().zip(record.iter()) {
            let Some(value) = decode_cell(field)? else {
                continue;
            };
            match column.partition {
                Partition::Meta => {
                    meta.insert(column.key.name.as_str(), value);
                }
                Partition::Param => {
                    params.insert(column.key.name.clone(), value);
                }
                Partition::Qoi => {
                    if let Some(kind) = table.qoi_kind(&column.key.name) {
                        if kind != value.kind() {
                            return Err(UqError::SchemaMismatch(
                                ErrorInfo::new("schema-mismatch", "mixed value types in column")
                                    .with_context("column", column.key.to_string()),
                            ));
                        }
                    }
                    table
                        .qoi_kinds
                        .entry(column.key.name.clone())
                        .or_insert(value.kind());
                    qois.insert(column.key.clone(), value);
                }
            }
        }
        let row = row_from_meta(&meta, params, qois)?;
        if row.app != table.app {
            return Err(format_error(format!("row app `{}` differs from table", row.app)));
        }
        if table.rows.contains_key(&row.run_id) {
            return Err(format_error(format!("duplicate row for {}", row.run_id)));
        }
        table.put_row(row);
    }
    Ok(table)
}

fn row_from_meta(
    meta: &BTreeMap<&str, Value>,
    params: BTreeMap<String, Value>,
    qois: BTreeMap<ColumnKey, Value>,
) -> Result<RunRow, UqError> {
    let int = |name: &str| -> Result<Option<i64>, UqError> {
        match meta.get(name) {
            None => Ok(None),
            Some(Value::Int(v)) => Ok(Some(*v)),
            Some(other) => Err(format_error(format!("`{name}` must be an integer, got {other}"))),
        }
    };
    let text = |name: &str| -> Result<Option<String>, UqError> {
        match meta.get(name) {
            None => Ok(None),
            Some(Value::Text(v)) => Ok(Some(v.clone())),
            Some(other) => Err(format_error(format!("`{name}` must be text, got {other}"))),
        }
    };

    let run_id = int("run_id")?.ok_or_else(|| format_error("row without run_id"))?;
    let status_label = text("status")?.ok_or_else(|| format_error("row without status"))?;
    let status = RunStatus::parse(&status_label)
        .ok_or_else(|| format_error(format!("unknown status `{status_label}`")))?;
    let chain = match (text("chain_id")?, int("iteration")?) {
        (Some(chain_id), Some(iteration)) => Some(ChainPosition {
            chain_id,
            iteration: iteration as u64,
        }),
        (None, None) => None,
        _ => return Err(format_error("chain_id and iteration must appear together")),
    };
    Ok(RunRow {
        run_id: RunId::from_raw(run_id as u64),
        app: text("app")?.unwrap_or_default(),
        sampler: text("sampler")?.unwrap_or_default(),
        status,
        lineage: Lineage {
            chain,
            refinement_level: int("refinement_level")?.map(|v| v as u32),
            replica: int("replica")?.map(|v| v as u32),
        },
        params,
        qois,
        failure: text("failure")?,
    })
}

/// Encodes one cell; `None` becomes the empty field.
pub fn encode_cell(value: Option<&Value>) -> String {
    match value {
        None => String::new(),
        Some(Value::Bool(v)) => v.to_string(),
        Some(Value::Int(v)) => v.to_string(),
        Some(Value::Float(v)) => format!("{v:?}"),
        Some(Value::Text(v)) => serde_json::Value::String(v.clone()).to_string(),
    }
}

/// Decodes one cell written by [`encode_cell`].
pub fn decode_cell(field: &str) -> Result<Option<Value>, UqError> {
    if field.is_empty() {
        return Ok(None);
    }
    if field.starts_with('"') {
        let text: String = serde_json::from_str(field)
            .map_err(|err| serde_error("csv-cell", format!("{field}: {err}")))?;
        return Ok(Some(Value::Text(text)));
    }
    match field {
        "true" => return Ok(Some(Value::Bool(true))),
        "false" => return Ok(Some(Value::Bool(false))),
        _ => {}
    }
    if let Ok(v) = field.parse::<i64>() {
        return Ok(Some(Value::Int(v)));
    }
    field
        .parse::<f64>()
        .map(|v| Some(Value::Float(v)))
        .map_err(|_| serde_error("csv-cell", format!("unrecognised cell `{field}`")))
}

fn format_error(message: impl Into<String>) -> UqError {
    UqError::Serde(ErrorInfo::new("csv-format", message))
}
