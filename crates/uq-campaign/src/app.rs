//! Applications: a parameter space plus the encoder, executor and decoder
//! that turn a parameter point into collated output.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uq_collate::DecodedOutput;
use uq_core::{ErrorInfo, ParamSpace, UqError, Value};

use crate::executor::Executor;

/// Writes a run's input files into its run directory.
pub trait Encoder: Send + Sync {
    /// Generates the inputs for `params` under `run_dir`.
    fn encode(&self, params: &BTreeMap<String, Value>, run_dir: &Path) -> Result<(), UqError>;
}

/// Parses a finished run's output into QoI values.
pub trait Decoder: Send + Sync {
    /// Reads the outputs found in `run_dir`. Failures use the `Decode` family.
    fn decode(&self, run_dir: &Path) -> Result<DecodedOutput, UqError>;
}

/// Substitutes `$name` placeholders of a template file with parameter values.
///
/// `$$` produces a literal dollar sign. A `$` not followed by an identifier is
/// copied unchanged.
#[derive(Debug, Clone)]
pub struct TemplateEncoder {
    template: String,
    target: String,
}

impl TemplateEncoder {
    /// Encoder writing `template` to `target` inside each run directory.
    pub fn new(template: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            target: target.into(),
        }
    }

    /// Reads the template text from `path`.
    pub fn from_file(path: &Path, target: impl Into<String>) -> Result<Self, UqError> {
        let template = fs::read_to_string(path).map_err(|err| {
            UqError::Config(
                ErrorInfo::new("template-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        Ok(Self::new(template, target))
    }

    /// Renders the template for one parameter assignment.
    pub fn render(&self, params: &BTreeMap<String, Value>) -> Result<String, UqError> {
        let mut out = String::with_capacity(self.template.len());
        let mut chars = self.template.char_indices().peekable();
        while let Some((_, ch)) = chars.next() {
            if ch != '$' {
                out.push(ch);
                continue;
            }
            match chars.peek() {
                Some((_, '$')) => {
                    chars.next();
                    out.push('$');
                }
                Some((_, next)) if next.is_ascii_alphabetic() || *next == '_' => {
                    let mut name = String::new();
                    while let Some((_, c)) = chars.peek() {
                        if c.is_ascii_alphanumeric() || *c == '_' {
                            name.push(*c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    let value = params.get(&name).ok_or_else(|| {
                        UqError::Config(
                            ErrorInfo::new("template-unknown-param", "template names an undeclared parameter")
                                .with_context("param", name.clone()),
                        )
                    })?;
                    out.push_str(&value.to_string());
                }
                _ => out.push('$'),
            }
        }
        Ok(out)
    }
}

impl Encoder for TemplateEncoder {
    fn encode(&self, params: &BTreeMap<String, Value>, run_dir: &Path) -> Result<(), UqError> {
        let rendered = self.render(params)?;
        let path = run_dir.join(&self.target);
        fs::write(&path, rendered).map_err(|err| {
            UqError::Execution(
                ErrorInfo::new("encode-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}

/// Reads named columns from a CSV file in the run directory.
///
/// A column with one data row becomes a scalar QoI; a column with several rows
/// becomes a vector QoI indexed `0..n`. Cells that parse as numbers are
/// recorded as floats, `true`/`false` as booleans, anything else as text.
#[derive(Debug, Clone)]
pub struct CsvDecoder {
    filename: String,
    columns: Vec<String>,
}

impl CsvDecoder {
    /// Decoder for `columns` of `filename`.
    pub fn new<I, S>(filename: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            filename: filename.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    fn decode_error(&self, code: &str, message: impl Into<String>, run_dir: &Path) -> UqError {
        UqError::Decode(
            ErrorInfo::new(code, message)
                .with_context("file", self.filename.clone())
                .with_context("run_dir", run_dir.display().to_string()),
        )
    }
}

impl Decoder for CsvDecoder {
    fn decode(&self, run_dir: &Path) -> Result<DecodedOutput, UqError> {
        let path = run_dir.join(&self.filename);
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|err| self.decode_error("decode-open", err.to_string(), run_dir))?;
        let headers = reader
            .headers()
            .map_err(|err| self.decode_error("decode-format", err.to_string(), run_dir))?
            .clone();
        let mut positions = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let position = headers.iter().position(|h| h == column).ok_or_else(|| {
                self.decode_error("decode-missing-column", format!("output has no column `{column}`"), run_dir)
            })?;
            positions.push(position);
        }

        let mut output = DecodedOutput::new();
        let mut rows = 0usize;
        for record in reader.records() {
            let record =
                record.map_err(|err| self.decode_error("decode-format", err.to_string(), run_dir))?;
            for (column, position) in self.columns.iter().zip(&positions) {
                let field = record.get(*position).unwrap_or_default();
                output.push(column, parse_field(field));
            }
            rows += 1;
        }
        if rows == 0 {
            return Err(self.decode_error("decode-empty", "output file has no data rows", run_dir));
        }
        Ok(output)
    }
}

fn parse_field(field: &str) -> Value {
    if let Ok(number) = field.parse::<f64>() {
        return Value::Float(number);
    }
    match field {
        "true" | "True" | "TRUE" => Value::Bool(true),
        "false" | "False" | "FALSE" => Value::Bool(false),
        _ => Value::Text(field.to_string()),
    }
}

/// One application of a campaign.
#[derive(Clone)]
pub struct App {
    /// Application name; also the name of its collation table.
    pub name: String,
    /// Declared parameters.
    pub params: ParamSpace,
    /// Input generator; `None` when the executor needs no input files.
    pub encoder: Option<Arc<dyn Encoder>>,
    /// Simulation runner.
    pub executor: Arc<dyn Executor>,
    /// Output parser.
    pub decoder: Arc<dyn Decoder>,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("encoder", &self.encoder.is_some())
            .finish()
    }
}

impl App {
    /// Application without an encoder.
    pub fn new(
        name: impl Into<String>,
        params: ParamSpace,
        executor: Arc<dyn Executor>,
        decoder: Arc<dyn Decoder>,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            encoder: None,
            executor,
            decoder,
        }
    }

    /// Adds an encoder.
    pub fn with_encoder(mut self, encoder: Arc<dyn Encoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    /// Directory holding the run directories of this app under `work_dir`.
    pub fn runs_dir(&self, work_dir: &Path) -> PathBuf {
        work_dir.join("runs").join(&self.name)
    }
}
