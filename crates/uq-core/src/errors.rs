//! Structured error types shared across the campaign crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`UqError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (run ids, column names, chain ids).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for campaign collation, sampling and analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum UqError {
    /// A decoded QoI disagrees with the type recorded for that column.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(ErrorInfo),
    /// Raw run output could not be parsed.
    #[error("decode error: {0}")]
    Decode(ErrorInfo),
    /// A chain partition carried no usable iterations.
    #[error("empty chain: {0}")]
    EmptyChain(ErrorInfo),
    /// A declared parameter or QoI is absent from the collated columns.
    #[error("missing parameter: {0}")]
    MissingParameter(ErrorInfo),
    /// The simulation could not be executed for a run.
    #[error("execution failure: {0}")]
    Execution(ErrorInfo),
    /// Two reports for the same run disagree, or a run was routed to the wrong table.
    #[error("conflict: {0}")]
    Conflict(ErrorInfo),
    /// Invalid configuration or parameter values.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Serialization, IO and persisted-format errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
    /// Sampler state errors.
    #[error("sampling error: {0}")]
    Sampling(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl UqError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            UqError::SchemaMismatch(info)
            | UqError::Decode(info)
            | UqError::EmptyChain(info)
            | UqError::MissingParameter(info)
            | UqError::Execution(info)
            | UqError::Conflict(info)
            | UqError::Config(info)
            | UqError::Serde(info)
            | UqError::Sampling(info) => info,
        }
    }

    /// Returns the stable machine readable code of the error.
    pub fn code(&self) -> &str {
        &self.info().code
    }

    /// Whether the error only concerns a single run's contribution.
    ///
    /// Row-level errors are recorded against the run and never abort a batch.
    pub fn is_row_level(&self) -> bool {
        matches!(
            self,
            UqError::SchemaMismatch(_) | UqError::Decode(_) | UqError::Execution(_)
        )
    }
}

/// Shorthand for wrapping IO and format errors into the serde family.
pub fn serde_error(code: &str, err: impl ToString) -> UqError {
    UqError::Serde(ErrorInfo::new(code, err.to_string()))
}
