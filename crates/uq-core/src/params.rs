//! Parameter space declarations for an application.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, UqError};
use crate::value::Value;

/// Declared type of an application parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// Floating point parameter; integers are accepted and widened.
    Float,
    /// Integer parameter.
    Integer,
    /// Text parameter.
    String,
    /// Boolean parameter.
    Boolean,
}

/// Declaration of a single parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Declared type.
    #[serde(rename = "type")]
    pub kind: ParamType,
    /// Inclusive lower bound for numeric parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Inclusive upper bound for numeric parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Value used when a sampler does not vary the parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    /// Float parameter bounded to `[min, max]` with a default.
    pub fn float(min: f64, max: f64, default: f64) -> Self {
        Self {
            kind: ParamType::Float,
            min: Some(min),
            max: Some(max),
            default: Some(Value::Float(default)),
        }
    }

    /// Text parameter with a default.
    pub fn string(default: impl Into<String>) -> Self {
        Self {
            kind: ParamType::String,
            min: None,
            max: None,
            default: Some(Value::Text(default.into())),
        }
    }
}

/// Parameter space of an application, keyed by parameter name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSpace {
    params: BTreeMap<String, ParamSpec>,
}

impl ParamSpace {
    /// Creates an empty parameter space.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a parameter declaration.
    pub fn with(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.params.insert(name.into(), spec);
        self
    }

    /// Returns the declaration for a parameter.
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.get(name)
    }

    /// Iterates the declared parameter names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    /// Validates varied values and completes them with defaults.
    ///
    /// Every declared parameter must end up with a value: either supplied by the
    /// sampler or through its default. Unknown names are rejected.
    pub fn complete(
        &self,
        varied: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, UqError> {
        for name in varied.keys() {
            if !self.params.contains_key(name) {
                return Err(UqError::Config(
                    ErrorInfo::new("param-unknown", "sampler varies an undeclared parameter")
                        .with_context("param", name.clone()),
                ));
            }
        }
        let mut full = BTreeMap::new();
        for (name, spec) in &self.params {
            let value = match varied.get(name).or(spec.default.as_ref()) {
                Some(value) => value,
                None => {
                    return Err(UqError::Config(
                        ErrorInfo::new("param-missing", "parameter has no value and no default")
                            .with_context("param", name.clone()),
                    ))
                }
            };
            full.insert(name.clone(), check_value(name, spec, value)?);
        }
        Ok(full)
    }
}

fn check_value(name: &str, spec: &ParamSpec, value: &Value) -> Result<Value, UqError> {
    let type_error = || {
        UqError::Config(
            ErrorInfo::new("param-type", "value does not match the declared parameter type")
                .with_context("param", name)
                .with_context("value", value.to_string()),
        )
    };
    let checked = match (spec.kind, value) {
        (ParamType::Float, Value::Float(v)) => Value::Float(*v),
        (ParamType::Float, Value::Int(v)) => Value::Float(*v as f64),
        (ParamType::Integer, Value::Int(v)) => Value::Int(*v),
        (ParamType::String, Value::Text(v)) => Value::Text(v.clone()),
        (ParamType::Boolean, Value::Bool(v)) => Value::Bool(*v),
        _ => return Err(type_error()),
    };
    if let Some(number) = checked.as_f64() {
        let below = spec.min.map_or(false, |min| number < min);
        let above = spec.max.map_or(false, |max| number > max);
        if below || above || number.is_nan() {
            return Err(UqError::Config(
                ErrorInfo::new("param-out-of-range", "value outside the declared bounds")
                    .with_context("param", name)
                    .with_context("value", number.to_string()),
            ));
        }
    }
    Ok(checked)
}
