#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uq_campaign::{App, CsvDecoder, FnExecutor, RunContext};
use uq_core::{ErrorInfo, ParamSpace, ParamSpec, ParameterPoint, UqError, Value};
use uq_sampling::Sampler;

pub fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

pub fn write_output(run_dir: &Path, columns: &[(&str, f64)]) -> Result<(), UqError> {
    let header: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
    let row: Vec<String> = columns.iter().map(|(_, value)| value.to_string()).collect();
    fs::write(
        run_dir.join("out.csv"),
        format!("{}\n{}\n", header.join(","), row.join(",")),
    )
    .map_err(|err| UqError::Execution(ErrorInfo::new("test-write", err.to_string())))
}

pub fn param(params: &BTreeMap<String, Value>, name: &str) -> f64 {
    params[name].as_f64().expect("numeric parameter")
}

pub fn unit_params() -> ParamSpace {
    ParamSpace::new()
        .with("a", ParamSpec::float(0.0, 1.0, 0.5))
        .with("b", ParamSpec::float(0.0, 1.0, 0.5))
}

/// `f = 4 a^2 + 0.1 b`, dominated by `a`.
pub fn quadratic_app(name: &str) -> App {
    let executor = FnExecutor::new(|params: &BTreeMap<String, Value>, ctx: &RunContext<'_>| {
        let (a, b) = (param(params, "a"), param(params, "b"));
        write_output(ctx.run_dir, &[("f", 4.0 * a * a + 0.1 * b)])
    });
    App::new(
        name,
        unit_params(),
        Arc::new(executor),
        Arc::new(CsvDecoder::new("out.csv", ["f"])),
    )
}

/// Emits `batches` batches of `per_batch` fixed points, then reports exhaustion.
pub struct CountingSampler {
    pub batches: usize,
    pub per_batch: usize,
    pub emitted: usize,
}

impl CountingSampler {
    pub fn new(batches: usize, per_batch: usize) -> Self {
        Self {
            batches,
            per_batch,
            emitted: 0,
        }
    }
}

impl Sampler for CountingSampler {
    fn name(&self) -> &str {
        "counting"
    }

    fn inputs(&self) -> Vec<String> {
        vec!["a".to_string()]
    }

    fn next_batch(&mut self) -> Result<Vec<ParameterPoint>, UqError> {
        if self.exhausted() {
            return Ok(Vec::new());
        }
        let round = self.emitted;
        self.emitted += 1;
        Ok((0..self.per_batch)
            .map(|k| {
                let a = (round * self.per_batch + k) as f64 / 100.0;
                ParameterPoint::new(BTreeMap::from([("a".to_string(), Value::Float(a))]))
            })
            .collect())
    }

    fn exhausted(&self) -> bool {
        self.emitted >= self.batches
    }
}
