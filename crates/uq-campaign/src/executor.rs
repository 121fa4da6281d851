//! Execution adapters: run the simulation for one run directory.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::process::Command;

use tracing::debug;
use uq_core::{ErrorInfo, RunDescriptor, UqError, Value};

/// Everything an executor learns about the attempt it is asked to make.
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    /// The run being executed.
    pub run: &'a RunDescriptor,
    /// Directory holding the run's inputs and outputs.
    pub run_dir: &'a Path,
    /// Attempt number, starting at 1.
    pub attempt: u32,
    /// Deterministic seed for this attempt, for stochastic models.
    pub seed: u64,
}

/// Runs the simulation of one run. Failures use the `Execution` family.
pub trait Executor: Send + Sync {
    /// Executes one attempt.
    fn execute(&self, ctx: &RunContext<'_>) -> Result<(), UqError>;
}

/// Runs an external command with the run directory as working directory.
///
/// The command sees `UQ_RUN_ID`, `UQ_RUN_SEED` and `UQ_ATTEMPT` in its
/// environment. A non-zero exit status fails the attempt.
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    program: String,
    args: Vec<String>,
}

impl LocalExecutor {
    /// Executor for `program` invoked with `args`.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl Executor for LocalExecutor {
    fn execute(&self, ctx: &RunContext<'_>) -> Result<(), UqError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(ctx.run_dir)
            .env("UQ_RUN_ID", ctx.run.run_id.as_raw().to_string())
            .env("UQ_RUN_SEED", ctx.seed.to_string())
            .env("UQ_ATTEMPT", ctx.attempt.to_string())
            .output()
            .map_err(|err| {
                UqError::Execution(
                    ErrorInfo::new("command-spawn", err.to_string())
                        .with_context("program", self.program.clone())
                        .with_context("run", ctx.run.run_id.to_string()),
                )
            })?;
        if output.status.success() {
            debug!(run = %ctx.run.run_id, attempt = ctx.attempt, "command finished");
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(5)..].join("\n");
        Err(UqError::Execution(
            ErrorInfo::new("command-failed", format!("command exited with {}", output.status))
                .with_context("program", self.program.clone())
                .with_context("run", ctx.run.run_id.to_string())
                .with_context("stderr", tail),
        ))
    }
}

type ModelFn = dyn Fn(&BTreeMap<String, Value>, &RunContext<'_>) -> Result<(), UqError> + Send + Sync;

/// In-process model: a closure given the run's parameters and context.
///
/// The closure writes its outputs into `ctx.run_dir` for the app's decoder.
pub struct FnExecutor {
    model: Box<ModelFn>,
}

impl FnExecutor {
    /// Wraps `model`.
    pub fn new<F>(model: F) -> Self
    where
        F: Fn(&BTreeMap<String, Value>, &RunContext<'_>) -> Result<(), UqError> + Send + Sync + 'static,
    {
        Self {
            model: Box::new(model),
        }
    }
}

impl fmt::Debug for FnExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnExecutor")
    }
}

impl Executor for FnExecutor {
    fn execute(&self, ctx: &RunContext<'_>) -> Result<(), UqError> {
        (self.model)(&ctx.run.params, ctx)
    }
}
