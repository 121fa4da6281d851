#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use uq_collate::{save_csv, CollationBuilder, DecodedOutput, RunOutcome};
use uq_core::{Lineage, RunDescriptor, RunId, Value};

pub fn uqc(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_uqc"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run uqc")
}

pub fn stdout_json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "uqc failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout json")
}

fn descriptor(id: u64, sampler: &str, x: f64, lineage: Lineage) -> RunDescriptor {
    RunDescriptor {
        run_id: RunId::from_raw(id),
        app: "model".to_string(),
        sampler: sampler.to_string(),
        params: BTreeMap::from([("x".to_string(), Value::Float(x))]),
        lineage,
    }
}

/// Four completed runs of `f = 2x` and one failure.
pub fn write_stats_table(dir: &Path) -> PathBuf {
    let builder = CollationBuilder::new("model");
    for (id, x) in [0.0, 1.0, 2.0, 3.0].into_iter().enumerate() {
        let run = descriptor(id as u64, "random", x, Lineage::default());
        let output = DecodedOutput::new().with_scalar("f", 2.0 * x);
        builder
            .add_run(&run, RunOutcome::Completed(output))
            .expect("add run");
    }
    let run = descriptor(4, "random", 9.0, Lineage::default());
    builder
        .add_run(&run, RunOutcome::failed("exit status 3"))
        .expect("add failed run");
    let path = dir.join("model.csv");
    save_csv(&builder.snapshot(), &path).expect("save table");
    path
}

/// One chain accepting x=1 at step 0 and x=3 at step 4.
pub fn write_chain_table(dir: &Path) -> PathBuf {
    let builder = CollationBuilder::new("model");
    for (id, (iteration, x)) in [(0, 1.0), (4, 3.0)].into_iter().enumerate() {
        let run = descriptor(id as u64, "mcmc", x, Lineage::chain("c0", iteration));
        let output = DecodedOutput::new().with_scalar("log_likelihood", -x * x);
        builder
            .add_run(&run, RunOutcome::Completed(output))
            .expect("add run");
    }
    let path = dir.join("chain.csv");
    save_csv(&builder.snapshot(), &path).expect("save table");
    path
}
