#![cfg(unix)]

mod common;

use std::fs;

use common::{stdout_json, uqc};

const CONFIG: &str = r#"
name: cli-demo
work_dir: state
seed: 11
app:
  name: quad
  params:
    a: { type: float, min: 0.0, max: 1.0, default: 0.5 }
  encoder:
    template: template.csv
    target: input.csv
  decoder:
    filename: out.csv
    columns: [f]
  command:
    program: sh
    args: ["-c", "cp input.csv out.csv"]
sampler:
  kind: random
  vary:
    a: { dist: uniform, lower: 0.0, upper: 1.0 }
  max_num: 6
  batch_size: 3
analysis:
  kind: basic-stats
  qois: [f]
"#;

#[test]
fn run_writes_state_that_failures_can_read() {
    let tmp = tempfile::tempdir().expect("tmp dir");
    fs::write(tmp.path().join("campaign.yaml"), CONFIG).expect("write config");
    fs::write(tmp.path().join("template.csv"), "f\n$a\n").expect("write template");
    let config = tmp.path().join("campaign.yaml");

    let output = uqc(&["run", "--config", config.to_str().unwrap()]);
    let json = stdout_json(&output);
    assert_eq!(json["campaign"], "cli-demo");
    assert_eq!(json["report"]["stop"], "exhausted");
    assert_eq!(json["report"]["rounds"].as_array().unwrap().len(), 2);
    assert_eq!(json["tables"]["quad"]["rows"], 6);
    assert_eq!(json["result"]["kind"], "basic-stats");

    let state = tmp.path().join("state");
    assert!(state.join("campaign.json").exists());
    let failures = uqc(&[
        "failures",
        "--state",
        state.to_str().unwrap(),
        "--app",
        "quad",
    ]);
    let json = stdout_json(&failures);
    assert_eq!(json["runs"], 6);
    assert!(json["failed"].as_array().unwrap().is_empty());
}

#[test]
fn round_limit_override_stops_early() {
    let tmp = tempfile::tempdir().expect("tmp dir");
    fs::write(tmp.path().join("campaign.yaml"), CONFIG).expect("write config");
    fs::write(tmp.path().join("template.csv"), "f\n$a\n").expect("write template");
    let config = tmp.path().join("campaign.yaml");

    let output = uqc(&["run", "--config", config.to_str().unwrap(), "--max-rounds", "1"]);
    let json = stdout_json(&output);
    assert_eq!(json["report"]["stop"], "round-limit");
    assert_eq!(json["tables"]["quad"]["rows"], 3);
}
