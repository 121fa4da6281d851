mod common;

use std::fs;

use common::fixture_path;
use uq_analysis::{AnalysisElement, AnalysisResult, TailPolicy};
use uq_campaign::config::{AnalysisConfig, SamplerKind};
use uq_campaign::{load_config, run_config, DispatchOptions, StopReason};
use uq_core::SeedSequence;
use uq_sampling::Sampler;

#[test]
fn sparse_grid_fixture_parses_with_defaults() {
    let config = load_config(fixture_path("sparse_grid.yaml")).expect("load config");
    assert_eq!(config.name, "grid-demo");
    assert_eq!(config.seed, 7);
    assert_eq!(config.base_dir, fixture_path(""));
    assert_eq!(config.dispatch, DispatchOptions::default());
    assert_eq!(config.run.max_rounds, Some(5));
    assert!(config.run.feedback);
    assert_eq!(config.sampler.replicas, 1);
    match &config.sampler.kind {
        SamplerKind::SparseGrid {
            vary,
            initial_level,
            max_level,
        } => {
            assert_eq!(vary.len(), 2);
            assert_eq!((*initial_level, *max_level), (1, 2));
        }
        other => panic!("unexpected sampler {other:?}"),
    }
    assert!(matches!(config.analysis, Some(AnalysisConfig::Sensitivity { .. })));
}

#[test]
fn mcmc_fixture_builds_replicated_chains() {
    let config = load_config(fixture_path("mcmc.yaml")).expect("load config");
    assert_eq!(config.dispatch.concurrency, 4);
    assert_eq!(config.dispatch.max_attempts, 3);
    assert_eq!(config.sampler.replicas, 2);
    match &config.analysis {
        Some(AnalysisConfig::Mcmc { inputs, tail }) => {
            assert!(inputs.is_empty());
            assert_eq!(*tail, TailPolicy::PadTo(60));
        }
        other => panic!("unexpected analysis {other:?}"),
    }

    let mut built = config.build_sampler(SeedSequence::new(config.seed)).expect("sampler");
    assert!(built.weights.is_none());
    assert_eq!(built.sampler.name(), "mcmc");
    let first = built.sampler.next_batch().expect("batch");
    // Two chains, each starting state evaluated twice.
    assert_eq!(first.len(), 4);
    assert!(first.iter().all(|point| point.lineage.replica.is_some()));

    let analysis = config.build_analysis(&built).expect("analysis").expect("configured");
    assert_eq!(analysis.name(), "mcmc");
}

#[test]
fn sensitivity_requires_a_grid_sampler() {
    let mut config = load_config(fixture_path("mcmc.yaml")).expect("load config");
    config.analysis = Some(AnalysisConfig::Sensitivity {
        qois: vec!["log_likelihood".to_string()],
    });
    let built = config.build_sampler(SeedSequence::new(1)).expect("sampler");
    let err = config.build_analysis(&built).err().expect("rejected");
    assert_eq!(err.code(), "sensitivity-needs-grid");
}

#[test]
fn malformed_configs_are_reported() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let path = temp.path().join("broken.yaml");
    fs::write(&path, "name: [unterminated\n").expect("write");
    assert_eq!(load_config(&path).unwrap_err().code(), "config-parse");
    assert_eq!(
        load_config(temp.path().join("absent.yaml")).unwrap_err().code(),
        "config-read"
    );
}

#[test]
fn config_hash_tracks_content() {
    let config = load_config(fixture_path("sparse_grid.yaml")).expect("load config");
    let again = load_config(fixture_path("sparse_grid.yaml")).expect("load config");
    assert_eq!(config.config_hash().expect("hash"), again.config_hash().expect("hash"));
    let mut reseeded = config.clone();
    reseeded.seed += 1;
    assert_ne!(config.config_hash().expect("hash"), reseeded.config_hash().expect("hash"));
}

#[cfg(unix)]
#[test]
fn yaml_campaign_runs_end_to_end() {
    let temp = tempfile::tempdir().expect("tmp dir");
    for file in ["sparse_grid.yaml", "template.csv"] {
        fs::copy(fixture_path(file), temp.path().join(file)).expect("copy fixture");
    }
    let (campaign, report) = run_config(temp.path().join("sparse_grid.yaml")).expect("run");
    assert_eq!(report.stop, StopReason::Exhausted);
    assert_eq!(report.rounds.len(), 3);
    assert!(report.rounds.iter().all(|round| round.failed == 0));

    let table = campaign.snapshot().expect("snapshot");
    assert_eq!(table.len(), 25);
    let indices = campaign
        .last_result()
        .and_then(AnalysisResult::as_sensitivity)
        .expect("sensitivity");
    let s_a = indices.first_order("f", "a").expect("index of a");
    assert!((s_a - 1.0).abs() < 1e-9);
    assert!(indices.first_order("f", "b").expect("index of b").abs() < 1e-9);

    let work_dir = temp.path().join("runs-out");
    assert!(work_dir.join("campaign.json").exists());
    let reloaded = uq_campaign::load_table(&work_dir, "quad").expect("reload");
    assert_eq!(reloaded, table);
}
