use std::collections::BTreeMap;

use proptest::prelude::*;
use uq_analysis::{AnalysisElement, AnalysisResult, McmcAnalysis, TailPolicy, DEFAULT_BINS};
use uq_collate::{CollationBuilder, CollationTable, DecodedOutput, RunOutcome};
use uq_core::{Lineage, RunDescriptor, RunId, UqError, Value};

struct ChainTable {
    builder: CollationBuilder,
    next_id: u64,
}

impl ChainTable {
    fn new() -> Self {
        Self {
            builder: CollationBuilder::new("model"),
            next_id: 0,
        }
    }

    fn state(&mut self, chain: &str, iteration: u64, x: f64, y: f64) -> RunId {
        let run_id = RunId::from_raw(self.next_id);
        self.next_id += 1;
        let run = RunDescriptor {
            run_id,
            app: "model".to_string(),
            sampler: "mcmc".to_string(),
            params: BTreeMap::from([
                ("x".to_string(), Value::Float(x)),
                ("y".to_string(), Value::Float(y)),
            ]),
            lineage: Lineage::chain(chain, iteration),
        };
        let output = DecodedOutput::new().with_scalar("log_likelihood", -x * x);
        self.builder
            .add_run(&run, RunOutcome::Completed(output))
            .expect("add run");
        run_id
    }

    fn snapshot(&self) -> CollationTable {
        self.builder.snapshot()
    }
}

#[test]
fn gaps_expand_the_previous_state_and_exclude_the_tail() {
    let mut table = ChainTable::new();
    table.state("A", 0, 0.0, 0.0);
    table.state("A", 5, 5.0, 50.0);
    table.state("A", 12, 12.0, 120.0);

    let chains = McmcAnalysis::new(["x", "y"])
        .reconstruct(&table.snapshot())
        .unwrap();
    let chain = chains.chain("A").unwrap();
    assert_eq!(chain.len(), 12);
    let x = chain.column("x").unwrap();
    assert_eq!(&x[..5], &[0.0; 5]);
    assert_eq!(&x[5..], &[5.0; 7]);
    assert!(!x.contains(&12.0));
    assert_eq!(chain.step(6), Some(vec![5.0, 50.0]));
    assert_eq!(chain.step(12), None);
    assert_eq!(chain.iterations, vec![0, 5, 12]);
}

#[test]
fn repeated_iterations_average_and_chains_stay_independent() {
    let mut table = ChainTable::new();
    table.state("A", 0, 0.0, 10.0);
    table.state("A", 3, 1.0, 20.0);
    table.state("A", 3, 3.0, 40.0);
    table.state("A", 7, 9.0, 90.0);
    table.state("B", 0, -1.0, -1.0);
    table.state("B", 2, -2.0, -2.0);

    let result = McmcAnalysis::new(["x", "y"])
        .analyse(&table.snapshot())
        .unwrap();
    let chains = result.as_mcmc().unwrap();
    assert_eq!(chains.chain_ids().collect::<Vec<_>>(), vec!["A", "B"]);

    let a = chains.chain("A").unwrap();
    assert_eq!(a.len(), 7);
    assert_eq!(a.column("x").unwrap(), &[0.0, 0.0, 0.0, 2.0, 2.0, 2.0, 2.0]);
    assert_eq!(a.column("y").unwrap()[3..], [30.0; 4]);

    let b = chains.chain("B").unwrap();
    assert_eq!(b.len(), 2);
    assert_eq!(b.column("x").unwrap(), &[-1.0, -1.0]);
}

#[test]
fn tail_policies_control_the_last_state() {
    let mut table = ChainTable::new();
    table.state("A", 0, 1.0, 1.0);
    table.state("A", 2, 2.0, 2.0);
    let snapshot = table.snapshot();

    let single = McmcAnalysis::new(["x"])
        .with_tail(TailPolicy::Single)
        .reconstruct(&snapshot)
        .unwrap();
    assert_eq!(single.chain("A").unwrap().column("x").unwrap(), &[1.0, 1.0, 2.0]);

    let padded = McmcAnalysis::new(["x"])
        .with_tail(TailPolicy::PadTo(5))
        .reconstruct(&snapshot)
        .unwrap();
    assert_eq!(
        padded.chain("A").unwrap().column("x").unwrap(),
        &[1.0, 1.0, 2.0, 2.0, 2.0]
    );

    let err = McmcAnalysis::new(["x"])
        .with_tail(TailPolicy::PadTo(1))
        .reconstruct(&snapshot)
        .unwrap_err();
    assert_eq!(err.code(), "chain-length-too-short");
}

#[test]
fn a_single_recorded_state_reconstructs_to_nothing_under_exclude() {
    let mut table = ChainTable::new();
    table.state("A", 4, 1.0, 1.0);
    let chains = McmcAnalysis::new(["x"]).reconstruct(&table.snapshot()).unwrap();
    assert!(chains.chain("A").unwrap().is_empty());

    let single = McmcAnalysis::new(["x"])
        .with_tail(TailPolicy::Single)
        .reconstruct(&table.snapshot())
        .unwrap();
    assert_eq!(single.chain("A").unwrap().len(), 1);
}

#[test]
fn ignored_and_failed_rows_do_not_contribute_states() {
    let mut table = ChainTable::new();
    table.state("A", 0, 1.0, 1.0);
    let rejected = table.state("A", 1, 100.0, 100.0);
    table.state("A", 3, 3.0, 3.0);
    table.builder.mark_ignored(rejected).unwrap();
    table
        .builder
        .add_run(
            &RunDescriptor {
                run_id: RunId::from_raw(99),
                app: "model".to_string(),
                sampler: "mcmc".to_string(),
                params: BTreeMap::from([
                    ("x".to_string(), Value::Float(7.0)),
                    ("y".to_string(), Value::Float(7.0)),
                ]),
                lineage: Lineage::chain("A", 2),
            },
            RunOutcome::failed("crashed"),
        )
        .unwrap();

    let chains = McmcAnalysis::new(["x"]).reconstruct(&table.snapshot()).unwrap();
    assert_eq!(chains.chain("A").unwrap().column("x").unwrap(), &[1.0, 1.0, 1.0]);
}

#[test]
fn chains_without_completed_states_are_empty_chain_errors() {
    let mut table = ChainTable::new();
    table.state("A", 0, 1.0, 1.0);
    let only = table.state("B", 0, 2.0, 2.0);
    table.builder.mark_ignored(only).unwrap();

    let err = McmcAnalysis::new(["x"])
        .reconstruct(&table.snapshot())
        .unwrap_err();
    match err {
        UqError::EmptyChain(info) => {
            assert_eq!(info.code, "empty-chain");
            assert_eq!(info.context["chain"], "B");
        }
        other => panic!("unexpected error {other:?}"),
    }

    let untagged = CollationBuilder::new("model").snapshot();
    let err = McmcAnalysis::new(["x"]).reconstruct(&untagged).unwrap_err();
    assert!(matches!(err, UqError::EmptyChain(_) | UqError::MissingParameter(_)));
}

#[test]
fn undeclared_parameters_abort_the_analysis() {
    let mut table = ChainTable::new();
    table.state("A", 0, 1.0, 1.0);
    let err = McmcAnalysis::new(["x", "z"])
        .reconstruct(&table.snapshot())
        .unwrap_err();
    assert!(matches!(err, UqError::MissingParameter(ref info) if info.context["param"] == "z"));
}

#[test]
fn traces_and_histograms_apply_burn_in() {
    let mut table = ChainTable::new();
    table.state("A", 0, 0.0, 0.0);
    table.state("A", 4, 1.0, 0.0);
    table.state("A", 8, 1.0, 0.0);
    table.state("B", 0, 5.0, 0.0);
    table.state("B", 2, 6.0, 0.0);
    table.state("B", 4, 6.0, 0.0);
    let chains = McmcAnalysis::new(["x", "y"])
        .reconstruct(&table.snapshot())
        .unwrap();

    assert_eq!(chains.trace("x", Some("A"), 2).unwrap(), vec![0.0, 0.0, 1.0, 1.0, 1.0, 1.0]);
    assert_eq!(
        chains.trace("x", None, 3).unwrap(),
        vec![0.0, 1.0, 1.0, 1.0, 1.0, 6.0]
    );
    assert!(chains.trace("x", Some("A"), 100).unwrap().is_empty());

    let hist = chains.histogram("x", None, 0, DEFAULT_BINS).unwrap();
    assert_eq!(hist.counts.len(), DEFAULT_BINS);
    assert_eq!(hist.total(), 12);
    assert_eq!(hist.edges.first(), Some(&0.0));
    assert_eq!(hist.edges.last(), Some(&6.0));

    assert_eq!(chains.trace("x", Some("C"), 0).unwrap_err().code(), "unknown-chain");
    assert_eq!(chains.trace("w", None, 0).unwrap_err().code(), "unknown-parameter");
    assert_eq!(chains.histogram("x", None, 0, 0).unwrap_err().code(), "histogram-bins");
}

#[test]
fn results_serialize_with_their_kind() {
    let mut table = ChainTable::new();
    table.state("A", 0, 0.0, 0.0);
    table.state("A", 1, 1.0, 0.0);
    let result = McmcAnalysis::new(["x"]).analyse(&table.snapshot()).unwrap();
    assert_eq!(result.kind(), "mcmc");
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["kind"], "mcmc");
    assert!(matches!(result, AnalysisResult::Mcmc(_)));
}

proptest! {
    #[test]
    fn expansion_length_is_the_iteration_span(
        mut iterations in proptest::collection::btree_set(0u64..200, 1..25)
    ) {
        let mut table = ChainTable::new();
        for (idx, iteration) in iterations.iter().enumerate() {
            table.state("A", *iteration, idx as f64, 0.0);
        }
        let first = *iterations.iter().next().unwrap();
        let last = *iterations.iter().next_back().unwrap();
        let chains = McmcAnalysis::new(["x"]).reconstruct(&table.snapshot()).unwrap();
        let chain = chains.chain("A").unwrap();
        prop_assert_eq!(chain.len() as u64, last - first);

        // Every recorded state but the last occupies exactly its gap.
        let x = chain.column("x").unwrap();
        iterations.remove(&last);
        let mut position = 0usize;
        let ordered: Vec<u64> = iterations.iter().copied().chain([last]).collect();
        for (idx, pair) in ordered.windows(2).enumerate() {
            for _ in 0..(pair[1] - pair[0]) {
                prop_assert_eq!(x[position], idx as f64);
                position += 1;
            }
        }
    }

    #[test]
    fn repeated_rows_average_column_wise(values in proptest::collection::vec(-1e3f64..1e3, 1..12)) {
        let mut table = ChainTable::new();
        for value in &values {
            table.state("A", 0, *value, 2.0 * value);
        }
        table.state("A", 1, 0.0, 0.0);
        let chains = McmcAnalysis::new(["x", "y"]).reconstruct(&table.snapshot()).unwrap();
        let expected = values.iter().sum::<f64>() / values.len() as f64;
        let state = chains.chain("A").unwrap().step(0).unwrap();
        prop_assert!((state[0] - expected).abs() < 1e-9);
        prop_assert!((state[1] - 2.0 * expected).abs() < 1e-9);
    }
}
