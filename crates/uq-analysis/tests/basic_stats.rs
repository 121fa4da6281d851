use std::collections::BTreeMap;

use proptest::prelude::*;
use uq_analysis::{AnalysisElement, BasicStats};
use uq_collate::{CollationBuilder, CollationTable, ColumnKey, DecodedOutput, RunOutcome};
use uq_core::{Lineage, RunDescriptor, RunId, UqError, Value};

fn table_with(outputs: Vec<RunOutcome>) -> CollationTable {
    let builder = CollationBuilder::new("cooling");
    for (id, outcome) in outputs.into_iter().enumerate() {
        let run = RunDescriptor {
            run_id: RunId::from_raw(id as u64),
            app: "cooling".to_string(),
            sampler: "random".to_string(),
            params: BTreeMap::from([("kappa".to_string(), Value::Float(id as f64))]),
            lineage: Lineage::default(),
        };
        builder.add_run(&run, outcome).expect("add run");
    }
    builder.snapshot()
}

fn te(value: f64) -> RunOutcome {
    RunOutcome::Completed(
        DecodedOutput::new()
            .with_scalar("te", value)
            .with_scalar("label", "ok"),
    )
}

#[test]
fn moments_skip_missing_cells_and_report_them() {
    let table = table_with(vec![
        te(1.0),
        te(2.0),
        RunOutcome::failed("timeout"),
        te(3.0),
        te(4.0),
        RunOutcome::Completed(DecodedOutput::new().with_scalar("label", "partial")),
    ]);
    let result = BasicStats::new().analyse(&table).unwrap();
    let stats = result.as_basic_stats().unwrap();
    assert_eq!(stats.columns.len(), 1, "text QoIs are not summarised");

    let te = stats.scalar("te").unwrap();
    assert_eq!(te.count, 4);
    assert_eq!(te.missing, 2);
    assert_eq!(te.mean, 2.5);
    assert!((te.variance - 5.0 / 3.0).abs() < 1e-12);
    assert!((te.sem - (5.0f64 / 12.0).sqrt()).abs() < 1e-12);
    assert_eq!(te.skewness, 0.0);
    assert!((te.kurtosis + 1.2).abs() < 1e-12);
    assert_eq!(te.quantiles.q50, 2.5);
}

#[test]
fn requested_qois_must_exist_and_be_numeric() {
    let table = table_with(vec![te(1.0), te(2.0)]);
    let err = BasicStats::for_qois(["pressure"]).analyse(&table).unwrap_err();
    assert!(matches!(err, UqError::MissingParameter(ref info) if info.code == "qoi-missing"));

    let err = BasicStats::for_qois(["label"]).analyse(&table).unwrap_err();
    assert_eq!(err.code(), "qoi-not-numeric");

    let result = BasicStats::for_qois(["te"]).analyse(&table).unwrap();
    let stats = result.as_basic_stats().unwrap();
    assert!(stats.get(&ColumnKey::scalar("te")).is_some());
}

proptest! {
    #[test]
    fn mean_matches_the_arithmetic_mean(values in proptest::collection::vec(-1e6f64..1e6, 1..40)) {
        let table = table_with(values.iter().map(|v| te(*v)).collect());
        let result = BasicStats::new().analyse(&table).unwrap();
        let stats = result.as_basic_stats().unwrap().scalar("te").unwrap().clone();
        let expected = values.iter().sum::<f64>() / values.len() as f64;
        prop_assert_eq!(stats.count, values.len());
        prop_assert!((stats.mean - expected).abs() <= 1e-9 * (1.0 + expected.abs()));
        if values.len() > 1 {
            prop_assert!(stats.variance >= 0.0);
        }
    }
}
