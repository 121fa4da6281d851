use std::collections::BTreeMap;

use uq_analysis::{AnalysisElement, CollocationWeights, SensitivityAnalysis};
use uq_collate::{CollationBuilder, DecodedOutput, RunOutcome};
use uq_core::{RunDescriptor, RunId, Value};
use uq_sampling::{CollocationSampler, Sampler};

fn vary() -> BTreeMap<String, (f64, f64)> {
    BTreeMap::from([
        ("a".to_string(), (0.0, 1.0)),
        ("b".to_string(), (-1.0, 1.0)),
    ])
}

fn model(point: &BTreeMap<String, Value>) -> f64 {
    let a = point["a"].as_f64().unwrap();
    let b = point["b"].as_f64().unwrap();
    4.0 * a * a + 0.1 * b
}

#[test]
fn level_one_grid_is_a_three_by_three_tensor() {
    let mut sampler = CollocationSampler::new(vary(), 1, 3).unwrap();
    let batch = sampler.next_batch().unwrap();
    assert_eq!(batch.len(), 9);
    assert!(batch.iter().all(|p| p.lineage.refinement_level == Some(0)));
    let bs: Vec<f64> = batch
        .iter()
        .filter(|p| p.values["a"] == Value::Float(0.0))
        .map(|p| p.values["b"].as_f64().unwrap())
        .collect();
    assert_eq!(bs, vec![-1.0, 0.0, 1.0]);
    assert!(sampler.next_batch().unwrap().is_empty());
    assert_eq!(sampler.weights().node_count(), 9);
}

#[test]
fn refinement_without_feedback_raises_every_parameter_and_keeps_old_nodes() {
    let mut sampler = CollocationSampler::new(vary(), 0, 2).unwrap();
    assert_eq!(sampler.next_batch().unwrap().len(), 1);
    let table = CollationBuilder::new("model").snapshot();
    sampler.refine(&table, None).unwrap();
    // 3x3 grid minus the midpoint already evaluated.
    let batch = sampler.next_batch().unwrap();
    assert_eq!(batch.len(), 8);
    assert!(batch.iter().all(|p| p.lineage.refinement_level == Some(1)));
    sampler.refine(&table, None).unwrap();
    assert_eq!(sampler.next_batch().unwrap().len(), 25 - 9);
    assert!(sampler.exhausted());
}

#[test]
fn feedback_refines_the_most_sensitive_parameter() {
    let mut sampler = CollocationSampler::new(vary(), 1, 4).unwrap();
    let weights = sampler.weights();
    let builder = CollationBuilder::new("model");
    let mut id = 0u64;
    let mut evaluate = |points: Vec<uq_core::ParameterPoint>| {
        for point in points {
            let run = RunDescriptor {
                run_id: RunId::from_raw(id),
                app: "model".to_string(),
                sampler: "collocation".to_string(),
                params: point.values.clone(),
                lineage: point.lineage.clone(),
            };
            id += 1;
            let output = DecodedOutput::new().with_scalar("f", model(&point.values));
            builder.add_run(&run, RunOutcome::Completed(output)).unwrap();
        }
    };

    evaluate(sampler.next_batch().unwrap());
    let analysis = SensitivityAnalysis::new(["f"], weights.clone());
    let result = analysis.analyse(&builder.snapshot()).unwrap();
    let sensitivity = result.as_sensitivity().unwrap();
    assert!(sensitivity.first_order("f", "a").unwrap() > 0.9);

    sampler.refine(&builder.snapshot(), Some(&result)).unwrap();
    assert_eq!(sampler.levels()["a"], 2);
    assert_eq!(sampler.levels()["b"], 1);
    let batch = sampler.next_batch().unwrap();
    assert_eq!(batch.len(), 5 * 3 - 9);

    // The analysis follows the refined grid once the new nodes are evaluated.
    assert_eq!(
        analysis.analyse(&builder.snapshot()).unwrap_err().code(),
        "grid-incomplete"
    );
    evaluate(batch);
    let refined = analysis.analyse(&builder.snapshot()).unwrap();
    assert_eq!(refined.as_sensitivity().unwrap().nodes, 15);
}

#[test]
fn bad_levels_are_rejected() {
    let err = CollocationSampler::new(vary(), 3, 2).unwrap_err();
    assert_eq!(err.code(), "collocation-level");
    let err = CollocationSampler::new(
        BTreeMap::from([("a".to_string(), (1.0, 1.0))]),
        0,
        1,
    )
    .unwrap_err();
    assert_eq!(err.code(), "marginal-invalid");
}
