use std::collections::BTreeMap;

use uq_analysis::McmcAnalysis;
use uq_collate::{CollationBuilder, CollationTable, DecodedOutput, RunOutcome};
use uq_core::{RunDescriptor, RunId, RunStatus, SeedSequence, UqError};
use uq_sampling::{MetropolisSampler, ProposalSpec, Sampler};

fn sampler(n_steps: u64, seed: u64) -> MetropolisSampler {
    let params = BTreeMap::from([(
        "x".to_string(),
        ProposalSpec {
            width: 0.8,
            lower: -3.0,
            upper: 3.0,
        },
    )]);
    let starts = vec![
        BTreeMap::from([("x".to_string(), -1.0)]),
        BTreeMap::from([("x".to_string(), 2.0)]),
    ];
    MetropolisSampler::new(params, starts, "log_likelihood", n_steps, SeedSequence::new(seed))
        .unwrap()
}

/// Drives the sampler to exhaustion, evaluating a standard normal target.
fn drive(sampler: &mut MetropolisSampler, fail_every: Option<u64>) -> (CollationTable, usize) {
    let builder = CollationBuilder::new("gauss");
    let mut next_id = 0u64;
    let mut rounds = 0;
    while !sampler.exhausted() {
        rounds += 1;
        for point in sampler.next_batch().unwrap() {
            let run = RunDescriptor {
                run_id: RunId::from_raw(next_id),
                app: "gauss".to_string(),
                sampler: sampler.name().to_string(),
                params: point.values.clone(),
                lineage: point.lineage.clone(),
            };
            let x = point.values["x"].as_f64().unwrap();
            let iteration = point.lineage.chain.as_ref().unwrap().iteration;
            let outcome = match fail_every {
                Some(every) if iteration > 0 && next_id % every == 0 => RunOutcome::failed("model crashed"),
                _ => RunOutcome::Completed(DecodedOutput::new().with_scalar("log_likelihood", -0.5 * x * x)),
            };
            next_id += 1;
            builder.add_run(&run, outcome).unwrap();
        }
        let refinement = sampler.refine(&builder.snapshot(), None).unwrap();
        for run_id in refinement.ignored_runs {
            builder.mark_ignored(run_id).unwrap();
        }
        assert!(rounds < 1000, "sampler never exhausted");
    }
    (builder.snapshot(), rounds)
}

#[test]
fn chains_run_to_their_step_budget() {
    let mut sampler = sampler(40, 5);
    let (table, _) = drive(&mut sampler, None);
    assert_eq!(sampler.chain_ids(), vec!["chain_0", "chain_1"]);
    assert!(sampler.next_batch().unwrap().is_empty());

    for row in table.rows() {
        let x = row.param("x").unwrap().as_f64().unwrap();
        assert!((-3.0..=3.0).contains(&x), "out-of-support proposal was run");
        let iteration = row.lineage.chain.as_ref().unwrap().iteration;
        assert!(iteration <= 40);
    }

    let rates = sampler.acceptance_rates();
    assert!(rates.values().all(|rate| (0.0..=1.0).contains(rate)));
    let completed = table.completed_rows().count() as f64;
    let accepted: f64 = rates.values().sum::<f64>();
    assert!(completed >= 2.0 && accepted > 0.0);

    let chains = McmcAnalysis::new(["x"]).reconstruct(&table).unwrap();
    for trajectory in chains.iter() {
        assert!(trajectory.len() <= 40);
        assert_eq!(trajectory.iterations[0], 0);
    }
}

#[test]
fn rejected_proposals_are_ignored_not_deleted() {
    let mut sampler = sampler(30, 9);
    let (table, _) = drive(&mut sampler, None);
    let counts = table.status_counts();
    let ignored = counts.get(&RunStatus::Ignored).copied().unwrap_or(0);
    let completed = counts.get(&RunStatus::Completed).copied().unwrap_or(0);
    assert_eq!(ignored + completed, table.len());
    // Completed chain rows are the starting states plus accepted proposals.
    assert!(completed >= 2);
    for row in table.rows().filter(|row| row.status == RunStatus::Completed) {
        assert!(row.lineage.chain.is_some());
    }
}

#[test]
fn identical_seeds_replay_identical_chains() {
    let (first, _) = drive(&mut sampler(25, 77), None);
    let (second, _) = drive(&mut sampler(25, 77), None);
    assert_eq!(first, second);
}

#[test]
fn failed_proposals_count_as_rejections() {
    let mut sampler = sampler(20, 3);
    let (table, _) = drive(&mut sampler, Some(3));
    assert!(!table.failed_runs().is_empty());
    let chains = McmcAnalysis::new(["x"]).reconstruct(&table).unwrap();
    assert_eq!(chains.len(), 2);
}

#[test]
fn starting_points_must_cover_the_parameters() {
    let params = BTreeMap::from([(
        "x".to_string(),
        ProposalSpec {
            width: 1.0,
            lower: 0.0,
            upper: 1.0,
        },
    )]);
    let err = MetropolisSampler::new(
        params.clone(),
        vec![BTreeMap::from([("y".to_string(), 0.5)])],
        "ll",
        10,
        SeedSequence::default(),
    )
    .unwrap_err();
    assert!(matches!(err, UqError::Config(ref info) if info.code == "mcmc-start"));

    let err = MetropolisSampler::new(
        params,
        vec![BTreeMap::from([("x".to_string(), 4.0)])],
        "ll",
        10,
        SeedSequence::default(),
    )
    .unwrap_err();
    assert_eq!(err.code(), "mcmc-start");
}
