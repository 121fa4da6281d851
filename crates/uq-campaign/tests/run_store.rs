use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use rayon::prelude::*;
use uq_campaign::RunStore;
use uq_core::{Lineage, RunId};

#[test]
fn concurrent_creation_issues_unique_ids() {
    let store = RunStore::new();
    let ids: Vec<RunId> = (0..200)
        .into_par_iter()
        .map(|i| {
            let app = if i % 2 == 0 { "even" } else { "odd" };
            store
                .create(app, "test", BTreeMap::new(), Lineage::default())
                .run_id
        })
        .collect();
    let unique: BTreeSet<RunId> = ids.iter().copied().collect();
    assert_eq!(unique.len(), 200);
    assert_eq!(unique.iter().next_back().map(RunId::as_raw), Some(199));
    assert_eq!(store.runs_for("even").len(), 100);
}

#[test]
fn duplicate_persisted_ids_are_rejected() {
    let store = RunStore::new();
    let run = store.create("app", "test", BTreeMap::new(), Lineage::default());
    let err = RunStore::from_runs(vec![run.clone(), run]).unwrap_err();
    assert_eq!(err.code(), "run-id-duplicate");
}

proptest! {
    #[test]
    fn restored_stores_never_reuse_ids(kept in proptest::collection::btree_set(0u64..50, 1..20)) {
        let original = RunStore::new();
        let runs: Vec<_> = (0..50)
            .map(|_| original.create("app", "test", BTreeMap::new(), Lineage::default()))
            .filter(|run| kept.contains(&run.run_id.as_raw()))
            .collect();
        let restored = RunStore::from_runs(runs).expect("restore");
        prop_assert_eq!(restored.len(), kept.len());
        let next = restored.create("app", "test", BTreeMap::new(), Lineage::default());
        let max_kept = *kept.iter().next_back().expect("non-empty");
        prop_assert_eq!(next.run_id.as_raw(), max_kept + 1);
    }
}
