use std::collections::BTreeMap;

use parking_lot::Mutex;
use uq_core::{ErrorInfo, Lineage, RunDescriptor, RunId, UqError, Value};

/// Append-only record of every run a campaign created.
///
/// Run ids are issued sequentially across all apps and never reused, also
/// after a campaign is reopened from disk.
#[derive(Debug, Default)]
pub struct RunStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    runs: BTreeMap<RunId, RunDescriptor>,
    next: u64,
}

impl RunStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from persisted descriptors.
    pub fn from_runs(runs: impl IntoIterator<Item = RunDescriptor>) -> Result<Self, UqError> {
        let mut inner = Inner::default();
        for run in runs {
            inner.next = inner.next.max(run.run_id.as_raw() + 1);
            if let Some(previous) = inner.runs.insert(run.run_id, run) {
                return Err(UqError::Conflict(
                    ErrorInfo::new("run-id-duplicate", "two persisted runs share an id")
                        .with_context("run", previous.run_id.to_string()),
                ));
            }
        }
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    /// Records a new run and returns its descriptor.
    pub fn create(
        &self,
        app: &str,
        sampler: &str,
        params: BTreeMap<String, Value>,
        lineage: Lineage,
    ) -> RunDescriptor {
        let mut inner = self.inner.lock();
        let run = RunDescriptor {
            run_id: RunId::from_raw(inner.next),
            app: app.to_string(),
            sampler: sampler.to_string(),
            params,
            lineage,
        };
        inner.next += 1;
        inner.runs.insert(run.run_id, run.clone());
        run
    }

    /// Descriptor of one run.
    pub fn get(&self, run_id: RunId) -> Option<RunDescriptor> {
        self.inner.lock().runs.get(&run_id).cloned()
    }

    /// Number of runs recorded.
    pub fn len(&self) -> usize {
        self.inner.lock().runs.len()
    }

    /// Whether no run was recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Descriptors of one app, in id order.
    pub fn runs_for(&self, app: &str) -> Vec<RunDescriptor> {
        self.inner
            .lock()
            .runs
            .values()
            .filter(|run| run.app == app)
            .cloned()
            .collect()
    }
}
