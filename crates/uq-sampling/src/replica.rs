use uq_analysis::AnalysisResult;
use uq_collate::CollationTable;
use uq_core::{ErrorInfo, ParameterPoint, UqError};

use crate::sampler::{Refinement, Sampler};

/// Repeats every point of an inner sampler, for stochastic simulations.
///
/// Copies differ only in their replica index; analyses that group by design
/// point (chain reconstruction, collocation) average them.
pub struct ReplicaSampler<S> {
    inner: S,
    replicas: u32,
}

impl<S: Sampler> ReplicaSampler<S> {
    /// Wraps `inner`, emitting each of its points `replicas` times.
    pub fn new(inner: S, replicas: u32) -> Result<Self, UqError> {
        if replicas == 0 {
            return Err(UqError::Config(
                ErrorInfo::new("replicas-zero", "replica count must be positive")
                    .with_context("sampler", inner.name()),
            ));
        }
        Ok(Self { inner, replicas })
    }

    /// The wrapped sampler.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: Sampler> Sampler for ReplicaSampler<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn inputs(&self) -> Vec<String> {
        self.inner.inputs()
    }

    fn next_batch(&mut self) -> Result<Vec<ParameterPoint>, UqError> {
        let points = self.inner.next_batch()?;
        let mut batch = Vec::with_capacity(points.len() * self.replicas as usize);
        for point in points {
            for replica in 0..self.replicas {
                let lineage = point.lineage.clone().with_replica(replica);
                batch.push(point.clone().with_lineage(lineage));
            }
        }
        Ok(batch)
    }

    fn exhausted(&self) -> bool {
        self.inner.exhausted()
    }

    fn refine(
        &mut self,
        table: &CollationTable,
        previous: Option<&AnalysisResult>,
    ) -> Result<Refinement, UqError> {
        self.inner.refine(table, previous)
    }
}
