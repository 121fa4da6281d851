use std::collections::BTreeMap;

use rand::rngs::StdRng;
use tracing::debug;
use uq_core::{ErrorInfo, ParameterPoint, SeedSequence, UqError, Value};

use crate::marginal::Marginal;
use crate::sampler::Sampler;

/// Independent draws from per-parameter marginals.
#[derive(Debug)]
pub struct RandomSampler {
    name: String,
    vary: BTreeMap<String, Marginal>,
    max_num: Option<usize>,
    batch_size: usize,
    emitted: usize,
    rng: StdRng,
}

impl RandomSampler {
    /// Creates a sampler drawing `batch_size` points per batch.
    ///
    /// With `max_num` set the sampler is exhausted after that many points;
    /// without it, it never is and the campaign's round limit stops the loop.
    pub fn new(
        vary: BTreeMap<String, Marginal>,
        max_num: Option<usize>,
        batch_size: usize,
        seeds: SeedSequence,
    ) -> Result<Self, UqError> {
        if vary.is_empty() {
            return Err(UqError::Config(ErrorInfo::new(
                "sampler-no-inputs",
                "random sampler needs at least one varied parameter",
            )));
        }
        if batch_size == 0 {
            return Err(UqError::Config(ErrorInfo::new(
                "batch-size-zero",
                "batch size must be positive",
            )));
        }
        for (name, marginal) in &vary {
            marginal.validate(name)?;
        }
        let name = "random".to_string();
        Ok(Self {
            rng: seeds.labelled(&name).rng(),
            name,
            vary,
            max_num,
            batch_size,
            emitted: 0,
        })
    }

    /// Number of points emitted so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

impl Sampler for RandomSampler {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<String> {
        self.vary.keys().cloned().collect()
    }

    fn next_batch(&mut self) -> Result<Vec<ParameterPoint>, UqError> {
        let remaining = self
            .max_num
            .map_or(self.batch_size, |max| max.saturating_sub(self.emitted));
        let count = remaining.min(self.batch_size);
        let mut batch = Vec::with_capacity(count);
        for _ in 0..count {
            let mut values = BTreeMap::new();
            for (name, marginal) in &self.vary {
                values.insert(name.clone(), Value::Float(marginal.sample(&mut self.rng)?));
            }
            batch.push(ParameterPoint::new(values));
        }
        self.emitted += count;
        debug!(sampler = %self.name, points = count, "random batch drawn");
        Ok(batch)
    }

    fn exhausted(&self) -> bool {
        self.max_num.map_or(false, |max| self.emitted >= max)
    }
}
