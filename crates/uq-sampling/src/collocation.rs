//! Dimension-adaptive stochastic collocation on nested equispaced grids.
//!
//! Each varied parameter carries its own level. Level 0 is the single midpoint
//! node; level `l >= 1` holds the `2^l + 1` equispaced nodes of the interval
//! with normalised trapezoid weights. Levels are nested, so refining one
//! parameter only adds nodes and every earlier run stays on the grid. Nodes are
//! tracked as integer positions on the finest representable level.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};
use uq_analysis::{AnalysisResult, CollocationNode, CollocationWeights};
use uq_collate::CollationTable;
use uq_core::{ErrorInfo, Lineage, ParameterPoint, UqError, Value};

use crate::sampler::{Refinement, Sampler};

/// Finest level a parameter can be refined to.
pub const MAX_LEVEL: u32 = 20;

const FINE: u64 = 1 << MAX_LEVEL;

#[derive(Debug, Clone, PartialEq)]
struct Axis {
    name: String,
    lower: f64,
    upper: f64,
    level: u32,
}

impl Axis {
    /// Fine positions of the nodes at the current level.
    fn nodes(&self) -> Vec<u32> {
        if self.level == 0 {
            return vec![(FINE / 2) as u32];
        }
        let stride = FINE >> self.level;
        (0..=(1u64 << self.level))
            .map(|k| (k * stride) as u32)
            .collect()
    }

    fn node_len(&self) -> usize {
        if self.level == 0 {
            1
        } else {
            (1usize << self.level) + 1
        }
    }

    fn weight(&self, fine: u32) -> Option<f64> {
        if self.level == 0 {
            return (u64::from(fine) == FINE / 2).then_some(1.0);
        }
        let stride = FINE >> self.level;
        if u64::from(fine) % stride != 0 {
            return None;
        }
        let h = 1.0 / (1u64 << self.level) as f64;
        if fine == 0 || u64::from(fine) == FINE {
            Some(h / 2.0)
        } else {
            Some(h)
        }
    }

    fn value(&self, fine: u32) -> f64 {
        self.lower + (self.upper - self.lower) * f64::from(fine) / FINE as f64
    }

    fn locate(&self, value: f64) -> Option<u32> {
        let span = self.upper - self.lower;
        let scaled = (value - self.lower) / span * FINE as f64;
        let fine = scaled.round();
        if !(0.0..=FINE as f64).contains(&fine) {
            return None;
        }
        let fine = fine as u32;
        ((self.value(fine) - value).abs() <= 1e-9 * span.abs()).then_some(fine)
    }
}

#[derive(Debug)]
struct GridState {
    axes: Vec<Axis>,
    max_level: u32,
    emitted: BTreeSet<Vec<u32>>,
    refinements: u32,
}

impl GridState {
    fn tensor_nodes(&self) -> Vec<Vec<u32>> {
        let mut nodes = vec![Vec::with_capacity(self.axes.len())];
        for axis in &self.axes {
            let positions = axis.nodes();
            let mut next = Vec::with_capacity(nodes.len() * positions.len());
            for prefix in &nodes {
                for position in &positions {
                    let mut node = prefix.clone();
                    node.push(*position);
                    next.push(node);
                }
            }
            nodes = next;
        }
        nodes
    }

    fn pending(&self) -> Vec<Vec<u32>> {
        self.tensor_nodes()
            .into_iter()
            .filter(|node| !self.emitted.contains(node))
            .collect()
    }

    fn refinable(&self) -> bool {
        self.axes.iter().any(|axis| axis.level < self.max_level)
    }
}

/// Read-only view of a collocation grid, handed to the sensitivity analysis.
#[derive(Debug, Clone)]
pub struct GridWeights {
    state: Arc<RwLock<GridState>>,
}

impl CollocationWeights for GridWeights {
    fn parameters(&self) -> Vec<String> {
        self.state
            .read()
            .axes
            .iter()
            .map(|axis| axis.name.clone())
            .collect()
    }

    fn node(&self, point: &BTreeMap<String, Value>) -> Option<CollocationNode> {
        let state = self.state.read();
        let mut weight = 1.0;
        let mut multi_index = Vec::with_capacity(state.axes.len());
        for axis in &state.axes {
            let value = point.get(&axis.name)?.as_f64()?;
            let fine = axis.locate(value)?;
            weight *= axis.weight(fine)?;
            multi_index.push(fine);
        }
        Some(CollocationNode {
            weight,
            multi_index,
        })
    }

    fn node_count(&self) -> usize {
        self.state.read().axes.iter().map(Axis::node_len).product()
    }
}

/// Dimension-adaptive collocation sampler over uniform parameters.
#[derive(Debug)]
pub struct CollocationSampler {
    name: String,
    state: Arc<RwLock<GridState>>,
}

impl CollocationSampler {
    /// Creates a sampler over `vary` (parameter -> `(lower, upper)`), starting
    /// every parameter at `initial_level`.
    pub fn new(
        vary: BTreeMap<String, (f64, f64)>,
        initial_level: u32,
        max_level: u32,
    ) -> Result<Self, UqError> {
        if vary.is_empty() {
            return Err(UqError::Config(ErrorInfo::new(
                "sampler-no-inputs",
                "collocation sampler needs at least one varied parameter",
            )));
        }
        if max_level > MAX_LEVEL || initial_level > max_level {
            return Err(UqError::Config(
                ErrorInfo::new("collocation-level", "levels out of range")
                    .with_context("initial_level", initial_level.to_string())
                    .with_context("max_level", max_level.to_string())
                    .with_hint(format!("levels must satisfy initial <= max <= {MAX_LEVEL}")),
            ));
        }
        let mut axes = Vec::with_capacity(vary.len());
        for (name, (lower, upper)) in vary {
            if !(lower.is_finite() && upper.is_finite() && lower < upper) {
                return Err(UqError::Config(
                    ErrorInfo::new("marginal-invalid", "collocation bounds must be finite and ordered")
                        .with_context("param", name),
                ));
            }
            axes.push(Axis {
                name,
                lower,
                upper,
                level: initial_level,
            });
        }
        Ok(Self {
            name: "collocation".to_string(),
            state: Arc::new(RwLock::new(GridState {
                axes,
                max_level,
                emitted: BTreeSet::new(),
                refinements: 0,
            })),
        })
    }

    /// Quadrature view of the grid that follows later refinements.
    pub fn weights(&self) -> Arc<dyn CollocationWeights> {
        Arc::new(GridWeights {
            state: Arc::clone(&self.state),
        })
    }

    /// Current level of each parameter.
    pub fn levels(&self) -> BTreeMap<String, u32> {
        self.state
            .read()
            .axes
            .iter()
            .map(|axis| (axis.name.clone(), axis.level))
            .collect()
    }

    /// Raises the level of one parameter. Returns `false` when it is already at
    /// the maximum level.
    pub fn refine_parameter(&mut self, name: &str) -> Result<bool, UqError> {
        let mut state = self.state.write();
        let raised = raise(&mut state, name)?;
        if raised {
            state.refinements += 1;
        }
        Ok(raised)
    }
}

fn raise(state: &mut GridState, name: &str) -> Result<bool, UqError> {
    let max_level = state.max_level;
    let axis = state
        .axes
        .iter_mut()
        .find(|axis| axis.name == name)
        .ok_or_else(|| {
            UqError::MissingParameter(
                ErrorInfo::new("param-missing", "parameter is not varied by the grid")
                    .with_context("param", name),
            )
        })?;
    if axis.level >= max_level {
        return Ok(false);
    }
    axis.level += 1;
    Ok(true)
}

impl Sampler for CollocationSampler {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<String> {
        self.state
            .read()
            .axes
            .iter()
            .map(|axis| axis.name.clone())
            .collect()
    }

    fn next_batch(&mut self) -> Result<Vec<ParameterPoint>, UqError> {
        let mut state = self.state.write();
        let pending = state.pending();
        let mut batch = Vec::with_capacity(pending.len());
        for node in pending {
            let values = state
                .axes
                .iter()
                .zip(&node)
                .map(|(axis, fine)| (axis.name.clone(), Value::Float(axis.value(*fine))))
                .collect();
            batch.push(ParameterPoint::new(values).with_lineage(Lineage::level(state.refinements)));
            state.emitted.insert(node);
        }
        debug!(points = batch.len(), refinement = state.refinements, "collocation batch");
        Ok(batch)
    }

    fn exhausted(&self) -> bool {
        let state = self.state.read();
        !state.refinable() && state.pending().is_empty()
    }

    fn refine(
        &mut self,
        _table: &CollationTable,
        previous: Option<&AnalysisResult>,
    ) -> Result<Refinement, UqError> {
        let mut state = self.state.write();
        let open: Vec<String> = state
            .axes
            .iter()
            .filter(|axis| axis.level < state.max_level)
            .map(|axis| axis.name.clone())
            .collect();
        if open.is_empty() {
            return Ok(Refinement::default());
        }

        // A single-node axis has no measurable index yet.
        let unexplored: Vec<String> = state
            .axes
            .iter()
            .filter(|axis| axis.level == 0 && axis.level < state.max_level)
            .map(|axis| axis.name.clone())
            .collect();
        match previous.and_then(AnalysisResult::as_sensitivity) {
            Some(_) if !unexplored.is_empty() => {
                for name in &unexplored {
                    raise(&mut state, name)?;
                }
                info!(params = unexplored.len(), "refined parameters still at level 0");
            }
            Some(result) => {
                let totals = result.total_first_order();
                let mut chosen = &open[0];
                let mut best = f64::NEG_INFINITY;
                for name in &open {
                    let index = totals.get(name).copied().unwrap_or(0.0);
                    if index > best {
                        best = index;
                        chosen = name;
                    }
                }
                raise(&mut state, chosen)?;
                info!(param = %chosen, index = best, "refined most sensitive parameter");
            }
            None => {
                for name in &open {
                    raise(&mut state, name)?;
                }
                info!(params = open.len(), "refined every open parameter");
            }
        }
        state.refinements += 1;
        Ok(Refinement::default())
    }
}
