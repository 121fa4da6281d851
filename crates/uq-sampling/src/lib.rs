#![deny(missing_docs)]
#![doc = "Samplers feeding UQ campaigns: independent random draws, dimension-adaptive collocation grids, Metropolis chains and replica expansion."]

pub mod collocation;
/// Per-parameter marginal distributions.
pub mod marginal;
pub mod metropolis;
/// Independent random draws.
pub mod random;
/// Replica expansion for stochastic models.
pub mod replica;
/// The sampler capability.
pub mod sampler;

pub use collocation::{CollocationSampler, GridWeights, MAX_LEVEL};
pub use marginal::Marginal;
pub use metropolis::{MetropolisSampler, ProposalSpec};
pub use random::RandomSampler;
pub use replica::ReplicaSampler;
pub use sampler::{Refinement, Sampler};
