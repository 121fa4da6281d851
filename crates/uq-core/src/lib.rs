#![deny(missing_docs)]
#![doc = "Core data types shared by the UQ campaign crates: run descriptors, cell values, parameter spaces, seeding and the canonical error surface."]

pub mod errors;
pub mod params;
pub mod provenance;
pub mod rng;
mod run;
mod value;

pub use errors::{serde_error, ErrorInfo, UqError};
pub use params::{ParamSpace, ParamSpec, ParamType};
pub use provenance::{CampaignProvenance, SchemaVersion};
pub use rng::{derive_substream_seed, SeedSequence};
pub use run::{ChainPosition, Lineage, ParameterPoint, RunDescriptor, RunId, RunStatus};
pub use value::{Value, ValueKind};
