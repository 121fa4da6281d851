#![deny(missing_docs)]
#![doc = "UQ campaign orchestration: applications, parallel run dispatch with retries, the adaptive sampling loop, YAML configuration and on-disk state."]

pub mod app;
pub mod campaign;
pub mod config;
/// Parallel batch execution.
pub mod dispatch;
/// Execution adapters.
pub mod executor;
pub mod feedback;
pub mod state;
/// Append-only run descriptor store.
pub mod store;

pub use app::{App, CsvDecoder, Decoder, Encoder, TemplateEncoder};
pub use campaign::Campaign;
pub use config::{load_config, run_config, AnalysisConfig, CampaignConfig, SamplerConfig, SamplerKind};
pub use dispatch::{execute_batch, BatchReport, DispatchOptions, RunReport};
pub use executor::{Executor, FnExecutor, LocalExecutor, RunContext};
pub use feedback::{LoopOptions, LoopReport, RoundReport, StopReason};
pub use state::{load_table, CampaignManifest, MANIFEST_FILE};
pub use store::RunStore;
