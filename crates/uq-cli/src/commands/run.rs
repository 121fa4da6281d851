use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use serde_json::json;
use tracing::info;
use uq_campaign::load_config;

use super::print_json;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// YAML campaign configuration.
    #[arg(long)]
    pub config: PathBuf,
    /// Override the configured round limit.
    #[arg(long)]
    pub max_rounds: Option<usize>,
    /// Refine samplers without analysis feedback.
    #[arg(long)]
    pub no_feedback: bool,
}

pub fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let mut config = load_config(&args.config)?;
    if args.max_rounds.is_some() {
        config.run.max_rounds = args.max_rounds;
    }
    if args.no_feedback {
        config.run.feedback = false;
    }
    let mut campaign = config.build()?;
    let report = campaign.run_loop(&config.run)?;
    let manifest = campaign.save()?;
    info!(
        campaign = campaign.name(),
        work_dir = %campaign.work_dir().display(),
        "campaign state written"
    );
    print_json(&json!({
        "campaign": campaign.name(),
        "work_dir": campaign.work_dir(),
        "report": report,
        "tables": manifest.apps,
        "result": campaign.last_result(),
    }))
}
