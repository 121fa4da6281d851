use std::error::Error;

use clap::Args;
use serde_json::json;

use super::{print_json, TableSource};

#[derive(Args, Debug)]
pub struct FailuresArgs {
    #[command(flatten)]
    pub source: TableSource,
}

pub fn run(args: &FailuresArgs) -> Result<(), Box<dyn Error>> {
    let table = args.source.load()?;
    let failed: Vec<_> = table
        .failed_runs()
        .into_iter()
        .map(|run| json!({ "run_id": run.run_id.as_raw(), "reason": run.reason }))
        .collect();
    print_json(&json!({
        "app": table.app(),
        "runs": table.len(),
        "failed": failed,
    }))
}
