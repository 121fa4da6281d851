pub mod analyse;
pub mod failures;
pub mod run;

use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use uq_collate::{load_csv, CollationTable};

/// Where a persisted table is read from.
#[derive(Args, Debug)]
pub struct TableSource {
    /// Table CSV file written by a campaign.
    #[arg(long, required_unless_present = "state", conflicts_with = "state")]
    pub table: Option<PathBuf>,
    /// Campaign work directory; the table is checked against its manifest.
    #[arg(long, requires = "app")]
    pub state: Option<PathBuf>,
    /// App whose table is read from `--state`.
    #[arg(long)]
    pub app: Option<String>,
}

impl TableSource {
    pub fn load(&self) -> Result<CollationTable, Box<dyn Error>> {
        let table = match (&self.table, &self.state, &self.app) {
            (Some(path), _, _) => load_csv(path)?,
            (None, Some(dir), Some(app)) => uq_campaign::load_table(dir, app)?,
            _ => return Err("either --table or --state with --app is required".into()),
        };
        Ok(table)
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
