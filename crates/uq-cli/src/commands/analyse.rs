use std::error::Error;

use clap::{Args, ValueEnum};
use serde_json::json;
use tracing::info;
use uq_analysis::{AnalysisElement, BasicStats, McmcAnalysis, TailPolicy, DEFAULT_BINS};

use super::{print_json, TableSource};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Method {
    /// Moments and quantiles per QoI column.
    Stats,
    /// Chain reconstruction from Metropolis runs.
    Mcmc,
}

#[derive(Args, Debug)]
pub struct AnalyseArgs {
    #[command(flatten)]
    pub source: TableSource,
    #[arg(long, value_enum, default_value_t = Method::Stats)]
    pub method: Method,
    /// QoIs to summarise (stats); all numeric QoIs when omitted.
    #[arg(long, value_delimiter = ',')]
    pub qois: Vec<String>,
    /// Parameters to reconstruct (mcmc).
    #[arg(long, value_delimiter = ',')]
    pub inputs: Vec<String>,
    /// Last-state policy: `exclude`, `single` or `pad-to:<len>`.
    #[arg(long, default_value = "exclude", value_parser = parse_tail)]
    pub tail: TailPolicy,
    /// Parameter whose trace and histogram are reported.
    #[arg(long)]
    pub param: Option<String>,
    /// Restrict the trace to one chain.
    #[arg(long)]
    pub chain: Option<String>,
    /// Burn-in steps dropped from each chain.
    #[arg(long, default_value_t = 0)]
    pub skip: usize,
    #[arg(long, default_value_t = DEFAULT_BINS)]
    pub bins: usize,
}

fn parse_tail(raw: &str) -> Result<TailPolicy, String> {
    match raw {
        "exclude" => Ok(TailPolicy::Exclude),
        "single" => Ok(TailPolicy::Single),
        other => other
            .strip_prefix("pad-to:")
            .and_then(|len| len.parse().ok())
            .map(TailPolicy::PadTo)
            .ok_or_else(|| format!("unknown tail policy `{other}`")),
    }
}

pub fn run(args: &AnalyseArgs) -> Result<(), Box<dyn Error>> {
    let table = args.source.load()?;
    info!(app = table.app(), rows = table.len(), method = ?args.method, "analysing table");
    match args.method {
        Method::Stats => {
            let element = if args.qois.is_empty() {
                BasicStats::new()
            } else {
                BasicStats::for_qois(args.qois.iter())
            };
            let result = element.analyse(&table)?;
            print_json(&result)
        }
        Method::Mcmc => {
            if args.inputs.is_empty() {
                return Err("--inputs is required for mcmc analysis".into());
            }
            let element = McmcAnalysis::new(args.inputs.iter()).with_tail(args.tail);
            let chains = element.reconstruct(&table)?;
            let lengths: serde_json::Map<String, serde_json::Value> = chains
                .iter()
                .map(|trajectory| (trajectory.chain_id.clone(), json!(trajectory.len())))
                .collect();
            let Some(param) = args.param.as_deref() else {
                return print_json(&json!({ "chains": lengths }));
            };
            let chain = args.chain.as_deref();
            let trace = chains.trace(param, chain, args.skip)?;
            let histogram = chains.histogram(param, chain, args.skip, args.bins)?;
            print_json(&json!({
                "chains": lengths,
                "param": param,
                "trace": trace,
                "histogram": histogram,
            }))
        }
    }
}
