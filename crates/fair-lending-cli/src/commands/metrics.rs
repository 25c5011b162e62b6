use clap::Args;
use serde_json::{json, Value};

use fair_lending_core::metrics::registry::{MetricDefinition, MetricRegistry};

use crate::input;

/// Arguments for listing metrics
#[derive(Args)]
pub struct MetricsArgs {
    /// JSON or YAML list of metric definitions to validate and list
    #[arg(long)]
    pub file: Option<String>,
}

pub fn run_metrics(args: MetricsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let registry = match args.file {
        Some(ref path) => {
            let defs: Vec<MetricDefinition> = input::file::read_structured(path)?;
            MetricRegistry::new(defs)?
        }
        None => MetricRegistry::standard(),
    };
    let rows: Vec<Value> = registry
        .iter()
        .enumerate()
        .map(|(i, m)| json!({ "index": i, "id": m.id, "label": m.label }))
        .collect();
    Ok(json!({ "results": rows }))
}
