use clap::Args;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use fair_lending_core::config::AnalysisConfig;
use fair_lending_core::metrics::registry::{MetricDefinition, MetricRegistry};
use fair_lending_core::peers::matcher::{match_peers, PeerBounds};
use fair_lending_core::peers::volume_index::VolumeIndex;
use fair_lending_core::table::{CellRow, CellTable};
use fair_lending_core::CellKey;

use crate::input;

/// Arguments for a single peer-set lookup
#[derive(Args)]
pub struct PeersArgs {
    /// Path to a JSON AnalysisInput; its cells, metrics and config are used
    #[arg(long)]
    pub input: Option<String>,

    /// Path to a CSV cell table
    #[arg(long)]
    pub cells: Option<String>,

    /// Subject lender
    #[arg(long)]
    pub entity: String,

    #[arg(long)]
    pub year: i32,

    #[arg(long)]
    pub geography: String,

    #[arg(long, default_value = "")]
    pub sub_geography: String,

    #[arg(long)]
    pub loan_category: String,

    #[arg(long)]
    pub kind: String,

    /// Lower volume multiple (default 0.5)
    #[arg(long)]
    pub low: Option<Decimal>,

    /// Upper volume multiple (default 2.0)
    #[arg(long)]
    pub high: Option<Decimal>,
}

pub fn run_peers(args: PeersArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let (rows, metrics, mut config) = load(&args)?;
    if let Some(low) = args.low {
        config.volume_ratio_low = low;
    }
    if let Some(high) = args.high {
        config.volume_ratio_high = high;
    }

    let registry = match metrics {
        Some(m) => MetricRegistry::new(m)?,
        None => MetricRegistry::new(input::cells_csv::metrics_from_rows(&rows)?)?,
    };
    let mut warnings = config.validate(&registry)?;
    let (table, table_warnings) = CellTable::from_rows(registry, &rows)?;

    let key = CellKey {
        year: args.year,
        geography_id: args.geography.clone(),
        sub_geography_id: args.sub_geography.clone(),
        loan_category: args.loan_category.clone(),
        kind: args.kind.clone(),
    };
    let index = VolumeIndex::build(&table);
    let peers = match_peers(&index, &args.entity, &key, PeerBounds::from_config(&config));

    warnings.extend(table_warnings);
    if peers.subject_total.is_none() {
        warnings.push(format!("'{}' has no row at {}", args.entity, key));
    }

    let members: Vec<Value> = peers
        .members
        .iter()
        .map(|(id, volume)| json!({ "entity_id": id, "total": volume }))
        .collect();
    Ok(json!({
        "result": {
            "subject_id": peers.subject_id,
            "cell": key.to_string(),
            "subject_total": peers.subject_total,
            "peer_count": peers.len(),
            "peer_total": peers.peer_total(),
            "members": members,
        },
        "warnings": warnings,
    }))
}

type Loaded = (Vec<CellRow>, Option<Vec<MetricDefinition>>, AnalysisConfig);

fn load(args: &PeersArgs) -> Result<Loaded, Box<dyn std::error::Error>> {
    if let Some(ref path) = args.input {
        let inp: fair_lending_core::AnalysisInput = input::file::read_json(path)?;
        return Ok((inp.cells, inp.metrics, inp.config));
    }
    if let Some(ref path) = args.cells {
        return Ok((input::cells_csv::read_cells(path)?, None, AnalysisConfig::default()));
    }
    match input::stdin::read_stdin::<fair_lending_core::AnalysisInput>()? {
        Some(inp) => Ok((inp.cells, inp.metrics, inp.config)),
        None => Err("--input or --cells is required (or pipe a JSON AnalysisInput on stdin)".into()),
    }
}
