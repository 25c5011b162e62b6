use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use serde_json::{json, Value};

use fair_lending_core::config::AnalysisConfig;
use fair_lending_core::metrics::registry::MetricDefinition;
use fair_lending_core::pipeline::AnalysisOutput;
use fair_lending_core::{run_analysis, AnalysisInput, ComputationOutput};

use crate::input;

/// Which slice of the analysis output to print
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum AnalyzeView {
    /// The whole output envelope
    #[default]
    Full,
    /// Ranked list of selected lenders
    Ranking,
    /// Shares table of one selected lender (see --entity)
    Shares,
    /// Gap-ratio table of one selected lender (see --entity)
    Ratios,
    /// Run summary and skip counts
    Summary,
}

/// Arguments for the full analysis pipeline
#[derive(Args)]
pub struct AnalyzeArgs {
    /// Path to a JSON AnalysisInput (cells, entities, config, metrics)
    #[arg(long)]
    pub input: Option<String>,

    /// Path to a CSV cell table (used when --input is absent)
    #[arg(long)]
    pub cells: Option<String>,

    /// Path to a CSV entity table: entity_id, display_name, category_tag
    #[arg(long)]
    pub entities: Option<String>,

    /// Path to a JSON or YAML AnalysisConfig
    #[arg(long)]
    pub config: Option<String>,

    /// Path to a JSON or YAML list of metric definitions; with --cells the
    /// default is the CSV's own metric columns
    #[arg(long)]
    pub metrics: Option<String>,

    /// Maximum number of ranked lenders
    #[arg(long)]
    pub max_results: Option<usize>,

    /// Minimum gap ratio for a metric/cell pair to count
    #[arg(long)]
    pub gap_ratio_threshold: Option<Decimal>,

    /// Significance level for the proportion test
    #[arg(long)]
    pub alpha: Option<f64>,

    /// Always list this lender (repeatable)
    #[arg(long = "include")]
    pub include: Vec<String>,

    /// Never list this lender (repeatable)
    #[arg(long = "exclude")]
    pub exclude: Vec<String>,

    /// Slice of the output to print
    #[arg(long, value_enum, default_value = "full")]
    pub view: AnalyzeView,

    /// Lender for the shares/ratios views; defaults to rank 1
    #[arg(long)]
    pub entity: Option<String>,
}

pub fn run_analyze(args: AnalyzeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut analysis_input: AnalysisInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(ref path) = args.cells {
        from_csv(path, &args)?
    } else if let Some(data) = input::stdin::read_stdin::<AnalysisInput>()? {
        data
    } else {
        return Err("--input or --cells is required (or pipe a JSON AnalysisInput on stdin)".into());
    };

    // The CSV path has already read these.
    if args.input.is_some() || args.cells.is_none() {
        if let Some(ref path) = args.config {
            analysis_input.config = input::file::read_structured(path)?;
        }
        if let Some(ref path) = args.metrics {
            analysis_input.metrics = Some(input::file::read_structured(path)?);
        }
    }
    apply_overrides(&mut analysis_input.config, &args);

    tracing::info!(
        rows = analysis_input.cells.len(),
        entities = analysis_input.entities.len(),
        "running analysis"
    );
    let output = run_analysis(&analysis_input)?;
    render_view(output, args.view, args.entity.as_deref())
}

fn from_csv(path: &str, args: &AnalyzeArgs) -> Result<AnalysisInput, Box<dyn std::error::Error>> {
    let cells = input::cells_csv::read_cells(path)?;
    let entities = match args.entities {
        Some(ref p) => input::cells_csv::read_entities(p)?,
        None => Vec::new(),
    };
    let config: AnalysisConfig = match args.config {
        Some(ref p) => input::file::read_structured(p)?,
        None => AnalysisConfig::default(),
    };
    let metrics: Vec<MetricDefinition> = match args.metrics {
        Some(ref p) => input::file::read_structured(p)?,
        None => input::cells_csv::metrics_from_rows(&cells)?,
    };
    Ok(AnalysisInput {
        metrics: Some(metrics),
        cells,
        entities,
        config,
    })
}

/// Flags win over file config.
fn apply_overrides(config: &mut AnalysisConfig, args: &AnalyzeArgs) {
    if let Some(n) = args.max_results {
        config.max_results = n;
    }
    if let Some(t) = args.gap_ratio_threshold {
        config.gap_ratio_threshold = t;
    }
    if let Some(a) = args.alpha {
        config.significance_alpha = a;
    }
    config.forced_include_ids.extend(args.include.iter().cloned());
    config.forced_exclude_ids.extend(args.exclude.iter().cloned());
}

fn render_view(
    output: ComputationOutput<AnalysisOutput>,
    view: AnalyzeView,
    entity: Option<&str>,
) -> Result<Value, Box<dyn std::error::Error>> {
    let warnings = output.warnings.clone();
    let methodology = output.methodology.clone();
    let result = &output.result;

    let mut value = match view {
        AnalyzeView::Full => return Ok(serde_json::to_value(&output)?),
        AnalyzeView::Ranking => json!({
            "results": serde_json::to_value(&result.selection.entries)?,
        }),
        AnalyzeView::Summary => json!({
            "result": serde_json::to_value(&result.summary)?,
        }),
        AnalyzeView::Shares | AnalyzeView::Ratios => {
            let report = match entity {
                Some(id) => result
                    .reports
                    .iter()
                    .find(|r| r.entity_id == id)
                    .ok_or_else(|| format!("lender '{id}' is not in the ranked list"))?,
                None => result
                    .reports
                    .first()
                    .ok_or("no lender was selected; nothing to show")?,
            };
            let rows = if matches!(view, AnalyzeView::Shares) {
                serde_json::to_value(&report.shares_table)?
            } else {
                serde_json::to_value(&report.ratio_table)?
            };
            json!({
                "entity_id": report.entity_id,
                "display_name": report.display_name,
                "results": rows,
            })
        }
    };

    if let Value::Object(ref mut map) = value {
        map.insert("warnings".into(), json!(warnings));
        map.insert("methodology".into(), json!(methodology));
    }
    Ok(value)
}
