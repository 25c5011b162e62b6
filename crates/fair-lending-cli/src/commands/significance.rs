use clap::{Args, ValueEnum};
use serde_json::{json, Value};

use fair_lending_core::config::{AnalysisConfig, SignificanceMethod};
use fair_lending_core::significance::proportion_test::{self, Proportion};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MethodArg {
    ChiSquared,
    Z,
}

impl From<MethodArg> for SignificanceMethod {
    fn from(m: MethodArg) -> Self {
        match m {
            MethodArg::ChiSquared => SignificanceMethod::ChiSquared,
            MethodArg::Z => SignificanceMethod::TwoProportionZ,
        }
    }
}

/// Arguments for a one-off subject vs peer proportion test
#[derive(Args)]
pub struct SignificanceArgs {
    /// Subject loans meeting the metric
    #[arg(long)]
    pub subject_count: u64,

    /// Subject total loans
    #[arg(long)]
    pub subject_total: u64,

    /// Pooled peer loans meeting the metric
    #[arg(long)]
    pub peer_count: u64,

    /// Pooled peer total loans
    #[arg(long)]
    pub peer_total: u64,

    #[arg(long, value_enum, default_value = "chi-squared")]
    pub method: MethodArg,

    #[arg(long, default_value = "0.05")]
    pub alpha: f64,

    /// Disable the Yates continuity correction
    #[arg(long)]
    pub no_correction: bool,
}

pub fn run_significance(args: SignificanceArgs) -> Result<Value, Box<dyn std::error::Error>> {
    if args.subject_count > args.subject_total || args.peer_count > args.peer_total {
        return Err("count cannot exceed its total".into());
    }
    if !(args.alpha > 0.0 && args.alpha < 1.0) {
        return Err("--alpha must be in (0, 1)".into());
    }

    let config = AnalysisConfig {
        significance_alpha: args.alpha,
        significance_method: args.method.into(),
        continuity_correction: !args.no_correction,
        ..Default::default()
    };
    let subject = Proportion::new(args.subject_count, args.subject_total);
    let peer = Proportion::new(args.peer_count, args.peer_total);
    let outcome = proportion_test::assess(subject, peer, &config);

    let mut warnings = Vec::new();
    if let Some(reason) = outcome.skip {
        warnings.push(format!("test not run: {reason:?}"));
    }
    Ok(json!({
        "result": serde_json::to_value(&outcome)?,
        "warnings": warnings,
    }))
}
