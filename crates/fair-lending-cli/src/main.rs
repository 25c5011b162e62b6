mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::analyze::AnalyzeArgs;
use commands::metrics::MetricsArgs;
use commands::peers::PeersArgs;
use commands::significance::SignificanceArgs;

/// Peer-matched fair-lending gap analysis
#[derive(Parser)]
#[command(
    name = "flx",
    version,
    about = "Peer-matched fair-lending gap analysis and lender ranking",
    long_about = "Compares each lender's lending shares against a volume-matched peer \
                  group, tests the gaps for significance, scores persistent \
                  underperformance and ranks the worst lenders. Reads a JSON \
                  analysis input or a CSV cell table."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Increase log verbosity on stderr (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full peer comparison, scoring and selection pipeline
    Analyze(AnalyzeArgs),
    /// Show the volume-matched peer set of one lender in one cell
    Peers(PeersArgs),
    /// Test one subject vs peer proportion pair for significance
    Significance(SignificanceArgs),
    /// List the registered lending metrics
    Metrics(MetricsArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Analyze(args) => commands::analyze::run_analyze(args),
        Commands::Peers(args) => commands::peers::run_peers(args),
        Commands::Significance(args) => commands::significance::run_significance(args),
        Commands::Metrics(args) => commands::metrics::run_metrics(args),
        Commands::Version => {
            println!("flx {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
