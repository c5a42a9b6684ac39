mod commands;
mod summary;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "argus", about = "Transient detection pipeline for survey FITS images")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan, download, and process a night of observations
    Run(commands::run::RunArgs),
    /// Difference a single observation against a template
    Diff(commands::diff::DiffArgs),
    /// Detect transient candidates in an existing difference image
    Detect(commands::detect::DetectArgs),
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let outcome = match &cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Diff(args) => commands::diff::run(args).map(|()| 0),
        Commands::Detect(args) => commands::detect::run(args).map(|()| 0),
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}
