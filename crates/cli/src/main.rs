mod logging;
mod simulate;
mod stats;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use seedlab_engine::{LabConfig, Role};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Role the simulated user acts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RoleArg {
    Analyst,
    Administrator,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Analyst => Role::Analyst,
            RoleArg::Administrator => Role::Administrator,
        }
    }
}

/// Seed-testing laboratory tooling.
#[derive(Parser)]
#[command(name = "seedlab", version, about = "Seed-testing laboratory tooling")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Path to a seedlab TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a list of 100-seed weights (grams)
    Stats {
        /// Weights in grams
        #[arg(required = true, allow_negative_numbers = true)]
        weights: Vec<Decimal>,
    },

    /// Run weights through thousand-seed-weight intake and report the result
    Pms {
        /// Replicates expected per batch
        #[arg(long, default_value_t = 8)]
        per_batch: u32,
        /// Apply the looser variability threshold for fluffy seed
        #[arg(long)]
        fluffy: bool,
        /// Operator-confirmed rounded thousand-seed weight
        #[arg(long)]
        rounded: Option<Decimal>,
        /// Finalize the analysis after intake
        #[arg(long)]
        finalize: bool,
        /// Role of the acting user
        #[arg(long, default_value = "analyst", value_enum)]
        role: RoleArg,
        /// Weights in grams, in weighing order
        #[arg(required = true, allow_negative_numbers = true)]
        weights: Vec<Decimal>,
    },

    /// Print the effective configuration
    Config,
}

fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.output, cli.quiet);
    logging::init_logging(&config.logging);

    match cli.command {
        Commands::Stats { weights } => {
            stats::cmd_stats(&weights, cli.output, cli.quiet);
        }
        Commands::Pms {
            per_batch,
            fluffy,
            rounded,
            finalize,
            role,
            weights,
        } => {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    report_error(
                        &format!("failed to start runtime: {}", e),
                        cli.output,
                        cli.quiet,
                    );
                    process::exit(1);
                }
            };
            let request = simulate::PmsRun {
                per_batch,
                fluffy,
                rounded,
                finalize,
                role: role.into(),
                weights,
            };
            runtime.block_on(simulate::cmd_pms(request, &config, cli.output, cli.quiet));
        }
        Commands::Config => {
            cmd_config(&config, cli.output, cli.quiet);
        }
    }
}

/// Load the configuration file if one was given, defaults otherwise.
fn load_config(path: Option<&Path>, output: OutputFormat, quiet: bool) -> LabConfig {
    let Some(path) = path else {
        return LabConfig::default();
    };
    match LabConfig::load(path) {
        Ok(config) => config,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

fn cmd_config(config: &LabConfig, output: OutputFormat, quiet: bool) {
    let rendered = match output {
        OutputFormat::Text => toml::to_string_pretty(config).map_err(|e| e.to_string()),
        OutputFormat::Json => serde_json::to_string_pretty(config).map_err(|e| e.to_string()),
    };
    match rendered {
        Ok(text) => println!("{}", text.trim_end()),
        Err(e) => {
            report_error(&format!("error rendering configuration: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
