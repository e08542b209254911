// pcorr - golden values and pairwise correlations across configuration snapshots

mod commands;
mod exit_codes;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{ConfigArgs, LayoutArgs, ThresholdArgs};
use exit_codes::{input_exit_code, EXIT_CONFIG, EXIT_ERROR, EXIT_OUTPUT, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "pcorr")]
#[command(about = "Pivot multi-instance configuration data and mine golden values and correlations")]
#[command(long_version = long_version())]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    /// More log output on stderr (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fold a raw batch into a persisted pivot table
    #[command(after_help = "\
Examples:
  pcorr accumulate export.csv --pivot corr_data_weekly.csv --key 1 --data 3 --instance 2
  pcorr accumulate export.csv --pivot corr_data_weekly.csv --config pcorr.toml
  pcorr accumulate export.txt --pivot corr_data_weekly.csv -c pcorr.toml --delimiter ';'")]
    Accumulate {
        /// Raw batch CSV (header row first)
        input: PathBuf,

        /// Pivot table to create or extend
        #[arg(long, short = 'p')]
        pivot: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,

        #[command(flatten)]
        layout: LayoutArgs,

        /// Field delimiter (default: sniffed from the first lines)
        #[arg(long, short = 'd')]
        delimiter: Option<char>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Mine golden values and relations from a pivot table
    #[command(after_help = "\
Examples:
  pcorr mine corr_data_weekly.csv
  pcorr mine corr_data_weekly.csv --out-dir results/ --json
  pcorr mine corr_data_weekly.csv --cat-thresh 0.4 --min-corr 0.8 --workers 4")]
    Mine {
        /// Pivot table written by `accumulate` or `run`
        pivot: PathBuf,

        /// Directory for golden_<tag>.csv and correlations_<tag>.csv
        /// (default: next to the pivot)
        #[arg(long, short = 'o')]
        out_dir: Option<PathBuf>,

        /// Output tag (default: from the pivot file name)
        #[arg(long)]
        tag: Option<String>,

        #[command(flatten)]
        config: ConfigArgs,

        #[command(flatten)]
        thresholds: ThresholdArgs,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Accumulate a batch, mine it, and optionally archive the outputs
    #[command(after_help = "\
Examples:
  pcorr run export.csv --key 1 --data 3 --instance 2
  pcorr run export.csv -c pcorr.toml --dir out/ --tag weekly --archive
  pcorr run export.csv -c pcorr.toml --json")]
    Run {
        /// Raw batch CSV (header row first)
        input: PathBuf,

        /// Working directory for the pivot and result tables
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Run tag used in output file names (default: current Unix time)
        #[arg(long)]
        tag: Option<String>,

        #[command(flatten)]
        config: ConfigArgs,

        #[command(flatten)]
        layout: LayoutArgs,

        #[command(flatten)]
        thresholds: ThresholdArgs,

        /// Field delimiter (default: sniffed from the first lines)
        #[arg(long, short = 'd')]
        delimiter: Option<char>,

        /// Zip the pivot and result tables into correlation_data_<tag>.zip
        #[arg(long)]
        archive: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Split a flat export into one CSV per key tuple
    #[command(after_help = "\
Examples:
  pcorr split export.csv --key 0 --out per-site/
  pcorr split export.csv --key 0,1 --out per-node/ --json")]
    Split {
        /// Export CSV (header row first)
        input: PathBuf,

        /// Positions forming the partition key (comma separated)
        #[arg(long = "key", value_delimiter = ',', required = true)]
        key_fields: Vec<usize>,

        /// Output directory (created if needed)
        #[arg(long, short = 'o')]
        out: PathBuf,

        /// Field delimiter (default: sniffed from the first lines)
        #[arg(long, short = 'd')]
        delimiter: Option<char>,

        /// Print the written files as JSON
        #[arg(long)]
        json: bool,
    },
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  pcorr-mining ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  pcorr-mining ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
        )
    }
}

/// Log to stderr. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("pcorr={level},pcorr_mining={level},pcorr_io={level}"))
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        None => {
            // No subcommand = show help
            eprintln!("Usage: pcorr <command> [options]");
            eprintln!("       pcorr --help for more information");
            Ok(())
        }
        Some(Commands::Accumulate { input, pivot, config, layout, delimiter, json }) => {
            commands::cmd_accumulate(input, pivot, config, layout, delimiter, json)
        }
        Some(Commands::Mine { pivot, out_dir, tag, config, thresholds, json }) => {
            commands::cmd_mine(pivot, out_dir, tag, config, thresholds, json)
        }
        Some(Commands::Run {
            input,
            dir,
            tag,
            config,
            layout,
            thresholds,
            delimiter,
            archive,
            json,
        }) => commands::cmd_run(
            input, dir, tag, config, layout, thresholds, delimiter, archive, json,
        ),
        Some(Commands::Split { input, key_fields, out, delimiter, json }) => {
            commands::cmd_split(input, key_fields, out, delimiter, json)
        }
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn general(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_CONFIG, message: msg.into(), hint: None }
    }

    /// Engine error raised while reading inputs or mining.
    pub fn input(err: pcorr_mining::MiningError) -> Self {
        Self { code: input_exit_code(&err), message: err.to_string(), hint: None }
    }

    /// Engine error raised while writing, replacing or archiving outputs.
    pub fn output(err: pcorr_mining::MiningError) -> Self {
        Self::output_msg(err.to_string())
    }

    pub fn output_msg(msg: impl Into<String>) -> Self {
        Self { code: EXIT_OUTPUT, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
