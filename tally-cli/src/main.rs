use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tally_ingest::StatementFormat;
use tracing_subscriber::EnvFilter;

mod config;
mod dispatch;
mod render;
mod state;

use config::OutputFormat;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("TALLY_BUILD_SHA"), ")");

#[derive(Parser, Debug)]
#[command(name = "tally", version = VERSION, about = "Normalize bank statements into one transaction list")]
struct Cli {
    /// Log dispatch decisions (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the statement formats that can be parsed
    Formats,

    /// Parse a statement and print its lines
    Parse {
        /// Statement file (.csv or .ofx)
        path: PathBuf,

        /// Format key (see `tally formats`); defaults to config, then to the file name
        #[arg(long, value_parser = parse_format_key)]
        format: Option<StatementFormat>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Manage ~/.tally/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default config if none exists
    Init,

    /// Print the effective config
    Show,
}

fn parse_format_key(key: &str) -> Result<StatementFormat, String> {
    StatementFormat::from_key(key).ok_or_else(|| {
        let keys: Vec<_> = StatementFormat::ALL.iter().map(|f| f.key()).collect();
        format!("unknown format '{key}' (expected one of: {})", keys.join(", "))
    })
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("initialize logging: {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Command::Formats => {
            for format in StatementFormat::ALL {
                println!("{:<12} {:<6} {}", format.key(), format.glob(), format.label());
            }
        }

        Command::Parse { path, format, json } => {
            let cfg = config::load_config()?;
            let chosen = format.or(cfg.parse.default_format);
            let (format, statement) = dispatch::parse_statement(&path, chosen)?;

            if json || cfg.output.format == OutputFormat::Json {
                println!("{}", render::render_json(&statement)?);
            } else {
                print!("{}", render::render_table(format, &statement));
            }
        }

        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => {
                println!("# {}", config::config_path()?.display());
                print!("{}", config::render_config(&config::load_config()?)?);
            }
        },
    }

    Ok(())
}
