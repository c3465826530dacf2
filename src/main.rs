//! blockwal - inspect and append to a block-structured write-ahead log

use anyhow::{Context, Result};
use blockwal::config::LogConfig;
use clap::{Parser as ClapParser, Subcommand};
use std::path::PathBuf;

/// blockwal - a block-structured write-ahead log
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory
    #[arg(short = 'D', long)]
    data_dir: Option<PathBuf>,

    /// Log file name inside the data directory
    #[arg(short, long)]
    log_file: Option<String>,

    /// Block size in bytes; must match the existing log
    #[arg(short, long)]
    block_size: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Append records and flush them
    Append {
        #[arg(required = true)]
        records: Vec<String>,
    },
    /// Print every record, newest first
    Dump,
    /// Force a checkpoint
    Checkpoint,
    /// Show log statistics
    Stats,
}

impl Args {
    fn config(&self) -> LogConfig {
        let defaults = LogConfig::default();
        LogConfig {
            data_dir: self.data_dir.clone().unwrap_or(defaults.data_dir),
            log_file: self.log_file.clone().unwrap_or(defaults.log_file),
            block_size: self.block_size.unwrap_or(defaults.block_size),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = args.config();
    let log = config.open_log().with_context(|| {
        format!(
            "Failed to open log {} in {:?}",
            config.log_file, config.data_dir
        )
    })?;

    match args.command {
        Command::Append { records } => {
            for record in &records {
                let lsn = log
                    .append(record.as_bytes())
                    .with_context(|| format!("Failed to append {:?}", record))?;
                println!("{}", lsn);
            }
            log.flush().context("Failed to flush log")?;
        }
        Command::Dump => {
            for record in log.iterator().context("Failed to read log")? {
                let record = record.context("Failed to read log record")?;
                println!("{}", String::from_utf8_lossy(&record));
            }
        }
        Command::Checkpoint => {
            let lsn = log.checkpoint().context("Checkpoint failed")?;
            println!("Checkpoint durable through {}", lsn);
        }
        Command::Stats => {
            println!("Log file:      {}", log.log_file());
            println!("Block size:    {}", log.block_size());
            println!("Blocks:        {}", log.log_size());
            println!("Current block: {}", log.current_block());
            println!("Latest LSN:    {}", log.latest_lsn());
        }
    }

    Ok(())
}
