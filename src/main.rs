//! blockstore - inspect and exercise a storage engine data directory

use anyhow::{bail, Context, Result};
use blockstore::config::{StorageConfig, DEFAULT_LOG_FILE, DEFAULT_POOL_SIZE};
use blockstore::engine::StorageEngine;
use blockstore::storage::{LogValue, TieBreak, ValueKind, DEFAULT_BLOCK_SIZE};
use clap::{Parser as ClapParser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory
    #[arg(short = 'D', long, default_value = "./blockstore_data")]
    data_dir: PathBuf,

    /// Number of buffer pool frames
    #[arg(short, long, default_value_t = DEFAULT_POOL_SIZE)]
    pool_size: usize,

    /// Block size in bytes
    #[arg(short, long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Log file name inside the data directory
    #[arg(short, long, default_value = DEFAULT_LOG_FILE)]
    log_file: String,

    /// Ranking of eviction candidates accessed at least twice
    #[arg(long, value_enum, default_value_t = TieBreakArg::SecondLast)]
    tie_break: TieBreakArg,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Append one record to the log and print its LSN
    Append {
        /// Values as `i:<int>` or `s:<string>`; bare integers are ints,
        /// anything else a string
        #[arg(required = true)]
        values: Vec<String>,
    },
    /// Print log records, newest first
    Dump {
        /// Comma separated kinds (`i`/`s`) to decode each record with;
        /// without it the raw bytes are printed
        #[arg(short, long, value_delimiter = ',')]
        kinds: Vec<String>,
    },
    /// Print the state of every buffer pool frame
    Pool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TieBreakArg {
    SecondLast,
    Last,
}

impl From<TieBreakArg> for TieBreak {
    fn from(arg: TieBreakArg) -> Self {
        match arg {
            TieBreakArg::SecondLast => TieBreak::SecondLastAccess,
            TieBreakArg::Last => TieBreak::LastAccess,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = StorageConfig {
        data_dir: args.data_dir,
        block_size: args.block_size,
        pool_size: args.pool_size,
        log_file: args.log_file,
        tie_break: args.tie_break.into(),
    };
    let engine = StorageEngine::open(config).context("Failed to open storage engine")?;

    match args.command {
        Command::Append { values } => {
            let values = values
                .iter()
                .map(|v| parse_value(v))
                .collect::<Result<Vec<_>>>()?;
            let lsn = engine
                .log()
                .append(&values)
                .context("Failed to append log record")?;
            engine.log().flush(lsn).context("Failed to flush log")?;
            println!("{}", lsn);
        }
        Command::Dump { kinds } => {
            let kinds = kinds
                .iter()
                .map(|k| parse_kind(k))
                .collect::<Result<Vec<_>>>()?;
            for record in engine.log().iter().context("Failed to read log")? {
                let mut record = record?;
                if kinds.is_empty() {
                    println!("{} {:02x?}", record.lsn(), record.as_bytes());
                    continue;
                }
                let lsn = record.lsn();
                let values = record.decode(&kinds)?;
                let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
                println!("{} [{}]", lsn, rendered.join(", "));
            }
        }
        Command::Pool => {
            for frame in engine.buffer_pool().snapshot() {
                println!("{}", frame);
            }
            println!("available: {}", engine.buffer_pool().available());
        }
    }

    Ok(())
}

fn parse_value(raw: &str) -> Result<LogValue> {
    if let Some(v) = raw.strip_prefix("i:") {
        let v = v
            .parse::<i32>()
            .with_context(|| format!("Invalid integer value: {}", raw))?;
        return Ok(LogValue::Int(v));
    }
    if let Some(s) = raw.strip_prefix("s:") {
        return Ok(LogValue::from(s));
    }
    Ok(match raw.parse::<i32>() {
        Ok(v) => LogValue::Int(v),
        Err(_) => LogValue::from(raw),
    })
}

fn parse_kind(raw: &str) -> Result<ValueKind> {
    match raw {
        "i" | "int" => Ok(ValueKind::Int),
        "s" | "str" | "string" => Ok(ValueKind::Str),
        _ => bail!("Unknown value kind: {}", raw),
    }
}
