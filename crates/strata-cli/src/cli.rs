use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

/// Log level options for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "strata")]
#[command(about = "strata - translate GraphQL-style request documents into SQL")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Set log level (off, error, warn, info, debug, trace).
    /// If not specified, uses the config file's [logging] level
    #[arg(short = 'l', long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Shortcut for --log-level=debug
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path
    #[arg(short = 'C', long, global = true, default_value = "strata.toml")]
    pub config: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Execute a request document and print the response envelope
    Run {
        /// Request document file
        request: PathBuf,

        /// JSON file with request variables
        #[arg(long)]
        vars: Option<PathBuf>,

        /// Run every mutation in one shared transaction
        #[arg(long)]
        single_txn: bool,
    },

    /// Print the SQL each field would run, without executing it
    Compile {
        request: PathBuf,

        #[arg(long)]
        vars: Option<PathBuf>,
    },

    /// Print the active schema and joins of the data sources
    Introspect {
        /// Only this data source
        #[arg(long)]
        source: Option<String>,
    },
}

impl Cli {
    /// Level from the flags, if any was given
    pub fn level_override(&self) -> Option<LevelFilter> {
        if self.verbose {
            return Some(LevelFilter::DEBUG);
        }
        self.log_level.map(LevelFilter::from)
    }
}
