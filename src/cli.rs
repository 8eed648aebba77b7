// src/cli.rs

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Watch working trees and checkpoint them into version control when a
/// configured rule fires.
#[derive(Debug, Clone, Parser)]
#[command(name = "savepoint", version, long_about = None)]
pub struct CliArgs {
    /// Config file (TOML) listing the repositories to watch.
    #[arg(
        short,
        long,
        value_name = "PATH",
        env = "SAVEPOINT_CONFIG",
        default_value = "Savepoint.toml"
    )]
    pub config: PathBuf,

    /// Overrides `SAVEPOINT_LOG`.
    #[arg(short, long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate the config and print the repositories without watching anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Append every notification as one JSON object per line to this file.
    #[arg(long, value_name = "PATH")]
    pub event_log: Option<PathBuf>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// `EnvFilter` directive for this level.
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}
