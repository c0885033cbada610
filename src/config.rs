//! Runtime settings from command-line flags and environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Log verbosity accepted by `--log-level` / `LOG_LEVEL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "study-roulette")]
#[command(about = "Redirects visitors to weighted studies, pinning each parameter set to one study")]
pub struct Settings {
    /// Directory holding one assignment record per fingerprint.
    #[arg(long, env = "LOOKUP_DIR")]
    pub lookup_dir: PathBuf,

    /// TOML file listing the studies.
    #[arg(long, env = "STUDIES_FILE")]
    pub studies_file: PathBuf,

    #[arg(long, env = "LOG_LEVEL", value_enum, ignore_case = true, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    #[arg(long, env = "LISTEN", default_value = "127.0.0.1:8000")]
    pub listen: SocketAddr,
}
