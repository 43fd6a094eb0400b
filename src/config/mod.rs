//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//! A run's configuration comes from an optional TOML file with CLI flags
//! layered on top (CLI takes precedence).

pub mod cli;
pub mod toml;
pub mod validator;

use crate::engine::EngineType;
use crate::matrix::generate::GenerateConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Complete run configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Input file (read by the coordinator only)
    pub input: Option<PathBuf>,
    /// Convolution engine
    #[serde(default)]
    pub engine: EngineType,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Input generation settings (generate mode)
    pub generate: Option<GenerateConfig>,
}

/// Local convolution stage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Upper bound on worker threads per process
    ///
    /// `None` runs one worker per local target.
    pub threads: Option<usize>,
}

/// Output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    /// Report elapsed wall-clock time
    #[serde(default)]
    pub timing: bool,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Four lines: minimum, maximum, median, floored mean
    #[default]
    Text,
    /// One JSON object
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Process topology configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Number of ranks in standalone mode
    #[serde(default = "default_processes")]
    pub processes: usize,
    /// Worker node addresses in rank order (coordinator mode)
    #[serde(default)]
    pub nodes: Vec<String>,
    /// Port a node service listens on
    #[serde(default = "default_port")]
    pub listen_port: u16,
    /// Port appended to node addresses given without one
    #[serde(default = "default_port")]
    pub node_port: u16,
}

fn default_processes() -> usize {
    1
}

fn default_port() -> u16 {
    9999
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            processes: default_processes(),
            nodes: Vec::new(),
            listen_port: default_port(),
            node_port: default_port(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (overridden by `RUST_LOG`)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
