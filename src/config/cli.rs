//! CLI argument parsing using clap

use crate::config::OutputFormat;
use crate::engine::EngineType;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Standalone mode (default) - every rank in this process
    Standalone,
    /// Coordinator mode - rank 0, drives remote node services
    Coordinator,
    /// Service mode - worker node (accepts coordinator connections)
    Service,
    /// Generate mode - write a random input file
    Generate,
}

/// Engine selection on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliEngineType {
    /// Valid convolution
    Direct,
    /// Identity transform; metrics are the targets' own data ranges
    Mock,
}

impl From<CliEngineType> for EngineType {
    fn from(engine: CliEngineType) -> Self {
        match engine {
            CliEngineType::Direct => EngineType::Direct,
            CliEngineType::Mock => EngineType::Mock,
        }
    }
}

/// Output format on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliOutputFormat {
    Text,
    Json,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Text => OutputFormat::Text,
            CliOutputFormat::Json => OutputFormat::Json,
        }
    }
}

/// convstat - distributed convolution with data-range statistics
#[derive(Parser, Debug)]
#[command(name = "convstat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode: standalone, coordinator, service, or generate
    #[arg(long, value_enum, default_value = "standalone")]
    pub mode: ExecutionMode,

    /// Input file (standalone/coordinator) or file to write (generate)
    #[arg(value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// TOML configuration file (CLI flags take precedence)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    // === Topology Options ===
    /// Number of ranks to run in standalone mode
    #[arg(short = 'p', long)]
    pub processes: Option<usize>,

    /// Comma-separated node addresses in rank order (coordinator mode)
    #[arg(long)]
    pub host_list: Option<String>,

    /// File containing node addresses, one per line (coordinator mode)
    #[arg(long)]
    pub clients_file: Option<PathBuf>,

    /// Port appended to node addresses given without one
    #[arg(long)]
    pub node_port: Option<u16>,

    /// Port for the node service to listen on (service mode)
    #[arg(long)]
    pub listen_port: Option<u16>,

    // === Execution Options ===
    /// Maximum worker threads per process (default: one per local target)
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Convolution engine: direct, or mock (identity, for pipeline checks)
    #[arg(long, value_enum)]
    pub engine: Option<CliEngineType>,

    // === Output Options ===
    /// Output format
    #[arg(short = 'o', long, value_enum)]
    pub output: Option<CliOutputFormat>,

    /// Report elapsed wall-clock time after the summary
    #[arg(long)]
    pub timing: bool,

    /// Log filter (e.g. warn, info, convstat=debug); RUST_LOG overrides
    #[arg(long, env = "CONVSTAT_LOG")]
    pub log_level: Option<String>,

    // === Generate Options ===
    /// Kernel rows (generate mode)
    #[arg(long)]
    pub kernel_rows: Option<usize>,

    /// Kernel columns (generate mode)
    #[arg(long)]
    pub kernel_cols: Option<usize>,

    /// Target rows (generate mode)
    #[arg(long)]
    pub target_rows: Option<usize>,

    /// Target columns (generate mode)
    #[arg(long)]
    pub target_cols: Option<usize>,

    /// Number of targets (generate mode)
    #[arg(short = 'n', long)]
    pub num_targets: Option<usize>,

    /// Smallest generated value (generate mode)
    #[arg(long, allow_hyphen_values = true)]
    pub min_value: Option<i64>,

    /// Largest generated value (generate mode)
    #[arg(long, allow_hyphen_values = true)]
    pub max_value: Option<i64>,

    /// Random seed (generate mode)
    #[arg(long)]
    pub seed: Option<u64>,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Whether any generate option was given
    pub fn has_generate_options(&self) -> bool {
        self.kernel_rows.is_some()
            || self.kernel_cols.is_some()
            || self.target_rows.is_some()
            || self.target_cols.is_some()
            || self.num_targets.is_some()
            || self.min_value.is_some()
            || self.max_value.is_some()
            || self.seed.is_some()
    }

    /// Validate CLI arguments that do not depend on a config file
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.host_list.is_some() && self.clients_file.is_some() {
            anyhow::bail!("--host-list and --clients-file are mutually exclusive");
        }
        if self.mode != ExecutionMode::Coordinator && (self.host_list.is_some() || self.clients_file.is_some()) {
            anyhow::bail!("--host-list/--clients-file are only valid in coordinator mode");
        }
        if self.mode != ExecutionMode::Generate && self.has_generate_options() {
            anyhow::bail!("Generate options require --mode generate");
        }
        Ok(())
    }
}

/// Normalize node addresses, appending `default_port` where missing
///
/// Blank entries and `#` comments are skipped.
pub fn parse_node_list<'a>(entries: impl IntoIterator<Item = &'a str>, default_port: u16) -> Vec<String> {
    entries
        .into_iter()
        .map(str::trim)
        .filter(|addr| !addr.is_empty() && !addr.starts_with('#'))
        .map(|addr| {
            if addr.contains(':') {
                addr.to_string()
            } else {
                format!("{}:{}", addr, default_port)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["convstat", "input.txt"]);
        assert_eq!(cli.mode, ExecutionMode::Standalone);
        assert_eq!(cli.path, Some(PathBuf::from("input.txt")));
        assert!(cli.processes.is_none());
        assert!(!cli.timing);
        cli.validate().unwrap();
    }

    #[test]
    fn test_coordinator_args() {
        let cli = Cli::parse_from([
            "convstat",
            "--mode",
            "coordinator",
            "--host-list",
            "10.0.1.10,10.0.1.11:7000",
            "-t",
            "4",
            "--timing",
            "input.txt",
        ]);
        assert_eq!(cli.mode, ExecutionMode::Coordinator);
        assert_eq!(cli.threads, Some(4));
        assert!(cli.timing);
        cli.validate().unwrap();
    }

    #[test]
    fn test_engine_selection() {
        let cli = Cli::parse_from(["convstat", "--engine", "mock", "input.txt"]);
        assert_eq!(cli.engine.map(EngineType::from), Some(EngineType::Mock));

        let cli = Cli::parse_from(["convstat", "--engine", "direct", "input.txt"]);
        assert_eq!(cli.engine.map(EngineType::from), Some(EngineType::Direct));

        assert!(Cli::try_parse_from(["convstat", "--engine", "fft", "input.txt"]).is_err());
    }

    #[test]
    fn test_host_list_outside_coordinator_rejected() {
        let cli = Cli::parse_from(["convstat", "--host-list", "a,b", "input.txt"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_generate_args() {
        let cli = Cli::parse_from([
            "convstat",
            "--mode",
            "generate",
            "--num-targets",
            "100",
            "--min-value",
            "-5",
            "out.txt",
        ]);
        assert!(cli.has_generate_options());
        assert_eq!(cli.min_value, Some(-5));
        cli.validate().unwrap();

        let cli = Cli::parse_from(["convstat", "--seed", "3", "input.txt"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_parse_node_list() {
        let nodes = parse_node_list("10.0.1.10, 10.0.1.11:7000,,".split(','), 9999);
        assert_eq!(nodes, vec!["10.0.1.10:9999", "10.0.1.11:7000"]);

        let file = "# rack 1\nhost-a\n\nhost-b:8000\n";
        assert_eq!(
            parse_node_list(file.lines(), 1234),
            vec!["host-a:1234", "host-b:8000"]
        );
    }
}
