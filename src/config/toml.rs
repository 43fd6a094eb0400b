//! TOML configuration file parsing

use super::*;
use crate::config::cli::{parse_node_list, Cli};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents).context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Build the run configuration from CLI arguments and the optional config file
pub fn build_config(cli: &Cli) -> Result<Config> {
    let config = match cli.config {
        Some(ref path) => parse_toml_file(path)?,
        None => Config::default(),
    };
    merge_cli_with_config(cli, config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Result<Config> {
    if let Some(ref path) = cli.path {
        config.input = Some(path.clone());
    }
    if let Some(engine) = cli.engine {
        config.engine = engine.into();
    }

    // Workers
    if let Some(threads) = cli.threads {
        config.workers.threads = Some(threads);
    }

    // Output
    if let Some(format) = cli.output {
        config.output.format = format.into();
    }
    if cli.timing {
        config.output.timing = true;
    }
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }

    // Topology
    if let Some(processes) = cli.processes {
        config.cluster.processes = processes;
    }
    if let Some(port) = cli.listen_port {
        config.cluster.listen_port = port;
    }
    if let Some(port) = cli.node_port {
        config.cluster.node_port = port;
    }
    let node_port = config.cluster.node_port;
    if let Some(ref host_list) = cli.host_list {
        config.cluster.nodes = parse_node_list(host_list.split(','), node_port);
    } else if let Some(ref clients_file) = cli.clients_file {
        let content = fs::read_to_string(clients_file)
            .with_context(|| format!("Failed to read clients file: {}", clients_file.display()))?;
        config.cluster.nodes = parse_node_list(content.lines(), node_port);
    } else {
        // Addresses from the config file may also omit the port
        let nodes = std::mem::take(&mut config.cluster.nodes);
        config.cluster.nodes = parse_node_list(nodes.iter().map(String::as_str), node_port);
    }

    // Generation
    if cli.has_generate_options() {
        let mut generate = config.generate.take().unwrap_or_default();
        if let Some(rows) = cli.kernel_rows {
            generate.kernel_shape.rows = rows;
        }
        if let Some(cols) = cli.kernel_cols {
            generate.kernel_shape.cols = cols;
        }
        if let Some(rows) = cli.target_rows {
            generate.target_shape.rows = rows;
        }
        if let Some(cols) = cli.target_cols {
            generate.target_shape.cols = cols;
        }
        if let Some(n) = cli.num_targets {
            generate.num_targets = n;
        }
        if let Some(min) = cli.min_value {
            generate.min_value = min;
        }
        if let Some(max) = cli.max_value {
            generate.max_value = max;
        }
        if let Some(seed) = cli.seed {
            generate.seed = seed;
        }
        config.generate = Some(generate);
    }

    Ok(config)
}
