//! convstat CLI entry point

use anyhow::{Context, Result};
use convstat::config::cli::{Cli, ExecutionMode};
use convstat::config::toml::build_config;
use convstat::config::validator::validate_config;
use convstat::config::Config;
use convstat::distributed::{DistributedCoordinator, LocalCluster, NodeService, RunReport};
use convstat::engine::create_engine;
use convstat::matrix::generate::write_input_file;
use std::sync::Arc;
use std::time::Instant;

fn main() -> Result<()> {
    let main_start = Instant::now();

    let cli = Cli::parse_args();
    cli.validate()?;

    let config = build_config(&cli)?;
    validate_config(&config, cli.mode).context("Configuration validation failed")?;
    convstat::util::logging::init_logging(&config.logging.level)?;

    tracing::debug!(mode = ?cli.mode, "convstat v{}", env!("CARGO_PKG_VERSION"));

    // Handle different execution modes
    match cli.mode {
        ExecutionMode::Standalone => run_standalone(config, main_start),
        ExecutionMode::Coordinator => run_coordinator(config, main_start),
        ExecutionMode::Service => run_service(config),
        ExecutionMode::Generate => run_generate(config),
    }
}

/// Run every rank inside this process
fn run_standalone(config: Config, main_start: Instant) -> Result<()> {
    let config = Arc::new(config);
    let engine = create_engine(config.engine);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let report = runtime.block_on(async { LocalCluster::new(config.clone(), engine).run().await })?;

    print_report(&report, &config, main_start)
}

/// Run as rank 0 against remote node services
fn run_coordinator(config: Config, main_start: Instant) -> Result<()> {
    let config = Arc::new(config);
    let engine = create_engine(config.engine);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let report = runtime.block_on(async {
        let coordinator = DistributedCoordinator::new(config.clone(), engine);
        let comm = coordinator
            .connect(&config.cluster.nodes)
            .await
            .context("Failed to establish the process group")?;
        coordinator.run(comm).await
    })?;

    print_report(&report, &config, main_start)
}

/// Serve runs as a worker node
fn run_service(config: Config) -> Result<()> {
    let engine = create_engine(config.engine);

    // Service mode uses tokio runtime
    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    runtime.block_on(async {
        let service = NodeService::new(config.cluster.listen_port, engine, config.workers.threads)
            .context("Failed to create node service")?;

        service.run().await
    })
}

/// Write a random input file
fn run_generate(config: Config) -> Result<()> {
    let path = config.input.as_ref().context("Generate mode requires an output path")?;
    let generate = config.generate.clone().unwrap_or_default();

    write_input_file(&generate, path)?;
    tracing::info!(
        path = %path.display(),
        kernel = %generate.kernel_shape,
        target = %generate.target_shape,
        targets = generate.num_targets,
        seed = generate.seed,
        "Input written"
    );
    Ok(())
}

fn print_report(report: &RunReport, config: &Config, main_start: Instant) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    convstat::output::write_report(&mut out, report, config, main_start.elapsed())
}
