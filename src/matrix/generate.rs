//! Random input generation
//!
//! Writes a complete input file (kernel, metadata and targets) in the format
//! accepted by [`InputReader`](super::input::InputReader). Generation is
//! seeded so a given configuration always produces the same file.

use super::Shape;
use anyhow::{Context, Result};
use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Parameters for a generated input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateConfig {
    pub kernel_shape: Shape,
    pub target_shape: Shape,
    pub num_targets: usize,
    /// Smallest generated element (inclusive)
    #[serde(default = "default_min_value")]
    pub min_value: i64,
    /// Largest generated element (inclusive)
    #[serde(default = "default_max_value")]
    pub max_value: i64,
    #[serde(default)]
    pub seed: u64,
}

fn default_min_value() -> i64 {
    -10
}

fn default_max_value() -> i64 {
    10
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            kernel_shape: Shape::new(3, 3),
            target_shape: Shape::new(16, 16),
            num_targets: 32,
            min_value: default_min_value(),
            max_value: default_max_value(),
            seed: 0,
        }
    }
}

impl GenerateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.kernel_shape.is_empty() || self.target_shape.is_empty() {
            anyhow::bail!(
                "Generated matrices must have positive dimensions (kernel {}, target {})",
                self.kernel_shape,
                self.target_shape
            );
        }
        for shape in [self.kernel_shape, self.target_shape] {
            if shape.checked_len().is_none() {
                anyhow::bail!("Generated matrix {} has too many elements", shape);
            }
        }
        if self.num_targets == 0 {
            anyhow::bail!("Generated input needs at least one target");
        }
        if self.min_value > self.max_value {
            anyhow::bail!(
                "min_value ({}) must not exceed max_value ({})",
                self.min_value,
                self.max_value
            );
        }
        Ok(())
    }
}

/// Write a generated input to `writer`
pub fn write_input<W: Write>(config: &GenerateConfig, writer: W) -> Result<()> {
    config.validate()?;

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);
    let mut out = BufWriter::new(writer);

    writeln!(out, "{} {}", config.kernel_shape.rows, config.kernel_shape.cols)?;
    write_matrix(&mut out, &mut rng, config.kernel_shape, config)?;
    writeln!(
        out,
        "{} {} {}",
        config.num_targets, config.target_shape.rows, config.target_shape.cols
    )?;
    for _ in 0..config.num_targets {
        writeln!(out)?;
        write_matrix(&mut out, &mut rng, config.target_shape, config)?;
    }

    out.flush().context("Failed to flush generated input")?;
    Ok(())
}

/// Write a generated input file
pub fn write_input_file(config: &GenerateConfig, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create input file: {}", path.display()))?;
    write_input(config, file)
        .with_context(|| format!("Failed to write input file: {}", path.display()))
}

fn write_matrix<W: Write>(
    out: &mut W,
    rng: &mut Xoshiro256PlusPlus,
    shape: Shape,
    config: &GenerateConfig,
) -> Result<()> {
    for _ in 0..shape.rows {
        let row: Vec<String> = (0..shape.cols)
            .map(|_| rng.gen_range(config.min_value..=config.max_value).to_string())
            .collect();
        writeln!(out, "{}", row.join(" "))?;
    }
    Ok(())
}
