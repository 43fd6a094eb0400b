//! Result output
//!
//! - `text`: the four summary lines, plus elapsed time when requested
//! - `json`: one JSON object with the summary, run shape and timing

pub mod json;
pub mod text;

use crate::config::{Config, OutputFormat};
use crate::distributed::RunReport;
use anyhow::Result;
use std::io::Write;
use std::time::Duration;

/// Write `report` to `out` in the configured format
pub fn write_report<W: Write>(out: &mut W, report: &RunReport, config: &Config, elapsed: Duration) -> Result<()> {
    let elapsed = config.output.timing.then_some(elapsed);
    match config.output.format {
        OutputFormat::Text => text::write_summary(out, &report.summary, elapsed)?,
        OutputFormat::Json => json::write_report(out, &json::JsonReport::new(report, elapsed), true)?,
    }
    out.flush()?;
    Ok(())
}
