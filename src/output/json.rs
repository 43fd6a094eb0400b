//! JSON output formatting
//!
//! One object per run: the summary, the run shape, how targets were split
//! across ranks and, when timing is enabled, the elapsed wall-clock time.

use crate::distributed::RunReport;
use crate::matrix::Shape;
use crate::stats::SummaryResult;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::time::Duration;

/// Duration with both microseconds and human-readable format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonDuration {
    pub micros: u64,
    pub human: String,
}

impl JsonDuration {
    pub fn from_duration(d: Duration) -> Self {
        let micros = d.as_micros() as u64;
        let human = format_duration_human(d);
        Self { micros, human }
    }
}

/// Shape of the run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRunInfo {
    pub kernel: Shape,
    pub target: Shape,
    pub num_targets: usize,
    pub world_size: usize,
    /// Targets convolved by each rank
    pub local_counts: Vec<usize>,
    pub engine: String,
}

/// Complete JSON report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonReport {
    pub version: String,
    /// RFC 3339 UTC time the report was produced
    pub timestamp: String,
    pub summary: SummaryResult,
    pub run: JsonRunInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<JsonDuration>,
}

impl JsonReport {
    pub fn new(report: &RunReport, elapsed: Option<Duration>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            summary: report.summary,
            run: JsonRunInfo {
                kernel: report.metadata.kernel_shape,
                target: report.metadata.target_shape,
                num_targets: report.metadata.num_targets,
                world_size: report.world_size,
                local_counts: report.local_counts.clone(),
                engine: report.engine.to_string(),
            },
            elapsed: elapsed.map(JsonDuration::from_duration),
        }
    }
}

/// Write the JSON report to `out`
pub fn write_report<W: Write>(out: &mut W, report: &JsonReport, pretty: bool) -> Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, report)?;
    } else {
        serde_json::to_writer(&mut *out, report)?;
    }
    writeln!(out)?;
    Ok(())
}

/// Format duration in human-readable format
fn format_duration_human(d: Duration) -> String {
    let micros = d.as_micros() as u64;

    if micros == 0 {
        return "0µs".to_string();
    }

    if micros < 1000 {
        format!("{}µs", micros)
    } else if micros < 1_000_000 {
        format!("{:.3}ms", micros as f64 / 1000.0)
    } else {
        format!("{:.3}s", micros as f64 / 1_000_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::RunMetadata;

    fn report() -> RunReport {
        RunReport {
            summary: SummaryResult {
                minimum: 1,
                maximum: 9,
                median: 3,
                floored_mean: 3,
            },
            metadata: RunMetadata {
                kernel_shape: Shape::new(2, 2),
                target_shape: Shape::new(8, 8),
                num_targets: 10,
            },
            world_size: 3,
            local_counts: vec![3, 3, 4],
            engine: "direct",
        }
    }

    #[test]
    fn test_json_report_fields() {
        let json = JsonReport::new(&report(), Some(Duration::from_micros(2500)));
        let mut buf = Vec::new();
        write_report(&mut buf, &json, false).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["summary"]["median"], 3);
        assert_eq!(value["summary"]["floored_mean"], 3);
        assert_eq!(value["run"]["world_size"], 3);
        assert_eq!(value["run"]["local_counts"], serde_json::json!([3, 3, 4]));
        assert_eq!(value["run"]["kernel"]["rows"], 2);
        assert_eq!(value["elapsed"]["micros"], 2500);
        assert_eq!(value["elapsed"]["human"], "2.500ms");
    }

    #[test]
    fn test_elapsed_omitted_without_timing() {
        let json = JsonReport::new(&report(), None);
        let text = serde_json::to_string(&json).unwrap();
        assert!(!text.contains("elapsed"));
    }

    #[test]
    fn test_format_duration_human() {
        assert_eq!(format_duration_human(Duration::ZERO), "0µs");
        assert_eq!(format_duration_human(Duration::from_micros(12)), "12µs");
        assert_eq!(format_duration_human(Duration::from_secs(2)), "2.000s");
    }
}
