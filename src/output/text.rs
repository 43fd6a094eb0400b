//! Human-readable text output

use crate::stats::SummaryResult;
use std::io::{self, Write};
use std::time::Duration;

/// Format the summary: minimum, maximum, median and floored mean, one per line
///
/// With `elapsed`, a final `Time elapsed <seconds>` line follows.
pub fn format_summary(summary: &SummaryResult, elapsed: Option<Duration>) -> String {
    let mut out = format!(
        "{}\n{}\n{}\n{}\n",
        summary.minimum, summary.maximum, summary.median, summary.floored_mean
    );
    if let Some(elapsed) = elapsed {
        out.push_str(&format!("Time elapsed {:.6}\n", elapsed.as_secs_f64()));
    }
    out
}

/// Write the summary to `out`
pub fn write_summary<W: Write>(out: &mut W, summary: &SummaryResult, elapsed: Option<Duration>) -> io::Result<()> {
    out.write_all(format_summary(summary, elapsed).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> SummaryResult {
        SummaryResult {
            minimum: 1,
            maximum: 9,
            median: 3,
            floored_mean: 3,
        }
    }

    #[test]
    fn test_four_lines() {
        assert_eq!(format_summary(&summary(), None), "1\n9\n3\n3\n");
    }

    #[test]
    fn test_elapsed_line() {
        let text = format_summary(&summary(), Some(Duration::from_millis(1500)));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[4], "Time elapsed 1.500000");
    }

    #[test]
    fn test_negative_values() {
        let summary = SummaryResult {
            minimum: -4,
            maximum: -1,
            median: -3,
            floored_mean: -3,
        };
        assert_eq!(format_summary(&summary, None), "-4\n-1\n-3\n-3\n");
    }
}
