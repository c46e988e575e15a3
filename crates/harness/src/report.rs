//! Text and JSON rendering of sweep results.
//!
//! Everything here is pure formatting; callers decide where the text goes.

use crate::runner::{BlockSample, Measurement};
use crate::timer::Precision;
use crate::verifier::Verdict;
use cyclebench_kernels::Capability;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// `"<kernel>: n=<size> cycles=<ticks> (<secs> sec.) PASS"`, or
/// `FAIL: <reason>` in place of `PASS`.
pub fn measurement_line(measurement: &Measurement) -> String {
    let unit = match measurement.precision {
        Precision::Cycle => "cycles",
        Precision::Wall => "ns",
    };
    format!(
        "{}: n={} {}={} ({:.8} sec.) {}",
        measurement.kernel,
        measurement.shape,
        unit,
        measurement.ticks,
        measurement.seconds,
        verdict_label(&measurement.verdict)
    )
}

/// Elapsed seconds the way the cache-pressure program prints them.
pub fn seconds_line(seconds: f64) -> String {
    format!("{seconds:.8} sec.")
}

/// Per-size line for cache-pressure output: `"<kernel> [<KB>KB]: <secs> sec."`.
pub fn cache_line(measurement: &Measurement) -> String {
    let mut line = format!(
        "{} [{}]: {}",
        measurement.kernel,
        measurement.shape,
        seconds_line(measurement.seconds)
    );
    if let Some(reason) = measurement.verdict.reason() {
        let _ = write!(line, " FAIL: {reason}");
    }
    line
}

/// Row-major grid with `%6.2f`-style cells and a trailing blank line.
pub fn matrix_grid(matrix: ArrayView2<'_, f32>) -> String {
    let mut grid = String::new();
    for row in matrix.rows() {
        for value in row {
            let _ = write!(grid, "{value:6.2} ");
        }
        grid.push('\n');
    }
    grid.push('\n');
    grid
}

pub fn block_copy_line(sample: &BlockSample) -> String {
    format!(
        "Copied {} bytes (Total {} bytes), cycles used: {}",
        sample.bytes, sample.total_bytes, sample.ticks
    )
}

/// One element per line.
pub fn vector_lines(values: &[i16]) -> String {
    let mut lines = String::with_capacity(values.len() * 6);
    for value in values {
        let _ = writeln!(lines, "{value}");
    }
    lines
}

fn verdict_label(verdict: &Verdict) -> String {
    match verdict {
        Verdict::Passed { .. } => "PASS".to_string(),
        Verdict::Failed { reason, .. } => format!("FAIL: {reason}"),
    }
}

/// Everything one CLI invocation measured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub capability: Capability,
    pub timer: String,
    pub precision: Precision,
    pub ticks_per_second: f64,
    pub measurements: Vec<Measurement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub block_trace: Vec<BlockTrace>,
}

/// Per-block samples for one memory-copy kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockTrace {
    pub kernel: String,
    pub samples: Vec<BlockSample>,
}

impl SweepReport {
    pub fn new(
        capability: Capability,
        timer: impl Into<String>,
        precision: Precision,
        ticks_per_second: f64,
        measurements: Vec<Measurement>,
    ) -> Self {
        Self {
            capability,
            timer: timer.into(),
            precision,
            ticks_per_second,
            measurements,
            block_trace: Vec::new(),
        }
    }

    pub fn failures(&self) -> usize {
        self.measurements.iter().filter(|m| !m.passed()).count()
    }

    /// Closing line for text output.
    pub fn summary(&self) -> String {
        let failed = self.failures();
        if failed == 0 {
            format!(
                "{} measurements, all verified ({} timer)",
                self.measurements.len(),
                self.timer
            )
        } else {
            format!(
                "{} measurements, {} failed verification ({} timer)",
                self.measurements.len(),
                failed,
                self.timer
            )
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyclebench_kernels::KernelVariant;
    use ndarray::Array2;

    fn measurement(verdict: Verdict) -> Measurement {
        Measurement {
            kernel: "mm-blocked".into(),
            variant: KernelVariant::OptimizedScalar,
            capability: Capability::MatrixMultiply,
            size: 4,
            shape: "4x4".into(),
            ticks: 1234,
            seconds: 0.000_000_5,
            iterations: 1,
            precision: Precision::Cycle,
            verdict,
        }
    }

    #[test]
    fn measurement_line_reports_pass_and_fail() {
        let pass = measurement(Verdict::Passed { max_abs_error: 0.0 });
        assert_eq!(
            measurement_line(&pass),
            "mm-blocked: n=4x4 cycles=1234 (0.00000050 sec.) PASS"
        );

        let fail = measurement(Verdict::failed("1 of 16 elements differ"));
        assert!(measurement_line(&fail).ends_with("FAIL: 1 of 16 elements differ"));
    }

    #[test]
    fn seconds_line_has_eight_decimals() {
        assert_eq!(seconds_line(0.5), "0.50000000 sec.");
    }

    #[test]
    fn grid_matches_fixed_width_cells() {
        let matrix = Array2::from_shape_vec((2, 2), vec![0.0f32, 1.0, 12.5, -3.25]).unwrap();
        assert_eq!(
            matrix_grid(matrix.view()),
            "  0.00   1.00 \n 12.50  -3.25 \n\n"
        );
    }

    #[test]
    fn block_copy_line_wording() {
        let sample = BlockSample {
            bytes: 512,
            total_bytes: 1024,
            ticks: 88,
        };
        assert_eq!(
            block_copy_line(&sample),
            "Copied 512 bytes (Total 1024 bytes), cycles used: 88"
        );
    }

    #[test]
    fn vector_lines_one_per_line() {
        assert_eq!(vector_lines(&[0, 2, -4]), "0\n2\n-4\n");
    }

    #[test]
    fn report_serializes_measurements() {
        let report = SweepReport::new(
            Capability::MatrixMultiply,
            "rdtsc",
            Precision::Cycle,
            3.0e9,
            vec![measurement(Verdict::Passed { max_abs_error: 0.0 })],
        );
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["capability"], "matrix-multiply");
        assert_eq!(json["measurements"][0]["verdict"]["status"], "Passed");
        assert!(json.get("block_trace").is_none());
        assert_eq!(report.failures(), 0);
    }
}
