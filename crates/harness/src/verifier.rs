//! Output verification against the reference kernel.

use cyclebench_kernels::Buffer;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Acceptance band for floating-point outputs.
///
/// An element passes when `|expected - actual| <= abs_eps + rel_eps * max(|expected|, |actual|)`.
/// Integer and byte outputs ignore the band and must match exactly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceSpec {
    pub abs_eps: f32,
    pub rel_eps: f32,
}

impl Default for ToleranceSpec {
    fn default() -> Self {
        Self {
            abs_eps: 1e-4,
            rel_eps: 1e-4,
        }
    }
}

impl ToleranceSpec {
    pub fn strict() -> Self {
        Self {
            abs_eps: 1e-6,
            rel_eps: 1e-6,
        }
    }

    pub fn exact() -> Self {
        Self {
            abs_eps: 0.0,
            rel_eps: 0.0,
        }
    }

    pub fn accepts(&self, expected: f32, actual: f32) -> bool {
        if expected == actual {
            return true;
        }
        let band = self.abs_eps + self.rel_eps * expected.abs().max(actual.abs());
        (expected - actual).abs() <= band
    }
}

/// One differing element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub index: usize,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Verdict {
    Passed {
        max_abs_error: f64,
    },
    Failed {
        reason: String,
        /// The first few differing elements.
        mismatches: Vec<Mismatch>,
        total_mismatches: usize,
    },
}

impl Verdict {
    /// A failure that is not about element values (kernel error, type clash).
    pub fn failed(reason: impl Into<String>) -> Self {
        Verdict::Failed {
            reason: reason.into(),
            mismatches: Vec::new(),
            total_mismatches: 0,
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Passed { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Verdict::Passed { .. } => None,
            Verdict::Failed { reason, .. } => Some(reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Verifier {
    tolerance: ToleranceSpec,
    max_reported: usize,
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new(ToleranceSpec::default())
    }
}

impl Verifier {
    pub const DEFAULT_MAX_REPORTED: usize = 8;

    pub fn new(tolerance: ToleranceSpec) -> Self {
        Self {
            tolerance,
            max_reported: Self::DEFAULT_MAX_REPORTED,
        }
    }

    pub fn with_max_reported(mut self, max_reported: usize) -> Self {
        self.max_reported = max_reported;
        self
    }

    /// Compare a candidate output with the reference output.
    ///
    /// Never panics: length and element-type disagreements become failed
    /// verdicts.
    pub fn compare(&self, reference: &Buffer, candidate: &Buffer) -> Verdict {
        if reference.len() != candidate.len() {
            return Verdict::failed(format!(
                "shape mismatch: reference has {} elements, candidate has {}",
                reference.len(),
                candidate.len()
            ));
        }

        match (reference, candidate) {
            (Buffer::F32(expected), Buffer::F32(actual)) => self.compare_f32(expected, actual),
            (Buffer::I16(expected), Buffer::I16(actual)) => self.compare_exact(expected, actual),
            (Buffer::I32(expected), Buffer::I32(actual)) => self.compare_exact(expected, actual),
            (Buffer::Bytes(expected), Buffer::Bytes(actual)) => self.compare_exact(expected, actual),
            _ => Verdict::failed(format!(
                "element type mismatch: reference is {:?}, candidate is {:?}",
                reference.element_type(),
                candidate.element_type()
            )),
        }
    }

    fn compare_f32(&self, expected: &[f32], actual: &[f32]) -> Verdict {
        let mut max_abs = 0.0f64;
        let mut mismatches = Vec::new();
        let mut total = 0usize;

        for (index, (e, a)) in expected.iter().zip(actual).enumerate() {
            let abs_err = (f64::from(*e) - f64::from(*a)).abs();
            if abs_err.is_finite() {
                max_abs = max_abs.max(abs_err);
            }
            if !self.tolerance.accepts(*e, *a) {
                total += 1;
                if mismatches.len() < self.max_reported {
                    mismatches.push(Mismatch {
                        index,
                        expected: e.to_string(),
                        actual: a.to_string(),
                    });
                }
            }
        }

        if total == 0 {
            Verdict::Passed {
                max_abs_error: max_abs,
            }
        } else {
            self.mismatch_verdict(mismatches, total, expected.len())
        }
    }

    fn compare_exact<T: PartialEq + Display>(&self, expected: &[T], actual: &[T]) -> Verdict {
        let mut mismatches = Vec::new();
        let mut total = 0usize;

        for (index, (e, a)) in expected.iter().zip(actual).enumerate() {
            if e != a {
                total += 1;
                if mismatches.len() < self.max_reported {
                    mismatches.push(Mismatch {
                        index,
                        expected: e.to_string(),
                        actual: a.to_string(),
                    });
                }
            }
        }

        if total == 0 {
            Verdict::Passed { max_abs_error: 0.0 }
        } else {
            self.mismatch_verdict(mismatches, total, expected.len())
        }
    }

    fn mismatch_verdict(&self, mismatches: Vec<Mismatch>, total: usize, len: usize) -> Verdict {
        let reason = match mismatches.first() {
            Some(first) => format!(
                "{total} of {len} elements differ; first at [{}]: expected {}, got {}",
                first.index, first.expected, first.actual
            ),
            None => format!("{total} of {len} elements differ"),
        };
        Verdict::Failed {
            reason,
            mismatches,
            total_mismatches: total,
        }
    }
}
