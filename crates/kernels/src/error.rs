//! Error taxonomy shared by the kernels and the harness.

use crate::config::{Capability, ElementType};
use thiserror::Error;

/// Errors that stop a benchmark or reject a setup step.
///
/// Verification mismatches are not errors: they are recorded as data in the
/// measurement of the offending kernel.
#[derive(Debug, Error)]
pub enum BenchError {
    /// Bad or missing command-line input.
    #[error("usage: {0}")]
    Usage(String),

    /// A workload buffer could not be allocated.
    #[error("cannot allocate {requested_bytes} bytes for workload buffers")]
    Allocation { requested_bytes: usize },

    /// A kernel name was registered twice.
    #[error("kernel `{0}` is already registered")]
    DuplicateKernel(String),

    /// The workload shape cannot be generated or executed.
    #[error("invalid workload shape: {0}")]
    InvalidShape(String),

    /// A kernel asked for a buffer of a different element type.
    #[error("{buffer} holds {actual:?} elements, expected {expected:?}")]
    BufferType {
        buffer: String,
        expected: ElementType,
        actual: ElementType,
    },

    /// No reference kernel is registered for the capability being swept.
    #[error("no reference kernel registered for {0}")]
    MissingReference(Capability),

    /// `Timer::stop` was called without a matching `start`.
    #[error("timer stopped without a matching start")]
    TimerNotStarted,
}

pub type Result<T> = std::result::Result<T, BenchError>;
