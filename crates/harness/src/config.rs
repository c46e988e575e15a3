//! Sweep and harness configuration.

use crate::verifier::{ToleranceSpec, Verifier};
use cyclebench_kernels::{Capability, FillPolicy, WorkloadShape, DEFAULT_RMW_STEPS};
use serde::Serialize;

/// Working-set sizes (KB) that straddle typical L1, L2 and L3 capacities.
pub const DEFAULT_CACHE_SWEEP_KB: [usize; 13] = [
    4, 8, 16, 32, 64, 128, 256, 512, 1024, 2048, 4096, 8192, 16384,
];

/// One sweep: a capability measured at each of `sizes`.
///
/// A size means matrix dimension, vector length, block count or working-set
/// kilobytes, depending on the capability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepConfig {
    pub capability: Capability,
    pub sizes: Vec<usize>,
    #[serde(skip)]
    pub fill: FillPolicy,
    pub tolerance: ToleranceSpec,
    /// Trip count for modify-in-place workloads.
    pub steps: u64,
    /// Timed invocations per kernel; ticks are summed.
    pub iterations: usize,
    /// Differing elements kept per failed verdict.
    pub max_reported: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            capability: Capability::ModifyInPlace,
            sizes: DEFAULT_CACHE_SWEEP_KB.to_vec(),
            fill: FillPolicy::default(),
            tolerance: ToleranceSpec::default(),
            steps: DEFAULT_RMW_STEPS,
            iterations: 1,
            max_reported: Verifier::DEFAULT_MAX_REPORTED,
        }
    }
}

impl SweepConfig {
    pub fn new(capability: Capability, sizes: Vec<usize>) -> Self {
        Self {
            capability,
            sizes,
            ..Self::default()
        }
    }

    pub fn with_fill(mut self, fill: FillPolicy) -> Self {
        self.fill = fill;
        self
    }

    pub fn with_tolerance(mut self, tolerance: ToleranceSpec) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_steps(mut self, steps: u64) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    pub fn with_max_reported(mut self, max_reported: usize) -> Self {
        self.max_reported = max_reported;
        self
    }

    pub fn shape_for(&self, size: usize) -> WorkloadShape {
        match self.capability {
            Capability::MatrixMultiply => WorkloadShape::matmul(size),
            Capability::VectorAdd => WorkloadShape::vector_add(size),
            Capability::MemoryCopy => WorkloadShape::memory_copy(size),
            Capability::ModifyInPlace => WorkloadShape::modify_in_place(size, self.steps),
        }
    }
}

/// Process-wide switches taken from global CLI flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarnessOptions {
    pub json: bool,
    /// Skip cycle-counter detection and time with the monotonic clock.
    pub force_monotonic: bool,
    pub iterations: usize,
}

impl HarnessOptions {
    pub fn iterations(&self) -> usize {
        self.iterations.max(1)
    }
}
