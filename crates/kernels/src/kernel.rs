//! The calling contract shared by every kernel implementation.

use crate::config::{Capability, KernelVariant, WorkloadShape};
use crate::memory::BlockCopy;
use crate::workload::{Buffer, KernelInputs};
use anyhow::Result;
use std::sync::Arc;

/// One implementation of a numeric operation.
///
/// Every kernel of a capability reads the same input buffers and writes the
/// same output layout (row-major for matrices), so the harness can compare
/// any of them against the reference variant.
pub trait Kernel: Send + Sync {
    fn name(&self) -> &'static str;
    fn capability(&self) -> Capability;
    fn variant(&self) -> KernelVariant;

    fn supports(&self, shape: &WorkloadShape) -> bool {
        shape.capability == self.capability()
    }

    /// Execute once, writing the result into `output`.
    fn run(&self, inputs: &KernelInputs<'_>, output: &mut Buffer) -> Result<()>;

    /// Per-block access for kernels that move memory blockwise.
    fn as_block_copy(&self) -> Option<&dyn BlockCopy> {
        None
    }
}

pub type DynKernel = Arc<dyn Kernel>;
