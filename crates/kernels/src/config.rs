//! Kernel configuration structures.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const KB: usize = 1024;

/// Bytes per block moved by the memory-copy kernels.
pub const COPY_BLOCK_BYTES: usize = 512;

/// Loads and stores performed by the modify-in-place loop when no count is given.
pub const DEFAULT_RMW_STEPS: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    MatrixMultiply,
    VectorAdd,
    MemoryCopy,
    ModifyInPlace,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::MatrixMultiply => "matrix-multiply",
            Capability::VectorAdd => "vector-add",
            Capability::MemoryCopy => "memory-copy",
            Capability::ModifyInPlace => "modify-in-place",
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            Capability::MatrixMultiply => ElementType::F32,
            Capability::VectorAdd => ElementType::I16,
            Capability::MemoryCopy => ElementType::Bytes,
            Capability::ModifyInPlace => ElementType::I32,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    F32,
    I16,
    I32,
    Bytes,
}

impl ElementType {
    pub fn element_size_bytes(&self) -> usize {
        match self {
            ElementType::F32 | ElementType::I32 => 4,
            ElementType::I16 => 2,
            ElementType::Bytes => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KernelVariant {
    /// Portable scalar code trusted as ground truth.
    Reference,
    /// Hand-tuned scalar code, no vector instructions.
    OptimizedScalar,
    Simd,
}

impl KernelVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            KernelVariant::Reference => "reference",
            KernelVariant::OptimizedScalar => "optimized-scalar",
            KernelVariant::Simd => "simd",
        }
    }
}

/// Shape of one sweep point.
///
/// `size` is the matrix dimension for matrix multiply, the element count for
/// vector add, the number of 512-byte blocks for memory copy and the working
/// set in kilobytes for the modify-in-place loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadShape {
    pub capability: Capability,
    pub size: usize,
    /// Loop trip count; only meaningful for the modify-in-place loop.
    pub steps: u64,
}

impl WorkloadShape {
    pub fn matmul(n: usize) -> Self {
        Self::new(Capability::MatrixMultiply, n)
    }

    pub fn vector_add(len: usize) -> Self {
        Self::new(Capability::VectorAdd, len)
    }

    pub fn memory_copy(blocks: usize) -> Self {
        Self::new(Capability::MemoryCopy, blocks)
    }

    pub fn modify_in_place(kb: usize, steps: u64) -> Self {
        Self {
            capability: Capability::ModifyInPlace,
            size: kb,
            steps,
        }
    }

    fn new(capability: Capability, size: usize) -> Self {
        Self {
            capability,
            size,
            steps: 0,
        }
    }

    pub fn element_type(&self) -> ElementType {
        self.capability.element_type()
    }

    pub fn input_count(&self) -> usize {
        match self.capability {
            Capability::MatrixMultiply | Capability::VectorAdd => 2,
            Capability::MemoryCopy => 1,
            Capability::ModifyInPlace => 0,
        }
    }

    /// Elements in every buffer of the workload, `None` on overflow.
    pub fn element_count(&self) -> Option<usize> {
        match self.capability {
            Capability::MatrixMultiply => self.size.checked_mul(self.size),
            Capability::VectorAdd => Some(self.size),
            Capability::MemoryCopy => self.size.checked_mul(COPY_BLOCK_BYTES),
            Capability::ModifyInPlace => self
                .size
                .checked_mul(KB)
                .map(|bytes| bytes / ElementType::I32.element_size_bytes()),
        }
    }

    pub fn buffer_bytes(&self) -> Option<usize> {
        self.element_count()?
            .checked_mul(self.element_type().element_size_bytes())
    }

    pub fn footprint_bytes(&self) -> Option<usize> {
        self.buffer_bytes()?.checked_mul(self.input_count() + 1)
    }
}

impl fmt::Display for WorkloadShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.capability {
            Capability::MatrixMultiply => write!(f, "{}x{}", self.size, self.size),
            Capability::VectorAdd => write!(f, "{}", self.size),
            Capability::MemoryCopy => write!(f, "{}x{}B", self.size, COPY_BLOCK_BYTES),
            Capability::ModifyInPlace => write!(f, "{}KB", self.size),
        }
    }
}
