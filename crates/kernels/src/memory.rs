//! Block memory copy kernels.

use crate::config::{Capability, KernelVariant, COPY_BLOCK_BYTES};
use crate::kernel::Kernel;
use crate::utils::copy_operands;
use crate::workload::{Buffer, KernelInputs};
use anyhow::Result;

/// Copies one fixed-size block; lets the harness time blocks individually.
pub trait BlockCopy: Send + Sync {
    fn copy_block(&self, dst: &mut [u8], src: &[u8]);
}

fn copy_all_blocks(copier: &dyn BlockCopy, inputs: &KernelInputs<'_>, output: &mut Buffer) -> Result<()> {
    let (src, dst) = copy_operands(inputs, output)?;
    for (dst_block, src_block) in dst
        .chunks_mut(COPY_BLOCK_BYTES)
        .zip(src.chunks(COPY_BLOCK_BYTES))
    {
        copier.copy_block(dst_block, src_block);
    }
    Ok(())
}

/// Byte-at-a-time copy.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceCopy;

impl BlockCopy for ReferenceCopy {
    fn copy_block(&self, dst: &mut [u8], src: &[u8]) {
        for (d, s) in dst.iter_mut().zip(src) {
            *d = *s;
        }
    }
}

impl Kernel for ReferenceCopy {
    fn name(&self) -> &'static str {
        "memcpy-reference"
    }

    fn capability(&self) -> Capability {
        Capability::MemoryCopy
    }

    fn variant(&self) -> KernelVariant {
        KernelVariant::Reference
    }

    fn run(&self, inputs: &KernelInputs<'_>, output: &mut Buffer) -> Result<()> {
        copy_all_blocks(self, inputs, output)
    }

    fn as_block_copy(&self) -> Option<&dyn BlockCopy> {
        Some(self)
    }
}

/// The platform `memcpy`, reached through `copy_from_slice`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SliceCopy;

impl BlockCopy for SliceCopy {
    fn copy_block(&self, dst: &mut [u8], src: &[u8]) {
        dst.copy_from_slice(src);
    }
}

impl Kernel for SliceCopy {
    fn name(&self) -> &'static str {
        "memcpy-slice"
    }

    fn capability(&self) -> Capability {
        Capability::MemoryCopy
    }

    fn variant(&self) -> KernelVariant {
        KernelVariant::OptimizedScalar
    }

    fn run(&self, inputs: &KernelInputs<'_>, output: &mut Buffer) -> Result<()> {
        copy_all_blocks(self, inputs, output)
    }

    fn as_block_copy(&self) -> Option<&dyn BlockCopy> {
        Some(self)
    }
}

/// 16-byte vector loads and stores.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimdCopy;

impl BlockCopy for SimdCopy {
    fn copy_block(&self, dst: &mut [u8], src: &[u8]) {
        let len = dst.len().min(src.len());
        let copied = copy_simd(&mut dst[..len], &src[..len]);
        dst[copied..len].copy_from_slice(&src[copied..len]);
    }
}

impl Kernel for SimdCopy {
    fn name(&self) -> &'static str {
        "memcpy-simd"
    }

    fn capability(&self) -> Capability {
        Capability::MemoryCopy
    }

    fn variant(&self) -> KernelVariant {
        KernelVariant::Simd
    }

    fn run(&self, inputs: &KernelInputs<'_>, output: &mut Buffer) -> Result<()> {
        copy_all_blocks(self, inputs, output)
    }

    fn as_block_copy(&self) -> Option<&dyn BlockCopy> {
        Some(self)
    }
}

const VECTOR_BYTES: usize = 16;

#[cfg(target_arch = "x86_64")]
fn copy_simd(dst: &mut [u8], src: &[u8]) -> usize {
    use std::arch::x86_64::*;

    let chunks = dst.len() / VECTOR_BYTES;
    for chunk in 0..chunks {
        let offset = chunk * VECTOR_BYTES;
        // SAFETY: SSE2 is baseline on x86_64; both slices have the same
        // length and offset + 16 <= len.
        unsafe {
            let v = _mm_loadu_si128(src.as_ptr().add(offset) as *const __m128i);
            _mm_storeu_si128(dst.as_mut_ptr().add(offset) as *mut __m128i, v);
        }
    }
    chunks * VECTOR_BYTES
}

#[cfg(target_arch = "aarch64")]
fn copy_simd(dst: &mut [u8], src: &[u8]) -> usize {
    use std::arch::aarch64::*;

    let chunks = dst.len() / VECTOR_BYTES;
    for chunk in 0..chunks {
        let offset = chunk * VECTOR_BYTES;
        // SAFETY: NEON is mandatory on aarch64; offset + 16 <= len.
        unsafe {
            let v = vld1q_u8(src.as_ptr().add(offset));
            vst1q_u8(dst.as_mut_ptr().add(offset), v);
        }
    }
    chunks * VECTOR_BYTES
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn copy_simd(_dst: &mut [u8], _src: &[u8]) -> usize {
    0
}
