//! 16-bit integer vector addition.
//!
//! Sums wrap modulo 2^16 in every variant, so the SIMD lanes and the scalar
//! loops agree even when a pair of inputs overflows.

use crate::config::{Capability, KernelVariant};
use crate::kernel::Kernel;
use crate::utils::vector_operands;
use crate::workload::{Buffer, KernelInputs};
use anyhow::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceVectorAdd;

impl Kernel for ReferenceVectorAdd {
    fn name(&self) -> &'static str {
        "vadd-reference"
    }

    fn capability(&self) -> Capability {
        Capability::VectorAdd
    }

    fn variant(&self) -> KernelVariant {
        KernelVariant::Reference
    }

    fn run(&self, inputs: &KernelInputs<'_>, output: &mut Buffer) -> Result<()> {
        let (lhs, rhs, out) = vector_operands(inputs, output)?;
        for i in 0..out.len() {
            out[i] = lhs[i].wrapping_add(rhs[i]);
        }
        Ok(())
    }
}

/// Four-way unrolled scalar add.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnrolledVectorAdd;

impl Kernel for UnrolledVectorAdd {
    fn name(&self) -> &'static str {
        "vadd-unrolled"
    }

    fn capability(&self) -> Capability {
        Capability::VectorAdd
    }

    fn variant(&self) -> KernelVariant {
        KernelVariant::OptimizedScalar
    }

    fn run(&self, inputs: &KernelInputs<'_>, output: &mut Buffer) -> Result<()> {
        let (lhs, rhs, out) = vector_operands(inputs, output)?;

        let mut out_chunks = out.chunks_exact_mut(4);
        let mut lhs_chunks = lhs.chunks_exact(4);
        let mut rhs_chunks = rhs.chunks_exact(4);
        for ((c, a), b) in (&mut out_chunks).zip(&mut lhs_chunks).zip(&mut rhs_chunks) {
            c[0] = a[0].wrapping_add(b[0]);
            c[1] = a[1].wrapping_add(b[1]);
            c[2] = a[2].wrapping_add(b[2]);
            c[3] = a[3].wrapping_add(b[3]);
        }
        let tail = out_chunks.into_remainder();
        for ((c, a), b) in tail
            .iter_mut()
            .zip(lhs_chunks.remainder())
            .zip(rhs_chunks.remainder())
        {
            *c = a.wrapping_add(*b);
        }
        Ok(())
    }
}

/// Eight lanes per instruction: SSE2 on x86_64, NEON on aarch64.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimdVectorAdd;

impl Kernel for SimdVectorAdd {
    fn name(&self) -> &'static str {
        "vadd-simd"
    }

    fn capability(&self) -> Capability {
        Capability::VectorAdd
    }

    fn variant(&self) -> KernelVariant {
        KernelVariant::Simd
    }

    fn run(&self, inputs: &KernelInputs<'_>, output: &mut Buffer) -> Result<()> {
        let (lhs, rhs, out) = vector_operands(inputs, output)?;
        let vectorized = vector_add_simd(lhs, rhs, out);
        for i in vectorized..out.len() {
            out[i] = lhs[i].wrapping_add(rhs[i]);
        }
        Ok(())
    }
}

const LANES: usize = 8;

/// Adds whole 8-lane chunks and returns how many elements were written.
#[cfg(target_arch = "x86_64")]
fn vector_add_simd(lhs: &[i16], rhs: &[i16], out: &mut [i16]) -> usize {
    use std::arch::x86_64::*;

    let chunks = out.len() / LANES;
    for chunk in 0..chunks {
        let offset = chunk * LANES;
        // SAFETY: SSE2 is part of the x86_64 baseline and offset + 8 <= len
        // for all three slices, which vector_operands sized identically.
        unsafe {
            let a = _mm_loadu_si128(lhs.as_ptr().add(offset) as *const __m128i);
            let b = _mm_loadu_si128(rhs.as_ptr().add(offset) as *const __m128i);
            _mm_storeu_si128(
                out.as_mut_ptr().add(offset) as *mut __m128i,
                _mm_add_epi16(a, b),
            );
        }
    }
    chunks * LANES
}

#[cfg(target_arch = "aarch64")]
fn vector_add_simd(lhs: &[i16], rhs: &[i16], out: &mut [i16]) -> usize {
    use std::arch::aarch64::*;

    let chunks = out.len() / LANES;
    for chunk in 0..chunks {
        let offset = chunk * LANES;
        // SAFETY: NEON is mandatory on aarch64 and offset + 8 <= len.
        unsafe {
            let a = vld1q_s16(lhs.as_ptr().add(offset));
            let b = vld1q_s16(rhs.as_ptr().add(offset));
            vst1q_s16(out.as_mut_ptr().add(offset), vaddq_s16(a, b));
        }
    }
    chunks * LANES
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn vector_add_simd(_lhs: &[i16], _rhs: &[i16], _out: &mut [i16]) -> usize {
    0
}
