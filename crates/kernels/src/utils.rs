//! Shared helpers for kernel implementations.

use crate::config::{Capability, WorkloadShape};
use crate::workload::{Buffer, KernelInputs};
use anyhow::{ensure, Result};
use serde::Serialize;

/// Vector instruction set used by the SIMD kernels on this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SimdLevel {
    Avx,
    Sse2,
    Neon,
    Portable,
}

#[cfg(target_arch = "x86_64")]
pub fn simd_level() -> SimdLevel {
    if is_x86_feature_detected!("avx") {
        SimdLevel::Avx
    } else {
        SimdLevel::Sse2
    }
}

#[cfg(target_arch = "aarch64")]
pub fn simd_level() -> SimdLevel {
    SimdLevel::Neon
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub fn simd_level() -> SimdLevel {
    SimdLevel::Portable
}

pub fn validate_shape(shape: &WorkloadShape, expected: Capability) -> Result<usize> {
    ensure!(
        shape.capability == expected,
        "{} kernel cannot run a {} workload",
        expected,
        shape.capability
    );
    let len = shape
        .element_count()
        .ok_or_else(|| anyhow::anyhow!("workload {} overflows usize", shape))?;
    Ok(len)
}

pub struct MatmulOperands<'a> {
    pub n: usize,
    pub lhs: &'a [f32],
    pub rhs: &'a [f32],
    pub out: &'a mut [f32],
}

pub fn matmul_operands<'a>(
    inputs: &KernelInputs<'a>,
    output: &'a mut Buffer,
) -> Result<MatmulOperands<'a>> {
    let len = validate_shape(&inputs.shape, Capability::MatrixMultiply)?;
    let lhs = inputs.f32(0)?;
    let rhs = inputs.f32(1)?;
    let out = output.f32_mut()?;
    ensure!(
        lhs.len() == len && rhs.len() == len && out.len() == len,
        "matmul buffers {} / {} / {} do not match {}",
        lhs.len(),
        rhs.len(),
        out.len(),
        inputs.shape
    );
    Ok(MatmulOperands {
        n: inputs.shape.size,
        lhs,
        rhs,
        out,
    })
}

pub fn vector_operands<'a>(
    inputs: &KernelInputs<'a>,
    output: &'a mut Buffer,
) -> Result<(&'a [i16], &'a [i16], &'a mut [i16])> {
    let len = validate_shape(&inputs.shape, Capability::VectorAdd)?;
    let lhs = inputs.i16(0)?;
    let rhs = inputs.i16(1)?;
    let out = output.i16_mut()?;
    ensure!(
        lhs.len() == len && rhs.len() == len && out.len() == len,
        "vector buffers {} / {} / {} do not match length {}",
        lhs.len(),
        rhs.len(),
        out.len(),
        len
    );
    Ok((lhs, rhs, out))
}

pub fn copy_operands<'a>(
    inputs: &KernelInputs<'a>,
    output: &'a mut Buffer,
) -> Result<(&'a [u8], &'a mut [u8])> {
    let len = validate_shape(&inputs.shape, Capability::MemoryCopy)?;
    let src = inputs.bytes(0)?;
    let dst = output.bytes_mut()?;
    ensure!(
        src.len() == len && dst.len() == len,
        "copy buffers {} / {} do not match {} bytes",
        src.len(),
        dst.len(),
        len
    );
    Ok((src, dst))
}

pub fn rmw_operands<'a>(inputs: &KernelInputs<'_>, output: &'a mut Buffer) -> Result<&'a mut [i32]> {
    let len = validate_shape(&inputs.shape, Capability::ModifyInPlace)?;
    let data = output.i32_mut()?;
    ensure!(
        data.len() == len && len > 0,
        "modify-in-place buffer holds {} elements, expected {}",
        data.len(),
        len
    );
    Ok(data)
}
