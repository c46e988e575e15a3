//! Matrix multiplication kernels.
//!
//! All variants accumulate into the output (`C += A * B`) over square,
//! row-major `f32` matrices, so a zeroed output yields the plain product.

use crate::config::{Capability, KernelVariant};
use crate::kernel::Kernel;
use crate::utils::{matmul_operands, MatmulOperands};
use crate::workload::{Buffer, KernelInputs};
use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatmulTilingConfig {
    pub tile_m: usize,
    pub tile_n: usize,
    pub tile_k: usize,
}

impl Default for MatmulTilingConfig {
    fn default() -> Self {
        Self {
            tile_m: 32,
            tile_n: 64,
            tile_k: 32,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceMatmul;

impl ReferenceMatmul {
    pub fn new() -> Self {
        Self
    }
}

impl Kernel for ReferenceMatmul {
    fn name(&self) -> &'static str {
        "mm-reference"
    }

    fn capability(&self) -> Capability {
        Capability::MatrixMultiply
    }

    fn variant(&self) -> KernelVariant {
        KernelVariant::Reference
    }

    fn run(&self, inputs: &KernelInputs<'_>, output: &mut Buffer) -> Result<()> {
        let MatmulOperands { n, lhs, rhs, out } = matmul_operands(inputs, output)?;

        for i in 0..n {
            for j in 0..n {
                // dot product of row i of A and column j of B
                let mut cij = out[i * n + j];
                for k in 0..n {
                    cij += lhs[i * n + k] * rhs[k * n + j];
                }
                out[i * n + j] = cij;
            }
        }
        Ok(())
    }
}

/// Cache-tiled scalar multiply in i-k-j order.
#[derive(Debug, Clone, Copy)]
pub struct BlockedMatmul {
    config: MatmulTilingConfig,
}

impl BlockedMatmul {
    pub fn new() -> Self {
        Self::with_config(MatmulTilingConfig::default())
    }

    pub fn with_config(config: MatmulTilingConfig) -> Self {
        Self { config }
    }
}

impl Default for BlockedMatmul {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel for BlockedMatmul {
    fn name(&self) -> &'static str {
        "mm-blocked"
    }

    fn capability(&self) -> Capability {
        Capability::MatrixMultiply
    }

    fn variant(&self) -> KernelVariant {
        KernelVariant::OptimizedScalar
    }

    fn run(&self, inputs: &KernelInputs<'_>, output: &mut Buffer) -> Result<()> {
        let MatmulOperands { n, lhs, rhs, out } = matmul_operands(inputs, output)?;

        let tm = self.config.tile_m.max(1);
        let tn = self.config.tile_n.max(1);
        let tk = self.config.tile_k.max(1);

        for i0 in (0..n).step_by(tm) {
            let i_max = (i0 + tm).min(n);
            for p0 in (0..n).step_by(tk) {
                let p_max = (p0 + tk).min(n);
                for j0 in (0..n).step_by(tn) {
                    let j_max = (j0 + tn).min(n);
                    for i in i0..i_max {
                        let c_row = &mut out[i * n + j0..i * n + j_max];
                        for p in p0..p_max {
                            let a_ip = lhs[i * n + p];
                            let b_row = &rhs[p * n + j0..p * n + j_max];
                            for (c, b) in c_row.iter_mut().zip(b_row) {
                                *c += a_ip * b;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Vectorized multiply: broadcasts `A[i][k]` against row `k` of `B`.
///
/// Uses AVX when the CPU reports it, NEON on aarch64, and a portable
/// row-update loop elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimdMatmul;

impl SimdMatmul {
    pub fn new() -> Self {
        Self
    }
}

impl Kernel for SimdMatmul {
    fn name(&self) -> &'static str {
        "mm-simd"
    }

    fn capability(&self) -> Capability {
        Capability::MatrixMultiply
    }

    fn variant(&self) -> KernelVariant {
        KernelVariant::Simd
    }

    fn run(&self, inputs: &KernelInputs<'_>, output: &mut Buffer) -> Result<()> {
        let MatmulOperands { n, lhs, rhs, out } = matmul_operands(inputs, output)?;
        matmul_simd(lhs, rhs, out, n);
        Ok(())
    }
}

#[cfg(target_arch = "x86_64")]
fn matmul_simd(lhs: &[f32], rhs: &[f32], out: &mut [f32], n: usize) {
    if is_x86_feature_detected!("avx") {
        // SAFETY: AVX support was just confirmed and all three slices hold
        // n * n elements (checked by matmul_operands).
        unsafe { x86::matmul_avx(lhs, rhs, out, n) }
    } else {
        matmul_rows_portable(lhs, rhs, out, n)
    }
}

#[cfg(target_arch = "aarch64")]
fn matmul_simd(lhs: &[f32], rhs: &[f32], out: &mut [f32], n: usize) {
    // SAFETY: NEON is mandatory on aarch64 and the slices hold n * n elements.
    unsafe { neon::matmul_neon(lhs, rhs, out, n) }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn matmul_simd(lhs: &[f32], rhs: &[f32], out: &mut [f32], n: usize) {
    matmul_rows_portable(lhs, rhs, out, n)
}

#[cfg_attr(target_arch = "aarch64", allow(dead_code))]
fn matmul_rows_portable(lhs: &[f32], rhs: &[f32], out: &mut [f32], n: usize) {
    for i in 0..n {
        let c_row = &mut out[i * n..(i + 1) * n];
        for k in 0..n {
            let a_ik = lhs[i * n + k];
            let b_row = &rhs[k * n..(k + 1) * n];
            for (c, b) in c_row.iter_mut().zip(b_row) {
                *c += a_ik * b;
            }
        }
    }
}

#[cfg(target_arch = "x86_64")]
mod x86 {
    use std::arch::x86_64::*;

    const LANES: usize = 8;

    #[target_feature(enable = "avx")]
    pub unsafe fn matmul_avx(lhs: &[f32], rhs: &[f32], out: &mut [f32], n: usize) {
        let chunks = n / LANES;
        for i in 0..n {
            let c_row = out.as_mut_ptr().add(i * n);
            for k in 0..n {
                let a_ik = *lhs.get_unchecked(i * n + k);
                let a_vec = _mm256_set1_ps(a_ik);
                let b_row = rhs.as_ptr().add(k * n);
                for chunk in 0..chunks {
                    let offset = chunk * LANES;
                    let b_vec = _mm256_loadu_ps(b_row.add(offset));
                    let c_vec = _mm256_loadu_ps(c_row.add(offset));
                    let acc = _mm256_add_ps(c_vec, _mm256_mul_ps(a_vec, b_vec));
                    _mm256_storeu_ps(c_row.add(offset), acc);
                }
                for j in chunks * LANES..n {
                    *c_row.add(j) += a_ik * *b_row.add(j);
                }
            }
        }
    }
}

#[cfg(target_arch = "aarch64")]
mod neon {
    use std::arch::aarch64::*;

    const LANES: usize = 4;

    pub unsafe fn matmul_neon(lhs: &[f32], rhs: &[f32], out: &mut [f32], n: usize) {
        let chunks = n / LANES;
        for i in 0..n {
            let c_row = out.as_mut_ptr().add(i * n);
            for k in 0..n {
                let a_ik = *lhs.get_unchecked(i * n + k);
                let a_vec = vdupq_n_f32(a_ik);
                let b_row = rhs.as_ptr().add(k * n);
                for chunk in 0..chunks {
                    let offset = chunk * LANES;
                    let b_vec = vld1q_f32(b_row.add(offset));
                    let c_vec = vld1q_f32(c_row.add(offset));
                    // separate multiply and add keeps rounding identical to the scalar kernels
                    let acc = vaddq_f32(c_vec, vmulq_f32(a_vec, b_vec));
                    vst1q_f32(c_row.add(offset), acc);
                }
                for j in chunks * LANES..n {
                    *c_row.add(j) += a_ik * *b_row.add(j);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkloadShape;
    use crate::workload::WorkloadGenerator;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn run_kernel(kernel: &dyn Kernel, n: usize, seed: u64) -> (Array2<f32>, Vec<f32>) {
        let mut workload = WorkloadGenerator::seeded(seed)
            .generate(WorkloadShape::matmul(n))
            .expect("workload");
        let a = workload.matrix_view(&workload.inputs()[0]).unwrap().to_owned();
        let b = workload.matrix_view(&workload.inputs()[1]).unwrap().to_owned();
        let (inputs, output) = workload.split_mut();
        kernel.run(&inputs, output).expect("kernel run");
        (a.dot(&b), workload.output().as_f32().unwrap().to_vec())
    }

    #[test]
    fn every_variant_matches_ndarray_product() {
        let blocked = BlockedMatmul::new();
        let kernels: [&dyn Kernel; 3] = [&ReferenceMatmul, &blocked, &SimdMatmul];
        for kernel in kernels {
            for n in [1, 3, 4, 9, 33, 70] {
                let (expected, actual) = run_kernel(kernel, n, 42);
                for (idx, value) in actual.iter().enumerate() {
                    assert_abs_diff_eq!(*value, expected[(idx / n, idx % n)], epsilon = 1e-3);
                }
            }
        }
    }

    #[test]
    fn output_is_accumulated_not_overwritten() {
        let mut workload = WorkloadGenerator::sequential()
            .generate(WorkloadShape::matmul(2))
            .unwrap();
        let (inputs, output) = workload.split_mut();
        output.f32_mut().unwrap().fill(1.0);
        ReferenceMatmul.run(&inputs, output).unwrap();
        // A = B = [[0, 1], [2, 3]] so A * B = [[2, 3], [6, 11]]
        assert_eq!(workload.output().as_f32().unwrap(), &[3.0, 4.0, 7.0, 12.0]);
    }

    #[test]
    fn tiny_tiles_still_cover_the_matrix() {
        let kernel = BlockedMatmul::with_config(MatmulTilingConfig {
            tile_m: 1,
            tile_n: 3,
            tile_k: 2,
        });
        let (expected, actual) = run_kernel(&kernel, 7, 3);
        for (idx, value) in actual.iter().enumerate() {
            assert_abs_diff_eq!(*value, expected[(idx / 7, idx % 7)], epsilon = 1e-4);
        }
    }
}
