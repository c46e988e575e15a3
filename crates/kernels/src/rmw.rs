//! Cache-pressure read-modify-write loops.
//!
//! Each step loads one `i32`, multiplies it by ten and divides it back,
//! walking the working set cyclically. The working set size decides whether
//! the traffic stays in cache; the trip count is fixed by the shape.

use crate::config::{Capability, KernelVariant};
use crate::kernel::Kernel;
use crate::utils::rmw_operands;
use crate::workload::{Buffer, KernelInputs};
use anyhow::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceRmw;

impl Kernel for ReferenceRmw {
    fn name(&self) -> &'static str {
        "rmw-reference"
    }

    fn capability(&self) -> Capability {
        Capability::ModifyInPlace
    }

    fn variant(&self) -> KernelVariant {
        KernelVariant::Reference
    }

    fn run(&self, inputs: &KernelInputs<'_>, output: &mut Buffer) -> Result<()> {
        let data = rmw_operands(inputs, output)?;
        let len = data.len() as u64;
        for step in 0..inputs.shape.steps {
            let idx = (step % len) as usize;
            data[idx] = data[idx].wrapping_mul(10);
            data[idx] /= 10;
        }
        Ok(())
    }
}

/// Same access pattern with a running index instead of a modulo per step.
#[derive(Debug, Default, Clone, Copy)]
pub struct WrappedRmw;

impl Kernel for WrappedRmw {
    fn name(&self) -> &'static str {
        "rmw-wrapped"
    }

    fn capability(&self) -> Capability {
        Capability::ModifyInPlace
    }

    fn variant(&self) -> KernelVariant {
        KernelVariant::OptimizedScalar
    }

    fn run(&self, inputs: &KernelInputs<'_>, output: &mut Buffer) -> Result<()> {
        let data = rmw_operands(inputs, output)?;
        let mut remaining = inputs.shape.steps;
        while remaining > 0 {
            let span = remaining.min(data.len() as u64) as usize;
            for value in &mut data[..span] {
                *value = value.wrapping_mul(10);
                *value /= 10;
            }
            remaining -= span as u64;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkloadShape;
    use crate::workload::WorkloadGenerator;

    #[test]
    fn zeroed_working_set_stays_zero() {
        let kernels: [&dyn Kernel; 2] = [&ReferenceRmw, &WrappedRmw];
        for kernel in kernels {
            let mut workload = WorkloadGenerator::sequential()
                .generate(WorkloadShape::modify_in_place(4, 10_000))
                .unwrap();
            let (inputs, output) = workload.split_mut();
            kernel.run(&inputs, output).unwrap();
            assert!(workload.output().as_i32().unwrap().iter().all(|v| *v == 0));
        }
    }

    #[test]
    fn variants_agree_on_partial_final_lap() {
        let mut expected = Buffer::I32((0..1024).map(|i| i * 1_000_000).collect());
        let mut actual = expected.clone();
        let shape = WorkloadShape::modify_in_place(4, 1024 * 2 + 17);
        let inputs = KernelInputs::new(shape, &[]);
        ReferenceRmw.run(&inputs, &mut expected).unwrap();
        WrappedRmw.run(&inputs, &mut actual).unwrap();
        assert_eq!(expected, actual);
        // values above i32::MAX / 10 wrap on the multiply and do not come back
        assert_ne!(expected.as_i32().unwrap()[1000], 1_000_000_000);
    }
}
