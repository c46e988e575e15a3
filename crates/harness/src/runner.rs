//! Sweep orchestration: generate, execute, verify, record.

use crate::config::SweepConfig;
use crate::timer::{Elapsed, Precision, Timer};
use crate::verifier::{Verdict, Verifier};
use anyhow::{bail, ensure, Result};
use cyclebench_kernels::{
    copy_operands, BenchError, Buffer, Capability, DynKernel, Kernel, KernelRegistry,
    KernelVariant, Workload, WorkloadGenerator, COPY_BLOCK_BYTES,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepState {
    Idle,
    GeneratingWorkload,
    ExecutingKernel,
    Verifying,
    Recording,
    Done,
}

/// One kernel timed at one size. Never modified after it is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub kernel: String,
    pub variant: KernelVariant,
    pub capability: Capability,
    pub size: usize,
    pub shape: String,
    pub ticks: u64,
    pub seconds: f64,
    pub iterations: usize,
    pub precision: Precision,
    pub verdict: Verdict,
}

impl Measurement {
    pub fn passed(&self) -> bool {
        self.verdict.is_pass()
    }
}

/// One timed 512-byte block copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSample {
    pub bytes: usize,
    pub total_bytes: usize,
    pub ticks: u64,
}

/// Hooks called outside the timed region while a sweep point's buffers are
/// still alive.
pub trait SweepObserver {
    fn on_workload(&mut self, _workload: &Workload) -> Result<()> {
        Ok(())
    }

    fn on_measurement(&mut self, _measurement: &Measurement, _workload: &Workload) -> Result<()> {
        Ok(())
    }
}

impl SweepObserver for () {}

pub struct Runner {
    registry: KernelRegistry,
    timer: Timer,
    state: SweepState,
}

impl Runner {
    pub fn new(registry: KernelRegistry, timer: Timer) -> Self {
        Self {
            registry,
            timer,
            state: SweepState::Idle,
        }
    }

    pub fn registry(&self) -> &KernelRegistry {
        &self.registry
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn state(&self) -> SweepState {
        self.state
    }

    pub fn run_sweep(&mut self, config: &SweepConfig) -> Result<Vec<Measurement>> {
        self.run_sweep_observed(config, &mut ())
    }

    /// Measure every registered kernel of the configured capability at every
    /// configured size.
    ///
    /// Kernel errors and verification failures are recorded and the sweep
    /// carries on; workload generation errors abort it.
    pub fn run_sweep_observed(
        &mut self,
        config: &SweepConfig,
        observer: &mut dyn SweepObserver,
    ) -> Result<Vec<Measurement>> {
        self.transition(SweepState::Idle);
        let capability = config.capability;
        let reference = self
            .registry
            .reference_for(capability)
            .ok_or(BenchError::MissingReference(capability))?;
        let candidates: Vec<DynKernel> = self
            .registry
            .kernels_for(capability)
            .filter(|kernel| !Arc::ptr_eq(kernel, &reference))
            .cloned()
            .collect();

        info!(
            capability = %capability,
            sizes = config.sizes.len(),
            kernels = candidates.len() + 1,
            timer = self.timer.source_name(),
            "starting sweep"
        );

        let generator = WorkloadGenerator::new(config.fill);
        let verifier = Verifier::new(config.tolerance).with_max_reported(config.max_reported);
        let iterations = config.iterations.max(1);
        let mut measurements = Vec::new();

        for &size in &config.sizes {
            let shape = config.shape_for(size);
            self.transition(SweepState::GeneratingWorkload);
            let mut workload = generator.generate(shape)?;
            observer.on_workload(&workload)?;

            let mut truth: Option<Buffer> = None;
            let mut reference_failed = false;

            for kernel in std::iter::once(&reference).chain(&candidates) {
                if !kernel.supports(&shape) {
                    debug!(kernel = kernel.name(), shape = %shape, "kernel does not support shape; skipping");
                    continue;
                }
                let is_reference = Arc::ptr_eq(kernel, &reference);

                self.transition(SweepState::ExecutingKernel);
                let outcome = self.execute(kernel.as_ref(), &mut workload, iterations);

                self.transition(SweepState::Verifying);
                let (elapsed, verdict) = match outcome {
                    Err(err) => {
                        warn!(kernel = kernel.name(), error = %err, "kernel failed");
                        if is_reference {
                            reference_failed = true;
                        }
                        (
                            Elapsed::zero(self.timer.ticks_per_second()),
                            Verdict::failed(format!("kernel error: {err:#}")),
                        )
                    }
                    Ok(elapsed) if is_reference => {
                        truth = Some(workload.output().clone());
                        (elapsed, Verdict::Passed { max_abs_error: 0.0 })
                    }
                    Ok(elapsed) => match &truth {
                        Some(expected) => (elapsed, verifier.compare(expected, workload.output())),
                        None if reference_failed => {
                            (elapsed, Verdict::failed("reference kernel failed; nothing to compare against"))
                        }
                        None => (elapsed, Verdict::failed("reference kernel did not run")),
                    },
                };

                self.transition(SweepState::Recording);
                let measurement = Measurement {
                    kernel: kernel.name().to_string(),
                    variant: kernel.variant(),
                    capability,
                    size,
                    shape: shape.to_string(),
                    ticks: elapsed.ticks,
                    seconds: elapsed.seconds(),
                    iterations,
                    precision: self.timer.precision(),
                    verdict,
                };
                debug!(
                    kernel = %measurement.kernel,
                    shape = %measurement.shape,
                    ticks = measurement.ticks,
                    passed = measurement.passed(),
                    "recorded measurement"
                );
                observer.on_measurement(&measurement, &workload)?;
                measurements.push(measurement);
            }
        }

        self.transition(SweepState::Done);
        Ok(measurements)
    }

    /// Time `iterations` invocations, zeroing the output before each.
    fn execute(
        &mut self,
        kernel: &dyn Kernel,
        workload: &mut Workload,
        iterations: usize,
    ) -> Result<Elapsed> {
        let mut total = Elapsed::zero(self.timer.ticks_per_second());
        for _ in 0..iterations {
            workload.reset_output();
            let (inputs, output) = workload.split_mut();
            let (result, elapsed) = self.timer.time(|| kernel.run(&inputs, output));
            result?;
            total = total.accumulate(elapsed);
        }
        Ok(total)
    }

    /// Copy a memory-copy workload one block at a time, timing each block.
    pub fn trace_block_copies(
        &mut self,
        kernel: &dyn Kernel,
        workload: &mut Workload,
    ) -> Result<Vec<BlockSample>> {
        ensure!(
            kernel.capability() == Capability::MemoryCopy,
            "{} is not a memory-copy kernel",
            kernel.name()
        );
        let Some(copier) = kernel.as_block_copy() else {
            bail!("{} does not expose per-block copies", kernel.name());
        };

        workload.reset_output();
        let (inputs, output) = workload.split_mut();
        let (src, dst) = copy_operands(&inputs, output)?;

        let mut samples = Vec::with_capacity(dst.len() / COPY_BLOCK_BYTES);
        let mut total_bytes = 0usize;
        for (dst_block, src_block) in dst
            .chunks_mut(COPY_BLOCK_BYTES)
            .zip(src.chunks(COPY_BLOCK_BYTES))
        {
            self.timer.start();
            copier.copy_block(dst_block, src_block);
            let elapsed = self.timer.stop()?;
            total_bytes += dst_block.len();
            samples.push(BlockSample {
                bytes: dst_block.len(),
                total_bytes,
                ticks: elapsed.ticks,
            });
        }
        Ok(samples)
    }

    fn transition(&mut self, next: SweepState) {
        trace!(from = ?self.state, to = ?next, "sweep state");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::ToleranceSpec;
    use cyclebench_kernels::{KernelInputs, ReferenceVectorAdd, SliceCopy, WorkloadShape};

    /// Adds one too many to the last element.
    struct OffByOne;

    impl Kernel for OffByOne {
        fn name(&self) -> &'static str {
            "vadd-off-by-one"
        }

        fn capability(&self) -> Capability {
            Capability::VectorAdd
        }

        fn variant(&self) -> KernelVariant {
            KernelVariant::OptimizedScalar
        }

        fn run(&self, inputs: &KernelInputs<'_>, output: &mut Buffer) -> Result<()> {
            ReferenceVectorAdd.run(inputs, output)?;
            if let Some(last) = output.i16_mut()?.last_mut() {
                *last += 1;
            }
            Ok(())
        }
    }

    /// Adds one too many everywhere.
    struct OffByOneEverywhere;

    impl Kernel for OffByOneEverywhere {
        fn name(&self) -> &'static str {
            "vadd-off-everywhere"
        }

        fn capability(&self) -> Capability {
            Capability::VectorAdd
        }

        fn variant(&self) -> KernelVariant {
            KernelVariant::OptimizedScalar
        }

        fn run(&self, inputs: &KernelInputs<'_>, output: &mut Buffer) -> Result<()> {
            ReferenceVectorAdd.run(inputs, output)?;
            for value in output.i16_mut()? {
                *value = value.wrapping_add(1);
            }
            Ok(())
        }
    }

    struct Broken;

    impl Kernel for Broken {
        fn name(&self) -> &'static str {
            "vadd-broken"
        }

        fn capability(&self) -> Capability {
            Capability::VectorAdd
        }

        fn variant(&self) -> KernelVariant {
            KernelVariant::Simd
        }

        fn run(&self, _inputs: &KernelInputs<'_>, _output: &mut Buffer) -> Result<()> {
            bail!("unsupported instruction set")
        }
    }

    fn vector_runner() -> Runner {
        let mut registry = KernelRegistry::new();
        registry.register(ReferenceVectorAdd).unwrap();
        registry.register(Broken).unwrap();
        registry.register(OffByOne).unwrap();
        Runner::new(registry, Timer::monotonic())
    }

    #[test]
    fn failures_are_recorded_and_the_sweep_continues() {
        let mut runner = vector_runner();
        let config = SweepConfig::new(Capability::VectorAdd, vec![16, 32]);
        let measurements = runner.run_sweep(&config).unwrap();

        let names: Vec<_> = measurements.iter().map(|m| m.kernel.as_str()).collect();
        assert_eq!(
            names,
            [
                "vadd-reference",
                "vadd-broken",
                "vadd-off-by-one",
                "vadd-reference",
                "vadd-broken",
                "vadd-off-by-one"
            ]
        );
        assert!(measurements[0].passed());
        assert!(measurements[1].verdict.reason().unwrap().contains("unsupported instruction set"));
        assert!(!measurements[2].passed());
        assert_eq!(measurements[5].size, 32);
        assert_eq!(runner.state(), SweepState::Done);
    }

    #[test]
    fn missing_reference_fails_before_any_work() {
        let mut registry = KernelRegistry::new();
        registry.register(OffByOne).unwrap();
        let mut runner = Runner::new(registry, Timer::monotonic());

        let err = runner
            .run_sweep(&SweepConfig::new(Capability::VectorAdd, vec![usize::MAX]))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BenchError>(),
            Some(BenchError::MissingReference(Capability::VectorAdd))
        ));
    }

    #[test]
    fn iterations_are_summed_into_one_measurement() {
        let mut runner = vector_runner();
        let config = SweepConfig::new(Capability::VectorAdd, vec![8])
            .with_iterations(3)
            .with_tolerance(ToleranceSpec::exact());
        let measurements = runner.run_sweep(&config).unwrap();
        assert!(measurements.iter().all(|m| m.iterations == 3));
    }

    #[test]
    fn reported_mismatches_are_capped_by_the_config() {
        let mut registry = KernelRegistry::new();
        registry.register(ReferenceVectorAdd).unwrap();
        registry.register(OffByOneEverywhere).unwrap();
        let mut runner = Runner::new(registry, Timer::monotonic());

        let config = SweepConfig::new(Capability::VectorAdd, vec![16]).with_max_reported(1);
        let measurements = runner.run_sweep(&config).unwrap();
        match &measurements[1].verdict {
            Verdict::Failed {
                mismatches,
                total_mismatches,
                ..
            } => {
                assert_eq!(*total_mismatches, 16);
                assert_eq!(mismatches.len(), 1);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn block_trace_covers_every_block() {
        let mut runner = Runner::new(KernelRegistry::new(), Timer::monotonic());
        let mut workload = WorkloadGenerator::sequential()
            .generate(WorkloadShape::memory_copy(3))
            .unwrap();
        let samples = runner.trace_block_copies(&SliceCopy, &mut workload).unwrap();

        let totals: Vec<_> = samples.iter().map(|s| s.total_bytes).collect();
        assert_eq!(totals, [512, 1024, 1536]);
        assert!(samples.iter().all(|s| s.bytes == COPY_BLOCK_BYTES));
        assert_eq!(workload.output(), &workload.inputs()[0]);
    }

    #[test]
    fn block_trace_rejects_other_capabilities() {
        let mut runner = Runner::new(KernelRegistry::new(), Timer::monotonic());
        let mut workload = WorkloadGenerator::sequential()
            .generate(WorkloadShape::vector_add(4))
            .unwrap();
        assert!(runner
            .trace_block_copies(&ReferenceVectorAdd, &mut workload)
            .is_err());
    }
}
