//! CLI wiring for the cyclebench binary.

use crate::config::{HarnessOptions, SweepConfig, DEFAULT_CACHE_SWEEP_KB};
use crate::report::{self, BlockTrace, SweepReport};
use crate::runner::{Measurement, Runner, SweepObserver};
use crate::timer::Timer;
use anyhow::Result;
use clap::builder::RangedU64ValueParser;
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use cyclebench_kernels::{
    simd_level, BenchError, Capability, FillPolicy, KernelRegistry, Workload,
    WorkloadGenerator, WorkloadShape, DEFAULT_RMW_STEPS,
};
use std::io::Write;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "cyclebench",
    version,
    about = "Cycle-accurate micro-benchmarks for small numeric kernels and cache behaviour"
)]
pub struct Cli {
    /// Print measurements as JSON instead of text lines.
    #[arg(long, global = true)]
    pub json: bool,

    /// Time with the monotonic clock even when a cycle counter is available.
    #[arg(long, global = true)]
    pub monotonic: bool,

    /// Timed invocations per kernel; ticks are summed.
    #[arg(long, global = true, default_value_t = 1, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    pub repeat: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Walk a working set of the given size with a read-modify-write loop.
    Cache {
        /// Working-set size in kilobytes.
        #[arg(value_name = "KB", value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
        kb: usize,
        #[arg(long, default_value_t = DEFAULT_RMW_STEPS)]
        steps: u64,
        /// Restrict to these kernels (the reference always runs).
        #[arg(long = "kernel")]
        kernels: Vec<String>,
    },
    /// Copy 512-byte blocks between two buffers.
    Memcpy {
        /// Number of 512-byte blocks to copy.
        #[arg(value_name = "ITERATIONS", value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
        blocks: usize,
        /// Also time every block copy individually.
        #[arg(long)]
        trace: bool,
        #[arg(long = "kernel")]
        kernels: Vec<String>,
    },
    /// Multiply two N x N single-precision matrices.
    Matmul {
        #[arg(value_name = "N", default_value_t = 4, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
        n: usize,
        /// Fill inputs pseudo-randomly from this seed instead of counting up.
        #[arg(long)]
        seed: Option<u64>,
        /// Print the input matrices and every kernel's product.
        #[arg(long)]
        print: bool,
        #[arg(long = "kernel")]
        kernels: Vec<String>,
    },
    /// Add two 16-bit integer vectors elementwise.
    VectorAdd {
        #[arg(value_name = "LEN", default_value_t = 256, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
        len: usize,
        /// Print every kernel's output, one element per line.
        #[arg(long)]
        print: bool,
        #[arg(long = "kernel")]
        kernels: Vec<String>,
    },
    /// Cache-pressure sweep across working-set sizes.
    Sweep {
        /// Working-set sizes in kilobytes.
        #[arg(
            long,
            value_delimiter = ',',
            default_values_t = DEFAULT_CACHE_SWEEP_KB,
            value_parser = RangedU64ValueParser::<usize>::new().range(1..)
        )]
        sizes: Vec<usize>,
        #[arg(long, default_value_t = DEFAULT_RMW_STEPS)]
        steps: u64,
        #[arg(long = "kernel")]
        kernels: Vec<String>,
    },
}

impl Command {
    fn sweep_config(&self) -> SweepConfig {
        match self {
            Command::Cache { kb, steps, .. } => {
                SweepConfig::new(Capability::ModifyInPlace, vec![*kb]).with_steps(*steps)
            }
            Command::Memcpy { blocks, .. } => SweepConfig::new(Capability::MemoryCopy, vec![*blocks]),
            Command::Matmul { n, seed, .. } => {
                let fill = seed.map_or(FillPolicy::Sequential, FillPolicy::Seeded);
                SweepConfig::new(Capability::MatrixMultiply, vec![*n]).with_fill(fill)
            }
            Command::VectorAdd { len, .. } => SweepConfig::new(Capability::VectorAdd, vec![*len]),
            Command::Sweep { sizes, steps, .. } => {
                SweepConfig::new(Capability::ModifyInPlace, sizes.clone()).with_steps(*steps)
            }
        }
    }

    fn kernel_filter(&self) -> &[String] {
        match self {
            Command::Cache { kernels, .. }
            | Command::Memcpy { kernels, .. }
            | Command::Matmul { kernels, .. }
            | Command::VectorAdd { kernels, .. }
            | Command::Sweep { kernels, .. } => kernels,
        }
    }

    fn print_buffers(&self) -> bool {
        matches!(
            self,
            Command::Matmul { print: true, .. } | Command::VectorAdd { print: true, .. }
        )
    }
}

/// Exit status for a rejected command line: 0 for `--help` / `--version`,
/// 1 for everything else.
pub fn usage_exit_code(err: &clap::Error) -> u8 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

pub fn run_cli(cli: Cli) -> Result<()> {
    let _ = tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(cli, &mut out)
}

/// Run one command, writing the report to `out`.
pub fn execute(cli: Cli, out: &mut dyn Write) -> Result<()> {
    let Cli {
        json,
        monotonic,
        repeat,
        command,
    } = cli;
    let options = HarnessOptions {
        json,
        force_monotonic: monotonic,
        iterations: repeat,
    };

    let config = command
        .sweep_config()
        .with_iterations(options.iterations());
    let registry = KernelRegistry::with_default_kernels()?.select(config.capability, command.kernel_filter())?;
    let timer = if options.force_monotonic {
        Timer::monotonic()
    } else {
        Timer::detect()
    };
    info!(
        command = %config.capability,
        kernels = registry.len(),
        timer = timer.source_name(),
        simd = ?simd_level(),
        "running benchmark"
    );

    let mut runner = Runner::new(registry, timer);
    let measurements = if command.print_buffers() && !options.json {
        let mut printer = BufferPrinter { out: &mut *out };
        runner.run_sweep_observed(&config, &mut printer)?
    } else {
        runner.run_sweep(&config)?
    };

    let mut report = SweepReport::new(
        config.capability,
        runner.timer().source_name(),
        runner.timer().precision(),
        runner.timer().ticks_per_second(),
        measurements,
    );

    if let Command::Memcpy {
        blocks,
        trace: true,
        ..
    } = &command
    {
        let mut workload = WorkloadGenerator::new(config.fill).generate(WorkloadShape::memory_copy(*blocks))?;
        let kernels: Vec<_> = runner.registry().kernels().to_vec();
        for kernel in kernels {
            let samples = runner.trace_block_copies(kernel.as_ref(), &mut workload)?;
            report.block_trace.push(BlockTrace {
                kernel: kernel.name().to_string(),
                samples,
            });
        }
    }

    if options.json {
        writeln!(out, "{}", report.to_json()?)?;
        return Ok(());
    }

    let cache_style = matches!(command, Command::Cache { .. } | Command::Sweep { .. });
    for measurement in &report.measurements {
        let line = if cache_style {
            report::cache_line(measurement)
        } else {
            report::measurement_line(measurement)
        };
        writeln!(out, "{line}")?;
    }
    for trace in &report.block_trace {
        writeln!(out, "{}:", trace.kernel)?;
        for sample in &trace.samples {
            writeln!(out, "{}", report::block_copy_line(sample))?;
        }
    }
    writeln!(out, "{}", report.summary())?;
    Ok(())
}

/// True when `err` rejects command-line input discovered after parsing,
/// such as an unknown `--kernel` name.
pub fn is_usage_error(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<BenchError>(), Some(BenchError::Usage(_)))
}

/// True when `err` came from a failed buffer allocation.
pub fn is_allocation_error(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<BenchError>(),
        Some(BenchError::Allocation { .. })
    )
}

/// Prints input and output buffers between timed runs.
struct BufferPrinter<'w> {
    out: &'w mut dyn Write,
}

impl SweepObserver for BufferPrinter<'_> {
    fn on_workload(&mut self, workload: &Workload) -> Result<()> {
        for (label, input) in ["A", "B"].iter().zip(workload.inputs()) {
            if let Some(matrix) = workload.matrix_view(input) {
                write!(self.out, "{label} =\n{}", report::matrix_grid(matrix))?;
            }
        }
        Ok(())
    }

    fn on_measurement(&mut self, measurement: &Measurement, workload: &Workload) -> Result<()> {
        let output = workload.output();
        if let Some(matrix) = workload.matrix_view(output) {
            write!(
                self.out,
                "Using {}, C =\n{}",
                measurement.kernel,
                report::matrix_grid(matrix)
            )?;
        } else if let Some(values) = output.as_i16() {
            writeln!(self.out, "Using {}:", measurement.kernel)?;
            write!(self.out, "{}", report::vector_lines(values))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("cyclebench").chain(args.iter().copied()))
    }

    fn run(args: &[&str]) -> String {
        let cli = parse(args).expect("valid arguments");
        let mut out = Vec::new();
        execute(cli, &mut out).expect("command succeeds");
        String::from_utf8(out).expect("utf-8 output")
    }

    #[test]
    fn missing_or_invalid_arguments_are_usage_errors() {
        for args in [
            &["cache"][..],
            &["cache", "lots"],
            &["cache", "0"],
            &["memcpy"],
            &["matmul", "-3"],
            &["frobnicate"],
            &["sweep", "--sizes", "16,0"],
            &["sweep", "--sizes", "16,,32"],
        ] {
            let err = parse(args).unwrap_err();
            assert_eq!(usage_exit_code(&err), 1, "{args:?}");
        }
    }

    #[test]
    fn help_and_version_exit_cleanly() {
        assert_eq!(usage_exit_code(&parse(&["--help"]).unwrap_err()), 0);
        assert_eq!(usage_exit_code(&parse(&["--version"]).unwrap_err()), 0);
    }

    #[test]
    fn defaults_match_the_classic_programs() {
        let cli = parse(&["matmul"]).unwrap();
        assert!(matches!(cli.command, Command::Matmul { n: 4, seed: None, print: false, .. }));
        let cli = parse(&["vector-add"]).unwrap();
        assert!(matches!(cli.command, Command::VectorAdd { len: 256, .. }));
        let cli = parse(&["sweep", "--sizes", "16,32"]).unwrap();
        assert!(matches!(&cli.command, Command::Sweep { sizes, steps, .. }
            if sizes == &[16, 32] && *steps == DEFAULT_RMW_STEPS));
    }

    #[test]
    fn vector_add_prints_every_kernel() {
        let out = run(&["--monotonic", "vector-add", "8", "--print"]);
        assert!(out.contains("Using vadd-reference:\n0\n2\n4\n"));
        assert!(out.contains("vadd-simd: n=8 ns="));
        assert!(out.trim_end().ends_with("3 measurements, all verified (monotonic timer)"));
    }

    #[test]
    fn matmul_print_shows_inputs_and_products() {
        let out = run(&["--monotonic", "matmul", "2", "--print", "--kernel", "mm-blocked"]);
        assert!(out.starts_with("A =\n  0.00   1.00 \n  2.00   3.00 \n\n"));
        assert!(out.contains("Using mm-blocked, C =\n  2.00   3.00 \n  6.00  11.00 \n\n"));
        assert!(!out.contains("mm-simd"));
    }

    #[test]
    fn cache_prints_seconds_per_kernel() {
        let out = run(&["--monotonic", "cache", "16", "--steps", "4096"]);
        let lines: Vec<_> = out.lines().collect();
        assert!(lines[0].starts_with("rmw-reference [16KB]: "));
        assert!(lines[0].ends_with(" sec."));
        assert!(lines[1].starts_with("rmw-wrapped [16KB]: "));
    }

    #[test]
    fn memcpy_trace_emits_block_lines() {
        let out = run(&["--monotonic", "memcpy", "2", "--trace", "--kernel", "memcpy-slice"]);
        assert!(out.contains("memcpy-slice:\nCopied 512 bytes (Total 512 bytes), cycles used: "));
        assert!(out.contains("Copied 512 bytes (Total 1024 bytes), cycles used: "));
    }

    #[test]
    fn json_output_is_a_single_document() {
        let out = run(&["--monotonic", "--json", "vector-add", "4"]);
        let report: SweepReport = serde_json::from_str(&out).unwrap();
        assert_eq!(report.measurements.len(), 3);
        assert_eq!(report.failures(), 0);
    }

    #[test]
    fn unknown_kernel_is_a_usage_error() {
        let cli = parse(&["vector-add", "--kernel", "vadd-quantum"]).unwrap();
        let mut out = Vec::new();
        let err = execute(cli, &mut out).unwrap_err();
        assert!(is_usage_error(&err));
        assert!(!is_allocation_error(&err));
        assert!(out.is_empty());
    }

    #[test]
    fn impossible_block_count_is_an_allocation_error() {
        let cli = parse(&["--monotonic", "memcpy", &usize::MAX.to_string()]).unwrap();
        let err = execute(cli, &mut Vec::new()).unwrap_err();
        assert!(is_allocation_error(&err));
        assert!(!is_usage_error(&err));
    }
}
