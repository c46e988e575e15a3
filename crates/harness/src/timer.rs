//! Tick sources and the bracketing timer.
//!
//! A [`Timer`] brackets a region with `start()` / `stop()` and reports the
//! ticks in between. Ticks come from a [`TickSource`]: the CPU cycle counter
//! where one is usable, otherwise the monotonic wall clock.

use cyclebench_kernels::BenchError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// How long hardware counters are sampled against `Instant` to learn their rate.
pub const CALIBRATION_WINDOW: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Precision {
    /// Processor cycle counter.
    Cycle,
    /// Monotonic wall clock, nanosecond ticks.
    Wall,
}

pub trait TickSource: Send + Sync {
    fn name(&self) -> &'static str;
    fn now(&self) -> u64;
    fn precision(&self) -> Precision;
    fn ticks_per_second(&self) -> f64;

    /// Width of the raw counter; readings wrap at `2^counter_bits`.
    fn counter_bits(&self) -> u32 {
        64
    }
}

/// Nanoseconds since the source was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for MonotonicClock {
    fn name(&self) -> &'static str {
        "monotonic"
    }

    fn now(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    fn precision(&self) -> Precision {
        Precision::Wall
    }

    fn ticks_per_second(&self) -> f64 {
        1.0e9
    }
}

/// x86_64 time-stamp counter.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Clone, Copy)]
pub struct Tsc {
    ticks_per_second: f64,
}

#[cfg(target_arch = "x86_64")]
impl Tsc {
    pub fn detect() -> Option<Self> {
        if !is_x86_feature_detected!("tsc") || !is_x86_feature_detected!("sse2") {
            return None;
        }
        if !has_invariant_tsc() {
            warn!("time-stamp counter rate varies with power state");
            return None;
        }
        let ticks_per_second = calibrate(read_tsc, CALIBRATION_WINDOW)?;
        Some(Self { ticks_per_second })
    }
}

/// CPUID leaf 0x8000_0007, EDX bit 8: the counter ticks at a constant rate
/// across P-, C- and T-states.
#[cfg(target_arch = "x86_64")]
fn has_invariant_tsc() -> bool {
    use std::arch::x86_64::__cpuid;
    // SAFETY: cpuid is available on every x86_64 processor.
    let max_extended = unsafe { __cpuid(0x8000_0000) }.eax;
    if max_extended < 0x8000_0007 {
        return false;
    }
    let edx = unsafe { __cpuid(0x8000_0007) }.edx;
    (edx >> 8) & 1 == 1
}

/// rdtsc fenced on both sides so the read is not reordered across the
/// timed region.
#[cfg(target_arch = "x86_64")]
fn read_tsc() -> u64 {
    use std::arch::x86_64::{_mm_lfence, _rdtsc};
    // SAFETY: tsc and sse2 were detected before any Tsc is constructed.
    unsafe {
        _mm_lfence();
        let ticks = _rdtsc();
        _mm_lfence();
        ticks
    }
}

#[cfg(target_arch = "x86_64")]
impl TickSource for Tsc {
    fn name(&self) -> &'static str {
        "rdtsc"
    }

    #[inline]
    fn now(&self) -> u64 {
        read_tsc()
    }

    fn precision(&self) -> Precision {
        Precision::Cycle
    }

    fn ticks_per_second(&self) -> f64 {
        self.ticks_per_second
    }
}

/// aarch64 virtual counter (`cntvct_el0`), rate from `cntfrq_el0`.
#[cfg(target_arch = "aarch64")]
#[derive(Debug, Clone, Copy)]
pub struct VirtualCounter {
    ticks_per_second: f64,
}

#[cfg(target_arch = "aarch64")]
impl VirtualCounter {
    pub fn detect() -> Option<Self> {
        let frequency: u64;
        // SAFETY: cntfrq_el0 is readable from EL0 on every aarch64 target Rust supports.
        unsafe {
            std::arch::asm!("mrs {}, cntfrq_el0", out(reg) frequency, options(nomem, nostack));
        }
        if frequency == 0 {
            return None;
        }
        Some(Self {
            ticks_per_second: frequency as f64,
        })
    }
}

#[cfg(target_arch = "aarch64")]
impl TickSource for VirtualCounter {
    fn name(&self) -> &'static str {
        "cntvct_el0"
    }

    #[inline]
    fn now(&self) -> u64 {
        let ticks: u64;
        // SAFETY: cntvct_el0 is readable from EL0; the isb keeps the read from
        // being hoisted above earlier instructions.
        unsafe {
            std::arch::asm!("isb", "mrs {}, cntvct_el0", out(reg) ticks, options(nostack));
        }
        ticks
    }

    fn precision(&self) -> Precision {
        Precision::Cycle
    }

    fn ticks_per_second(&self) -> f64 {
        self.ticks_per_second
    }
}

/// Counter rate measured against `Instant` over `window`.
#[cfg_attr(not(target_arch = "x86_64"), allow(dead_code))]
fn calibrate(read: fn() -> u64, window: Duration) -> Option<f64> {
    let clock = Instant::now();
    let start = read();
    while clock.elapsed() < window {
        std::hint::spin_loop();
    }
    let end = read();
    let seconds = clock.elapsed().as_secs_f64();
    let ticks = end.wrapping_sub(start);
    (ticks > 0 && seconds > 0.0).then(|| ticks as f64 / seconds)
}

#[cfg(target_arch = "x86_64")]
fn hardware_source() -> Option<Box<dyn TickSource>> {
    Tsc::detect().map(|tsc| Box::new(tsc) as Box<dyn TickSource>)
}

#[cfg(target_arch = "aarch64")]
fn hardware_source() -> Option<Box<dyn TickSource>> {
    VirtualCounter::detect().map(|counter| Box::new(counter) as Box<dyn TickSource>)
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn hardware_source() -> Option<Box<dyn TickSource>> {
    None
}

/// Ticks between two readings of a counter `bits` wide.
///
/// A single rollover between `start` and `end` is corrected exactly; the
/// result is never negative.
pub fn elapsed_ticks(start: u64, end: u64, bits: u32) -> u64 {
    let delta = end.wrapping_sub(start);
    if bits >= 64 {
        delta
    } else {
        delta & ((1u64 << bits) - 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Elapsed {
    pub ticks: u64,
    pub ticks_per_second: f64,
}

impl Elapsed {
    pub fn zero(ticks_per_second: f64) -> Self {
        Self {
            ticks: 0,
            ticks_per_second,
        }
    }

    pub fn seconds(&self) -> f64 {
        if self.ticks_per_second > 0.0 {
            self.ticks as f64 / self.ticks_per_second
        } else {
            0.0
        }
    }

    pub fn accumulate(self, other: Elapsed) -> Self {
        Self {
            ticks: self.ticks.saturating_add(other.ticks),
            ticks_per_second: self.ticks_per_second,
        }
    }
}

pub struct Timer {
    source: Box<dyn TickSource>,
    started: Option<u64>,
}

impl Timer {
    pub fn new(source: Box<dyn TickSource>) -> Self {
        Self {
            source,
            started: None,
        }
    }

    /// Prefer the hardware cycle counter, degrading to the monotonic clock.
    pub fn detect() -> Self {
        match hardware_source() {
            Some(source) => {
                info!(
                    source = source.name(),
                    ticks_per_second = source.ticks_per_second(),
                    "using hardware cycle counter"
                );
                Self::new(source)
            }
            None => {
                warn!("no usable cycle counter; falling back to the monotonic clock with reduced precision");
                Self::monotonic()
            }
        }
    }

    pub fn monotonic() -> Self {
        Self::new(Box::new(MonotonicClock::new()))
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    pub fn precision(&self) -> Precision {
        self.source.precision()
    }

    pub fn ticks_per_second(&self) -> f64 {
        self.source.ticks_per_second()
    }

    #[inline]
    pub fn start(&mut self) {
        self.started = Some(self.source.now());
    }

    /// Ticks since the matching `start()`.
    #[inline]
    pub fn stop(&mut self) -> Result<Elapsed, BenchError> {
        let end = self.source.now();
        let start = self.started.take().ok_or(BenchError::TimerNotStarted)?;
        Ok(Elapsed {
            ticks: elapsed_ticks(start, end, self.source.counter_bits()),
            ticks_per_second: self.source.ticks_per_second(),
        })
    }

    /// Bracket `f` and return its value with the elapsed time.
    pub fn time<T>(&mut self, f: impl FnOnce() -> T) -> (T, Elapsed) {
        let start = self.source.now();
        let value = f();
        let end = self.source.now();
        let elapsed = Elapsed {
            ticks: elapsed_ticks(start, end, self.source.counter_bits()),
            ticks_per_second: self.source.ticks_per_second(),
        };
        (value, elapsed)
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("source", &self.source.name())
            .field("precision", &self.source.precision())
            .field("running", &self.started.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Counter that advances by `step` on every read and wraps at `bits`.
    struct SteppingCounter {
        value: AtomicU64,
        step: u64,
        bits: u32,
    }

    impl TickSource for SteppingCounter {
        fn name(&self) -> &'static str {
            "stepping"
        }

        fn now(&self) -> u64 {
            let raw = self.value.fetch_add(self.step, Ordering::Relaxed);
            if self.bits >= 64 {
                raw
            } else {
                raw & ((1u64 << self.bits) - 1)
            }
        }

        fn precision(&self) -> Precision {
            Precision::Cycle
        }

        fn ticks_per_second(&self) -> f64 {
            1000.0
        }

        fn counter_bits(&self) -> u32 {
            self.bits
        }
    }

    fn stepping(start: u64, step: u64, bits: u32) -> Timer {
        Timer::new(Box::new(SteppingCounter {
            value: AtomicU64::new(start),
            step,
            bits,
        }))
    }

    #[test]
    fn narrow_counter_rollover_is_corrected() {
        let mut timer = stepping((1 << 32) - 3, 10, 32);
        timer.start();
        let elapsed = timer.stop().unwrap();
        assert_eq!(elapsed.ticks, 10);
        assert!((elapsed.seconds() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn full_width_counter_wraps_cleanly() {
        let mut timer = stepping(u64::MAX - 1, 5, 64);
        timer.start();
        assert_eq!(timer.stop().unwrap().ticks, 5);
    }

    #[test]
    fn stop_without_start_is_an_error() {
        let mut timer = Timer::monotonic();
        assert!(matches!(timer.stop(), Err(BenchError::TimerNotStarted)));
        timer.start();
        assert!(timer.stop().is_ok());
        assert!(timer.stop().is_err());
    }

    #[test]
    fn degenerate_region_is_non_negative() {
        for mut timer in [Timer::monotonic(), Timer::detect()] {
            for _ in 0..1000 {
                timer.start();
                let elapsed = timer.stop().unwrap();
                assert!(elapsed.seconds() >= 0.0);
                // a near-zero region can never read as a wrapped-around huge value
                assert!(elapsed.seconds() < 1.0);
            }
        }
    }

    #[test]
    fn time_brackets_the_closure() {
        let mut timer = Timer::monotonic();
        let (value, elapsed) = timer.time(|| {
            std::thread::sleep(Duration::from_millis(2));
            7
        });
        assert_eq!(value, 7);
        assert!(elapsed.seconds() >= 0.002);
        assert_eq!(timer.precision(), Precision::Wall);
    }

    #[test]
    fn elapsed_ticks_masks_to_counter_width() {
        assert_eq!(elapsed_ticks(0xFF, 0x01, 8), 2);
        assert_eq!(elapsed_ticks(100, 250, 64), 150);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn tsc_is_only_used_when_invariant() {
        if let Some(tsc) = Tsc::detect() {
            assert!(has_invariant_tsc());
            let first = tsc.now();
            let second = tsc.now();
            assert!(second >= first);
        }
    }
}
