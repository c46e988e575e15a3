//! Timing, verification and sweep orchestration for cyclebench kernels.

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod report;
pub mod runner;
pub mod timer;
pub mod verifier;

#[cfg(feature = "cli")]
pub use cli::*;
pub use config::*;
pub use report::*;
pub use runner::*;
pub use timer::*;
pub use verifier::*;
