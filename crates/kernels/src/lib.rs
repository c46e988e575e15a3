//! Kernel families and workload plumbing for cyclebench.
//!
//! Every operation ships a trusted reference variant plus hand-tuned scalar
//! and SIMD variants. They share one calling contract ([`Kernel`]) over a
//! generated [`Workload`], so the harness can time and verify any of them
//! against identical inputs.

pub mod config;
pub mod error;
pub mod kernel;
pub mod matmul;
pub mod memory;
pub mod registry;
pub mod rmw;
pub mod utils;
pub mod vector;
pub mod workload;

pub use config::*;
pub use error::BenchError;
pub use kernel::*;
pub use matmul::*;
pub use memory::*;
pub use registry::*;
pub use rmw::*;
pub use utils::*;
pub use vector::*;
pub use workload::*;
