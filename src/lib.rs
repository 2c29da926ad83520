//! Core library for inkflow: an interactive incompressible-fluid toy.
//!
//! The solver is the classic stable-fluids pipeline: semi-Lagrangian
//! advection of velocity and dye, pointer-driven Gaussian splats, a
//! fixed-count Jacobi pressure solve, and a gradient subtraction that keeps
//! the velocity field (approximately) divergence-free.

pub mod app;
pub mod config;
pub mod error;
pub mod export;
pub mod grid;
pub mod input;
pub mod kernels;
pub mod metrics;
pub mod pipeline;
pub mod state;

#[cfg(feature = "gpu")]
pub mod gpu;

pub use app::FluidApp;
pub use config::SimConfig;
pub use error::SimError;
pub use export::ImageExporter;
pub use grid::{DoubleBuffer, Field, FilterMode};
pub use input::{PointerInputModel, SplatRequest};
pub use metrics::FluidMetrics;
pub use pipeline::SolverPipeline;
pub use state::FluidState;

#[cfg(feature = "gpu")]
pub use gpu::GpuSolverPipeline;
