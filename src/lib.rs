//! # Drape - GPU cloth simulation
//!
//! A cloth is an `n × n` grid of particles stepped by compute kernels and drawn
//! from the same buffers every frame. Drape handles the GPU plumbing (ping-pong
//! position buffers, precomputed bind groups, dispatch order, pipeline caching)
//! so a cloth is a few builder calls.
//!
//! ## Quick Start
//!
//! ```ignore
//! use drape::prelude::*;
//!
//! fn main() -> Result<(), SimulationError> {
//!     Simulation::new()
//!         .with_grid_size(40)
//!         .with_strategy(StrategyKind::MassSpring)
//!         .with_iterations(6)
//!         .with_pin_policy(PinPolicy::TopEdge)
//!         .run()
//! }
//! ```
//!
//! ## Frame Anatomy
//!
//! Every frame the [`FrameScheduler`](scheduler::FrameScheduler):
//!
//! 1. uploads the [`SimParams`] block (time, gravity, grid, drive),
//! 2. runs one integration sweep from the current buffer into the next,
//! 3. for Mass-Spring, runs constraint iterations as pairs of sweeps that end
//!    back in the next buffer,
//! 4. renders the next buffer and swaps the two.
//!
//! ## Strategies
//!
//! | Strategy | Kernel | Selector |
//! |----------|--------|----------|
//! | [`StrategyKind::Pbd`] | Blend each particle's displacement toward its neighbours' | `pbd`, key `1` |
//! | [`StrategyKind::MassSpring`] | Relax grid edges toward rest length | `massSpring`, key `2` |
//!
//! Changing strategy (or gravity) goes through the [`StateStore`]; the
//! scheduler rebuilds the pipeline once, at the start of the next frame.
//!
//! ## Headless Runs
//!
//! [`Simulation::headless`] steps the same kernels without a window, and
//! [`cpu::CpuCloth`] runs the same arithmetic on the CPU for comparison.

pub mod cpu;
pub mod error;
pub mod gpu;
pub mod grid;
mod headless;
pub mod input;
pub mod layout;
pub mod scheduler;
pub mod shader;
mod simulation;
pub mod state;
pub mod strategy;
pub mod time;
pub mod uniforms;

pub use glam::{Vec3, Vec4};

pub use error::{FrameError, GpuError, GridError, ListenerError, SimulationError};
pub use gpu::MeshTopology;
pub use grid::{build_grid, ClothGrid, Neighborhood, PinPolicy};
pub use headless::{HeadlessCloth, HEADLESS_DT};
pub use layout::ParticleGpu;
pub use simulation::{SimConfig, Simulation};
pub use state::{Event, EventKind, StateStore};
pub use strategy::StrategyKind;
pub use uniforms::SimParams;

/// Convenient re-exports for common usage.
///
/// ```ignore
/// use drape::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cpu::CpuCloth;
    pub use crate::error::SimulationError;
    pub use crate::gpu::MeshTopology;
    pub use crate::grid::{build_grid, ClothGrid, Neighborhood, PinPolicy};
    pub use crate::simulation::{SimConfig, Simulation};
    pub use crate::state::{Event, EventKind, StateStore};
    pub use crate::strategy::StrategyKind;
    pub use crate::time::Time;
    pub use crate::uniforms::SimParams;
    pub use crate::{Vec3, Vec4};
}
