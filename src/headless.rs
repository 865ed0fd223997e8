//! Stepping the cloth on a GPU without a window.
//!
//! Used for verification and batch runs: same buffers, kernels and scheduler
//! as the windowed app, no surface and no render pass. The clock runs at a
//! fixed 60 Hz so runs are reproducible.

use crate::error::{GpuError, SimulationError};
use crate::gpu::{ClothGpu, DeviceManager};
use crate::grid::ClothGrid;
use crate::layout::ParticleGpu;
use crate::scheduler::{FrameScheduler, FrameStats, TickOutcome};
use crate::simulation::SimConfig;
use crate::state::StateStore;
use crate::time::Time;

/// Fixed time step of headless runs, in seconds.
pub const HEADLESS_DT: f32 = 1.0 / 60.0;

pub struct HeadlessCloth {
    grid: ClothGrid,
    devices: DeviceManager,
    gpu: ClothGpu,
    scheduler: FrameScheduler,
    store: StateStore,
}

impl HeadlessCloth {
    /// Build the grid, acquire a device and compile the initial strategy.
    pub fn new(config: SimConfig) -> Result<Self, SimulationError> {
        let grid = config.build_grid()?;
        let mut devices = DeviceManager::new();
        let ctx = devices.init_headless()?;

        let mut scheduler = config.scheduler().with_clock(Time::fixed(HEADLESS_DT));
        let mut store = config.state_store();
        scheduler.subscribe(&mut store);

        let mut gpu = ClothGpu::new(ctx, &grid, config.topology, scheduler.params())?;
        for (kind, source) in config.kernels {
            gpu.set_kernel_source(kind, source);
        }
        scheduler.start(&mut gpu.backend(ctx))?;

        Ok(Self {
            grid,
            devices,
            gpu,
            scheduler,
            store,
        })
    }

    pub fn grid(&self) -> &ClothGrid {
        &self.grid
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    /// Strategy and gravity changes made here apply on the next step.
    pub fn store_mut(&mut self) -> &mut StateStore {
        &mut self.store
    }

    pub fn request_reset(&self) {
        self.scheduler.request_reset();
    }

    /// Submit one frame. Does not wait for the GPU.
    pub fn step(&mut self) -> Result<TickOutcome, GpuError> {
        let ctx = self.devices.get_mut().ok_or(GpuError::NoAdapter)?;
        self.scheduler.tick(&mut self.gpu.backend(ctx))
    }

    /// Submit `frames` frames and return the scheduler's counters.
    pub fn run(&mut self, frames: u32) -> Result<FrameStats, GpuError> {
        for _ in 0..frames {
            self.step()?;
        }
        Ok(self.scheduler.stats())
    }

    /// Read the current position buffer back. Waits for submitted frames.
    pub fn positions(&self) -> Result<Vec<ParticleGpu>, GpuError> {
        let ctx = self.devices.get().ok_or(GpuError::NoAdapter)?;
        self.gpu.read_positions(ctx, self.scheduler.current_index())
    }
}
