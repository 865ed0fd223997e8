//! Simulation builder and runner.

use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use crate::error::{GridError, SimulationError};
use crate::gpu::{ClothGpu, DeviceManager, MeshTopology};
use crate::grid::{build_grid, ClothGrid, Neighborhood, PinPolicy};
use crate::headless::HeadlessCloth;
use crate::input::{Control, OrbitInput};
use crate::scheduler::FrameScheduler;
use crate::state::{SimState, StateStore};
use crate::strategy::StrategyKind;
use crate::uniforms::{Drive, SimParams};

/// Resolved configuration for one cloth.
#[derive(Clone, Debug)]
pub struct SimConfig {
    /// Particles per side. Default 32.
    pub grid_size: u32,
    /// Rest distance between structural neighbours. Default 0.05.
    pub spacing: f32,
    /// Initial strategy. Default PBD.
    pub strategy: StrategyKind,
    /// Initial gravity flag. Default on.
    pub gravity: bool,
    /// Constraint iterations per frame, clamped to 1..=8. Default 4.
    pub iterations: u32,
    /// Default: the two top corners.
    pub pin_policy: PinPolicy,
    /// Default: structural plus shear links.
    pub neighborhood: Neighborhood,
    /// Default: triangles.
    pub topology: MeshTopology,
    /// Optional oscillating vertex. Its particle is pinned automatically.
    pub drive: Option<Drive>,
    /// Kernel text replacing a built-in strategy.
    pub kernels: Vec<(StrategyKind, String)>,
    pub title: String,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            grid_size: 32,
            spacing: 0.05,
            strategy: StrategyKind::Pbd,
            gravity: true,
            iterations: 4,
            pin_policy: PinPolicy::TopCorners,
            neighborhood: Neighborhood::Shear,
            topology: MeshTopology::Triangles,
            drive: None,
            kernels: Vec::new(),
            title: "Drape".to_string(),
        }
    }
}

impl SimConfig {
    pub fn build_grid(&self) -> Result<ClothGrid, GridError> {
        let mut grid = build_grid(self.grid_size, self.spacing, &self.pin_policy, self.neighborhood)?;
        if let Some(drive) = self.drive {
            grid.pin(drive.index)?;
        }
        Ok(grid)
    }

    pub fn params(&self) -> SimParams {
        SimParams::new(self.grid_size, self.spacing)
            .with_gravity(self.gravity)
            .with_iterations(self.iterations)
            .with_drive(self.drive)
    }

    /// A state store holding the initial strategy and gravity flag.
    pub fn state_store(&self) -> StateStore {
        StateStore::new(SimState {
            strategy: self.strategy,
            gravity: self.gravity,
        })
    }

    pub fn scheduler(&self) -> FrameScheduler {
        FrameScheduler::new(self.params(), self.strategy)
    }
}

/// A cloth simulation builder.
///
/// Use method chaining to configure, then call `.run()` to open a window, or
/// `.headless()` to step on the GPU without one.
///
/// ```ignore
/// Simulation::new()
///     .with_grid_size(48)
///     .with_strategy(StrategyKind::MassSpring)
///     .with_iterations(6)
///     .run()?;
/// ```
#[derive(Clone, Debug, Default)]
pub struct Simulation {
    config: SimConfig,
}

impl Simulation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grid_size(mut self, n: u32) -> Self {
        self.config.grid_size = n;
        self
    }

    pub fn with_spacing(mut self, spacing: f32) -> Self {
        self.config.spacing = spacing;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn with_gravity(mut self, enabled: bool) -> Self {
        self.config.gravity = enabled;
        self
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.config.iterations = iterations;
        self
    }

    pub fn with_pin_policy(mut self, policy: PinPolicy) -> Self {
        self.config.pin_policy = policy;
        self
    }

    pub fn with_neighborhood(mut self, neighborhood: Neighborhood) -> Self {
        self.config.neighborhood = neighborhood;
        self
    }

    pub fn with_topology(mut self, topology: MeshTopology) -> Self {
        self.config.topology = topology;
        self
    }

    /// Oscillate particle `index` along Z. The particle is pinned.
    pub fn with_drive(mut self, index: u32, amplitude: f32, frequency: f32) -> Self {
        self.config.drive = Some(Drive {
            index,
            amplitude,
            frequency,
        });
        self
    }

    /// Replace the built-in kernel of `kind` with `source`.
    pub fn with_kernel(mut self, kind: StrategyKind, source: impl Into<String>) -> Self {
        self.config.kernels.push((kind, source.into()));
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.config.title = title.into();
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Step the cloth on a surface-less device.
    pub fn headless(self) -> Result<HeadlessCloth, SimulationError> {
        HeadlessCloth::new(self.config)
    }

    /// Open a window and run until it is closed.
    pub fn run(self) -> Result<(), SimulationError> {
        let grid = self.config.build_grid()?;

        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Wait);

        let mut app = App::new(self.config, grid);
        event_loop.run_app(&mut app)?;

        match app.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

struct App {
    config: SimConfig,
    grid: ClothGrid,
    window: Option<Arc<Window>>,
    devices: DeviceManager,
    gpu: Option<ClothGpu>,
    scheduler: FrameScheduler,
    store: StateStore,
    orbit: OrbitInput,
    error: Option<SimulationError>,
}

impl App {
    fn new(config: SimConfig, grid: ClothGrid) -> Self {
        let scheduler = config.scheduler();
        let mut store = config.state_store();
        scheduler.subscribe(&mut store);

        Self {
            config,
            grid,
            window: None,
            devices: DeviceManager::new(),
            gpu: None,
            scheduler,
            store,
            orbit: OrbitInput::default(),
            error: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<(), SimulationError> {
        let window_attrs = Window::default_attributes()
            .with_title(self.title())
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));
        let window = Arc::new(event_loop.create_window(window_attrs)?);
        self.window = Some(window.clone());

        let ctx = self.devices.init(window.clone())?;
        let mut gpu = ClothGpu::new(ctx, &self.grid, self.config.topology, self.scheduler.params())?;
        for (kind, source) in &self.config.kernels {
            gpu.set_kernel_source(*kind, source.clone());
        }
        self.scheduler.start(&mut gpu.backend(ctx))?;
        self.gpu = Some(gpu);

        window.request_redraw();
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: SimulationError) {
        log::error!("{}", err);
        self.scheduler.stop();
        self.error = Some(err);
        event_loop.exit();
    }

    fn title(&self) -> String {
        let state = self.store.state();
        format!(
            "{} [{}, gravity {}{}]",
            self.config.title,
            state.strategy,
            if state.gravity { "on" } else { "off" },
            if self.scheduler.time().is_paused() { ", paused" } else { "" }
        )
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(gpu), Some(ctx)) = (&mut self.gpu, self.devices.get_mut()) else {
            return;
        };
        let result = self.scheduler.tick(&mut gpu.backend(ctx));
        if let Err(err) = result {
            self.fail(event_loop, err.into());
            return;
        }
        if self.scheduler.is_running() {
            if let Some(window) = &self.window {
                window.request_redraw();
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(err) = self.init(event_loop) {
                self.fail(event_loop, err);
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(control) = Control::from_event(&event) {
            control.apply(&mut self.store, &mut self.scheduler);
            if let Some(window) = &self.window {
                window.set_title(&self.title());
            }
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.scheduler.stop();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let (Some(gpu), Some(ctx)) = (&mut self.gpu, self.devices.get_mut()) {
                    gpu.resize(ctx, size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            ref other => {
                if let Some(gpu) = &mut self.gpu {
                    self.orbit.handle_event(other, &mut gpu.camera);
                }
            }
        }
    }
}
