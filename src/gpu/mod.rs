//! GPU side of the simulation.
//!
//! [`ClothGpu`] owns everything device-dependent for one cloth. It borrows a
//! [`GpuContext`] to become a [`FrameBackend`] for the scheduler:
//!
//! ```ignore
//! let mut backend = cloth_gpu.backend(ctx);
//! scheduler.tick(&mut backend)?;
//! ```
//!
//! With a surface, each frame acquires the swapchain texture first, records
//! the compute sweeps and the render pass into one encoder, submits and
//! presents. Without one, only the sweeps are submitted.

mod buffers;
mod camera;
mod compute;
mod context;
mod render;

pub use buffers::{check_buffer_size, check_dispatch_size, compute_bind_group_layout, DeviceResources};
pub use camera::Camera;
pub use compute::ClothCompute;
pub use context::{DeviceManager, GpuContext, HEADLESS_FORMAT};
pub use render::{ClothRenderer, MeshTopology, DEPTH_FORMAT};

use crate::error::{FrameError, GpuError};
use crate::grid::ClothGrid;
use crate::layout::ParticleGpu;
use crate::scheduler::{FrameBackend, FramePlan};
use crate::strategy::StrategyKind;
use crate::uniforms::SimParams;

/// Device resources, compute state and (when windowed) the renderer.
pub struct ClothGpu {
    resources: DeviceResources,
    compute: ClothCompute,
    renderer: Option<ClothRenderer>,
    pub camera: Camera,
}

impl ClothGpu {
    /// Allocate buffers for `grid` on `ctx`'s device. A renderer is created
    /// only when `ctx` has a surface.
    pub fn new(
        ctx: &GpuContext,
        grid: &ClothGrid,
        topology: MeshTopology,
        params: &SimParams,
    ) -> Result<Self, GpuError> {
        let indices = topology.indices(grid);
        let resources = DeviceResources::new(&ctx.device, grid, &indices, params)?;
        let renderer = match ctx.surface_size() {
            Some(size) => Some(ClothRenderer::new(&ctx.device, ctx.format, topology, size)?),
            None => None,
        };
        let extent = grid.spacing() * grid.size() as f32;

        Ok(Self {
            resources,
            compute: ClothCompute::new(grid.neighborhood()),
            renderer,
            camera: Camera::framing(extent),
        })
    }

    pub fn resources(&self) -> &DeviceResources {
        &self.resources
    }

    /// See [`ClothCompute::set_kernel_source`].
    pub fn set_kernel_source(&mut self, kind: StrategyKind, source: String) {
        self.compute.set_kernel_source(kind, source);
    }

    pub fn active_strategy(&self) -> Option<StrategyKind> {
        self.compute.active_kind()
    }

    /// Resize the surface and the depth buffer together.
    pub fn resize(&mut self, ctx: &mut GpuContext, width: u32, height: u32) {
        ctx.resize(width, height);
        if let Some(renderer) = &mut self.renderer {
            renderer.resize(&ctx.device, width, height);
        }
    }

    /// Read position buffer `index` back. Waits for the GPU to go idle.
    pub fn read_positions(&self, ctx: &GpuContext, index: usize) -> Result<Vec<ParticleGpu>, GpuError> {
        self.resources.read_positions(&ctx.device, &ctx.queue, index)
    }

    pub fn backend<'a>(&'a mut self, ctx: &'a mut GpuContext) -> GpuBackend<'a> {
        GpuBackend { ctx, gpu: self }
    }
}

/// A [`ClothGpu`] paired with its context for the length of one call.
pub struct GpuBackend<'a> {
    ctx: &'a mut GpuContext,
    gpu: &'a mut ClothGpu,
}

impl GpuBackend<'_> {
    fn acquire_frame(&mut self) -> Result<Option<wgpu::SurfaceTexture>, FrameError> {
        let Some(surface) = &self.ctx.surface else {
            return Ok(None);
        };
        match surface.get_current_texture() {
            Ok(frame) => Ok(Some(frame)),
            Err(err @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                self.ctx.reconfigure();
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl FrameBackend for GpuBackend<'_> {
    fn write_params(&mut self, params: &SimParams) {
        self.gpu.resources.write_params(&self.ctx.queue, params);
    }

    fn activate_strategy(&mut self, kind: StrategyKind) -> Result<(), GpuError> {
        let gpu = &mut *self.gpu;
        gpu.compute.activate(&self.ctx.device, gpu.resources.layout(), kind)
    }

    fn submit_frame(&mut self, plan: &FramePlan) -> Result<(), FrameError> {
        let frame = if self.gpu.renderer.is_some() {
            self.acquire_frame()?
        } else {
            None
        };

        let mut encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Cloth Frame Encoder"),
        });
        self.gpu.compute.encode(&mut encoder, &self.gpu.resources, plan)?;

        if let (Some(frame), Some(renderer)) = (&frame, &self.gpu.renderer) {
            let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
            let aspect = self
                .ctx
                .surface_size()
                .map(|(w, h)| w as f32 / h.max(1) as f32)
                .unwrap_or(1.0);
            renderer.update_camera(&self.ctx.queue, &self.gpu.camera, aspect);
            renderer.encode(&mut encoder, &view, &self.gpu.resources, plan.render_buffer());
        }

        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        if let Some(frame) = frame {
            frame.present();
        }
        Ok(())
    }

    fn reset_positions(&mut self) {
        self.gpu.resources.reset(&self.ctx.queue);
    }
}
