//! Device acquisition.
//!
//! [`DeviceManager`] is owned state with explicit lifecycle: `init` (window)
//! or `init_headless`, `get`, and `reset`. It caches one [`GpuContext`];
//! a second `init` returns the cached context instead of requesting another
//! device.

use std::sync::Arc;

use winit::window::Window;

use crate::error::GpuError;

/// Colour format used when there is no surface to ask.
pub const HEADLESS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Device, queue and (when windowed) the configured surface.
pub struct GpuContext {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface: Option<wgpu::Surface<'static>>,
    pub config: Option<wgpu::SurfaceConfiguration>,
    /// Preferred colour format for render targets.
    pub format: wgpu::TextureFormat,
}

impl GpuContext {
    /// Acquire a device able to present to `window` and configure its surface.
    pub async fn with_window(window: Arc<Window>) -> Result<Self, GpuError> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let (device, queue) = request_device(&adapter).await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or(GpuError::UnsupportedSurface)?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        log::info!(
            "using adapter '{}' ({:?}), surface format {:?}",
            adapter.get_info().name,
            adapter.get_info().backend,
            format
        );

        Ok(Self {
            adapter,
            device,
            queue,
            surface: Some(surface),
            config: Some(config),
            format,
        })
    }

    /// Acquire a device with no surface, for compute-only runs.
    pub async fn headless() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let (device, queue) = request_device(&adapter).await?;
        log::info!("using adapter '{}' without a surface", adapter.get_info().name);

        Ok(Self {
            adapter,
            device,
            queue,
            surface: None,
            config: None,
            format: HEADLESS_FORMAT,
        })
    }

    /// Current surface size, or `None` when headless.
    pub fn surface_size(&self) -> Option<(u32, u32)> {
        self.config.as_ref().map(|c| (c.width, c.height))
    }

    /// Reconfigure the surface for a new size. Zero sizes are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let Some(config) = &mut self.config {
            config.width = width;
            config.height = height;
        }
        self.reconfigure();
    }

    /// Re-apply the current surface configuration (after `Lost`/`Outdated`).
    pub fn reconfigure(&mut self) {
        if let (Some(surface), Some(config)) = (&self.surface, &self.config) {
            surface.configure(&self.device, config);
        }
    }
}

async fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue), GpuError> {
    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Drape Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                memory_hints: Default::default(),
            },
            None,
        )
        .await?;
    Ok((device, queue))
}

/// Owner of the process's one [`GpuContext`].
#[derive(Default)]
pub struct DeviceManager {
    context: Option<GpuContext>,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a windowed context, or return the cached one.
    pub fn init(&mut self, window: Arc<Window>) -> Result<&mut GpuContext, GpuError> {
        if self.context.is_none() {
            self.context = Some(pollster::block_on(GpuContext::with_window(window))?);
        }
        self.context.as_mut().ok_or(GpuError::NoAdapter)
    }

    /// Acquire a surface-less context, or return the cached one.
    pub fn init_headless(&mut self) -> Result<&mut GpuContext, GpuError> {
        if self.context.is_none() {
            self.context = Some(pollster::block_on(GpuContext::headless())?);
        }
        self.context.as_mut().ok_or(GpuError::NoAdapter)
    }

    pub fn get(&self) -> Option<&GpuContext> {
        self.context.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut GpuContext> {
        self.context.as_mut()
    }

    pub fn is_initialized(&self) -> bool {
        self.context.is_some()
    }

    /// Drop the cached context. The next `init` acquires a fresh device.
    pub fn reset(&mut self) {
        if self.context.take().is_some() {
            log::debug!("released GPU context");
        }
    }
}
