//! Error types for Drape.
//!
//! Initialization failures (no adapter, shader compilation, buffer sizing) are
//! fatal and bubble out of [`Simulation::run`](crate::Simulation::run).
//! Per-frame failures are [`FrameError`]s; the scheduler logs them and skips
//! the frame instead of stopping.

use std::fmt;

use crate::strategy::StrategyKind;

/// Errors that can occur while acquiring or using the GPU.
#[derive(Debug)]
pub enum GpuError {
    /// Failed to create a surface for rendering.
    SurfaceCreation(wgpu::CreateSurfaceError),
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// The surface reported no usable formats for this adapter.
    UnsupportedSurface,
    /// A kernel failed to compile or its pipeline failed validation.
    ShaderCompilation { label: String, message: String },
    /// A strategy was asked to compile before any kernel source was bound.
    Unbound(StrategyKind),
    /// Requested buffer size is zero or exceeds the device limit.
    BufferSize { label: &'static str, size: u64, limit: u64 },
    /// A compute sweep needs more workgroups than one dispatch dimension allows.
    DispatchSize { workgroups: u32, limit: u32 },
    /// Failed to map buffer for reading.
    BufferMapping(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::SurfaceCreation(e) => write!(f, "Failed to create GPU surface: {}", e),
            GpuError::NoAdapter => write!(f, "No compatible GPU adapter found. Ensure your system has a GPU with WebGPU/Vulkan/Metal/DX12 support."),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::UnsupportedSurface => write!(f, "Surface is not supported by the selected adapter"),
            GpuError::ShaderCompilation { label, message } => {
                write!(f, "Failed to compile {}: {}", label, message)
            }
            GpuError::Unbound(kind) => write!(f, "Strategy '{}' has no kernel source bound", kind),
            GpuError::BufferSize { label, size, limit } => {
                if *size == 0 {
                    write!(f, "{} cannot be created with size 0", label)
                } else {
                    write!(f, "{} needs {} bytes but the device allows at most {}", label, size, limit)
                }
            }
            GpuError::DispatchSize { workgroups, limit } => write!(
                f,
                "Compute sweep needs {} workgroups but the device allows at most {} per dimension",
                workgroups, limit
            ),
            GpuError::BufferMapping(msg) => write!(f, "Failed to map GPU buffer: {}", msg),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::SurfaceCreation(e) => Some(e),
            GpuError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::CreateSurfaceError> for GpuError {
    fn from(e: wgpu::CreateSurfaceError) -> Self {
        GpuError::SurfaceCreation(e)
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

/// Errors raised while building the particle grid.
#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    /// Fewer than two particles per side; no edges are possible.
    TooSmall(u32),
    /// `n × n` particles exceed the most a single sweep can dispatch.
    TooLarge { n: u32, max_particles: u32 },
    /// Spacing must be finite and positive.
    InvalidSpacing(f32),
    /// An explicit pin refers to a particle outside the grid.
    PinOutOfRange { index: u32, count: u32 },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::TooSmall(n) => write!(f, "Grid size must be at least 2, got {}", n),
            GridError::TooLarge { n, max_particles } => write!(
                f,
                "Grid size {} is too large: {}x{} exceeds the limit of {} particles",
                n, n, n, max_particles
            ),
            GridError::InvalidSpacing(s) => write!(f, "Grid spacing must be finite and positive, got {}", s),
            GridError::PinOutOfRange { index, count } => {
                write!(f, "Pinned particle {} is outside a grid of {} particles", index, count)
            }
        }
    }
}

impl std::error::Error for GridError {}

/// A recoverable failure while encoding or presenting a single frame.
#[derive(Debug)]
pub enum FrameError {
    /// No compiled pipeline for the strategy the frame asked for.
    MissingPipeline(StrategyKind),
    /// The surface could not hand out a texture this frame.
    Surface(wgpu::SurfaceError),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::MissingPipeline(kind) => {
                write!(f, "No compiled pipeline for strategy '{}'", kind)
            }
            FrameError::Surface(e) => write!(f, "Surface error: {}", e),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::Surface(e) => Some(e),
            FrameError::MissingPipeline(_) => None,
        }
    }
}

impl From<wgpu::SurfaceError> for FrameError {
    fn from(e: wgpu::SurfaceError) -> Self {
        FrameError::Surface(e)
    }
}

/// Error returned by a state-store listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerError(pub String);

impl fmt::Display for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener failed: {}", self.0)
    }
}

impl std::error::Error for ListenerError {}

impl From<&str> for ListenerError {
    fn from(msg: &str) -> Self {
        ListenerError(msg.to_string())
    }
}

impl From<String> for ListenerError {
    fn from(msg: String) -> Self {
        ListenerError(msg)
    }
}

/// Errors that can occur when running a simulation.
#[derive(Debug)]
pub enum SimulationError {
    /// Failed to create or run the event loop.
    EventLoop(winit::error::EventLoopError),
    /// Failed to create window.
    Window(winit::error::OsError),
    /// GPU initialization failed.
    Gpu(GpuError),
    /// The cloth grid could not be built.
    Grid(GridError),
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::EventLoop(e) => write!(f, "Failed to create event loop: {}", e),
            SimulationError::Window(e) => write!(f, "Failed to create window: {}", e),
            SimulationError::Gpu(e) => write!(f, "GPU error: {}", e),
            SimulationError::Grid(e) => write!(f, "Grid error: {}", e),
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::EventLoop(e) => Some(e),
            SimulationError::Window(e) => Some(e),
            SimulationError::Gpu(e) => Some(e),
            SimulationError::Grid(e) => Some(e),
        }
    }
}

impl From<winit::error::EventLoopError> for SimulationError {
    fn from(e: winit::error::EventLoopError) -> Self {
        SimulationError::EventLoop(e)
    }
}

impl From<winit::error::OsError> for SimulationError {
    fn from(e: winit::error::OsError) -> Self {
        SimulationError::Window(e)
    }
}

impl From<GpuError> for SimulationError {
    fn from(e: GpuError) -> Self {
        SimulationError::Gpu(e)
    }
}

impl From<GridError> for SimulationError {
    fn from(e: GridError) -> Self {
        SimulationError::Grid(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_messages() {
        let zero = GpuError::BufferSize { label: "Position Buffer A", size: 0, limit: 256 };
        assert!(zero.to_string().contains("size 0"));

        let big = GpuError::BufferSize { label: "Index Buffer", size: 512, limit: 256 };
        let msg = big.to_string();
        assert!(msg.contains("512"));
        assert!(msg.contains("256"));
    }

    #[test]
    fn test_grid_error_wraps_into_simulation_error() {
        let err: SimulationError = GridError::TooSmall(1).into();
        assert!(err.to_string().contains("at least 2"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
