//! The parameter block uploaded to binding 0 before every frame.
//!
//! All fields are `f32` so the WGSL struct needs no padding:
//!
//! ```wgsl
//! struct SimParams {
//!     time: f32,
//!     gravity_enabled: f32,
//!     grid_size: f32,
//!     spacing: f32,
//!     iterations: f32,
//!     drive_index: f32,
//!     amplitude: f32,
//!     frequency: f32,
//! };
//! ```

use bytemuck::{Pod, Zeroable};

/// `drive_index` value meaning "no driven vertex".
pub const NO_DRIVE: f32 = -1.0;

/// Upper bound on constraint iterations per frame.
pub const MAX_ITERATIONS: u32 = 8;

/// Per-frame simulation parameters, laid out exactly as the kernels read them.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SimParams {
    /// Seconds since the simulation started.
    pub time: f32,
    /// 1.0 when gravity is on.
    pub gravity_enabled: f32,
    /// Particles per side.
    pub grid_size: f32,
    /// Rest distance between structural neighbours.
    pub spacing: f32,
    /// Constraint iterations per frame (Mass-Spring only).
    pub iterations: f32,
    /// Index of the driven vertex, or [`NO_DRIVE`].
    pub drive_index: f32,
    /// Oscillation amplitude of the driven vertex along Z.
    pub amplitude: f32,
    /// Oscillation frequency of the driven vertex in Hz.
    pub frequency: f32,
}

/// Size of the uniform buffer in bytes.
pub const PARAMS_SIZE: u64 = std::mem::size_of::<SimParams>() as u64;

/// Sinusoidal motion applied to one pinned vertex.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Drive {
    pub index: u32,
    pub amplitude: f32,
    pub frequency: f32,
}

impl SimParams {
    pub fn new(grid_size: u32, spacing: f32) -> Self {
        Self {
            time: 0.0,
            gravity_enabled: 1.0,
            grid_size: grid_size as f32,
            spacing,
            iterations: 1.0,
            drive_index: NO_DRIVE,
            amplitude: 0.0,
            frequency: 0.0,
        }
    }

    pub fn with_gravity(mut self, enabled: bool) -> Self {
        self.set_gravity(enabled);
        self
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.set_iterations(iterations);
        self
    }

    pub fn with_drive(mut self, drive: Option<Drive>) -> Self {
        match drive {
            Some(d) => {
                self.drive_index = d.index as f32;
                self.amplitude = d.amplitude;
                self.frequency = d.frequency;
            }
            None => {
                self.drive_index = NO_DRIVE;
                self.amplitude = 0.0;
                self.frequency = 0.0;
            }
        }
        self
    }

    pub fn set_gravity(&mut self, enabled: bool) {
        self.gravity_enabled = if enabled { 1.0 } else { 0.0 };
    }

    pub fn gravity(&self) -> bool {
        self.gravity_enabled > 0.5
    }

    /// Clamped to `1..=MAX_ITERATIONS`.
    pub fn set_iterations(&mut self, iterations: u32) {
        self.iterations = iterations.clamp(1, MAX_ITERATIONS) as f32;
    }

    pub fn iteration_count(&self) -> u32 {
        self.iterations as u32
    }

    pub fn grid_size(&self) -> u32 {
        self.grid_size as u32
    }

    pub fn drive(&self) -> Option<Drive> {
        (self.drive_index >= 0.0).then(|| Drive {
            index: self.drive_index as u32,
            amplitude: self.amplitude,
            frequency: self.frequency,
        })
    }

    /// Bytes in upload order.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Read a block back from bytes written by [`as_bytes`](Self::as_bytes).
    ///
    /// Returns `None` when `bytes` is not exactly [`PARAMS_SIZE`] long.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() as u64 != PARAMS_SIZE {
            return None;
        }
        Some(bytemuck::pod_read_unaligned(bytes))
    }
}
