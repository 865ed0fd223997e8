//! GPU memory layout shared by the position buffers and the render pipeline.
//!
//! Every particle is one `vec4<f32>`: `xyz` is the position and `w` is the
//! pinned flag (1.0 pinned, 0.0 free). The compute kernels index the buffers
//! as `array<vec4<f32>>` and the render pipeline reads the same bytes as a
//! single vertex attribute, so both sides take their layout from here.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// One particle as stored in a position buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleGpu {
    pub position: [f32; 3],
    pub pinned: f32,
}

impl ParticleGpu {
    pub fn new(position: Vec3, pinned: bool) -> Self {
        Self {
            position: position.to_array(),
            pinned: if pinned { 1.0 } else { 0.0 },
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned > 0.5
    }
}

impl From<Vec4> for ParticleGpu {
    fn from(v: Vec4) -> Self {
        Self {
            position: [v.x, v.y, v.z],
            pinned: v.w,
        }
    }
}

impl From<ParticleGpu> for Vec4 {
    fn from(p: ParticleGpu) -> Self {
        Vec4::new(p.position[0], p.position[1], p.position[2], p.pinned)
    }
}

/// Bytes per particle in a position buffer.
pub const PARTICLE_STRIDE: u64 = std::mem::size_of::<ParticleGpu>() as u64;

/// Vertex attributes the render pipeline reads from a position buffer.
pub const PARTICLE_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x4];

/// Vertex buffer layout matching [`ParticleGpu`].
pub fn particle_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: PARTICLE_STRIDE,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &PARTICLE_ATTRIBUTES,
    }
}

/// Size in bytes of a position buffer holding `count` particles.
pub fn position_buffer_size(count: usize) -> u64 {
    count as u64 * PARTICLE_STRIDE
}
