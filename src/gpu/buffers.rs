//! Device resources for one cloth: the ping-pong position pair, the parameter
//! block, the index buffer and the compute bindings that tie them together.
//!
//! Both compute bind groups are built up front. Group `i` reads position
//! buffer `i` and writes the other one, so a sweep never binds one buffer for
//! reading and writing at once and nothing is recreated per frame.

use wgpu::util::DeviceExt;

use crate::error::GpuError;
use crate::grid::ClothGrid;
use crate::layout::{position_buffer_size, ParticleGpu, PARTICLE_STRIDE};
use crate::shader::workgroup_count;
use crate::uniforms::{SimParams, PARAMS_SIZE};

/// Layout shared by every compute kernel: params, read-only input,
/// read-write output.
pub fn compute_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let storage = |binding, read_only| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    };

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Cloth Compute Bind Group Layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(PARAMS_SIZE),
                },
                count: None,
            },
            storage(1, true),
            storage(2, false),
        ],
    })
}

/// Reject zero-sized buffers and buffers above `limit`.
pub fn check_buffer_size(label: &'static str, size: u64, limit: u64) -> Result<(), GpuError> {
    if size == 0 || size > limit {
        return Err(GpuError::BufferSize { label, size, limit });
    }
    Ok(())
}

/// Reject a sweep whose 1D dispatch exceeds the per-dimension limit.
pub fn check_dispatch_size(particle_count: u32, limit: u32) -> Result<u32, GpuError> {
    let workgroups = workgroup_count(particle_count);
    if workgroups > limit {
        return Err(GpuError::DispatchSize { workgroups, limit });
    }
    Ok(workgroups)
}

pub struct DeviceResources {
    positions: [wgpu::Buffer; 2],
    params: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
    particle_count: u32,
    initial: Vec<ParticleGpu>,
    layout: wgpu::BindGroupLayout,
    bind_groups: [wgpu::BindGroup; 2],
}

impl DeviceResources {
    /// Allocate and upload everything for `grid`.
    ///
    /// Both position buffers start with the grid's initial layout.
    pub fn new(
        device: &wgpu::Device,
        grid: &ClothGrid,
        indices: &[u32],
        params: &SimParams,
    ) -> Result<Self, GpuError> {
        let limits = device.limits();
        let storage_limit = limits
            .max_buffer_size
            .min(u64::from(limits.max_storage_buffer_binding_size));

        let positions_size = position_buffer_size(grid.particle_count());
        check_buffer_size("Position buffer", positions_size, storage_limit)?;
        let index_size = (indices.len() * std::mem::size_of::<u32>()) as u64;
        check_buffer_size("Index buffer", index_size, limits.max_buffer_size)?;
        check_dispatch_size(
            grid.particle_count() as u32,
            limits.max_compute_workgroups_per_dimension,
        )?;

        let initial = grid.particles().to_vec();
        let position_buffer = |label| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&initial),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
            })
        };
        let positions = [position_buffer("Position Buffer A"), position_buffer("Position Buffer B")];

        let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sim Params Buffer"),
            contents: params.as_bytes(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let indices_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Cloth Index Buffer"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let layout = compute_bind_group_layout(device);
        let bind_group = |label, read: &wgpu::Buffer, write: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: read.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: write.as_entire_binding(),
                    },
                ],
            })
        };
        let bind_groups = [
            bind_group("Cloth Compute A->B", &positions[0], &positions[1]),
            bind_group("Cloth Compute B->A", &positions[1], &positions[0]),
        ];

        log::debug!(
            "allocated {} particles ({} bytes per buffer), {} indices",
            grid.particle_count(),
            positions_size,
            indices.len()
        );

        Ok(Self {
            positions,
            params,
            indices: indices_buffer,
            index_count: indices.len() as u32,
            particle_count: grid.particle_count() as u32,
            initial,
            layout,
            bind_groups,
        })
    }

    /// `(read, write)` buffer indices for a frame starting at `parity`.
    pub fn swap(parity: usize) -> (usize, usize) {
        let read = parity & 1;
        (read, 1 - read)
    }

    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    /// Bind group that reads buffer `read` and writes the other one.
    pub fn bind_group(&self, read: usize) -> &wgpu::BindGroup {
        &self.bind_groups[read & 1]
    }

    pub fn position_buffer(&self, index: usize) -> &wgpu::Buffer {
        &self.positions[index & 1]
    }

    pub fn index_buffer(&self) -> &wgpu::Buffer {
        &self.indices
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn particle_count(&self) -> u32 {
        self.particle_count
    }

    /// Queue the parameter block. Takes effect for work submitted after it.
    pub fn write_params(&self, queue: &wgpu::Queue, params: &SimParams) {
        queue.write_buffer(&self.params, 0, params.as_bytes());
    }

    /// Queue the initial layout into both position buffers.
    pub fn reset(&self, queue: &wgpu::Queue) {
        for buffer in &self.positions {
            queue.write_buffer(buffer, 0, bytemuck::cast_slice(&self.initial));
        }
    }

    /// Copy position buffer `index` back to the CPU.
    ///
    /// Blocks until the GPU has finished all submitted work.
    pub fn read_positions(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        index: usize,
    ) -> Result<Vec<ParticleGpu>, GpuError> {
        let size = position_buffer_size(self.particle_count as usize);
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Position Readback Buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Position Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(self.position_buffer(index), 0, &staging, 0, size);
        queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);

        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(GpuError::BufferMapping(e.to_string())),
            Err(e) => return Err(GpuError::BufferMapping(e.to_string())),
        }

        let particles = {
            let data = slice.get_mapped_range();
            data.chunks_exact(PARTICLE_STRIDE as usize)
                .map(bytemuck::pod_read_unaligned::<ParticleGpu>)
                .collect()
        };
        staging.unmap();
        Ok(particles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_parity() {
        assert_eq!(DeviceResources::swap(0), (0, 1));
        assert_eq!(DeviceResources::swap(1), (1, 0));
        assert_eq!(DeviceResources::swap(2), (0, 1));
    }

    #[test]
    fn test_buffer_size_checks() {
        assert!(check_buffer_size("Position buffer", 1024, 4096).is_ok());
        assert!(check_buffer_size("Position buffer", 4096, 4096).is_ok());

        match check_buffer_size("Index buffer", 0, 4096) {
            Err(GpuError::BufferSize { size: 0, .. }) => {}
            other => panic!("expected zero-size error, got {:?}", other),
        }
        match check_buffer_size("Position buffer", 8192, 4096) {
            Err(GpuError::BufferSize { size, limit, .. }) => {
                assert_eq!((size, limit), (8192, 4096));
            }
            other => panic!("expected limit error, got {:?}", other),
        }
    }

    #[test]
    fn test_dispatch_size_checks() {
        let limit = wgpu::Limits::default().max_compute_workgroups_per_dimension;
        assert_eq!(check_dispatch_size(32 * 32, limit).unwrap(), 16);
        assert!(check_dispatch_size(limit * 64, limit).is_ok());

        match check_dispatch_size(2100 * 2100, limit) {
            Err(GpuError::DispatchSize { workgroups, limit: got }) => {
                assert_eq!(workgroups, 68_907);
                assert_eq!(got, limit);
            }
            other => panic!("expected dispatch error, got {:?}", other),
        }
    }
}
