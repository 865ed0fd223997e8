//! CPU reference solver.
//!
//! [`CpuCloth`] runs the same per-frame sweep sequence as the GPU path, with
//! the same constants and the same ping-pong discipline, on plain vectors.
//! It is a separate, explicitly chosen path: nothing runs it alongside the
//! GPU kernels. Tests use it to check the simulation invariants without a
//! device, and the benchmarks use it as a baseline.

use glam::{Vec3, Vec4};

use crate::grid::{ClothGrid, DistanceConstraint};
use crate::shader::{GRAVITY_STEP, RELAXATION, STIFFNESS};
use crate::strategy::StrategyKind;
use crate::uniforms::SimParams;

/// A cloth stepped on the CPU with two position buffers.
#[derive(Clone, Debug)]
pub struct CpuCloth {
    size: u32,
    rest: Vec<Vec3>,
    constraints: Vec<DistanceConstraint>,
    buffers: [Vec<Vec4>; 2],
    current: usize,
    initial: Vec<Vec4>,
}

impl CpuCloth {
    pub fn new(grid: &ClothGrid) -> Self {
        let positions = grid.positions();
        let count = positions.len() as u32;
        Self {
            size: grid.size(),
            rest: (0..count).map(|i| grid.rest_position(i)).collect(),
            constraints: grid.constraints(),
            buffers: [positions.clone(), positions.clone()],
            current: 0,
            initial: positions,
        }
    }

    /// The authoritative buffer: the output of the last frame.
    pub fn positions(&self) -> &[Vec4] {
        &self.buffers[self.current]
    }

    /// Index (0 or 1) of the current buffer.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Restore the initial layout in both buffers.
    pub fn reset(&mut self) {
        self.buffers = [self.initial.clone(), self.initial.clone()];
        self.current = 0;
    }

    /// Advance one frame with the given strategy.
    ///
    /// One integration sweep reads current and writes next. Mass-Spring then
    /// runs `params.iterations` constraint iterations, each a pair of sweeps
    /// (next → current, current → next), so the frame always ends in next.
    /// Finally the roles swap.
    pub fn step(&mut self, params: &SimParams, strategy: StrategyKind) {
        let read = self.current;
        let write = 1 - read;

        self.sweep(read, write, params, |cloth, src, dst, params| match strategy {
            StrategyKind::Pbd => cloth.pbd_integrate(src, dst, params),
            StrategyKind::MassSpring => cloth.spring_sweep(src, dst, params, true),
        });

        if strategy.relaxes_constraints() {
            for _ in 0..params.iteration_count() {
                self.sweep(write, read, params, |cloth, src, dst, params| {
                    cloth.spring_sweep(src, dst, params, false)
                });
                self.sweep(read, write, params, |cloth, src, dst, params| {
                    cloth.spring_sweep(src, dst, params, false)
                });
            }
        }

        self.current = write;
    }

    fn sweep<F>(&mut self, read: usize, write: usize, params: &SimParams, kernel: F)
    where
        F: Fn(&Self, &[Vec4], &mut [Vec4], &SimParams),
    {
        debug_assert_ne!(read, write);
        let mut out = std::mem::take(&mut self.buffers[write]);
        kernel(self, &self.buffers[read], &mut out, params);
        self.buffers[write] = out;
    }

    fn pinned_output(&self, idx: usize, p: Vec4, params: &SimParams) -> Vec4 {
        match params.drive() {
            Some(drive) if drive.index as usize == idx => {
                let offset = drive.amplitude
                    * (std::f32::consts::TAU * drive.frequency * params.time).sin();
                (self.rest[idx] + Vec3::new(0.0, 0.0, offset)).extend(p.w)
            }
            _ => p,
        }
    }

    fn pbd_integrate(&self, src: &[Vec4], dst: &mut [Vec4], params: &SimParams) {
        let n = self.size as i32;
        for (idx, out) in dst.iter_mut().enumerate() {
            let p = src[idx];
            if p.w > 0.5 {
                *out = self.pinned_output(idx, p, params);
                continue;
            }
            let col = idx as i32 % n;
            let row = idx as i32 / n;
            let rest = self.rest[idx];

            let mut d = p.truncate() - rest;
            if params.gravity() {
                d.y -= GRAVITY_STEP;
            }

            let mut sum = Vec3::ZERO;
            let mut count = 0.0;
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let (c, r) = (col + dx, row + dy);
                    if (dx == 0 && dy == 0) || c < 0 || r < 0 || c >= n || r >= n {
                        continue;
                    }
                    let j = (r * n + c) as usize;
                    sum += src[j].truncate() - self.rest[j];
                    count += 1.0;
                }
            }
            if count > 0.0 {
                d = d.lerp(sum / count, RELAXATION);
            }
            *out = (rest + d).extend(p.w);
        }
    }

    fn spring_sweep(&self, src: &[Vec4], dst: &mut [Vec4], params: &SimParams, with_gravity: bool) {
        let gravity_step = if with_gravity && params.gravity() {
            GRAVITY_STEP
        } else {
            0.0
        };
        relax_constraints(src, dst, &self.constraints, gravity_step);

        if let Some(drive) = params.drive() {
            let idx = drive.index as usize;
            if idx < src.len() && src[idx].w > 0.5 {
                dst[idx] = self.pinned_output(idx, src[idx], params);
            }
        }
    }
}

/// Per-particle corrections from one relaxation sweep over `constraints`.
///
/// Every edge's correction is computed from `positions` alone and the results
/// are summed, so the outcome does not depend on edge order. A free endpoint
/// moves half the scaled error, or all of it when the other end is pinned; a
/// pinned endpoint gets nothing.
pub fn spring_corrections(positions: &[Vec4], constraints: &[DistanceConstraint]) -> Vec<Vec3> {
    let mut corrections = vec![Vec3::ZERO; positions.len()];
    for c in constraints {
        let (a, b) = (c.a as usize, c.b as usize);
        let (pa, pb) = (positions[a], positions[b]);
        let delta = pb.truncate() - pa.truncate();
        let dist = delta.length();
        if dist < 1e-6 {
            continue;
        }
        let scaled = delta * ((dist - c.rest) / dist * STIFFNESS);
        let (a_pinned, b_pinned) = (pa.w > 0.5, pb.w > 0.5);
        if !a_pinned {
            corrections[a] += scaled * if b_pinned { 1.0 } else { 0.5 };
        }
        if !b_pinned {
            corrections[b] -= scaled * if a_pinned { 1.0 } else { 0.5 };
        }
    }
    corrections
}

/// Apply one relaxation sweep from `read` into `write`.
///
/// Free particles first drop by `gravity_step` (zero for pure constraint
/// sweeps), then take their summed correction. Pinned particles are copied.
pub fn relax_constraints(
    read: &[Vec4],
    write: &mut [Vec4],
    constraints: &[DistanceConstraint],
    gravity_step: f32,
) {
    let corrections = spring_corrections(read, constraints);
    for ((out, p), corr) in write.iter_mut().zip(read).zip(corrections) {
        *out = if p.w > 0.5 {
            *p
        } else {
            let mut next = p.truncate();
            next.y -= gravity_step;
            (next + corr).extend(p.w)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{build_grid, Neighborhood, PinPolicy};
    use crate::uniforms::Drive;

    #[test]
    fn test_step_swaps_buffers() {
        let grid = build_grid(4, 0.1, &PinPolicy::TopCorners, Neighborhood::Shear).unwrap();
        let mut cloth = CpuCloth::new(&grid);
        let params = SimParams::new(4, 0.1);
        assert_eq!(cloth.current_index(), 0);
        cloth.step(&params, StrategyKind::Pbd);
        assert_eq!(cloth.current_index(), 1);
        cloth.step(&params, StrategyKind::MassSpring);
        assert_eq!(cloth.current_index(), 0);
    }

    #[test]
    fn test_gravity_off_keeps_rest_pose() {
        let grid = build_grid(5, 0.1, &PinPolicy::None, Neighborhood::Shear).unwrap();
        let mut cloth = CpuCloth::new(&grid);
        let params = SimParams::new(5, 0.1).with_gravity(false);
        for _ in 0..10 {
            cloth.step(&params, StrategyKind::Pbd);
            cloth.step(&params, StrategyKind::MassSpring);
        }
        for (p, q) in cloth.positions().iter().zip(grid.positions()) {
            assert!((*p - q).length() < 1e-5);
        }
    }

    #[test]
    fn test_driven_vertex_oscillates() {
        let mut grid = build_grid(4, 0.1, &PinPolicy::None, Neighborhood::Shear).unwrap();
        grid.pin(1).unwrap();
        let mut cloth = CpuCloth::new(&grid);
        let mut params = SimParams::new(4, 0.1)
            .with_drive(Some(Drive { index: 1, amplitude: 0.2, frequency: 1.0 }));
        params.time = 0.25;
        cloth.step(&params, StrategyKind::Pbd);
        let driven = cloth.positions()[1];
        assert!((driven.z - 0.2).abs() < 1e-5);
        assert_eq!(driven.truncate().truncate(), grid.rest_position(1).truncate());
    }

    #[test]
    fn test_pinned_endpoint_takes_no_correction() {
        let positions = vec![Vec4::new(0.0, 0.0, 0.0, 1.0), Vec4::new(0.3, 0.0, 0.0, 0.0)];
        let constraints = [DistanceConstraint { a: 0, b: 1, rest: 0.1 }];
        let corr = spring_corrections(&positions, &constraints);
        assert_eq!(corr[0], Vec3::ZERO);
        // full correction on the free side: 0.1 * (0.3 - 0.1) toward a
        assert!((corr[1].x + 0.02).abs() < 1e-6);
    }

    #[test]
    fn test_spring_sweep_is_relaxation_plus_drive() {
        let mut grid = build_grid(4, 0.1, &PinPolicy::TopCorners, Neighborhood::Shear).unwrap();
        grid.pin(5).unwrap();
        let cloth = CpuCloth::new(&grid);
        let mut params = SimParams::new(4, 0.1)
            .with_drive(Some(Drive { index: 5, amplitude: 0.1, frequency: 1.0 }));
        params.time = 0.25;

        let src = grid.positions();
        let mut expected = vec![Vec4::ZERO; src.len()];
        relax_constraints(&src, &mut expected, &cloth.constraints, GRAVITY_STEP);
        let mut out = vec![Vec4::ZERO; src.len()];
        cloth.spring_sweep(&src, &mut out, &params, true);

        for idx in (0..src.len()).filter(|&i| i != 5) {
            assert_eq!(out[idx], expected[idx], "particle {}", idx);
        }
        assert!((out[5].z - 0.1).abs() < 1e-5);
        assert_eq!(expected[5], src[5]);
    }

    #[test]
    fn test_reset_restores_layout() {
        let grid = build_grid(3, 0.1, &PinPolicy::TopCorners, Neighborhood::Shear).unwrap();
        let mut cloth = CpuCloth::new(&grid);
        let params = SimParams::new(3, 0.1);
        cloth.step(&params, StrategyKind::Pbd);
        cloth.reset();
        assert_eq!(cloth.positions(), grid.positions().as_slice());
        assert_eq!(cloth.current_index(), 0);
    }
}
