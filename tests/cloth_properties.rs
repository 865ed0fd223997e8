//! Behavioural properties of the cloth, checked against the CPU solver (same
//! arithmetic as the kernels) and the scheduler driving a recording backend.

use drape::cpu::{relax_constraints, CpuCloth};
use drape::error::{FrameError, GpuError};
use drape::grid::{build_grid, DistanceConstraint, Neighborhood, PinPolicy};
use drape::scheduler::{FrameBackend, FramePlan, FrameScheduler};
use drape::state::StateStore;
use drape::strategy::StrategyKind;
use drape::time::Time;
use drape::uniforms::SimParams;
use glam::Vec4;
use rand::Rng;

#[derive(Default)]
struct CountingBackend {
    compiled: Vec<StrategyKind>,
    frames: Vec<FramePlan>,
}

impl FrameBackend for CountingBackend {
    fn write_params(&mut self, _params: &SimParams) {}

    fn activate_strategy(&mut self, kind: StrategyKind) -> Result<(), GpuError> {
        self.compiled.push(kind);
        Ok(())
    }

    fn submit_frame(&mut self, plan: &FramePlan) -> Result<(), FrameError> {
        self.frames.push(*plan);
        Ok(())
    }

    fn reset_positions(&mut self) {}
}

// ============================================================================
// Grid construction
// ============================================================================

#[test]
fn test_random_grids_have_expected_topology() {
    let mut rng = rand::thread_rng();
    for _ in 0..20 {
        let n: u32 = rng.gen_range(2..=40);
        for neighborhood in [Neighborhood::Structural, Neighborhood::Shear] {
            let grid = build_grid(n, 0.05, &PinPolicy::TopCorners, neighborhood).unwrap();
            assert_eq!(grid.particle_count(), (n * n) as usize);

            let structural = 2 * n * (n - 1);
            let expected = match neighborhood {
                Neighborhood::Structural => structural,
                Neighborhood::Shear => structural + 2 * (n - 1) * (n - 1),
            };
            assert_eq!(grid.edges().len(), expected as usize, "n = {}", n);

            let mut seen = std::collections::HashSet::new();
            for edge in grid.edges() {
                assert_ne!(edge.a, edge.b, "self edge in n = {}", n);
                assert!(seen.insert((edge.a.min(edge.b), edge.a.max(edge.b))), "duplicate edge");
            }
        }
    }
}

#[test]
fn test_grid_of_one_is_rejected() {
    assert!(build_grid(1, 0.1, &PinPolicy::None, Neighborhood::Shear).is_err());
    assert!(build_grid(0, 0.1, &PinPolicy::None, Neighborhood::Shear).is_err());
}

// ============================================================================
// Stepping
// ============================================================================

#[test]
fn test_pinned_particles_hold_under_gravity() {
    let grid = build_grid(10, 0.1, &PinPolicy::TopCorners, Neighborhood::Shear).unwrap();
    let pinned = grid.pinned_indices();
    assert_eq!(pinned, vec![0, 9]);

    for strategy in StrategyKind::ALL {
        let mut cloth = CpuCloth::new(&grid);
        let params = SimParams::new(10, 0.1).with_iterations(4);
        for _ in 0..100 {
            cloth.step(&params, strategy);
        }

        let initial = grid.positions();
        for (idx, p) in cloth.positions().iter().enumerate() {
            if pinned.contains(&(idx as u32)) {
                assert_eq!(*p, initial[idx], "{}: pinned particle {} moved", strategy, idx);
            } else {
                assert_ne!(p.y, initial[idx].y, "{}: particle {} never moved", strategy, idx);
            }
        }
    }
}

#[test]
fn test_pbd_free_particles_sag() {
    let grid = build_grid(10, 0.1, &PinPolicy::TopCorners, Neighborhood::Shear).unwrap();
    let mut cloth = CpuCloth::new(&grid);
    let params = SimParams::new(10, 0.1);
    for _ in 0..100 {
        cloth.step(&params, StrategyKind::Pbd);
    }
    for (idx, p) in cloth.positions().iter().enumerate() {
        if !grid.is_pinned(idx as u32) {
            assert!(p.y < grid.rest_position(idx as u32).y, "particle {} did not sag", idx);
        }
    }
}

#[test]
fn test_single_step_drop_is_bounded() {
    let grid = build_grid(8, 0.1, &PinPolicy::None, Neighborhood::Shear).unwrap();
    let mut cloth = CpuCloth::new(&grid);
    cloth.step(&SimParams::new(8, 0.1), StrategyKind::Pbd);

    for (p, rest) in cloth.positions().iter().zip(grid.positions()) {
        let drop = rest.y - p.y;
        assert!(drop > 0.0 && drop < 0.001, "drop {} out of (0, 0.001)", drop);
        assert!((p.x - rest.x).abs() < 1e-6);
        assert!(p.z.abs() < 1e-6);
    }
}

#[test]
fn test_relaxation_shortens_stretched_edge() {
    let read = vec![Vec4::new(0.0, 0.0, 0.0, 0.0), Vec4::new(0.2, 0.0, 0.0, 0.0)];
    let constraints = [DistanceConstraint { a: 0, b: 1, rest: 0.1 }];
    let mut write = vec![Vec4::ZERO; 2];

    relax_constraints(&read, &mut write, &constraints, 0.0);

    let dist = (write[1] - write[0]).truncate().length();
    assert!(dist < 0.2, "distance did not shrink: {}", dist);
    assert!(dist > 0.1, "relaxation overshot rest length: {}", dist);
}

// ============================================================================
// Ping-pong parity
// ============================================================================

#[test]
fn test_buffer_parity_follows_frame_count() {
    let grid = build_grid(6, 0.1, &PinPolicy::TopCorners, Neighborhood::Shear).unwrap();
    let params = SimParams::new(6, 0.1).with_iterations(3);

    for strategy in StrategyKind::ALL {
        let mut cloth = CpuCloth::new(&grid);
        let mut backend = CountingBackend::default();
        let mut scheduler = FrameScheduler::new(params, strategy).with_clock(Time::fixed(1.0 / 60.0));
        scheduler.start(&mut backend).unwrap();

        for frame in 1..=7usize {
            cloth.step(&params, strategy);
            scheduler.tick(&mut backend).unwrap();
            assert_eq!(cloth.current_index(), frame % 2);
            assert_eq!(scheduler.current_index(), frame % 2);
        }
    }
}

#[test]
fn test_no_sweep_reads_and_writes_same_buffer() {
    let params = SimParams::new(16, 0.05).with_iterations(8);
    let mut backend = CountingBackend::default();
    let mut scheduler = FrameScheduler::new(params, StrategyKind::MassSpring).with_clock(Time::fixed(0.01));
    scheduler.start(&mut backend).unwrap();
    for _ in 0..4 {
        scheduler.tick(&mut backend).unwrap();
    }

    for plan in &backend.frames {
        let sweeps = plan.sweeps();
        assert_eq!(sweeps.len(), 17);
        assert!(sweeps.iter().all(|s| s.read != s.write));
        assert_eq!(sweeps.last().unwrap().write, plan.write);
        assert_eq!(plan.render_buffer(), plan.write);
        assert_eq!(plan.workgroups, 4);
    }
}

// ============================================================================
// Parameters and strategy switching
// ============================================================================

#[test]
fn test_params_bytes_round_trip() {
    let mut params = SimParams::new(24, 0.07).with_gravity(false).with_iterations(5);
    params.time = 12.5;

    let bytes = params.as_bytes();
    assert_eq!(bytes.len(), 32);
    assert_eq!(SimParams::from_bytes(bytes), Some(params));
}

#[test]
fn test_one_rebuild_per_strategy_activation() {
    let mut store = StateStore::default();
    let mut backend = CountingBackend::default();
    let mut scheduler = FrameScheduler::new(SimParams::new(8, 0.1), StrategyKind::Pbd)
        .with_clock(Time::fixed(1.0 / 60.0));
    scheduler.subscribe(&mut store);
    scheduler.start(&mut backend).unwrap();

    for frame in 0..12 {
        match frame {
            3 => {
                store.set_strategy(StrategyKind::MassSpring);
            }
            5 => {
                // no change, no rebuild
                store.set_strategy(StrategyKind::MassSpring);
            }
            8 => {
                store.set_strategy(StrategyKind::Pbd);
            }
            _ => {}
        }
        scheduler.tick(&mut backend).unwrap();
    }

    assert_eq!(
        backend.compiled,
        vec![StrategyKind::Pbd, StrategyKind::MassSpring, StrategyKind::Pbd]
    );
    assert_eq!(scheduler.stats().pipelines_built, 3);
    assert!(backend.frames[3..8].iter().all(|p| p.strategy == StrategyKind::MassSpring));
    assert!(backend.frames[8..].iter().all(|p| p.strategy == StrategyKind::Pbd));
}
