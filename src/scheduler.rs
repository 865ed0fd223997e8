//! The per-frame controller.
//!
//! Each tick the scheduler:
//!
//! 1. applies pending state-store changes (at most one pipeline rebuild),
//! 2. advances the clock and uploads the parameter block,
//! 3. hands the backend a [`FramePlan`]: an integration sweep from the current
//!    buffer into the next one, then constraint iterations for strategies
//!    that relax constraints, then a render pass over the next buffer,
//! 4. swaps current and next.
//!
//! The scheduler never waits for the GPU. Buffer roles flip on the CPU
//! timeline, and because every command goes to one queue in submission order,
//! frame N+1 can be encoded while frame N is still executing.
//!
//! Backends implement [`FrameBackend`]; the window renderer, the headless
//! runner and test doubles all sit behind it.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{FrameError, GpuError};
use crate::gpu::DeviceResources;
use crate::shader::workgroup_count;
use crate::state::{Event, EventKind, StateStore};
use crate::strategy::StrategyKind;
use crate::time::Time;
use crate::uniforms::SimParams;

/// What a backend has to do for the scheduler.
pub trait FrameBackend {
    /// Queue an upload of the parameter block.
    fn write_params(&mut self, params: &SimParams);

    /// Compile `kind` and make it the active strategy, dropping the previous
    /// one. Failure is fatal.
    fn activate_strategy(&mut self, kind: StrategyKind) -> Result<(), GpuError>;

    /// Encode and submit one frame. Must not wait for GPU completion.
    fn submit_frame(&mut self, plan: &FramePlan) -> Result<(), FrameError>;

    /// Restore the initial cloth layout in both position buffers.
    fn reset_positions(&mut self);
}

/// Which kernel entry point a sweep runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pass {
    Integrate,
    Constrain,
}

/// One compute dispatch: read one position buffer, write the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sweep {
    pub pass: Pass,
    pub read: usize,
    pub write: usize,
}

/// Everything a backend needs to encode one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramePlan {
    pub frame: u64,
    pub strategy: StrategyKind,
    /// Buffer holding the authoritative positions at frame start.
    pub read: usize,
    /// Buffer the frame's result ends up in.
    pub write: usize,
    pub workgroups: u32,
    pub constraint_iterations: u32,
    /// `false` while paused: no compute, just redraw the current buffer.
    pub simulate: bool,
}

impl FramePlan {
    /// Compute dispatches in submission order.
    ///
    /// Each constraint iteration is a pair of sweeps (next → current,
    /// current → next), so every sweep reads the previous sweep's output and
    /// the last one always writes [`write`](Self::write).
    pub fn sweeps(&self) -> Vec<Sweep> {
        if !self.simulate {
            return Vec::new();
        }
        let mut sweeps = Vec::with_capacity(1 + 2 * self.constraint_iterations as usize);
        sweeps.push(Sweep {
            pass: Pass::Integrate,
            read: self.read,
            write: self.write,
        });
        for _ in 0..self.constraint_iterations {
            sweeps.push(Sweep {
                pass: Pass::Constrain,
                read: self.write,
                write: self.read,
            });
            sweeps.push(Sweep {
                pass: Pass::Constrain,
                read: self.read,
                write: self.write,
            });
        }
        sweeps
    }

    /// Buffer the render pass draws from.
    pub fn render_buffer(&self) -> usize {
        if self.simulate {
            self.write
        } else {
            self.read
        }
    }
}

/// Lifecycle of the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// Result of one [`FrameScheduler::tick`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame was submitted.
    Submitted,
    /// The frame failed to encode and was dropped; the loop continues.
    Skipped,
    /// The scheduler is not running; nothing was done.
    Inactive,
}

/// Counters for diagnostics and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub submitted: u64,
    pub skipped: u64,
    pub pipelines_built: u64,
}

#[derive(Debug, Default)]
struct PendingChanges {
    strategy: Option<StrategyKind>,
    gravity: Option<bool>,
    reset: bool,
}

/// Drives the frame loop over a [`FrameBackend`].
pub struct FrameScheduler {
    state: SchedulerState,
    params: SimParams,
    strategy: StrategyKind,
    active: Option<StrategyKind>,
    current: usize,
    time: Time,
    pending: Rc<RefCell<PendingChanges>>,
    stats: FrameStats,
}

impl FrameScheduler {
    pub fn new(params: SimParams, strategy: StrategyKind) -> Self {
        Self {
            state: SchedulerState::Idle,
            params,
            strategy,
            active: None,
            current: 0,
            time: Time::new(),
            pending: Rc::new(RefCell::new(PendingChanges::default())),
            stats: FrameStats::default(),
        }
    }

    /// Use `time` as the simulation clock.
    pub fn with_clock(mut self, time: Time) -> Self {
        self.time = time;
        self
    }

    /// Listen for strategy and gravity changes on `store`.
    ///
    /// Changes are only recorded here; they take effect at the start of the
    /// next tick, so several changes between frames cost one rebuild.
    pub fn subscribe(&self, store: &mut StateStore) {
        let pending = Rc::clone(&self.pending);
        store.on(EventKind::StrategyChanged, move |event| {
            if let Event::StrategyChanged(kind) = event {
                pending.borrow_mut().strategy = Some(*kind);
            }
            Ok(())
        });
        let pending = Rc::clone(&self.pending);
        store.on(EventKind::GravityToggled, move |event| {
            if let Event::GravityToggled(enabled) = event {
                pending.borrow_mut().gravity = Some(*enabled);
            }
            Ok(())
        });
    }

    /// Compile the initial strategy, upload parameters and start running.
    ///
    /// Errors here are fatal initialization errors.
    pub fn start<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> Result<(), GpuError> {
        if self.state == SchedulerState::Running {
            return Ok(());
        }
        if self.active != Some(self.strategy) {
            self.activate(backend, self.strategy)?;
        }
        backend.write_params(&self.params);
        self.state = SchedulerState::Running;
        log::info!(
            "scheduler running: {}x{} grid, strategy '{}'",
            self.params.grid_size(),
            self.params.grid_size(),
            self.strategy
        );
        Ok(())
    }

    /// Stop scheduling frames. In-flight GPU work is left to finish.
    pub fn stop(&mut self) {
        if self.state == SchedulerState::Running {
            log::info!("scheduler stopped after {} frames", self.stats.submitted);
        }
        self.state = SchedulerState::Stopped;
    }

    /// Run one frame.
    ///
    /// Returns an error only for fatal failures (a strategy that will not
    /// compile). Frame-level failures are logged and reported as
    /// [`TickOutcome::Skipped`] without swapping buffers.
    pub fn tick<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> Result<TickOutcome, GpuError> {
        if self.state != SchedulerState::Running {
            return Ok(TickOutcome::Inactive);
        }

        self.apply_pending(backend)?;

        let (elapsed, _) = self.time.update();
        self.params.time = elapsed;
        backend.write_params(&self.params);

        let plan = self.plan();
        match backend.submit_frame(&plan) {
            Ok(()) => {
                if plan.simulate {
                    self.current = plan.write;
                }
                self.stats.submitted += 1;
                Ok(TickOutcome::Submitted)
            }
            Err(err) => {
                log::warn!("dropping frame {}: {}", plan.frame, err);
                self.stats.skipped += 1;
                Ok(TickOutcome::Skipped)
            }
        }
    }

    /// The plan the next tick would submit.
    pub fn plan(&self) -> FramePlan {
        let constraint_iterations = if self.strategy.relaxes_constraints() {
            self.params.iteration_count()
        } else {
            0
        };
        let n = self.params.grid_size();
        let (read, write) = DeviceResources::swap(self.current);
        FramePlan {
            frame: self.stats.submitted,
            strategy: self.strategy,
            read,
            write,
            workgroups: workgroup_count(n.saturating_mul(n)),
            constraint_iterations,
            simulate: !self.time.is_paused(),
        }
    }

    fn apply_pending<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> Result<(), GpuError> {
        let changes = std::mem::take(&mut *self.pending.borrow_mut());

        if let Some(enabled) = changes.gravity {
            self.params.set_gravity(enabled);
            log::debug!("gravity {}", if enabled { "on" } else { "off" });
        }
        if let Some(kind) = changes.strategy {
            self.strategy = kind;
        }
        if self.active != Some(self.strategy) {
            self.activate(backend, self.strategy)?;
        }
        if changes.reset {
            backend.reset_positions();
            self.current = 0;
            self.time.reset();
            log::info!("cloth reset to rest layout");
        }
        Ok(())
    }

    fn activate<B: FrameBackend + ?Sized>(&mut self, backend: &mut B, kind: StrategyKind) -> Result<(), GpuError> {
        backend.activate_strategy(kind)?;
        self.active = Some(kind);
        self.stats.pipelines_built += 1;
        Ok(())
    }

    /// Restore the rest layout at the start of the next tick.
    pub fn request_reset(&self) {
        self.pending.borrow_mut().reset = true;
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.time.toggle_pause();
        self.time.is_paused()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }

    /// Index (0 or 1) of the buffer holding the latest positions.
    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn time(&self) -> &Time {
        &self.time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        activations: Vec<StrategyKind>,
        plans: Vec<FramePlan>,
        uploads: Vec<SimParams>,
        resets: usize,
        fail_next: bool,
    }

    impl FrameBackend for Recorder {
        fn write_params(&mut self, params: &SimParams) {
            self.uploads.push(*params);
        }

        fn activate_strategy(&mut self, kind: StrategyKind) -> Result<(), GpuError> {
            self.activations.push(kind);
            Ok(())
        }

        fn submit_frame(&mut self, plan: &FramePlan) -> Result<(), FrameError> {
            if std::mem::take(&mut self.fail_next) {
                return Err(FrameError::MissingPipeline(plan.strategy));
            }
            self.plans.push(*plan);
            Ok(())
        }

        fn reset_positions(&mut self) {
            self.resets += 1;
        }
    }

    fn scheduler(strategy: StrategyKind) -> FrameScheduler {
        let params = SimParams::new(8, 0.1).with_iterations(3);
        FrameScheduler::new(params, strategy).with_clock(Time::fixed(1.0 / 60.0))
    }

    #[test]
    fn test_idle_until_started() {
        let mut backend = Recorder::default();
        let mut sched = scheduler(StrategyKind::Pbd);
        assert_eq!(sched.state(), SchedulerState::Idle);
        assert_eq!(sched.tick(&mut backend).unwrap(), TickOutcome::Inactive);
        assert!(backend.plans.is_empty());

        sched.start(&mut backend).unwrap();
        assert!(sched.is_running());
        assert_eq!(backend.activations, vec![StrategyKind::Pbd]);
    }

    #[test]
    fn test_stop_is_quiet() {
        let mut backend = Recorder::default();
        let mut sched = scheduler(StrategyKind::Pbd);
        sched.start(&mut backend).unwrap();
        sched.tick(&mut backend).unwrap();
        sched.stop();
        assert_eq!(sched.tick(&mut backend).unwrap(), TickOutcome::Inactive);
        assert_eq!(backend.plans.len(), 1);
    }

    #[test]
    fn test_pbd_plan_is_single_sweep() {
        let sched = scheduler(StrategyKind::Pbd);
        let plan = sched.plan();
        assert_eq!(plan.workgroups, 1);
        assert_eq!(
            plan.sweeps(),
            vec![Sweep { pass: Pass::Integrate, read: 0, write: 1 }]
        );
        assert_eq!(plan.render_buffer(), 1);
    }

    #[test]
    fn test_constraint_sweeps_ping_pong_and_end_in_write() {
        let sched = scheduler(StrategyKind::MassSpring);
        let sweeps = sched.plan().sweeps();
        assert_eq!(sweeps.len(), 1 + 2 * 3);
        for pair in sweeps.windows(2) {
            assert_eq!(pair[1].read, pair[0].write);
        }
        assert!(sweeps.iter().all(|s| s.read != s.write));
        assert_eq!(sweeps.last().unwrap().write, 1);
    }

    #[test]
    fn test_plan_roles_follow_resource_swap() {
        let mut backend = Recorder::default();
        let mut sched = scheduler(StrategyKind::Pbd);
        sched.start(&mut backend).unwrap();
        for _ in 0..4 {
            let plan = sched.plan();
            assert_eq!((plan.read, plan.write), DeviceResources::swap(sched.current_index()));
            sched.tick(&mut backend).unwrap();
        }
    }

    #[test]
    fn test_oversized_params_do_not_overflow_plan() {
        let sched = FrameScheduler::new(SimParams::new(70_000, 0.01), StrategyKind::Pbd);
        assert_eq!(sched.plan().workgroups, workgroup_count(u32::MAX));
    }

    #[test]
    fn test_time_written_before_each_frame() {
        let mut backend = Recorder::default();
        let mut sched = scheduler(StrategyKind::Pbd);
        sched.start(&mut backend).unwrap();
        sched.tick(&mut backend).unwrap();
        sched.tick(&mut backend).unwrap();
        let last = backend.uploads.last().unwrap();
        assert!((last.time - 2.0 / 60.0).abs() < 1e-6);
    }

    #[test]
    fn test_skipped_frame_does_not_swap() {
        let mut backend = Recorder::default();
        let mut sched = scheduler(StrategyKind::Pbd);
        sched.start(&mut backend).unwrap();
        backend.fail_next = true;
        assert_eq!(sched.tick(&mut backend).unwrap(), TickOutcome::Skipped);
        assert_eq!(sched.current_index(), 0);
        assert_eq!(sched.tick(&mut backend).unwrap(), TickOutcome::Submitted);
        assert_eq!(sched.current_index(), 1);
        assert_eq!(sched.stats().skipped, 1);
        assert_eq!(sched.stats().submitted, 1);
    }

    #[test]
    fn test_pause_redraws_without_simulating() {
        let mut backend = Recorder::default();
        let mut sched = scheduler(StrategyKind::Pbd);
        sched.start(&mut backend).unwrap();
        assert!(sched.toggle_pause());
        sched.tick(&mut backend).unwrap();
        let plan = backend.plans[0];
        assert!(!plan.simulate);
        assert!(plan.sweeps().is_empty());
        assert_eq!(plan.render_buffer(), 0);
        assert_eq!(sched.current_index(), 0);
    }

    #[test]
    fn test_reset_request() {
        let mut backend = Recorder::default();
        let mut sched = scheduler(StrategyKind::Pbd);
        sched.start(&mut backend).unwrap();
        sched.tick(&mut backend).unwrap();
        sched.request_reset();
        sched.tick(&mut backend).unwrap();
        assert_eq!(backend.resets, 1);
        // reset puts the cloth in buffer 0, the frame then writes buffer 1
        assert_eq!(backend.plans[1].read, 0);
    }

    #[test]
    fn test_gravity_change_updates_params() {
        let mut backend = Recorder::default();
        let mut store = StateStore::default();
        let mut sched = scheduler(StrategyKind::Pbd);
        sched.subscribe(&mut store);
        sched.start(&mut backend).unwrap();

        store.set_gravity(false);
        sched.tick(&mut backend).unwrap();
        assert!(!backend.uploads.last().unwrap().gravity());
        assert_eq!(backend.activations.len(), 1);
    }

    #[test]
    fn test_changes_between_frames_coalesce() {
        let mut backend = Recorder::default();
        let mut store = StateStore::default();
        let mut sched = scheduler(StrategyKind::Pbd);
        sched.subscribe(&mut store);
        sched.start(&mut backend).unwrap();

        store.set_strategy(StrategyKind::MassSpring);
        store.set_strategy(StrategyKind::Pbd);
        sched.tick(&mut backend).unwrap();
        assert_eq!(backend.activations, vec![StrategyKind::Pbd]);
        assert_eq!(sched.stats().pipelines_built, 1);
    }
}
