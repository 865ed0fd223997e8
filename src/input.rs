//! Keyboard controls and mouse orbiting.
//!
//! | key     | control                          |
//! |---------|----------------------------------|
//! | `G`     | toggle gravity                   |
//! | `1`     | select the `pbd` strategy        |
//! | `2`     | select the `massSpring` strategy |
//! | `Tab`   | cycle strategies                 |
//! | `Space` | pause / resume                   |
//! | `R`     | reset the cloth to its rest pose |
//!
//! Strategy and gravity go through the [`StateStore`], so the scheduler only
//! sees actual changes. Pause and reset act on the scheduler directly.

use glam::Vec2;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::gpu::Camera;
use crate::scheduler::FrameScheduler;
use crate::state::StateStore;
use crate::strategy::StrategyKind;

/// A user control, decoupled from the key that triggered it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    ToggleGravity,
    SelectStrategy(StrategyKind),
    CycleStrategy,
    TogglePause,
    Reset,
}

impl Control {
    pub fn from_key(key: KeyCode) -> Option<Self> {
        match key {
            KeyCode::KeyG => Some(Control::ToggleGravity),
            KeyCode::Digit1 => Some(Control::SelectStrategy(StrategyKind::Pbd)),
            KeyCode::Digit2 => Some(Control::SelectStrategy(StrategyKind::MassSpring)),
            KeyCode::Tab => Some(Control::CycleStrategy),
            KeyCode::Space => Some(Control::TogglePause),
            KeyCode::KeyR => Some(Control::Reset),
            _ => None,
        }
    }

    /// The control for a key press, ignoring releases and auto-repeat.
    pub fn from_event(event: &WindowEvent) -> Option<Self> {
        match event {
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed && !event.repeat =>
            {
                match event.physical_key {
                    PhysicalKey::Code(key) => Self::from_key(key),
                    PhysicalKey::Unidentified(_) => None,
                }
            }
            _ => None,
        }
    }

    pub fn apply(self, store: &mut StateStore, scheduler: &mut FrameScheduler) {
        match self {
            Control::ToggleGravity => {
                let enabled = store.toggle_gravity();
                log::info!("gravity {}", if enabled { "on" } else { "off" });
            }
            Control::SelectStrategy(kind) => {
                if store.set_strategy(kind) {
                    log::info!("strategy -> {}", kind);
                }
            }
            Control::CycleStrategy => {
                let next = store.state().strategy.next();
                store.set_strategy(next);
                log::info!("strategy -> {}", next);
            }
            Control::TogglePause => {
                let paused = scheduler.toggle_pause();
                log::info!("{}", if paused { "paused" } else { "resumed" });
            }
            Control::Reset => scheduler.request_reset(),
        }
    }
}

/// Left-drag orbits the camera, the wheel zooms.
#[derive(Debug, Default)]
pub struct OrbitInput {
    dragging: bool,
    last: Option<Vec2>,
}

impl OrbitInput {
    pub fn handle_event(&mut self, event: &WindowEvent, camera: &mut Camera) {
        match event {
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => self.set_dragging(*state == ElementState::Pressed),
            WindowEvent::CursorMoved { position, .. } => {
                if let Some(delta) = self.cursor_moved(Vec2::new(position.x as f32, position.y as f32)) {
                    camera.orbit(delta.x, delta.y);
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 * 0.01,
                };
                camera.zoom(scroll);
            }
            _ => {}
        }
    }

    pub fn set_dragging(&mut self, dragging: bool) {
        self.dragging = dragging;
        if !dragging {
            self.last = None;
        }
    }

    /// Drag delta since the previous cursor position, while dragging.
    pub fn cursor_moved(&mut self, position: Vec2) -> Option<Vec2> {
        if !self.dragging {
            return None;
        }
        let delta = self.last.map(|last| position - last);
        self.last = Some(position);
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Time;
    use crate::uniforms::SimParams;

    fn setup() -> (StateStore, FrameScheduler) {
        let mut store = StateStore::default();
        let scheduler = FrameScheduler::new(SimParams::new(4, 0.1), StrategyKind::Pbd)
            .with_clock(Time::fixed(0.1));
        scheduler.subscribe(&mut store);
        (store, scheduler)
    }

    #[test]
    fn test_key_bindings() {
        assert_eq!(Control::from_key(KeyCode::KeyG), Some(Control::ToggleGravity));
        assert_eq!(
            Control::from_key(KeyCode::Digit2),
            Some(Control::SelectStrategy(StrategyKind::MassSpring))
        );
        assert_eq!(Control::from_key(KeyCode::Tab), Some(Control::CycleStrategy));
        assert_eq!(Control::from_key(KeyCode::KeyQ), None);
    }

    #[test]
    fn test_strategy_controls_update_store() {
        let (mut store, mut scheduler) = setup();
        Control::SelectStrategy(StrategyKind::MassSpring).apply(&mut store, &mut scheduler);
        assert_eq!(store.state().strategy, StrategyKind::MassSpring);
        Control::CycleStrategy.apply(&mut store, &mut scheduler);
        assert_eq!(store.state().strategy, StrategyKind::Pbd);
    }

    #[test]
    fn test_gravity_and_pause_controls() {
        let (mut store, mut scheduler) = setup();
        Control::ToggleGravity.apply(&mut store, &mut scheduler);
        assert!(!store.state().gravity);
        Control::TogglePause.apply(&mut store, &mut scheduler);
        assert!(scheduler.time().is_paused());
    }

    #[test]
    fn test_drag_deltas() {
        let mut orbit = OrbitInput::default();
        assert_eq!(orbit.cursor_moved(Vec2::new(10.0, 10.0)), None);

        orbit.set_dragging(true);
        assert_eq!(orbit.cursor_moved(Vec2::new(10.0, 10.0)), None);
        assert_eq!(orbit.cursor_moved(Vec2::new(14.0, 7.0)), Some(Vec2::new(4.0, -3.0)));

        orbit.set_dragging(false);
        orbit.set_dragging(true);
        assert_eq!(orbit.cursor_moved(Vec2::new(0.0, 0.0)), None);
    }
}
