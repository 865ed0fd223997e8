//! Simulation-wide mutable state with change notifications.
//!
//! The store holds the active strategy and the gravity flag. UI controls
//! change it through the setters; the scheduler subscribes so it can rebuild
//! pipelines or parameters lazily when something actually changed.
//!
//! Handlers run synchronously, in subscription order, on the thread that
//! calls [`StateStore::emit`]. A handler that fails (returns an error or
//! panics) is logged and the remaining handlers still run.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::ListenerError;
use crate::strategy::StrategyKind;

/// A state change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    StrategyChanged(StrategyKind),
    GravityToggled(bool),
}

/// Which events a handler subscribes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    StrategyChanged,
    GravityToggled,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::StrategyChanged(_) => EventKind::StrategyChanged,
            Event::GravityToggled(_) => EventKind::GravityToggled,
        }
    }
}

type Handler = Box<dyn FnMut(&Event) -> Result<(), ListenerError>>;

/// Outcome of one [`StateStore::emit`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmitReport {
    /// Handlers that ran to completion.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

/// Values held by the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimState {
    pub strategy: StrategyKind,
    pub gravity: bool,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Pbd,
            gravity: true,
        }
    }
}

/// A minimal publish-subscribe register around [`SimState`].
#[derive(Default)]
pub struct StateStore {
    state: SimState,
    strategy_handlers: Vec<Handler>,
    gravity_handlers: Vec<Handler>,
}

impl StateStore {
    pub fn new(state: SimState) -> Self {
        Self {
            state,
            strategy_handlers: Vec::new(),
            gravity_handlers: Vec::new(),
        }
    }

    pub fn state(&self) -> SimState {
        self.state
    }

    /// Subscribe `handler` to every event of `kind`.
    pub fn on<F>(&mut self, kind: EventKind, handler: F)
    where
        F: FnMut(&Event) -> Result<(), ListenerError> + 'static,
    {
        self.handlers_mut(kind).push(Box::new(handler));
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::StrategyChanged => self.strategy_handlers.len(),
            EventKind::GravityToggled => self.gravity_handlers.len(),
        }
    }

    /// Deliver `event` to its subscribers in subscription order.
    pub fn emit(&mut self, event: Event) -> EmitReport {
        let mut report = EmitReport::default();
        for (i, handler) in self.handlers_mut(event.kind()).iter_mut().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(err)) => {
                    log::warn!("{:?} handler #{} failed: {}", event.kind(), i, err);
                    report.failed += 1;
                }
                Err(_) => {
                    log::warn!("{:?} handler #{} panicked", event.kind(), i);
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Select a strategy. Emits only when it differs from the current one.
    pub fn set_strategy(&mut self, strategy: StrategyKind) -> bool {
        if self.state.strategy == strategy {
            return false;
        }
        self.state.strategy = strategy;
        self.emit(Event::StrategyChanged(strategy));
        true
    }

    /// Set the gravity flag. Emits only on an actual change.
    pub fn set_gravity(&mut self, enabled: bool) -> bool {
        if self.state.gravity == enabled {
            return false;
        }
        self.state.gravity = enabled;
        self.emit(Event::GravityToggled(enabled));
        true
    }

    pub fn toggle_gravity(&mut self) -> bool {
        let enabled = !self.state.gravity;
        self.set_gravity(enabled);
        enabled
    }

    fn handlers_mut(&mut self, kind: EventKind) -> &mut Vec<Handler> {
        match kind {
            EventKind::StrategyChanged => &mut self.strategy_handlers,
            EventKind::GravityToggled => &mut self.gravity_handlers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut store = StateStore::default();
        for id in 0..3 {
            let log = log.clone();
            store.on(EventKind::GravityToggled, move |_| {
                log.borrow_mut().push(id);
                Ok(())
            });
        }
        store.emit(Event::GravityToggled(false));
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_failing_handler_is_isolated() {
        let hits = Rc::new(RefCell::new(0));
        let mut store = StateStore::default();
        store.on(EventKind::StrategyChanged, |_| Err("boom".into()));
        store.on(EventKind::StrategyChanged, |_| panic!("listener panic"));
        {
            let hits = hits.clone();
            store.on(EventKind::StrategyChanged, move |_| {
                *hits.borrow_mut() += 1;
                Ok(())
            });
        }

        let report = store.emit(Event::StrategyChanged(StrategyKind::MassSpring));
        assert_eq!(report, EmitReport { delivered: 1, failed: 2 });
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn test_events_only_reach_their_kind() {
        let hits = Rc::new(RefCell::new(0));
        let mut store = StateStore::default();
        {
            let hits = hits.clone();
            store.on(EventKind::StrategyChanged, move |_| {
                *hits.borrow_mut() += 1;
                Ok(())
            });
        }
        store.emit(Event::GravityToggled(true));
        assert_eq!(*hits.borrow(), 0);
        assert_eq!(store.listener_count(EventKind::StrategyChanged), 1);
        assert_eq!(store.listener_count(EventKind::GravityToggled), 0);
    }

    #[test]
    fn test_setters_emit_only_on_change() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut store = StateStore::default();
        for kind in [EventKind::StrategyChanged, EventKind::GravityToggled] {
            let events = events.clone();
            store.on(kind, move |e| {
                events.borrow_mut().push(*e);
                Ok(())
            });
        }

        assert!(!store.set_strategy(StrategyKind::Pbd));
        assert!(store.set_strategy(StrategyKind::MassSpring));
        assert!(!store.set_gravity(true));
        assert!(!store.toggle_gravity());

        assert_eq!(
            *events.borrow(),
            vec![
                Event::StrategyChanged(StrategyKind::MassSpring),
                Event::GravityToggled(false),
            ]
        );
        assert_eq!(
            store.state(),
            SimState { strategy: StrategyKind::MassSpring, gravity: false }
        );
    }
}
