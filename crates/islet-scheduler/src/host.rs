//! Host environment — the observation primitives evaluators attach to.
//!
//! A [`Host`] supplies viewport intersections, interaction events, idle
//! slots, timers and connectivity. Every registration returns a [`Cancel`]
//! that releases it explicitly or on drop.
//!
//! [`EventHost`] is the bundled implementation: listener tables plus a
//! virtual clock. Embedders feed it events (`intersect`, `dispatch`,
//! `set_online`, `run_idle`) and time (`advance`). Dispatch never holds an
//! internal borrow while user callbacks run, so callbacks may register or
//! cancel freely; a registration cancelled mid-dispatch is skipped.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use islet_core::{HostConfig, InteractionEvent};

/// Releases a host registration exactly once, on [`Cancel::cancel`] or drop.
#[must_use = "dropping a Cancel releases the registration immediately"]
pub struct Cancel {
    release: Option<Box<dyn FnOnce()>>,
}

impl Cancel {
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A registration with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }

    /// Combine several registrations into one.
    pub fn merge(cancels: Vec<Cancel>) -> Self {
        Self::new(move || drop(cancels))
    }

    pub fn cancel(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Cancel {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for Cancel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cancel")
            .field("pending", &self.release.is_some())
            .finish()
    }
}

/// Viewport observation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionOptions {
    /// Visible fraction that counts as "in view".
    pub threshold: f64,
    /// Distance (px) around the viewport treated as visible.
    pub margin_px: f64,
}

/// Passed to idle callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleDeadline {
    /// True when the request timed out instead of getting an idle period.
    pub did_timeout: bool,
}

/// The environment a boundary lives in.
pub trait Host {
    /// Monotonic time since the host started.
    fn now(&self) -> Duration;

    /// Report intersection ratios for `target`.
    fn observe_intersection(
        &self,
        target: &str,
        options: IntersectionOptions,
        callback: Box<dyn FnMut(f64)>,
    ) -> Cancel;

    /// Passive listener for one interaction event on `target`.
    fn listen(
        &self,
        target: &str,
        event: InteractionEvent,
        callback: Box<dyn FnMut(InteractionEvent)>,
    ) -> Cancel;

    /// Request an idle period, bounded by `timeout`.
    /// `None` means the host has no idle-time primitive.
    fn request_idle(
        &self,
        timeout: Duration,
        callback: Box<dyn FnOnce(IdleDeadline)>,
    ) -> Option<Cancel>;

    /// One-shot timer.
    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> Cancel;

    fn is_online(&self) -> bool;

    /// Called with the new state on every connectivity change.
    fn watch_connectivity(&self, callback: Box<dyn FnMut(bool)>) -> Cancel;
}

type Shared<F> = Rc<RefCell<Box<F>>>;

struct Observer {
    target: String,
    options: IntersectionOptions,
    callback: Shared<dyn FnMut(f64)>,
}

struct Listener {
    target: String,
    event: InteractionEvent,
    callback: Shared<dyn FnMut(InteractionEvent)>,
}

struct Deadline<F: ?Sized> {
    at: Duration,
    callback: Box<F>,
}

#[derive(Default)]
struct HostState {
    now: Duration,
    online: bool,
    next_id: u64,
    observers: BTreeMap<u64, Observer>,
    listeners: BTreeMap<u64, Listener>,
    timers: BTreeMap<u64, Deadline<dyn FnOnce()>>,
    idle: BTreeMap<u64, Deadline<dyn FnOnce(IdleDeadline)>>,
    watchers: BTreeMap<u64, Shared<dyn FnMut(bool)>>,
}

impl HostState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

enum Table {
    Observers,
    Listeners,
    Timers,
    Idle,
    Watchers,
}

enum Due {
    Timer(Box<dyn FnOnce()>),
    Idle(Box<dyn FnOnce(IdleDeadline)>),
}

/// Event-fed host with a virtual clock.
#[derive(Clone)]
pub struct EventHost {
    idle_supported: bool,
    state: Rc<RefCell<HostState>>,
}

impl EventHost {
    pub fn new(idle_supported: bool, online: bool) -> Self {
        Self {
            idle_supported,
            state: Rc::new(RefCell::new(HostState {
                online,
                ..HostState::default()
            })),
        }
    }

    pub fn from_config(config: &HostConfig) -> Self {
        Self::new(config.idle_supported, config.start_online)
    }

    pub fn idle_supported(&self) -> bool {
        self.idle_supported
    }

    /// Report that `target` is now `ratio` visible.
    pub fn intersect(&self, target: &str, ratio: f64) {
        let callbacks: Vec<(u64, Shared<dyn FnMut(f64)>)> = self
            .state
            .borrow()
            .observers
            .iter()
            .filter(|(_, o)| o.target == target)
            .map(|(id, o)| (*id, o.callback.clone()))
            .collect();
        tracing::trace!("intersect {target} ratio={ratio} observers={}", callbacks.len());
        for (id, callback) in callbacks {
            if !self.state.borrow().observers.contains_key(&id) {
                continue;
            }
            if let Ok(mut f) = callback.try_borrow_mut() {
                (*f)(ratio);
            }
        }
    }

    /// Dispatch an interaction event at `target`.
    pub fn dispatch(&self, target: &str, event: InteractionEvent) {
        let callbacks: Vec<(u64, Shared<dyn FnMut(InteractionEvent)>)> = self
            .state
            .borrow()
            .listeners
            .iter()
            .filter(|(_, l)| l.target == target && l.event == event)
            .map(|(id, l)| (*id, l.callback.clone()))
            .collect();
        tracing::trace!("dispatch {event} at {target} listeners={}", callbacks.len());
        for (id, callback) in callbacks {
            if !self.state.borrow().listeners.contains_key(&id) {
                continue;
            }
            if let Ok(mut f) = callback.try_borrow_mut() {
                (*f)(event);
            }
        }
    }

    /// Change connectivity; watchers run only on an actual change.
    pub fn set_online(&self, online: bool) {
        let watchers: Vec<(u64, Shared<dyn FnMut(bool)>)> = {
            let mut state = self.state.borrow_mut();
            if state.online == online {
                return;
            }
            state.online = online;
            state
                .watchers
                .iter()
                .map(|(id, w)| (*id, w.clone()))
                .collect()
        };
        tracing::debug!("connectivity → {}", if online { "online" } else { "offline" });
        for (id, callback) in watchers {
            if !self.state.borrow().watchers.contains_key(&id) {
                continue;
            }
            if let Ok(mut f) = callback.try_borrow_mut() {
                (*f)(online);
            }
        }
    }

    /// Grant an idle period to every pending idle request.
    pub fn run_idle(&self) -> usize {
        let pending: Vec<Box<dyn FnOnce(IdleDeadline)>> = {
            let mut state = self.state.borrow_mut();
            std::mem::take(&mut state.idle)
                .into_values()
                .map(|d| d.callback)
                .collect()
        };
        let count = pending.len();
        for callback in pending {
            callback(IdleDeadline { did_timeout: false });
        }
        count
    }

    /// Move the clock forward, firing due timers and timed-out idle
    /// requests in deadline order.
    pub fn advance(&self, by: Duration) {
        let target = self.state.borrow().now + by;
        while let Some(due) = self.pop_due(target) {
            match due {
                Due::Timer(callback) => callback(),
                Due::Idle(callback) => callback(IdleDeadline { did_timeout: true }),
            }
        }
        self.state.borrow_mut().now = target;
    }

    fn pop_due(&self, target: Duration) -> Option<Due> {
        let mut state = self.state.borrow_mut();
        let timer = state
            .timers
            .iter()
            .filter(|(_, d)| d.at <= target)
            .map(|(id, d)| (d.at, *id))
            .min();
        let idle = state
            .idle
            .iter()
            .filter(|(_, d)| d.at <= target)
            .map(|(id, d)| (d.at, *id))
            .min();
        let fire_timer = match (timer, idle) {
            (None, None) => return None,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (Some(t), Some(i)) => t <= i,
        };
        if fire_timer {
            let (at, id) = timer?;
            state.now = state.now.max(at);
            state.timers.remove(&id).map(|d| Due::Timer(d.callback))
        } else {
            let (at, id) = idle?;
            state.now = state.now.max(at);
            state.idle.remove(&id).map(|d| Due::Idle(d.callback))
        }
    }

    pub fn observer_count(&self) -> usize {
        self.state.borrow().observers.len()
    }

    pub fn listener_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }

    pub fn pending_idle(&self) -> usize {
        self.state.borrow().idle.len()
    }

    pub fn watcher_count(&self) -> usize {
        self.state.borrow().watchers.len()
    }

    /// Total live registrations across every table.
    pub fn registrations(&self) -> usize {
        let s = self.state.borrow();
        s.observers.len() + s.listeners.len() + s.timers.len() + s.idle.len() + s.watchers.len()
    }

    /// Options of the observers attached to `target`.
    pub fn observer_options(&self, target: &str) -> Vec<IntersectionOptions> {
        self.state
            .borrow()
            .observers
            .values()
            .filter(|o| o.target == target)
            .map(|o| o.options)
            .collect()
    }

    fn release(&self, table: Table, id: u64) -> Cancel {
        let weak: Weak<RefCell<HostState>> = Rc::downgrade(&self.state);
        Cancel::new(move || {
            let Some(state) = weak.upgrade() else {
                return;
            };
            // Removed entries are dropped after the borrow ends: their
            // closures may own further registrations.
            let Ok(mut guard) = state.try_borrow_mut() else {
                tracing::warn!("host registration {id} released during host borrow");
                return;
            };
            match table {
                Table::Observers => {
                    let removed = guard.observers.remove(&id);
                    drop(guard);
                    drop(removed);
                }
                Table::Listeners => {
                    let removed = guard.listeners.remove(&id);
                    drop(guard);
                    drop(removed);
                }
                Table::Timers => {
                    let removed = guard.timers.remove(&id);
                    drop(guard);
                    drop(removed);
                }
                Table::Idle => {
                    let removed = guard.idle.remove(&id);
                    drop(guard);
                    drop(removed);
                }
                Table::Watchers => {
                    let removed = guard.watchers.remove(&id);
                    drop(guard);
                    drop(removed);
                }
            }
        })
    }
}

impl Default for EventHost {
    fn default() -> Self {
        Self::new(true, true)
    }
}

impl Host for EventHost {
    fn now(&self) -> Duration {
        self.state.borrow().now
    }

    fn observe_intersection(
        &self,
        target: &str,
        options: IntersectionOptions,
        callback: Box<dyn FnMut(f64)>,
    ) -> Cancel {
        let id = {
            let mut state = self.state.borrow_mut();
            let id = state.next_id();
            state.observers.insert(
                id,
                Observer {
                    target: target.to_string(),
                    options,
                    callback: Rc::new(RefCell::new(callback)),
                },
            );
            id
        };
        self.release(Table::Observers, id)
    }

    fn listen(
        &self,
        target: &str,
        event: InteractionEvent,
        callback: Box<dyn FnMut(InteractionEvent)>,
    ) -> Cancel {
        let id = {
            let mut state = self.state.borrow_mut();
            let id = state.next_id();
            state.listeners.insert(
                id,
                Listener {
                    target: target.to_string(),
                    event,
                    callback: Rc::new(RefCell::new(callback)),
                },
            );
            id
        };
        self.release(Table::Listeners, id)
    }

    fn request_idle(
        &self,
        timeout: Duration,
        callback: Box<dyn FnOnce(IdleDeadline)>,
    ) -> Option<Cancel> {
        if !self.idle_supported {
            return None;
        }
        let id = {
            let mut state = self.state.borrow_mut();
            let id = state.next_id();
            let at = state.now + timeout;
            state.idle.insert(id, Deadline { at, callback });
            id
        };
        Some(self.release(Table::Idle, id))
    }

    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> Cancel {
        let id = {
            let mut state = self.state.borrow_mut();
            let id = state.next_id();
            let at = state.now + delay;
            state.timers.insert(id, Deadline { at, callback });
            id
        };
        self.release(Table::Timers, id)
    }

    fn is_online(&self) -> bool {
        self.state.borrow().online
    }

    fn watch_connectivity(&self, callback: Box<dyn FnMut(bool)>) -> Cancel {
        let id = {
            let mut state = self.state.borrow_mut();
            let id = state.next_id();
            state.watchers.insert(id, Rc::new(RefCell::new(callback)));
            id
        };
        self.release(Table::Watchers, id)
    }
}
