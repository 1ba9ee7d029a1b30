//! Boundary — one unit of deferred content and its activation state.
//!
//! ```text
//! dormant ──(evaluator satisfied)──▶ active
//!    │                                 ▲
//!    └──▶ activating ──(tier delay)────┘
//! ```
//!
//! Activation is one-way and happens at most once. The evaluator's host
//! registrations are released the moment it succeeds, or at teardown.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde::Serialize;

use islet_core::{BoundaryState, Priority, TriggerKind};

use crate::connectivity::{ConnectivityGate, RenderDecision};
use crate::engine::Registry;
use crate::host::{Cancel, Host};
use crate::triggers::Trigger;

/// Passed to `on_activated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub id: String,
    pub priority: Priority,
    pub trigger: TriggerKind,
    /// Time from registration to activation.
    pub elapsed: Duration,
}

/// Status of a boundary as seen by code that does not hold its handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BoundaryStatus {
    pub is_active: bool,
    pub is_activating: bool,
}

/// Registration request for one boundary.
pub struct BoundarySpec<T> {
    pub(crate) id: Option<String>,
    pub(crate) priority: Option<Priority>,
    pub(crate) trigger: Trigger,
    pub(crate) placeholder: T,
    pub(crate) content: T,
    pub(crate) respect_connection_speed: bool,
    pub(crate) on_activated: Option<Box<dyn FnOnce(&Activation)>>,
    pub(crate) on_render_change: Option<Box<dyn FnMut(RenderDecision)>>,
}

impl<T> BoundarySpec<T> {
    pub fn new(trigger: Trigger, placeholder: T, content: T) -> Self {
        Self {
            id: None,
            priority: None,
            trigger,
            placeholder,
            content,
            respect_connection_speed: false,
            on_activated: None,
            on_render_change: None,
        }
    }

    /// Explicit id. Omitted ids get a random token.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Keep the placeholder while the host is offline.
    pub fn respect_connection_speed(mut self, respect: bool) -> Self {
        self.respect_connection_speed = respect;
        self
    }

    /// Called once, the first time the boundary becomes active.
    pub fn on_activated(mut self, callback: impl FnOnce(&Activation) + 'static) -> Self {
        self.on_activated = Some(Box::new(callback));
        self
    }

    /// Called whenever the rendered payload flips.
    pub fn on_render_change(mut self, callback: impl FnMut(RenderDecision) + 'static) -> Self {
        self.on_render_change = Some(Box::new(callback));
        self
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }
}

pub(crate) struct BoundaryCore {
    id: String,
    priority: Priority,
    trigger: TriggerKind,
    host: Rc<dyn Host>,
    state: Cell<BoundaryState>,
    created_at: Duration,
    activated_at: Cell<Option<Duration>>,
    torn_down: Cell<bool>,
    guard: RefCell<Option<Cancel>>,
    gate: RefCell<ConnectivityGate>,
    rendered: Cell<RenderDecision>,
    activation_fired: Cell<bool>,
    on_activated: RefCell<Option<Box<dyn FnOnce(&Activation)>>>,
    on_render_change: RefCell<Option<Box<dyn FnMut(RenderDecision)>>>,
}

impl BoundaryCore {
    pub(crate) fn new(
        id: String,
        priority: Priority,
        trigger: TriggerKind,
        host: Rc<dyn Host>,
        respect_connection_speed: bool,
        on_activated: Option<Box<dyn FnOnce(&Activation)>>,
        on_render_change: Option<Box<dyn FnMut(RenderDecision)>>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<BoundaryCore>| {
            let gate = if respect_connection_speed {
                let weak = weak.clone();
                ConnectivityGate::attach(&host, move |online| {
                    if let Some(core) = weak.upgrade() {
                        core.connectivity_changed(online);
                    }
                })
            } else {
                ConnectivityGate::disabled()
            };
            Self {
                created_at: host.now(),
                id,
                priority,
                trigger,
                host,
                state: Cell::new(BoundaryState::Dormant),
                activated_at: Cell::new(None),
                torn_down: Cell::new(false),
                guard: RefCell::new(None),
                gate: RefCell::new(gate),
                rendered: Cell::new(RenderDecision::Placeholder),
                activation_fired: Cell::new(false),
                on_activated: RefCell::new(on_activated),
                on_render_change: RefCell::new(on_render_change),
            }
        })
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn trigger_kind(&self) -> TriggerKind {
        self.trigger
    }

    pub(crate) fn state(&self) -> BoundaryState {
        self.state.get()
    }

    pub(crate) fn is_live(&self) -> bool {
        !self.torn_down.get()
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state.get() == BoundaryState::Active
    }

    pub(crate) fn deferred(&self) -> bool {
        self.gate.borrow().defers(self.is_active())
    }

    pub(crate) fn render_decision(&self) -> RenderDecision {
        self.gate.borrow().decide(self.is_active())
    }

    pub(crate) fn status(&self) -> BoundaryStatus {
        BoundaryStatus {
            is_active: self.is_active(),
            is_activating: self.state.get() == BoundaryState::Activating,
        }
    }

    /// Registration-to-activation interval, once active.
    pub(crate) fn activation_elapsed(&self) -> Option<Duration> {
        self.activated_at
            .get()
            .map(|at| at.saturating_sub(self.created_at))
    }

    /// Hold the evaluator's registrations until success or teardown.
    pub(crate) fn install_guard(&self, guard: Cancel) {
        if self.is_active() || !self.is_live() {
            // Satisfied while attaching, or torn down from a callback.
            drop(guard);
            return;
        }
        let previous = self.guard.borrow_mut().replace(guard);
        drop(previous);
    }

    pub(crate) fn mark_activating(&self) {
        if self.is_live() && self.state.get() == BoundaryState::Dormant {
            self.state.set(BoundaryState::Activating);
        }
    }

    /// Dormant → active. Returns false when already active or torn down.
    pub(crate) fn activate(&self) -> bool {
        if !self.is_live() || self.is_active() {
            return false;
        }
        let now = self.host.now();
        self.state.set(BoundaryState::Active);
        self.activated_at.set(Some(now));

        let guard = self.guard.borrow_mut().take();
        drop(guard);

        let elapsed = now.saturating_sub(self.created_at);
        tracing::info!(
            "⚡ Boundary activated: '{}' ({}, {}) after {}ms",
            self.id,
            self.trigger,
            self.priority,
            elapsed.as_millis()
        );

        if !self.activation_fired.replace(true) {
            let callback = self.on_activated.borrow_mut().take();
            if let Some(callback) = callback {
                callback(&Activation {
                    id: self.id.clone(),
                    priority: self.priority,
                    trigger: self.trigger,
                    elapsed,
                });
            }
        }

        self.refresh_render();
        true
    }

    fn connectivity_changed(&self, online: bool) {
        if !self.is_live() {
            return;
        }
        if self.is_active() {
            tracing::debug!(
                "🌐 '{}' connectivity {} while active",
                self.id,
                if online { "restored" } else { "lost" }
            );
        }
        self.refresh_render();
    }

    fn refresh_render(&self) {
        let decision = self.render_decision();
        if self.rendered.replace(decision) == decision {
            return;
        }
        let callback = self.on_render_change.borrow_mut().take();
        if let Some(mut callback) = callback {
            callback(decision);
            let mut slot = self.on_render_change.borrow_mut();
            if slot.is_none() && self.is_live() {
                *slot = Some(callback);
            }
        }
    }

    /// Cancel all pending evaluator work. Idempotent.
    pub(crate) fn teardown(&self) {
        if self.torn_down.replace(true) {
            return;
        }
        let guard = self.guard.borrow_mut().take();
        drop(guard);
        self.gate.borrow_mut().release();
        let on_activated = self.on_activated.borrow_mut().take();
        let on_render_change = self.on_render_change.borrow_mut().take();
        drop((on_activated, on_render_change));
        tracing::debug!("🧹 Boundary torn down: '{}' ({})", self.id, self.state.get());
    }
}

/// Live handle to a registered boundary. Dropping it tears the boundary down.
pub struct Boundary<T> {
    pub(crate) core: Rc<BoundaryCore>,
    registry: Weak<RefCell<Registry>>,
    placeholder: T,
    content: T,
}

impl<T> Boundary<T> {
    pub(crate) fn new(
        core: Rc<BoundaryCore>,
        registry: Weak<RefCell<Registry>>,
        placeholder: T,
        content: T,
    ) -> Self {
        Self {
            core,
            registry,
            placeholder,
            content,
        }
    }

    pub fn id(&self) -> &str {
        &self.core.id
    }

    pub fn priority(&self) -> Priority {
        self.core.priority
    }

    pub fn trigger(&self) -> TriggerKind {
        self.core.trigger
    }

    /// `Dormant` or `Active`; a pending tier delay reads as `Dormant`.
    pub fn state(&self) -> BoundaryState {
        self.core.state().observable()
    }

    pub fn is_active(&self) -> bool {
        self.core.is_active()
    }

    /// Active, but still showing the placeholder because the host is offline.
    pub fn deferred(&self) -> bool {
        self.core.deferred()
    }

    pub fn status(&self) -> BoundaryStatus {
        self.core.status()
    }

    pub fn render_decision(&self) -> RenderDecision {
        self.core.render_decision()
    }

    /// The payload to show right now.
    pub fn render(&self) -> &T {
        match self.render_decision() {
            RenderDecision::Content => &self.content,
            RenderDecision::Placeholder => &self.placeholder,
        }
    }

    pub fn placeholder(&self) -> &T {
        &self.placeholder
    }

    pub fn content(&self) -> &T {
        &self.content
    }

    pub fn activation_elapsed(&self) -> Option<Duration> {
        self.core.activation_elapsed()
    }

    /// Unmount: cancel pending evaluator work and leave the registry.
    pub fn teardown(self) {
        drop(self);
    }
}

impl<T> Drop for Boundary<T> {
    fn drop(&mut self) {
        self.core.teardown();
        if let Some(registry) = self.registry.upgrade()
            && let Ok(mut registry) = registry.try_borrow_mut()
        {
            registry.remove(&self.core);
        }
    }
}

impl<T> std::fmt::Debug for Boundary<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Boundary")
            .field("id", &self.core.id)
            .field("priority", &self.core.priority)
            .field("trigger", &self.core.trigger)
            .field("state", &self.core.state())
            .field("deferred", &self.deferred())
            .finish()
    }
}
