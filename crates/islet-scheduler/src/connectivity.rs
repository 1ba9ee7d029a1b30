//! Connectivity gate — keeps the placeholder up while offline.
//!
//! The gate never delays activation or `on_activated`; it only decides
//! which payload renders. Reconnecting flips the decision back without
//! touching the evaluator.

use std::cell::Cell;
use std::rc::Rc;

use serde::Serialize;

use crate::host::{Cancel, Host};

/// Which payload a boundary renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderDecision {
    Placeholder,
    Content,
}

/// `content = active AND NOT (respect_connection AND offline)`.
pub fn render_decision(active: bool, respect_connection: bool, online: bool) -> RenderDecision {
    if active && !(respect_connection && !online) {
        RenderDecision::Content
    } else {
        RenderDecision::Placeholder
    }
}

pub struct ConnectivityGate {
    respect: bool,
    online: Rc<Cell<bool>>,
    watch: Option<Cancel>,
}

impl ConnectivityGate {
    /// A gate that ignores connectivity.
    pub fn disabled() -> Self {
        Self {
            respect: false,
            online: Rc::new(Cell::new(true)),
            watch: None,
        }
    }

    /// Track the host's connectivity; `on_change` runs after each change.
    pub fn attach(host: &Rc<dyn Host>, mut on_change: impl FnMut(bool) + 'static) -> Self {
        let online = Rc::new(Cell::new(host.is_online()));
        let tracked = online.clone();
        let watch = host.watch_connectivity(Box::new(move |now_online| {
            tracked.set(now_online);
            on_change(now_online);
        }));
        Self {
            respect: true,
            online,
            watch: Some(watch),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.get()
    }

    pub fn decide(&self, active: bool) -> RenderDecision {
        render_decision(active, self.respect, self.online.get())
    }

    /// True when active but held back by connectivity.
    pub fn defers(&self, active: bool) -> bool {
        active && self.decide(active) == RenderDecision::Placeholder
    }

    /// Stop watching the host. The last known state stays readable.
    pub fn release(&mut self) {
        self.watch.take();
    }
}
