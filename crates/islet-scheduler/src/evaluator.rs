//! Trigger evaluator interface.
//!
//! An evaluator watches the host for one condition and fires its
//! [`Satisfied`] signal at most once. Whatever it registered is returned as
//! a single [`Cancel`]; the boundary drops it on success or teardown.

use std::cell::RefCell;
use std::rc::Rc;

use islet_core::TriggerKind;

use crate::channel::TriggerChannel;
use crate::host::{Cancel, Host};

/// One-shot activation signal shared by every listener an evaluator attaches.
#[derive(Clone)]
pub struct Satisfied {
    slot: Rc<RefCell<Option<Box<dyn FnOnce()>>>>,
}

impl Satisfied {
    pub fn new(on_satisfied: impl FnOnce() + 'static) -> Self {
        Self {
            slot: Rc::new(RefCell::new(Some(Box::new(on_satisfied)))),
        }
    }

    /// Run the activation, the first time only.
    pub fn fire(&self) {
        let callback = self.slot.borrow_mut().take();
        if let Some(callback) = callback {
            callback();
        }
    }

    pub fn is_spent(&self) -> bool {
        self.slot.borrow().is_none()
    }
}

/// What an evaluator can see while attaching.
pub struct ObserveContext<'a> {
    /// Boundary id, also the host target and channel key.
    pub id: &'a str,
    pub host: &'a Rc<dyn Host>,
    pub channel: &'a TriggerChannel,
    pub(crate) mark_activating: &'a dyn Fn(),
}

impl ObserveContext<'_> {
    /// Record that activation is decided but still pending.
    pub fn mark_activating(&self) {
        (self.mark_activating)();
    }
}

/// Strategy that decides when a boundary activates.
pub trait Evaluator {
    fn kind(&self) -> TriggerKind;

    fn observe(&self, ctx: &ObserveContext<'_>, on_satisfied: Satisfied) -> Cancel;
}
