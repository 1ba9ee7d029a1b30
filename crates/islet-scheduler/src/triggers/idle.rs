//! Idle trigger: wait for an idle period, or a plain timer when the host
//! has no idle primitive.

use std::time::Duration;

use islet_core::TriggerKind;

use crate::evaluator::{Evaluator, ObserveContext, Satisfied};
use crate::host::Cancel;

pub struct IdleTrigger {
    timeout: Duration,
}

impl IdleTrigger {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Evaluator for IdleTrigger {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Idle
    }

    fn observe(&self, ctx: &ObserveContext<'_>, on_satisfied: Satisfied) -> Cancel {
        let signal = on_satisfied.clone();
        let id = ctx.id.to_string();
        let request = ctx.host.request_idle(
            self.timeout,
            Box::new(move |deadline| {
                tracing::debug!("💤 '{id}' idle slot (timed out: {})", deadline.did_timeout);
                signal.fire();
            }),
        );
        match request {
            Some(cancel) => cancel,
            None => {
                tracing::warn!(
                    "💤 '{}' host has no idle primitive, fallback timer {}ms",
                    ctx.id,
                    self.timeout.as_millis()
                );
                ctx.host
                    .set_timeout(self.timeout, Box::new(move || on_satisfied.fire()))
            }
        }
    }
}
