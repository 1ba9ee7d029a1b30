//! Immediate trigger: active at construction, or after the tier delay.

use islet_core::TriggerKind;

use crate::evaluator::{Evaluator, ObserveContext, Satisfied};
use crate::host::Cancel;
use crate::priority::DelayDecision;

pub struct ImmediateTrigger {
    decision: DelayDecision,
}

impl ImmediateTrigger {
    pub fn new(decision: DelayDecision) -> Self {
        Self { decision }
    }
}

impl Evaluator for ImmediateTrigger {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Immediate
    }

    fn observe(&self, ctx: &ObserveContext<'_>, on_satisfied: Satisfied) -> Cancel {
        match self.decision {
            DelayDecision::Now => {
                on_satisfied.fire();
                Cancel::noop()
            }
            DelayDecision::Reported(delay) => {
                tracing::debug!(
                    "⏱️ '{}' tier delay {}ms reported, activating now",
                    ctx.id,
                    delay.as_millis()
                );
                on_satisfied.fire();
                Cancel::noop()
            }
            DelayDecision::After(delay) => {
                tracing::debug!("⏱️ '{}' deferred by tier delay {}ms", ctx.id, delay.as_millis());
                ctx.mark_activating();
                ctx.host
                    .set_timeout(delay, Box::new(move || on_satisfied.fire()))
            }
        }
    }
}
