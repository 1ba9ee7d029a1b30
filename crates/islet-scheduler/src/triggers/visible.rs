//! Visible trigger: activate when the boundary scrolls (nearly) into view.

use islet_core::TriggerKind;

use crate::evaluator::{Evaluator, ObserveContext, Satisfied};
use crate::host::{Cancel, IntersectionOptions};

pub struct VisibleTrigger {
    options: IntersectionOptions,
}

impl VisibleTrigger {
    pub fn new(threshold: f64, margin_px: f64) -> Self {
        Self {
            options: IntersectionOptions {
                threshold,
                margin_px,
            },
        }
    }
}

impl Evaluator for VisibleTrigger {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Visible
    }

    fn observe(&self, ctx: &ObserveContext<'_>, on_satisfied: Satisfied) -> Cancel {
        let threshold = self.options.threshold;
        let id = ctx.id.to_string();
        ctx.host.observe_intersection(
            ctx.id,
            self.options,
            Box::new(move |ratio| {
                if ratio >= threshold {
                    tracing::debug!("👁️ '{id}' intersecting at {ratio:.2}");
                    on_satisfied.fire();
                }
            }),
        )
    }
}
