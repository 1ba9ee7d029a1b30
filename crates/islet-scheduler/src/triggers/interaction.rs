//! Interaction trigger: the first configured event wins.

use islet_core::{InteractionEvent, TriggerKind};

use crate::evaluator::{Evaluator, ObserveContext, Satisfied};
use crate::host::Cancel;

pub struct InteractionTrigger {
    events: Vec<InteractionEvent>,
}

impl InteractionTrigger {
    pub fn new(events: &[InteractionEvent]) -> Self {
        let mut unique: Vec<InteractionEvent> = Vec::with_capacity(events.len());
        for event in events {
            if !unique.contains(event) {
                unique.push(*event);
            }
        }
        Self { events: unique }
    }

    pub fn events(&self) -> &[InteractionEvent] {
        &self.events
    }
}

impl Evaluator for InteractionTrigger {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Interaction
    }

    fn observe(&self, ctx: &ObserveContext<'_>, on_satisfied: Satisfied) -> Cancel {
        // All listeners share one signal; the boundary drops the merged
        // Cancel on success, which removes the siblings too.
        let listeners = self
            .events
            .iter()
            .map(|event| {
                let signal = on_satisfied.clone();
                let id = ctx.id.to_string();
                ctx.host.listen(
                    ctx.id,
                    *event,
                    Box::new(move |fired| {
                        tracing::debug!("👆 '{id}' received {fired}");
                        signal.fire();
                    }),
                )
            })
            .collect();
        Cancel::merge(listeners)
    }
}
