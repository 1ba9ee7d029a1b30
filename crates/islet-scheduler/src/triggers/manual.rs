//! Manual trigger: activated through the channel, under the boundary id.

use islet_core::TriggerKind;

use crate::evaluator::{Evaluator, ObserveContext, Satisfied};
use crate::host::Cancel;

pub struct ManualTrigger;

impl Evaluator for ManualTrigger {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Manual
    }

    fn observe(&self, ctx: &ObserveContext<'_>, on_satisfied: Satisfied) -> Cancel {
        ctx.channel
            .subscribe(ctx.id, move || on_satisfied.fire())
            .into()
    }
}
