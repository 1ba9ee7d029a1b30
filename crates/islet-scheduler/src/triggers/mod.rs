//! Trigger configuration and the evaluator for each kind.

pub mod idle;
pub mod immediate;
pub mod interaction;
pub mod manual;
pub mod visible;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use islet_core::{InteractionEvent, IsletError, Priority, Result, SchedulerConfig, TriggerKind};

use crate::evaluator::Evaluator;
use crate::priority::PriorityDelayPolicy;

pub use idle::IdleTrigger;
pub use immediate::ImmediateTrigger;
pub use interaction::InteractionTrigger;
pub use manual::ManualTrigger;
pub use visible::VisibleTrigger;

/// A boundary's trigger and its trigger-specific settings.
/// Unset fields fall back to the scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "lowercase")]
pub enum Trigger {
    Immediate,
    Visible {
        #[serde(default)]
        threshold: Option<f64>,
        #[serde(default)]
        margin_px: Option<f64>,
    },
    Interaction {
        #[serde(default)]
        events: Option<Vec<InteractionEvent>>,
    },
    Idle {
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    Manual,
}

impl Trigger {
    pub fn visible() -> Self {
        Trigger::Visible {
            threshold: None,
            margin_px: None,
        }
    }

    pub fn interaction(events: &[InteractionEvent]) -> Self {
        Trigger::Interaction {
            events: Some(events.to_vec()),
        }
    }

    pub fn idle(timeout_ms: u64) -> Self {
        Trigger::Idle {
            timeout_ms: Some(timeout_ms),
        }
    }

    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::Immediate => TriggerKind::Immediate,
            Trigger::Visible { .. } => TriggerKind::Visible,
            Trigger::Interaction { .. } => TriggerKind::Interaction,
            Trigger::Idle { .. } => TriggerKind::Idle,
            Trigger::Manual => TriggerKind::Manual,
        }
    }
}

/// Resolve defaults, validate, and build the evaluator for one boundary.
pub fn build(
    id: &str,
    trigger: &Trigger,
    priority: Priority,
    settings: &SchedulerConfig,
    policy: &PriorityDelayPolicy,
) -> Result<Box<dyn Evaluator>> {
    let evaluator: Box<dyn Evaluator> = match trigger {
        Trigger::Immediate => Box::new(ImmediateTrigger::new(policy.decide(priority))),
        Trigger::Visible {
            threshold,
            margin_px,
        } => {
            let threshold = threshold.unwrap_or(settings.visible_threshold);
            let margin_px = margin_px.unwrap_or(settings.visible_margin_px);
            if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
                return Err(IsletError::invalid(
                    id,
                    format!("visibility threshold {threshold} outside [0, 1]"),
                ));
            }
            if !margin_px.is_finite() || margin_px < 0.0 {
                return Err(IsletError::invalid(
                    id,
                    format!("visibility margin {margin_px} must be non-negative"),
                ));
            }
            Box::new(VisibleTrigger::new(threshold, margin_px))
        }
        Trigger::Interaction { events } => {
            let events = events.as_deref().unwrap_or(&settings.interaction_events);
            if events.is_empty() {
                return Err(IsletError::invalid(id, "interaction trigger needs at least one event"));
            }
            Box::new(InteractionTrigger::new(events))
        }
        Trigger::Idle { timeout_ms } => {
            let timeout = timeout_ms.unwrap_or(settings.idle_timeout_ms);
            Box::new(IdleTrigger::new(Duration::from_millis(timeout)))
        }
        Trigger::Manual => Box::new(ManualTrigger),
    };
    Ok(evaluator)
}
