//! Boundary vocabulary — priority tiers, trigger kinds, interaction events.

use serde::{Deserialize, Serialize};

/// Advisory priority tier of a boundary.
///
/// Priority is metadata, not a queue discipline: a `Low` boundary whose
/// trigger fires first activates first. Only the `Immediate` trigger turns
/// the tier into timing, through the priority delay policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
    Manual,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
        Priority::Manual,
    ];
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Critical => write!(f, "critical"),
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
            Priority::Manual => write!(f, "manual"),
        }
    }
}

/// Which evaluator watches a boundary. Fixed for the boundary's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Immediate,
    Visible,
    Interaction,
    Idle,
    Manual,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerKind::Immediate => write!(f, "immediate"),
            TriggerKind::Visible => write!(f, "visible"),
            TriggerKind::Interaction => write!(f, "interaction"),
            TriggerKind::Idle => write!(f, "idle"),
            TriggerKind::Manual => write!(f, "manual"),
        }
    }
}

/// User interaction events an `Interaction` trigger can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionEvent {
    PointerEnter,
    Focus,
    TouchStart,
    Click,
    KeyDown,
}

impl InteractionEvent {
    /// Events listened for when a boundary does not name its own.
    pub fn defaults() -> Vec<InteractionEvent> {
        vec![
            InteractionEvent::PointerEnter,
            InteractionEvent::Focus,
            InteractionEvent::TouchStart,
        ]
    }
}

impl std::fmt::Display for InteractionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InteractionEvent::PointerEnter => write!(f, "pointer-enter"),
            InteractionEvent::Focus => write!(f, "focus"),
            InteractionEvent::TouchStart => write!(f, "touch-start"),
            InteractionEvent::Click => write!(f, "click"),
            InteractionEvent::KeyDown => write!(f, "key-down"),
        }
    }
}

/// Boundary lifecycle. `Activating` is internal bookkeeping while a
/// priority delay is pending; handles report it as `Dormant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryState {
    Dormant,
    Activating,
    Active,
}

impl BoundaryState {
    /// The externally observable state.
    pub fn observable(self) -> BoundaryState {
        match self {
            BoundaryState::Activating => BoundaryState::Dormant,
            other => other,
        }
    }
}

impl std::fmt::Display for BoundaryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundaryState::Dormant => write!(f, "dormant"),
            BoundaryState::Activating => write!(f, "activating"),
            BoundaryState::Active => write!(f, "active"),
        }
    }
}

/// How the tier delay applies to `Immediate` boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityDelayMode {
    /// Non-critical immediates stay dormant until the tier delay elapses.
    #[default]
    Defer,
    /// Immediates activate at construction; the delay is only reported.
    Vestigial,
}
