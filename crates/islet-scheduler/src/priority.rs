//! Priority delay policy for `Immediate` boundaries.
//!
//! Each tier maps to a delay (critical 0, high 50, normal 150, low 300,
//! manual 0 ms by default). In `Defer` mode a non-zero delay holds the
//! boundary dormant until it elapses. In `Vestigial` mode the boundary is
//! active at construction and the delay is only reported.

use std::time::Duration;

use islet_core::{Priority, PriorityDelayMode, PriorityDelays, SchedulerConfig};

/// What the policy decided for one boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayDecision {
    /// Activate synchronously.
    Now,
    /// Activate after the delay.
    After(Duration),
    /// Activate synchronously; the tier delay is informational.
    Reported(Duration),
}

#[derive(Debug, Clone)]
pub struct PriorityDelayPolicy {
    mode: PriorityDelayMode,
    delays: PriorityDelays,
}

impl PriorityDelayPolicy {
    pub fn new(mode: PriorityDelayMode, delays: PriorityDelays) -> Self {
        Self { mode, delays }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config.priority_delay_mode, config.priority_delays.clone())
    }

    pub fn mode(&self) -> PriorityDelayMode {
        self.mode
    }

    pub fn delay_for(&self, priority: Priority) -> Duration {
        Duration::from_millis(self.delays.for_priority(priority))
    }

    pub fn decide(&self, priority: Priority) -> DelayDecision {
        let delay = self.delay_for(priority);
        if delay.is_zero() {
            return DelayDecision::Now;
        }
        match self.mode {
            PriorityDelayMode::Defer => DelayDecision::After(delay),
            PriorityDelayMode::Vestigial => DelayDecision::Reported(delay),
        }
    }
}

impl Default for PriorityDelayPolicy {
    fn default() -> Self {
        Self::new(PriorityDelayMode::default(), PriorityDelays::default())
    }
}
