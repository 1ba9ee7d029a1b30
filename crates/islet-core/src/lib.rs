//! # Islet Core
//!
//! Shared vocabulary for the Islet progressive activation scheduler:
//! priority tiers, trigger kinds, interaction events, configuration and the
//! error type every other crate returns.

pub mod config;
pub mod error;
pub mod types;

pub use config::{HostConfig, IsletConfig, PriorityDelays, SchedulerConfig};
pub use error::{IsletError, Result};
pub use types::{BoundaryState, InteractionEvent, Priority, PriorityDelayMode, TriggerKind};
