//! # Islet Scheduler
//!
//! Progressive activation: content renders as a placeholder right away and
//! becomes interactive later, when its trigger fires.
//!
//! ## Design Principles
//! - Single-threaded and event-driven — `Rc`/`RefCell`, no locks, no polling
//! - One evaluator per boundary, chosen at registration, never swapped
//! - Activation is one-way and fires `on_activated` at most once
//! - Every host registration is released on success or teardown
//! - Failures degrade (fallback timer, dropped signal), never surface
//!
//! ## Architecture
//! ```text
//! Scheduler::register(spec)
//!   ├── Immediate   → now, or after the tier delay (PriorityDelayPolicy)
//!   ├── Visible     → Host::observe_intersection (threshold, margin)
//!   ├── Interaction → Host::listen × events, first one wins
//!   ├── Idle        → Host::request_idle, else Host::set_timeout
//!   └── Manual      → TriggerChannel::subscribe(id)
//!         └── satisfied → Boundary: dormant → active
//!                           └── ConnectivityGate → placeholder | content
//!
//! Scheduler::status(id) / Scheduler::metrics() → read-only views
//! ```

pub mod boundary;
pub mod channel;
pub mod connectivity;
pub mod driver;
pub mod engine;
pub mod evaluator;
pub mod host;
pub mod metrics;
pub mod priority;
pub mod triggers;

pub use boundary::{Activation, Boundary, BoundarySpec, BoundaryStatus};
pub use channel::{ManualSignal, Subscription, TriggerChannel};
pub use connectivity::{ConnectivityGate, RenderDecision};
pub use driver::{run_for, run_realtime};
pub use engine::Scheduler;
pub use evaluator::{Evaluator, ObserveContext, Satisfied};
pub use host::{Cancel, EventHost, Host, IdleDeadline, IntersectionOptions};
pub use metrics::SchedulerMetrics;
pub use priority::{DelayDecision, PriorityDelayPolicy};
pub use triggers::Trigger;
