//! Scheduler — registers boundaries and answers status/metrics queries.
//!
//! Owns the host handle, the manual trigger channel and a weak index of
//! live boundaries. Boundaries are owned by their handles; the index only
//! lets unrelated code ask about them by id.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use islet_core::{IsletConfig, IsletError, Priority, Result, SchedulerConfig, TriggerKind};

use crate::boundary::{Boundary, BoundaryCore, BoundarySpec, BoundaryStatus};
use crate::channel::{ManualSignal, TriggerChannel};
use crate::evaluator::{ObserveContext, Satisfied};
use crate::host::Host;
use crate::metrics::{BoundarySample, SchedulerMetrics};
use crate::priority::PriorityDelayPolicy;
use crate::triggers::{self, Trigger};

/// Weak index of live boundaries by id.
#[derive(Default)]
pub(crate) struct Registry {
    boundaries: HashMap<String, Weak<BoundaryCore>>,
}

impl Registry {
    fn live(&self, id: &str) -> Option<Rc<BoundaryCore>> {
        self.boundaries
            .get(id)
            .and_then(Weak::upgrade)
            .filter(|core| core.is_live())
    }

    fn insert(&mut self, core: &Rc<BoundaryCore>) {
        self.boundaries
            .insert(core.id().to_string(), Rc::downgrade(core));
    }

    pub(crate) fn remove(&mut self, core: &Rc<BoundaryCore>) {
        let owned = self
            .boundaries
            .get(core.id())
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), Rc::as_ptr(core)));
        if owned {
            self.boundaries.remove(core.id());
        }
    }

    fn prune(&mut self) {
        self.boundaries
            .retain(|_, weak| weak.upgrade().is_some_and(|core| core.is_live()));
    }

    fn cores(&self) -> Vec<Rc<BoundaryCore>> {
        self.boundaries
            .values()
            .filter_map(Weak::upgrade)
            .filter(|core| core.is_live())
            .collect()
    }
}

/// The progressive activation scheduler.
pub struct Scheduler {
    host: Rc<dyn Host>,
    channel: TriggerChannel,
    settings: SchedulerConfig,
    policy: PriorityDelayPolicy,
    registry: Rc<RefCell<Registry>>,
}

impl Scheduler {
    pub fn new(settings: SchedulerConfig, host: Rc<dyn Host>) -> Self {
        let policy = PriorityDelayPolicy::from_config(&settings);
        Self {
            host,
            channel: TriggerChannel::new(),
            settings,
            policy,
            registry: Rc::new(RefCell::new(Registry::default())),
        }
    }

    pub fn from_config(config: &IsletConfig, host: Rc<dyn Host>) -> Self {
        Self::new(config.scheduler.clone(), host)
    }

    /// Share an existing channel, e.g. between schedulers on one page.
    pub fn with_channel(mut self, channel: TriggerChannel) -> Self {
        self.channel = channel;
        self
    }

    pub fn host(&self) -> &Rc<dyn Host> {
        &self.host
    }

    pub fn channel(&self) -> &TriggerChannel {
        &self.channel
    }

    pub fn settings(&self) -> &SchedulerConfig {
        &self.settings
    }

    pub fn policy(&self) -> &PriorityDelayPolicy {
        &self.policy
    }

    /// Register a boundary and attach its evaluator.
    pub fn register<T>(&self, spec: BoundarySpec<T>) -> Result<Boundary<T>> {
        let BoundarySpec {
            id,
            priority,
            trigger,
            placeholder,
            content,
            respect_connection_speed,
            on_activated,
            on_render_change,
        } = spec;

        let id = match id {
            Some(id) if id.trim().is_empty() => {
                return Err(IsletError::invalid(&id, "boundary id must not be empty"));
            }
            Some(id) => id,
            None => new_boundary_id(),
        };
        let priority = priority.unwrap_or(self.settings.default_priority);

        {
            let mut registry = self.registry.borrow_mut();
            registry.prune();
            if registry.live(&id).is_some() {
                return Err(IsletError::DuplicateId(id));
            }
        }

        let evaluator = triggers::build(&id, &trigger, priority, &self.settings, &self.policy)?;
        let core = BoundaryCore::new(
            id.clone(),
            priority,
            trigger.kind(),
            self.host.clone(),
            respect_connection_speed,
            on_activated,
            on_render_change,
        );
        self.registry.borrow_mut().insert(&core);

        tracing::info!(
            "📌 Boundary registered: '{}' ({}, {}{})",
            id,
            trigger.kind(),
            priority,
            if respect_connection_speed { ", connection-aware" } else { "" }
        );

        let weak = Rc::downgrade(&core);
        let satisfied = Satisfied::new(move || {
            // Liveness check: the handle may be gone by the time the host
            // callback runs.
            if let Some(core) = weak.upgrade() {
                core.activate();
            }
        });
        let mark = {
            let core = core.clone();
            move || core.mark_activating()
        };
        let ctx = ObserveContext {
            id: &id,
            host: &self.host,
            channel: &self.channel,
            mark_activating: &mark,
        };
        let guard = evaluator.observe(&ctx, satisfied);
        core.install_guard(guard);

        Ok(Boundary::new(
            core,
            Rc::downgrade(&self.registry),
            placeholder,
            content,
        ))
    }

    /// Register a manual boundary under a fresh random id, with all other
    /// settings at their defaults. Returns the handle and its signal.
    pub fn manual_boundary<T>(&self, placeholder: T, content: T) -> Result<(Boundary<T>, ManualSignal)> {
        let spec = BoundarySpec::new(Trigger::Manual, placeholder, content)
            .id(new_boundary_id())
            .priority(Priority::Manual);
        let boundary = self.register(spec)?;
        let signal = self.channel.signal(boundary.id());
        Ok((boundary, signal))
    }

    /// Scoped publish handle for `id`.
    pub fn signal(&self, id: &str) -> ManualSignal {
        self.channel.signal(id)
    }

    /// Publish a manual activation for `id`. Fire-and-forget.
    pub fn publish(&self, id: &str) {
        self.channel.publish(id);
    }

    /// Status by id; unknown or torn-down ids read as neither active nor activating.
    pub fn status(&self, id: &str) -> BoundaryStatus {
        let core = self.registry.borrow().live(id);
        core.map(|core| core.status()).unwrap_or_default()
    }

    /// Trigger kind of a live boundary.
    pub fn trigger_of(&self, id: &str) -> Option<TriggerKind> {
        let core = self.registry.borrow().live(id);
        core.map(|core| core.trigger_kind())
    }

    pub fn metrics(&self) -> SchedulerMetrics {
        let cores = self.registry.borrow().cores();
        let samples: Vec<BoundarySample> = cores
            .iter()
            .map(|core| BoundarySample {
                active: core.is_active(),
                deferred: core.deferred(),
                activation: core.activation_elapsed(),
            })
            .collect();
        SchedulerMetrics::from_samples(&samples)
    }

    /// Live boundary ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .registry
            .borrow()
            .cores()
            .iter()
            .map(|core| core.id().to_string())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.registry.borrow().cores().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn new_boundary_id() -> String {
    format!("islet-{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::RenderDecision;
    use crate::host::EventHost;
    use islet_core::{BoundaryState, InteractionEvent, PriorityDelayMode};
    use std::cell::Cell;
    use std::time::Duration;

    fn setup(idle_supported: bool, online: bool) -> (Scheduler, EventHost) {
        let host = EventHost::new(idle_supported, online);
        let scheduler = Scheduler::new(SchedulerConfig::default(), Rc::new(host.clone()));
        (scheduler, host)
    }

    fn counter() -> Rc<Cell<u32>> {
        Rc::new(Cell::new(0))
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_critical_immediate_active_at_construction() {
        let (sched, host) = setup(true, true);
        let b = sched
            .register(BoundarySpec::new(Trigger::Immediate, "ph", "content").priority(Priority::Critical))
            .unwrap();
        assert_eq!(b.state(), BoundaryState::Active);
        assert_eq!(*b.render(), "content");
        assert_eq!(b.activation_elapsed(), Some(Duration::ZERO));
        assert_eq!(host.registrations(), 0);
    }

    #[test]
    fn test_priority_delay_defers_immediate() {
        let (sched, host) = setup(true, true);
        let fired = counter();
        let f = fired.clone();
        let b = sched
            .register(
                BoundarySpec::new(Trigger::Immediate, "ph", "content")
                    .id("feed")
                    .priority(Priority::Low)
                    .on_activated(move |_| f.set(f.get() + 1)),
            )
            .unwrap();

        assert_eq!(b.state(), BoundaryState::Dormant);
        assert_eq!(sched.status("feed"), BoundaryStatus { is_active: false, is_activating: true });
        host.advance(ms(299));
        assert!(!b.is_active());
        host.advance(ms(1));
        assert!(b.is_active());
        assert_eq!(b.activation_elapsed(), Some(ms(300)));
        assert_eq!(fired.get(), 1);
        assert_eq!(sched.status("feed"), BoundaryStatus { is_active: true, is_activating: false });
    }

    #[test]
    fn test_vestigial_delay_activates_immediately() {
        let host = EventHost::default();
        let settings = SchedulerConfig {
            priority_delay_mode: PriorityDelayMode::Vestigial,
            ..SchedulerConfig::default()
        };
        let sched = Scheduler::new(settings, Rc::new(host.clone()));
        assert_eq!(sched.policy().mode(), PriorityDelayMode::Vestigial);
        assert_eq!(sched.settings().priority_delay_mode, PriorityDelayMode::Vestigial);
        assert_eq!(sched.host().now(), Duration::ZERO);

        let b = sched
            .register(BoundarySpec::new(Trigger::Immediate, (), ()).priority(Priority::Low))
            .unwrap();
        assert!(b.is_active());
        assert_eq!(host.pending_timers(), 0);
    }

    #[test]
    fn test_visible_activates_once_and_detaches() {
        let (sched, host) = setup(true, true);
        let fired = counter();
        let f = fired.clone();
        let b = sched
            .register(
                BoundarySpec::new(Trigger::visible(), "ph", "chart")
                    .id("chart")
                    .on_activated(move |_| f.set(f.get() + 1)),
            )
            .unwrap();
        assert_eq!(host.observer_count(), 1);
        assert_eq!(host.observer_options("chart")[0].margin_px, 50.0);

        host.intersect("chart", 0.05);
        assert_eq!(b.state(), BoundaryState::Dormant);
        host.intersect("chart", 0.1);
        assert_eq!(b.state(), BoundaryState::Active);
        assert_eq!(host.observer_count(), 0);

        host.intersect("chart", 1.0);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_visible_torn_down_before_intersection() {
        let (sched, host) = setup(true, true);
        let fired = counter();
        let f = fired.clone();
        let b = sched
            .register(
                BoundarySpec::new(Trigger::visible(), (), ())
                    .id("below-fold")
                    .on_activated(move |_| f.set(f.get() + 1)),
            )
            .unwrap();
        b.teardown();
        assert_eq!(host.registrations(), 0);

        host.intersect("below-fold", 1.0);
        assert_eq!(fired.get(), 0);
        assert_eq!(sched.status("below-fold"), BoundaryStatus::default());
        assert!(sched.is_empty());
    }

    fn tracked(id: &str, trigger: Trigger, fired: &Rc<Cell<u32>>) -> BoundarySpec<()> {
        let f = fired.clone();
        BoundarySpec::new(trigger, (), ())
            .id(id)
            .respect_connection_speed(true)
            .on_activated(move |_| f.set(f.get() + 1))
    }

    #[test]
    fn test_teardown_releases_every_trigger_kind() {
        let (sched, host) = setup(true, true);
        let (fallback_sched, fallback_host) = setup(false, true);
        let fired = counter();

        let boundaries = vec![
            sched.register(tracked("hero", Trigger::Immediate, &fired)).unwrap(),
            sched.register(tracked("chart", Trigger::visible(), &fired)).unwrap(),
            sched
                .register(tracked("menu", Trigger::Interaction { events: None }, &fired))
                .unwrap(),
            sched
                .register(tracked("related", Trigger::Idle { timeout_ms: None }, &fired))
                .unwrap(),
            sched.register(tracked("chat", Trigger::Manual, &fired)).unwrap(),
            fallback_sched
                .register(tracked("lazy", Trigger::idle(500), &fired))
                .unwrap(),
        ];
        // tier timer + observer + 3 listeners + idle request, one watcher each
        assert_eq!(host.registrations(), 11);
        assert_eq!(host.watcher_count(), 5);
        assert_eq!(sched.channel().subscriber_count("chat"), 1);
        assert_eq!(fallback_host.pending_timers(), 1);
        assert_eq!(fallback_host.registrations(), 2);

        drop(boundaries);
        assert_eq!(host.registrations(), 0);
        assert_eq!(fallback_host.registrations(), 0);
        assert_eq!(sched.channel().subscriber_count("chat"), 0);
        assert_eq!(sched.channel().topic_count(), 0);

        host.intersect("chart", 1.0);
        for event in InteractionEvent::defaults() {
            host.dispatch("menu", event);
        }
        assert_eq!(host.run_idle(), 0);
        sched.publish("chat");
        host.set_online(false);
        host.set_online(true);
        host.advance(ms(5000));
        fallback_host.advance(ms(5000));

        assert_eq!(fired.get(), 0);
        assert!(sched.is_empty());
        assert!(fallback_sched.is_empty());
    }

    #[test]
    fn test_interaction_configured_events_only() {
        let (sched, host) = setup(true, true);
        let b = sched
            .register(
                BoundarySpec::new(Trigger::interaction(&[InteractionEvent::Focus]), (), ()).id("search"),
            )
            .unwrap();

        host.dispatch("search", InteractionEvent::TouchStart);
        assert_eq!(b.state(), BoundaryState::Dormant);
        host.dispatch("search", InteractionEvent::Focus);
        assert_eq!(b.state(), BoundaryState::Active);
        assert_eq!(host.listener_count(), 0);
    }

    #[test]
    fn test_interaction_first_event_removes_all_listeners() {
        let (sched, host) = setup(true, true);
        let spec = BoundarySpec::new(Trigger::Interaction { events: None }, (), ()).id("menu");
        let b = sched.register(spec).unwrap();
        assert_eq!(host.listener_count(), 3);
        host.dispatch("menu", InteractionEvent::PointerEnter);
        assert!(b.is_active());
        assert_eq!(host.listener_count(), 0);
    }

    #[test]
    fn test_idle_fallback_timer_without_idle_support() {
        let (sched, host) = setup(false, true);
        let fired = counter();
        let f = fired.clone();
        let b = sched
            .register(
                BoundarySpec::new(Trigger::idle(2000), (), ())
                    .id("a")
                    .priority(Priority::Low)
                    .on_activated(move |_| f.set(f.get() + 1)),
            )
            .unwrap();
        assert_eq!(host.pending_idle(), 0);
        assert_eq!(host.pending_timers(), 1);

        host.advance(ms(2000));
        assert!(b.is_active());
        let elapsed = b.activation_elapsed().unwrap();
        assert!(elapsed <= ms(2000));
        assert_eq!(fired.get(), 1);
        assert_eq!(host.registrations(), 0);
    }

    #[test]
    fn test_idle_uses_idle_period_when_supported() {
        let (sched, host) = setup(true, true);
        let b = sched
            .register(BoundarySpec::new(Trigger::Idle { timeout_ms: None }, (), ()))
            .unwrap();
        assert_eq!(host.pending_idle(), 1);
        assert_eq!(host.pending_timers(), 0);
        host.advance(ms(10));
        host.run_idle();
        assert_eq!(b.activation_elapsed(), Some(ms(10)));
    }

    #[test]
    fn test_connectivity_gate_defers_render() {
        let (sched, host) = setup(true, false);
        let renders = Rc::new(RefCell::new(Vec::new()));
        let r = renders.clone();
        let fired = counter();
        let f = fired.clone();
        let b = sched
            .register(
                BoundarySpec::new(Trigger::Manual, "ph", "content")
                    .id("comments")
                    .respect_connection_speed(true)
                    .on_activated(move |_| f.set(f.get() + 1))
                    .on_render_change(move |d| r.borrow_mut().push(d)),
            )
            .unwrap();

        sched.publish("comments");
        assert!(b.is_active());
        assert!(b.deferred());
        assert_eq!(*b.render(), "ph");
        assert_eq!(fired.get(), 1);

        host.set_online(true);
        assert!(!b.deferred());
        assert_eq!(*b.render(), "content");
        host.set_online(false);
        assert!(b.deferred());
        assert_eq!(fired.get(), 1);
        assert_eq!(
            *renders.borrow(),
            vec![RenderDecision::Content, RenderDecision::Placeholder]
        );
    }

    #[test]
    fn test_connectivity_ignored_without_opt_in() {
        let (sched, host) = setup(true, false);
        let b = sched
            .register(BoundarySpec::new(Trigger::Immediate, (), ()).priority(Priority::Critical))
            .unwrap();
        assert!(!b.deferred());
        assert_eq!(host.watcher_count(), 0);
    }

    #[test]
    fn test_publish_targets_only_matching_ids() {
        let (sched, _host) = setup(true, true);
        let x1 = sched.register(BoundarySpec::new(Trigger::Manual, (), ()).id("x")).unwrap();
        let y = sched.register(BoundarySpec::new(Trigger::Manual, (), ()).id("y")).unwrap();

        sched.publish("x");
        assert!(x1.is_active());
        assert!(!y.is_active());
        assert_eq!(sched.channel().subscriber_count("x"), 0);
        assert_eq!(sched.channel().subscriber_count("y"), 1);
    }

    #[test]
    fn test_shared_channel_reaches_every_scheduler() {
        let host = EventHost::default();
        let channel = TriggerChannel::new();
        let left = Scheduler::new(SchedulerConfig::default(), Rc::new(host.clone()))
            .with_channel(channel.clone());
        let right = Scheduler::new(SchedulerConfig::default(), Rc::new(host.clone()))
            .with_channel(channel.clone());
        let a = left.register(BoundarySpec::new(Trigger::Manual, (), ()).id("x")).unwrap();
        let b = right.register(BoundarySpec::new(Trigger::Manual, (), ()).id("x")).unwrap();

        channel.publish("x");
        assert!(a.is_active() && b.is_active());
    }

    #[test]
    fn test_manual_boundary_generator() {
        let (sched, _host) = setup(true, true);
        let (b, signal) = sched.manual_boundary("ph", "content").unwrap();
        assert!(b.id().starts_with("islet-"));
        assert_eq!(b.priority(), Priority::Manual);
        assert_eq!(signal.id(), b.id());

        signal.publish();
        assert!(signal.has_signaled());
        assert!(b.is_active());

        let (other, _) = sched.manual_boundary((), ()).unwrap();
        assert_ne!(other.id(), b.id());
    }

    #[test]
    fn test_duplicate_and_empty_ids_rejected() {
        let (sched, _host) = setup(true, true);
        let first = sched.register(BoundarySpec::new(Trigger::Manual, (), ()).id("dup")).unwrap();
        let err = sched
            .register(BoundarySpec::new(Trigger::Manual, (), ()).id("dup"))
            .unwrap_err();
        assert!(matches!(err, IsletError::DuplicateId(ref id) if id == "dup"));

        drop(first);
        assert!(sched.register(BoundarySpec::new(Trigger::Manual, (), ()).id("dup")).is_ok());

        let err = sched
            .register(BoundarySpec::new(Trigger::Manual, (), ()).id("  "))
            .unwrap_err();
        assert!(matches!(err, IsletError::InvalidBoundary { .. }));
    }

    #[test]
    fn test_activation_is_monotonic() {
        let (sched, _host) = setup(true, true);
        let fired = counter();
        let f = fired.clone();
        let b = sched
            .register(
                BoundarySpec::new(Trigger::Manual, (), ())
                    .id("once")
                    .on_activated(move |_| f.set(f.get() + 1)),
            )
            .unwrap();
        let again = sched.register(BoundarySpec::new(Trigger::Manual, (), ()).id("twin")).unwrap();

        sched.publish("once");
        sched.publish("once");
        assert_eq!(fired.get(), 1);
        assert!(b.is_active());
        assert!(!b.core.activate());
        assert!(!again.is_active());
    }

    #[test]
    fn test_metrics_over_live_boundaries() {
        let (sched, host) = setup(false, true);
        let fast = sched.register(BoundarySpec::new(Trigger::idle(100), (), ()).id("fast")).unwrap();
        let slow = sched.register(BoundarySpec::new(Trigger::idle(300), (), ()).id("slow")).unwrap();
        let _never = sched.register(BoundarySpec::new(Trigger::visible(), (), ()).id("never")).unwrap();
        let gone = sched.register(BoundarySpec::new(Trigger::Manual, (), ()).id("gone")).unwrap();
        drop(gone);

        host.advance(ms(500));
        assert!(fast.is_active() && slow.is_active());

        let m = sched.metrics();
        assert_eq!(m.total, 3);
        assert_eq!(m.active, 2);
        assert!((m.completion_pct - 66.666).abs() < 0.01);
        assert_eq!(m.mean_activation_ms, Some(200.0));
        assert_eq!(m.p95_activation_ms, Some(300.0));
        assert_eq!(sched.ids(), vec!["fast", "never", "slow"]);
    }

    #[test]
    fn test_trigger_kind_lookup() {
        let (sched, _host) = setup(true, true);
        let _b = sched.register(BoundarySpec::new(Trigger::visible(), (), ()).id("v")).unwrap();
        assert_eq!(sched.trigger_of("v"), Some(TriggerKind::Visible));
        assert_eq!(sched.trigger_of("nope"), None);
    }

    #[test]
    fn test_on_activated_may_publish_to_siblings() {
        let (sched, _host) = setup(true, true);
        let channel = sched.channel().clone();
        let sibling = sched.register(BoundarySpec::new(Trigger::Manual, (), ()).id("sidebar")).unwrap();
        let _main = sched
            .register(
                BoundarySpec::new(Trigger::Immediate, (), ())
                    .priority(Priority::Critical)
                    .on_activated(move |_| channel.publish("sidebar")),
            )
            .unwrap();
        assert!(sibling.is_active());
    }
}
