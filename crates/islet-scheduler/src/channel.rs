//! Manual trigger channel — activate a boundary by id from anywhere.
//!
//! Fire-and-forget: `publish` never confirms delivery, never queues for
//! subscribers that arrive later, and never checks that the id exists.
//! A topic is created on its first subscription and torn down when its
//! last subscriber leaves.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};

use crate::host::Cancel;

type Callback = Rc<RefCell<Box<dyn FnMut()>>>;

#[derive(Default)]
struct ChannelState {
    next_id: u64,
    topics: HashMap<String, BTreeMap<u64, Callback>>,
    published: u64,
    dropped: u64,
}

/// Publish/subscribe bus keyed by boundary id.
#[derive(Clone, Default)]
pub struct TriggerChannel {
    state: Rc<RefCell<ChannelState>>,
}

impl TriggerChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to signals for `id`. Unsubscribes on drop.
    pub fn subscribe(&self, id: &str, callback: impl FnMut() + 'static) -> Subscription {
        let sub_id = {
            let mut state = self.state.borrow_mut();
            state.next_id += 1;
            let sub_id = state.next_id;
            let topic = state.topics.entry(id.to_string()).or_insert_with(|| {
                tracing::debug!("📡 Channel topic opened: {id}");
                BTreeMap::new()
            });
            topic.insert(sub_id, Rc::new(RefCell::new(Box::new(callback))));
            sub_id
        };
        Subscription {
            channel: Rc::downgrade(&self.state),
            id: id.to_string(),
            sub_id,
            live: true,
        }
    }

    /// Signal every current subscriber of `id`.
    pub fn publish(&self, id: &str) {
        let callbacks: Vec<(u64, Callback)> = {
            let mut state = self.state.borrow_mut();
            state.published += 1;
            let callbacks: Vec<_> = state
                .topics
                .get(id)
                .map(|topic| topic.iter().map(|(k, cb)| (*k, cb.clone())).collect())
                .unwrap_or_default();
            if callbacks.is_empty() {
                state.dropped += 1;
            }
            callbacks
        };
        if callbacks.is_empty() {
            tracing::debug!("📭 Signal for '{id}' dropped: no subscribers");
            return;
        }
        tracing::debug!("📨 Signal for '{id}' → {} subscriber(s)", callbacks.len());
        for (sub_id, callback) in callbacks {
            if !self.is_subscribed(id, sub_id) {
                continue;
            }
            // A subscriber re-publishing its own id is not re-entered.
            if let Ok(mut f) = callback.try_borrow_mut() {
                (*f)();
            }
        }
    }

    /// A scoped signal for one id.
    pub fn signal(&self, id: &str) -> ManualSignal {
        ManualSignal {
            id: id.to_string(),
            channel: self.clone(),
            signaled: Cell::new(false),
        }
    }

    pub fn subscriber_count(&self, id: &str) -> usize {
        self.state.borrow().topics.get(id).map_or(0, BTreeMap::len)
    }

    /// Number of ids with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.state.borrow().topics.len()
    }

    /// Total publishes, and how many of them reached nobody.
    pub fn publish_stats(&self) -> (u64, u64) {
        let state = self.state.borrow();
        (state.published, state.dropped)
    }

    fn is_subscribed(&self, id: &str, sub_id: u64) -> bool {
        self.state
            .borrow()
            .topics
            .get(id)
            .is_some_and(|topic| topic.contains_key(&sub_id))
    }
}

/// A live channel subscription.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    channel: Weak<RefCell<ChannelState>>,
    id: String,
    sub_id: u64,
    live: bool,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !std::mem::replace(&mut self.live, false) {
            return;
        }
        let Some(state) = self.channel.upgrade() else {
            return;
        };
        let Ok(mut state) = state.try_borrow_mut() else {
            tracing::warn!("channel subscription for '{}' released during publish bookkeeping", self.id);
            return;
        };
        let mut removed = None;
        let mut emptied = false;
        if let Some(topic) = state.topics.get_mut(&self.id) {
            removed = topic.remove(&self.sub_id);
            emptied = topic.is_empty();
        }
        if emptied {
            state.topics.remove(&self.id);
        }
        drop(state);
        drop(removed);
        if emptied {
            tracing::debug!("📡 Channel topic closed: {}", self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl From<Subscription> for Cancel {
    fn from(subscription: Subscription) -> Self {
        Cancel::new(move || subscription.unsubscribe())
    }
}

/// Publish handle scoped to one id.
///
/// `has_signaled` is the caller's own "did I ask" flag. It flips on
/// `publish` whether or not a boundary with this id exists; use
/// `Scheduler::status` for the boundary's confirmed state.
pub struct ManualSignal {
    id: String,
    channel: TriggerChannel,
    signaled: Cell<bool>,
}

impl ManualSignal {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn publish(&self) {
        self.signaled.set(true);
        self.channel.publish(&self.id);
    }

    pub fn has_signaled(&self) -> bool {
        self.signaled.get()
    }
}

impl std::fmt::Debug for ManualSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualSignal")
            .field("id", &self.id)
            .field("signaled", &self.signaled.get())
            .finish()
    }
}
