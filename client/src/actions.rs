//! Named gameplay actions with started/active/ended transitions
//!
//! An [`ActionSet`] is the configured input surface pawns bind against.
//! Device sampling (see `input`) drives transitions through [`ActionSet::trigger`];
//! pawns subscribe callbacks through an `InputBinder`.

use log::debug;
use shared::{ACTION_FIRE, ACTION_JUMP, ACTION_LOOK, ACTION_MOVE};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Transition of an action a callback can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionPhase {
    Started,
    Active,
    Ended,
}

/// Value carried by a transition
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionValue {
    Button(bool),
    Axis { x: f32, y: f32 },
}

impl ActionValue {
    pub fn axis(&self) -> (f32, f32) {
        match *self {
            ActionValue::Axis { x, y } => (x, y),
            ActionValue::Button(true) => (1.0, 0.0),
            ActionValue::Button(false) => (0.0, 0.0),
        }
    }
}

pub type Callback = Arc<dyn Fn(ActionValue) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub{}", self.0)
    }
}

struct Subscription {
    id: SubscriptionId,
    phase: ActionPhase,
    callback: Callback,
}

#[derive(Default)]
struct ActionTable {
    actions: HashMap<String, Vec<Subscription>>,
    next_id: u64,
}

/// Shared handle to the configured actions; clones see the same table
#[derive(Clone, Default)]
pub struct ActionSet {
    inner: Arc<Mutex<ActionTable>>,
}

impl ActionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default gameplay actions: Move, Look, Jump and Fire
    pub fn standard() -> Self {
        Self::with_actions(&[ACTION_MOVE, ACTION_LOOK, ACTION_JUMP, ACTION_FIRE])
    }

    pub fn with_actions(names: &[&str]) -> Self {
        let set = Self::new();
        for name in names {
            set.add_action(name);
        }
        set
    }

    fn table(&self) -> MutexGuard<'_, ActionTable> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_action(&self, name: &str) {
        self.table().actions.entry(name.to_string()).or_default();
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table().actions.contains_key(name)
    }

    /// Attaches `callback` to one transition of `name`; `None` if the action
    /// is not configured
    pub fn subscribe(
        &self,
        name: &str,
        phase: ActionPhase,
        callback: Callback,
    ) -> Option<SubscriptionId> {
        let mut table = self.table();
        let id = SubscriptionId(table.next_id);
        let subscribers = table.actions.get_mut(name)?;
        subscribers.push(Subscription {
            id,
            phase,
            callback,
        });
        table.next_id += 1;
        Some(id)
    }

    /// Returns false when `id` was not subscribed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut table = self.table();
        for subscribers in table.actions.values_mut() {
            if let Some(index) = subscribers.iter().position(|sub| sub.id == id) {
                subscribers.remove(index);
                return true;
            }
        }
        false
    }

    /// Fires every callback attached to `phase` of `name` and returns how
    /// many ran
    pub fn trigger(&self, name: &str, phase: ActionPhase, value: ActionValue) -> usize {
        // Callbacks run outside the lock so they may touch the set themselves
        let callbacks: Vec<Callback> = match self.table().actions.get(name) {
            Some(subscribers) => subscribers
                .iter()
                .filter(|sub| sub.phase == phase)
                .map(|sub| Arc::clone(&sub.callback))
                .collect(),
            None => {
                debug!("Trigger for unconfigured action {}", name);
                return 0;
            }
        };

        for callback in &callbacks {
            callback(value);
        }
        callbacks.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.table().actions.values().map(Vec::len).sum()
    }

    pub fn subscribers_of(&self, name: &str) -> usize {
        self.table().actions.get(name).map_or(0, Vec::len)
    }
}

impl fmt::Debug for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table();
        let mut names: Vec<&String> = table.actions.keys().collect();
        names.sort();
        f.debug_struct("ActionSet").field("actions", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Callback) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = Arc::clone(&count);
        (
            count,
            Arc::new(move |_: ActionValue| {
                handle.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_standard_actions() {
        let actions = ActionSet::standard();

        assert!(actions.contains(ACTION_MOVE));
        assert!(actions.contains(ACTION_LOOK));
        assert!(actions.contains(ACTION_JUMP));
        assert!(actions.contains(ACTION_FIRE));
        assert!(!actions.contains("Crouch"));
    }

    #[test]
    fn test_trigger_only_matching_phase() {
        let actions = ActionSet::standard();
        let (started, on_started) = counter();
        let (ended, on_ended) = counter();

        actions.subscribe(ACTION_JUMP, ActionPhase::Started, on_started);
        actions.subscribe(ACTION_JUMP, ActionPhase::Ended, on_ended);

        assert_eq!(
            actions.trigger(ACTION_JUMP, ActionPhase::Started, ActionValue::Button(true)),
            1
        );
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(ended.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_subscribe_unknown_action() {
        let actions = ActionSet::standard();
        let (_, callback) = counter();

        assert!(actions
            .subscribe("Crouch", ActionPhase::Started, callback)
            .is_none());
        assert_eq!(actions.subscriber_count(), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let actions = ActionSet::standard();
        let (count, callback) = counter();

        let id = actions
            .subscribe(ACTION_FIRE, ActionPhase::Started, callback)
            .unwrap();
        assert!(actions.unsubscribe(id));
        assert!(!actions.unsubscribe(id));

        actions.trigger(ACTION_FIRE, ActionPhase::Started, ActionValue::Button(true));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_callback_may_reenter_set() {
        let actions = ActionSet::standard();
        let inner = actions.clone();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_handle = Arc::clone(&seen);

        actions.subscribe(
            ACTION_MOVE,
            ActionPhase::Active,
            Arc::new(move |_: ActionValue| {
                seen_handle.store(inner.subscriber_count(), Ordering::SeqCst);
            }),
        );

        actions.trigger(
            ACTION_MOVE,
            ActionPhase::Active,
            ActionValue::Axis { x: 1.0, y: 0.0 },
        );
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_axis_from_button() {
        assert_eq!(ActionValue::Button(true).axis(), (1.0, 0.0));
        assert_eq!(ActionValue::Axis { x: 0.5, y: -1.0 }.axis(), (0.5, -1.0));
    }
}
