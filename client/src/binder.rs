//! Per-possession owner of action subscriptions

use crate::actions::{ActionPhase, ActionSet, Callback};
use log::{debug, warn};

type Unsubscribe = Box<dyn FnOnce() + Send>;

/// Attaches callbacks to named actions and releases every attachment
/// exactly once
///
/// A binder lives as long as one possession. Dropping it unbinds.
pub struct InputBinder {
    actions: ActionSet,
    unsubscribers: Vec<Unsubscribe>,
}

impl InputBinder {
    pub fn new(actions: ActionSet) -> Self {
        Self {
            actions,
            unsubscribers: Vec::new(),
        }
    }

    /// Binds the supplied callbacks to the transitions of `name`
    ///
    /// Returns false, binding nothing, if the action is not configured.
    pub fn action(
        &mut self,
        name: &str,
        on_started: Option<Callback>,
        on_active: Option<Callback>,
        on_ended: Option<Callback>,
    ) -> bool {
        if !self.actions.contains(name) {
            warn!("Input action '{}' not found, nothing bound", name);
            return false;
        }

        let hooks = [
            (ActionPhase::Started, on_started),
            (ActionPhase::Active, on_active),
            (ActionPhase::Ended, on_ended),
        ];

        for (phase, callback) in hooks {
            let Some(callback) = callback else {
                continue;
            };
            if let Some(id) = self.actions.subscribe(name, phase, callback) {
                let actions = self.actions.clone();
                self.unsubscribers.push(Box::new(move || {
                    actions.unsubscribe(id);
                }));
            }
        }

        true
    }

    /// Releases every subscription, newest first
    pub fn unbind_all(&mut self) {
        if self.unsubscribers.is_empty() {
            return;
        }

        debug!("Unbinding {} input subscriptions", self.unsubscribers.len());
        while let Some(unsubscribe) = self.unsubscribers.pop() {
            unsubscribe();
        }
    }

    /// Number of live subscriptions
    pub fn len(&self) -> usize {
        self.unsubscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unsubscribers.is_empty()
    }
}

impl Drop for InputBinder {
    fn drop(&mut self) {
        self.unbind_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionValue;
    use shared::{ACTION_JUMP, ACTION_MOVE};
    use std::sync::{Arc, Mutex};

    fn noop() -> Option<Callback> {
        Some(Arc::new(|_: ActionValue| {}))
    }

    #[test]
    fn test_action_binds_each_callback() {
        let actions = ActionSet::standard();
        let mut binder = InputBinder::new(actions.clone());

        assert!(binder.action(ACTION_MOVE, noop(), noop(), noop()));
        assert!(binder.action(ACTION_JUMP, noop(), None, None));

        assert_eq!(binder.len(), 4);
        assert_eq!(actions.subscribers_of(ACTION_MOVE), 3);
        assert_eq!(actions.subscribers_of(ACTION_JUMP), 1);
    }

    #[test]
    fn test_unknown_action_binds_nothing() {
        let actions = ActionSet::standard();
        let mut binder = InputBinder::new(actions.clone());

        assert!(!binder.action("Crouch", noop(), noop(), noop()));
        assert!(binder.is_empty());
        assert_eq!(actions.subscriber_count(), 0);
    }

    #[test]
    fn test_unbind_all_is_idempotent() {
        let actions = ActionSet::standard();
        let mut binder = InputBinder::new(actions.clone());
        binder.action(ACTION_MOVE, noop(), noop(), noop());

        binder.unbind_all();
        let after_first = actions.subscriber_count();
        binder.unbind_all();

        assert_eq!(after_first, 0);
        assert_eq!(actions.subscriber_count(), 0);
        assert!(binder.is_empty());
    }

    #[test]
    fn test_unbind_runs_in_reverse_order() {
        let actions = ActionSet::standard();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut binder = InputBinder::new(actions.clone());
        binder.action(ACTION_MOVE, noop(), None, None);
        binder.action(ACTION_JUMP, noop(), None, None);

        // Wrap the recorded closures to observe the order they run in
        let recorded = std::mem::take(&mut binder.unsubscribers);
        for (index, unsubscribe) in recorded.into_iter().enumerate() {
            let order = Arc::clone(&order);
            binder.unsubscribers.push(Box::new(move || {
                order.lock().unwrap().push(index);
                unsubscribe();
            }));
        }

        binder.unbind_all();
        assert_eq!(*order.lock().unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_drop_unbinds() {
        let actions = ActionSet::standard();
        let fired = Arc::new(Mutex::new(0));

        {
            let mut binder = InputBinder::new(actions.clone());
            let fired = Arc::clone(&fired);
            binder.action(
                ACTION_JUMP,
                Some(Arc::new(move |_: ActionValue| *fired.lock().unwrap() += 1)),
                None,
                None,
            );
            actions.trigger(ACTION_JUMP, ActionPhase::Started, ActionValue::Button(true));
        }

        actions.trigger(ACTION_JUMP, ActionPhase::Started, ActionValue::Button(true));
        assert_eq!(*fired.lock().unwrap(), 1);
        assert_eq!(actions.subscriber_count(), 0);
    }
}
