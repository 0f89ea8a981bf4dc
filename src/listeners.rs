//! Keyed callback registry shared by the state store and the event bus.
//!
//! Each key (a store path or an event name) owns an ordered list of
//! callbacks. [`Listeners::add`] hands back a [`Subscription`] that removes
//! exactly that callback; the handle only holds a weak reference, so it is
//! safe to keep after the registry is gone.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde_json::Value;

/// A listener invoked with the value (or event payload) it subscribed to.
pub type Callback = Rc<dyn Fn(&Value)>;

type Table = RefCell<HashMap<String, Vec<(u64, Callback)>>>;

#[derive(Default)]
pub struct Listeners {
    table: Rc<Table>,
    next_id: Cell<u64>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `key`.
    pub fn add(&self, key: &str, callback: Callback) -> Subscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.table
            .borrow_mut()
            .entry(key.to_string())
            .or_default()
            .push((id, callback));
        Subscription {
            table: Rc::downgrade(&self.table),
            key: key.to_string(),
            id,
        }
    }

    /// Snapshot of the callbacks under `key`, in registration order.
    ///
    /// The borrow is released before returning so callers may invoke the
    /// callbacks while they add or remove listeners.
    pub fn callbacks(&self, key: &str) -> Vec<Callback> {
        self.table
            .borrow()
            .get(key)
            .map(|list| list.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default()
    }

    pub fn has(&self, key: &str) -> bool {
        self.table.borrow().contains_key(key)
    }

    pub fn count(&self, key: &str) -> usize {
        self.table.borrow().get(key).map_or(0, Vec::len)
    }
}

/// Removal capability for one registered callback.
///
/// Dropping the handle keeps the callback registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[derive(Debug, Clone)]
pub struct Subscription {
    table: Weak<Table>,
    key: String,
    id: u64,
}

impl Subscription {
    /// Remove the callback. Repeat calls are no-ops.
    pub fn unsubscribe(&self) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let mut table = table.borrow_mut();
        if let Some(list) = table.get_mut(&self.key) {
            list.retain(|(id, _)| *id != self.id);
            if list.is_empty() {
                table.remove(&self.key);
            }
        }
    }

    /// The key this subscription is registered under.
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn counter() -> (Rc<Cell<u32>>, Callback) {
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        (hits, Rc::new(move |_: &Value| h.set(h.get() + 1)))
    }

    #[test]
    fn add_and_invoke() {
        let listeners = Listeners::new();
        let (hits, cb) = counter();
        listeners.add("a", cb);
        for cb in listeners.callbacks("a") {
            cb(&json!(1));
        }
        assert_eq!(hits.get(), 1);
        assert!(listeners.callbacks("b").is_empty());
    }

    #[test]
    fn unsubscribe_removes_only_that_callback() {
        let listeners = Listeners::new();
        let (_, first) = counter();
        let (_, second) = counter();
        let sub = listeners.add("a", first);
        listeners.add("a", second);

        sub.unsubscribe();
        assert_eq!(listeners.count("a"), 1);
        sub.unsubscribe();
        assert_eq!(listeners.count("a"), 1);
    }

    #[test]
    fn empty_keys_are_pruned() {
        let listeners = Listeners::new();
        let (_, cb) = counter();
        let sub = listeners.add("a", cb);
        assert!(listeners.has("a"));
        sub.unsubscribe();
        assert!(!listeners.has("a"));
    }

    #[test]
    fn handle_outlives_registry() {
        let (_, cb) = counter();
        let sub = {
            let listeners = Listeners::new();
            listeners.add("a", cb)
        };
        sub.unsubscribe();
        assert_eq!(sub.key(), "a");
    }
}
