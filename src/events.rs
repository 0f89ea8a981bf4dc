//! Application event bus: synchronous publish/subscribe by event name.
//!
//! Unlike the state store, the bus keeps no data: `emit` hands the payload
//! to the listeners registered at that moment and forgets it.

use std::cell::{Cell, OnceCell};
use std::rc::Rc;

use serde_json::Value;
use tracing::debug;

use crate::listeners::{Listeners, Subscription};

pub const AUTH_LOGIN: &str = "auth:login";
pub const AUTH_LOGOUT: &str = "auth:logout";
pub const PAGE_LOADED: &str = "page:loaded";
pub const PROGRESS_UPDATED: &str = "progress:updated";
pub const ACHIEVEMENT_EARNED: &str = "achievement:earned";
pub const LESSON_COMPLETED: &str = "lesson:completed";

#[derive(Default)]
pub struct EventBus {
    listeners: Listeners,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, event: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + 'static,
    {
        self.listeners.add(event, Rc::new(callback))
    }

    /// Like [`on`](Self::on), but the callback runs for the first emit only.
    pub fn once<F>(&self, event: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + 'static,
    {
        let fired = Rc::new(Cell::new(false));
        let handle: Rc<OnceCell<Subscription>> = Rc::new(OnceCell::new());
        let inner_handle = handle.clone();
        let sub = self.listeners.add(
            event,
            Rc::new(move |payload: &Value| {
                if fired.replace(true) {
                    return;
                }
                if let Some(sub) = inner_handle.get() {
                    sub.unsubscribe();
                }
                callback(payload);
            }),
        );
        let _ = handle.set(sub.clone());
        sub
    }

    pub fn emit(&self, event: &str, payload: &Value) {
        let callbacks = self.listeners.callbacks(event);
        debug!(event, listeners = callbacks.len(), "emit");
        for cb in callbacks {
            cb(payload);
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.count(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    #[test]
    fn emit_reaches_listeners_of_that_event() {
        let bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        bus.on(AUTH_LOGIN, move |p| s.borrow_mut().push(p.clone()));

        bus.emit(AUTH_LOGIN, &json!("alice"));
        bus.emit(AUTH_LOGOUT, &Value::Null);

        assert_eq!(*seen.borrow(), vec![json!("alice")]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let sub = bus.on("x", move |_| h.set(h.get() + 1));
        bus.emit("x", &Value::Null);
        sub.unsubscribe();
        sub.unsubscribe();
        bus.emit("x", &Value::Null);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn once_fires_a_single_time() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        bus.once(PAGE_LOADED, move |_| h.set(h.get() + 1));

        bus.emit(PAGE_LOADED, &json!("dashboard"));
        bus.emit(PAGE_LOADED, &json!("reading"));

        assert_eq!(hits.get(), 1);
        assert_eq!(bus.listener_count(PAGE_LOADED), 0);
    }

    #[test]
    fn once_survives_reentrant_emit() {
        let bus = Rc::new(EventBus::new());
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let b = Rc::downgrade(&bus);
        bus.once("x", move |_| {
            h.set(h.get() + 1);
            if let Some(bus) = b.upgrade() {
                bus.emit("x", &Value::Null);
            }
        });
        bus.emit("x", &Value::Null);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn listener_may_subscribe_during_emit() {
        let bus = Rc::new(EventBus::new());
        let b = Rc::downgrade(&bus);
        bus.on("x", move |_| {
            if let Some(bus) = b.upgrade() {
                bus.on("x", |_| {});
            }
        });
        bus.emit("x", &Value::Null);
        assert_eq!(bus.listener_count("x"), 2);
    }
}
