#![forbid(unsafe_code)]

//! Synchronous named-topic publish/subscribe.
//!
//! The store treats the bus as an external collaborator: anything
//! implementing [`EventBus`] can carry change notifications. [`SyncBus`] is
//! the in-crate reference implementation.
//!
//! # Invariants
//!
//! 1. `emit` runs every handler subscribed to the topic synchronously, on
//!    the caller's own stack, in subscription order.
//! 2. Handlers may re-enter the bus mid-dispatch (subscribe or emit); the
//!    dispatch in progress is unaffected because the handler list is
//!    snapshotted before the first handler runs.
//! 3. A handler subscribed during an `emit` of the same topic does not
//!    observe that emit.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::Serialize;
use serde_json::Value;

/// Payload carried on every `"{name}-changed"` topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    /// Name of the property that changed.
    pub name: String,
    /// Value now visible to readers.
    pub new_value: Value,
    /// Previous value; `None` exactly once, for the definition-time event.
    pub old_value: Option<Value>,
}

/// Handler invoked for each event on a subscribed topic.
pub type BusHandler = Rc<dyn Fn(&ChangeEvent)>;

/// Topic a property's change notifications are published on.
#[must_use]
pub fn changed_topic(name: &str) -> String {
    format!("{name}-changed")
}

/// Synchronous publish/subscribe over named topics.
pub trait EventBus {
    /// Publish `event` to every handler subscribed to `topic`, in
    /// subscription order, before returning.
    fn emit(&self, topic: &str, event: &ChangeEvent);

    /// Subscribe `handler` to `topic`. Subscriptions are never removed.
    fn on(&self, topic: &str, handler: BusHandler);
}

/// Single-threaded, fully synchronous [`EventBus`].
#[derive(Default)]
pub struct SyncBus {
    topics: RefCell<HashMap<String, Vec<BusHandler>>>,
}

impl SyncBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handlers currently subscribed to `topic`.
    #[must_use]
    pub fn handler_count(&self, topic: &str) -> usize {
        self.topics.borrow().get(topic).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for SyncBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics = self.topics.borrow();
        f.debug_struct("SyncBus")
            .field("topics", &topics.len())
            .finish()
    }
}

impl EventBus for SyncBus {
    fn emit(&self, topic: &str, event: &ChangeEvent) {
        // Snapshot so handlers can re-enter the bus while we dispatch.
        let handlers: Vec<BusHandler> = self
            .topics
            .borrow()
            .get(topic)
            .map(|hs| hs.to_vec())
            .unwrap_or_default();
        tracing::trace!(topic, handlers = handlers.len(), "bus.emit");
        for handler in handlers {
            handler(event);
        }
    }

    fn on(&self, topic: &str, handler: BusHandler) {
        self.topics
            .borrow_mut()
            .entry(topic.to_string())
            .or_default()
            .push(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(name: &str, new: Value) -> ChangeEvent {
        ChangeEvent {
            name: name.into(),
            new_value: new,
            old_value: None,
        }
    }

    #[test]
    fn handlers_run_in_subscription_order() {
        let bus = SyncBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Rc::clone(&seen);
            bus.on("x-changed", Rc::new(move |_| seen.borrow_mut().push(tag)));
        }

        bus.emit("x-changed", &event("x", json!(1)));
        assert_eq!(*seen.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn emit_without_subscribers_is_a_no_op() {
        let bus = SyncBus::new();
        bus.emit("nobody-changed", &event("nobody", json!(0)));
    }

    #[test]
    fn topics_are_independent() {
        let bus = SyncBus::new();
        let hits = Rc::new(RefCell::new(0u32));

        let h = Rc::clone(&hits);
        bus.on("a-changed", Rc::new(move |_| *h.borrow_mut() += 1));

        bus.emit("b-changed", &event("b", json!(2)));
        assert_eq!(*hits.borrow(), 0);

        bus.emit("a-changed", &event("a", json!(1)));
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn handler_may_emit_reentrantly() {
        let bus = Rc::new(SyncBus::new());
        let order = Rc::new(RefCell::new(Vec::new()));

        {
            let bus_inner = Rc::clone(&bus);
            let order = Rc::clone(&order);
            bus.on(
                "outer-changed",
                Rc::new(move |_| {
                    order.borrow_mut().push("outer");
                    bus_inner.emit("inner-changed", &event("inner", json!(9)));
                }),
            );
        }
        {
            let order = Rc::clone(&order);
            bus.on("inner-changed", Rc::new(move |_| order.borrow_mut().push("inner")));
        }

        bus.emit("outer-changed", &event("outer", json!(1)));
        assert_eq!(*order.borrow(), vec!["outer", "inner"]);
    }

    #[test]
    fn handler_subscribed_mid_emit_misses_that_emit() {
        let bus = Rc::new(SyncBus::new());
        let late_hits = Rc::new(RefCell::new(0u32));

        {
            let bus_inner = Rc::clone(&bus);
            let late_hits = Rc::clone(&late_hits);
            bus.on(
                "x-changed",
                Rc::new(move |_| {
                    let late_hits = Rc::clone(&late_hits);
                    bus_inner.on("x-changed", Rc::new(move |_| *late_hits.borrow_mut() += 1));
                }),
            );
        }

        bus.emit("x-changed", &event("x", json!(1)));
        assert_eq!(*late_hits.borrow(), 0);

        bus.emit("x-changed", &event("x", json!(2)));
        assert_eq!(*late_hits.borrow(), 1);
    }

    #[test]
    fn changed_topic_format() {
        assert_eq!(changed_topic("foo"), "foo-changed");
        assert_eq!(changed_topic("_secret"), "_secret-changed");
    }
}
