//! Property-based invariant tests for the store's write protocol.
//!
//! These verify structural invariants that must hold for any inputs:
//!
//! 1. A batch `set` is all-or-nothing under validator failure.
//! 2. Notification count equals the number of entries whose value changed.
//! 3. `to_json` keys always follow definition order.
//! 4. A derived chain of length N cascades fully on one root write.
//! 5. A derived property recomputes once per changed dependency in a batch.

use std::cell::RefCell;
use std::rc::Rc;

use propwire::{EventBus, PropError, PropertyStore, SyncBus, Validator};
use proptest::prelude::*;
use serde_json::json;

fn store() -> (PropertyStore, Rc<SyncBus>) {
    let bus = Rc::new(SyncBus::new());
    (PropertyStore::new(bus.clone()), bus)
}

/// Cap any incoming value at `limit` via a rejecting validator.
fn cap_validator(name: &str, limit: i64) -> Validator {
    let name = name.to_string();
    Rc::new(move |incoming, _current| {
        if incoming.as_i64().is_some_and(|n| n <= limit) {
            Ok(())
        } else {
            Err(PropError::rejected(name.clone(), "over limit"))
        }
    })
}

proptest! {
    #[test]
    fn batch_is_all_or_nothing(
        initials in prop::collection::vec(0i64..100, 2..6),
        updates in prop::collection::vec(0i64..200, 2..6),
        limit in 50i64..150,
    ) {
        let n = initials.len().min(updates.len());
        let (store, _bus) = store();
        for (i, v) in initials.iter().take(n).enumerate() {
            let name = format!("p{i}");
            store
                .define_prop_with(name.as_str(), json!(v), Some(cap_validator(&name, limit)), None)
                .unwrap();
        }

        let entries: Vec<(String, serde_json::Value)> = updates
            .iter()
            .take(n)
            .enumerate()
            .map(|(i, v)| (format!("p{i}"), json!(v)))
            .collect();
        let any_over = updates.iter().take(n).any(|v| *v > limit);

        let outcome = store.set_many(entries);
        for (i, (initial, update)) in initials.iter().zip(&updates).take(n).enumerate() {
            let current = store.get(&format!("p{i}")).unwrap();
            if any_over {
                prop_assert_eq!(&current, &json!(initial));
            } else {
                prop_assert_eq!(&current, &json!(update));
            }
        }
        prop_assert_eq!(outcome.is_err(), any_over);
    }

    #[test]
    fn notification_count_matches_changed_entries(
        initials in prop::collection::vec(0i64..10, 1..6),
        updates in prop::collection::vec(0i64..10, 1..6),
    ) {
        let n = initials.len().min(updates.len());
        let (store, bus) = store();
        let hits = Rc::new(RefCell::new(0usize));
        for (i, v) in initials.iter().take(n).enumerate() {
            let name = format!("p{i}");
            store.define_prop(name.as_str(), json!(v)).unwrap();
            let hits = Rc::clone(&hits);
            bus.on(&format!("{name}-changed"), Rc::new(move |_| *hits.borrow_mut() += 1));
        }

        let entries: Vec<(String, serde_json::Value)> = updates
            .iter()
            .take(n)
            .enumerate()
            .map(|(i, v)| (format!("p{i}"), json!(v)))
            .collect();
        store.set_many(entries).unwrap();

        let expected = initials
            .iter()
            .zip(&updates)
            .take(n)
            .filter(|(a, b)| a != b)
            .count();
        prop_assert_eq!(*hits.borrow(), expected);
    }

    #[test]
    fn to_json_follows_definition_order(count in 1usize..12) {
        let (store, _bus) = store();
        for i in 0..count {
            store.define_prop(format!("prop{i}"), json!(i)).unwrap();
        }
        let keys: Vec<String> = store.to_json().keys().cloned().collect();
        let expected: Vec<String> = (0..count).map(|i| format!("prop{i}")).collect();
        prop_assert_eq!(keys, expected);
    }

    #[test]
    fn derived_chain_cascades_fully(depth in 1usize..16, root in -100i64..100) {
        let (store, _bus) = store();
        store.define_prop("level0", json!(0)).unwrap();
        for i in 1..=depth {
            let parent = format!("level{}", i - 1);
            store
                .define_derived(
                    format!("level{i}"),
                    &[parent.as_str()],
                    |v| json!(v[0].as_i64().unwrap() + 1),
                    None,
                )
                .unwrap();
        }

        store.set("level0", json!(root)).unwrap();
        for i in 0..=depth {
            prop_assert_eq!(
                store.get(&format!("level{i}")).unwrap(),
                json!(root + i as i64)
            );
        }
    }

    #[test]
    fn derived_recomputes_once_per_changed_dependency(
        count in 2usize..6,
        changed in prop::collection::vec(any::<bool>(), 2..6),
    ) {
        let n = count.min(changed.len());
        let (store, _bus) = store();
        for i in 0..n {
            store.define_prop(format!("d{i}"), json!(0)).unwrap();
        }
        let dep_names: Vec<String> = (0..n).map(|i| format!("d{i}")).collect();
        let deps: Vec<&str> = dep_names.iter().map(String::as_str).collect();

        let runs = Rc::new(RefCell::new(0usize));
        {
            let runs = Rc::clone(&runs);
            store
                .define_derived(
                    "agg",
                    &deps,
                    move |v| {
                        *runs.borrow_mut() += 1;
                        json!(v.iter().map(|x| x.as_i64().unwrap()).sum::<i64>())
                    },
                    None,
                )
                .unwrap();
        }
        *runs.borrow_mut() = 0;

        // Change only the flagged dependencies; unchanged writes emit no
        // notification, so they drive no recomputation.
        let entries: Vec<(String, serde_json::Value)> = changed
            .iter()
            .take(n)
            .enumerate()
            .map(|(i, flag)| (format!("d{i}"), json!(if *flag { 1 } else { 0 })))
            .collect();
        store.set_many(entries).unwrap();

        let expected = changed.iter().take(n).filter(|flag| **flag).count();
        prop_assert_eq!(*runs.borrow(), expected);
    }
}
