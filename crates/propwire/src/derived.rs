#![forbid(unsafe_code)]

//! Derived properties and the dependency recomputation engine.
//!
//! A derived property names already-defined dependencies and a calculator.
//! At definition time the store subscribes one recompute handler per
//! dependency to that dependency's changed topic; each handler re-runs the
//! calculator over the *current* dependency values and writes the result
//! through the store's own unrestricted path. Everything is synchronous:
//! the recomputed value is visible before the triggering `set` returns.
//!
//! # Invariants
//!
//! 1. Dependencies must be fully defined before they can be named, which
//!    transitively rules out self-reference and cycles.
//! 2. Derived properties never carry a value validator; the only write
//!    protection available to them is view-level access gating.
//! 3. Recomputation is per dependency event, never batched: three
//!    dependencies changing in one batch `set` drive three recomputations.
//!
//! Bus handlers hold only a `Weak` reference to store state, so a dropped
//! store leaves inert subscriptions rather than a reference cycle.

use std::rc::Rc;

use serde_json::Value;

use crate::bus::changed_topic;
use crate::error::{PropError, Result};
use crate::store::{
    ChangeRule, PropKind, Property, PropertyStore, StagedChange, default_change_rule,
};

/// Computes a derived value from its dependencies' current values, passed
/// in declared order.
pub type Calculator = Rc<dyn Fn(&[Value]) -> Value>;

impl PropertyStore {
    /// Define a derived property with the default change rule.
    ///
    /// `initial` overrides the first calculation when `Some`; with `None`
    /// the calculator runs immediately over the current dependency values.
    pub fn define_derived(
        &self,
        name: impl Into<String>,
        depends_on: &[&str],
        calculator: impl Fn(&[Value]) -> Value + 'static,
        initial: Option<Value>,
    ) -> Result<&Self> {
        self.define_derived_with(name, depends_on, Rc::new(calculator), initial, None)
    }

    /// Define a derived property.
    ///
    /// Fails with [`PropError::DuplicateProperty`] if `name` is taken and
    /// with [`PropError::UnknownDependency`] if any entry of `depends_on`
    /// is not already defined; in both cases nothing is created or
    /// subscribed. The definition-time notification rule is the same as
    /// [`PropertyStore::define_prop_with`]: the change rule is evaluated
    /// against `(value, None)`.
    pub fn define_derived_with(
        &self,
        name: impl Into<String>,
        depends_on: &[&str],
        calculator: Calculator,
        initial: Option<Value>,
        change_rule: Option<ChangeRule>,
    ) -> Result<&Self> {
        let name = name.into();
        let deps: Vec<String> = depends_on.iter().map(ToString::to_string).collect();

        let dep_values = {
            let props = self.shared.props.borrow();
            if props.contains_key(&name) {
                return Err(PropError::duplicate(name));
            }
            let mut values = Vec::with_capacity(deps.len());
            for dep in &deps {
                let prop = props.get(dep).ok_or_else(|| PropError::UnknownDependency {
                    name: name.clone(),
                    dependency: dep.clone(),
                })?;
                values.push(prop.value.clone());
            }
            values
        };

        // The calculator is caller code and may have re-entered the store.
        let value = match initial {
            Some(v) => v,
            None => calculator(&dep_values),
        };

        let rule = change_rule.unwrap_or_else(default_change_rule);
        {
            let mut props = self.shared.props.borrow_mut();
            if props.contains_key(&name) {
                return Err(PropError::duplicate(name));
            }
            props.insert(
                name.clone(),
                Property {
                    value: value.clone(),
                    kind: PropKind::Derived,
                    validator: None,
                    change_rule: Rc::clone(&rule),
                    deps: deps.clone(),
                },
            );
        }

        for dep in &deps {
            let weak = Rc::downgrade(&self.shared);
            let name = name.clone();
            let deps = deps.clone();
            let calculator = Rc::clone(&calculator);
            self.shared.bus.on(
                &changed_topic(dep),
                Rc::new(move |_event| {
                    let Some(shared) = weak.upgrade() else {
                        return;
                    };
                    let store = PropertyStore::from_shared(shared);
                    match store.snapshot_values(&deps) {
                        Ok(values) => {
                            let next = calculator(&values);
                            if let Err(err) = store.set(&name, next) {
                                tracing::warn!(name = %name, %err, "derived recompute write failed");
                            }
                        }
                        Err(err) => {
                            tracing::warn!(name = %name, %err, "derived recompute skipped");
                        }
                    }
                }),
            );
        }

        tracing::debug!(name = %name, deps = deps.len(), "store.define_derived");
        self.notify(vec![StagedChange {
            name,
            new_value: value,
            old_value: None,
            rule,
        }]);
        Ok(self)
    }
}
