#![forbid(unsafe_code)]

//! The property store and its get/set protocol.
//!
//! # Design
//!
//! [`PropertyStore`] is a cheap-to-clone handle over shared, single-threaded
//! state (`Rc<RefCell<..>>`). Property values are [`serde_json::Value`], so a
//! single store holds heterogeneously typed properties and the JSON
//! projection is a direct snapshot.
//!
//! All mutation funnels through one primitive: stage the writes under a
//! single borrow, release the borrow, then run change rules and emit
//! notifications. Single-property `set`, batch `set_many`, definition-time
//! notification, and derived recomputation all reuse it, which is what makes
//! the protocol safely re-entrant.
//!
//! # Invariants
//!
//! 1. A property's stored value always reflects the most recent successful
//!    write or recomputation; there is no pending state.
//! 2. The `RefCell` borrow on store state is never held across validator,
//!    change-rule, calculator, or bus-handler invocation.
//! 3. In a batch, no value is written until every entry has passed
//!    existence, access, and value validation; notifications fire only
//!    after every value in the batch is visible to readers.
//! 4. Properties are never removed once defined.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::access::{AccessPolicy, Unrestricted};
use crate::bus::{ChangeEvent, EventBus, changed_topic};
use crate::error::{PropError, Result};

/// Whether a property is written directly or recomputed from dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropKind {
    /// Set directly by callers, guarded by an optional value validator.
    Primary,
    /// Recomputed from other properties; never carries a value validator.
    Derived,
}

/// Value validator for primary properties, invoked with
/// `(incoming, current)`. Rejection is an `Err`, propagated verbatim; the
/// `Ok` carries no information and validation must have no other effect.
pub type Validator = Rc<dyn Fn(&Value, &Value) -> Result<()>>;

/// Decides whether a transition `(new, old)` counts as a change for
/// notification purposes. `old` is `None` exactly once, at definition time.
pub type ChangeRule = Rc<dyn Fn(&Value, Option<&Value>) -> bool>;

/// The default change rule: shallow inequality.
///
/// Scalars (null, booleans, numbers, strings) compare by value; an object
/// or array on either side always counts as a change, since a freshly
/// built composite is a distinct value even when structurally equal to the
/// old one. Callers wanting structural (deep) comparison, or coarser rules
/// like epsilon comparison on numbers, supply their own rule.
#[must_use]
pub fn default_change_rule() -> ChangeRule {
    fn is_composite(value: &Value) -> bool {
        value.is_object() || value.is_array()
    }
    Rc::new(|new, old| match old {
        None => true,
        Some(old) => is_composite(new) || is_composite(old) || new != old,
    })
}

pub(crate) struct Property {
    pub(crate) value: Value,
    pub(crate) kind: PropKind,
    pub(crate) validator: Option<Validator>,
    pub(crate) change_rule: ChangeRule,
    /// Dependency names in declared order; empty for primary properties.
    pub(crate) deps: Vec<String>,
}

pub(crate) struct StoreShared {
    pub(crate) props: RefCell<IndexMap<String, Property>>,
    pub(crate) bus: Rc<dyn EventBus>,
}

/// A fully applied write awaiting its change-rule decision and notification.
pub(crate) struct StagedChange {
    pub(crate) name: String,
    pub(crate) new_value: Value,
    pub(crate) old_value: Option<Value>,
    pub(crate) rule: ChangeRule,
}

/// Reactive store of named properties with synchronous change notification.
///
/// Cloning a `PropertyStore` creates a new handle to the **same** store.
pub struct PropertyStore {
    pub(crate) shared: Rc<StoreShared>,
}

impl Clone for PropertyStore {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl std::fmt::Debug for PropertyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let props = self.shared.props.borrow();
        f.debug_struct("PropertyStore")
            .field("properties", &props.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PropertyStore {
    /// Create a store bound to `bus` for its whole lifetime.
    #[must_use]
    pub fn new(bus: Rc<dyn EventBus>) -> Self {
        Self {
            shared: Rc::new(StoreShared {
                props: RefCell::new(IndexMap::new()),
                bus,
            }),
        }
    }

    pub(crate) fn from_shared(shared: Rc<StoreShared>) -> Self {
        Self { shared }
    }

    /// The event bus this store publishes change notifications on.
    /// External subscribers attach here and observe the same synchronous
    /// ordering as the store's own derived-property handlers.
    #[must_use]
    pub fn bus(&self) -> &Rc<dyn EventBus> {
        &self.shared.bus
    }

    /// Whether `name` is defined (primary or derived).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.shared.props.borrow().contains_key(name)
    }

    /// Number of defined properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.props.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.props.borrow().is_empty()
    }

    /// Kind of `name`: primary or derived.
    pub fn kind_of(&self, name: &str) -> Result<PropKind> {
        self.shared
            .props
            .borrow()
            .get(name)
            .map(|p| p.kind)
            .ok_or_else(|| PropError::unknown(name))
    }

    /// Declared dependencies of `name`, in order. Empty for primary
    /// properties; fixed at definition time for derived ones.
    pub fn dependencies_of(&self, name: &str) -> Result<Vec<String>> {
        self.shared
            .props
            .borrow()
            .get(name)
            .map(|p| p.deps.clone())
            .ok_or_else(|| PropError::unknown(name))
    }

    /// Current values of `names`, in order, bypassing access gates.
    /// Used by the recomputation engine.
    pub(crate) fn snapshot_values(&self, names: &[String]) -> Result<Vec<Value>> {
        let props = self.shared.props.borrow();
        names
            .iter()
            .map(|name| {
                props
                    .get(name)
                    .map(|p| p.value.clone())
                    .ok_or_else(|| PropError::unknown(name.clone()))
            })
            .collect()
    }

    /// Define a primary property with the default change rule and no
    /// validator. Returns `&Self` so definitions chain.
    pub fn define_prop(&self, name: impl Into<String>, initial: Value) -> Result<&Self> {
        self.define_prop_with(name, initial, None, None)
    }

    /// Define a primary property.
    ///
    /// The validator is **not** applied to `initial`; it guards subsequent
    /// writes only. The change rule is immediately evaluated against
    /// `(initial, None)` and, if it signals a change, a notification for the
    /// definition itself is emitted.
    ///
    /// Fails with [`PropError::DuplicateProperty`] if `name` is taken; the
    /// existing property is untouched.
    pub fn define_prop_with(
        &self,
        name: impl Into<String>,
        initial: Value,
        validator: Option<Validator>,
        change_rule: Option<ChangeRule>,
    ) -> Result<&Self> {
        let name = name.into();
        let rule = change_rule.unwrap_or_else(default_change_rule);
        {
            let mut props = self.shared.props.borrow_mut();
            if props.contains_key(&name) {
                return Err(PropError::duplicate(name));
            }
            props.insert(
                name.clone(),
                Property {
                    value: initial.clone(),
                    kind: PropKind::Primary,
                    validator,
                    change_rule: Rc::clone(&rule),
                    deps: Vec::new(),
                },
            );
        }
        tracing::debug!(name = %name, "store.define");
        self.notify(vec![StagedChange {
            name,
            new_value: initial,
            old_value: None,
            rule,
        }]);
        Ok(self)
    }

    /// Write one property through the unrestricted path.
    pub fn set(&self, name: &str, value: Value) -> Result<()> {
        self.set_entries(&Unrestricted, vec![(name.to_string(), value)])
    }

    /// Atomically write a batch of properties, in entry order.
    ///
    /// Validation is all-or-nothing: if any entry is unknown or rejected,
    /// no property in the batch is mutated and nothing is notified.
    /// Notifications fire per entry, after every value in the batch is
    /// already visible to readers.
    pub fn set_many(&self, entries: Vec<(String, Value)>) -> Result<()> {
        self.set_entries(&Unrestricted, entries)
    }

    /// The shared set protocol. `policy` is the access gate injected by the
    /// calling surface: identity for the raw store, a real gate for views.
    pub(crate) fn set_entries(
        &self,
        policy: &dyn AccessPolicy,
        entries: Vec<(String, Value)>,
    ) -> Result<()> {
        // Phase 1: every name must be defined. Capture kind, validator, and
        // current value per entry while we hold the borrow.
        let mut checks = Vec::with_capacity(entries.len());
        {
            let props = self.shared.props.borrow();
            for (name, _) in &entries {
                let prop = props
                    .get(name)
                    .ok_or_else(|| PropError::unknown(name.clone()))?;
                checks.push((prop.kind, prop.validator.clone(), prop.value.clone()));
            }
        }

        // Phase 2: access gate for every entry.
        for ((name, _), (kind, _, _)) in entries.iter().zip(&checks) {
            policy.check_write(name, *kind)?;
        }

        // Phase 3: value validators for every entry. A rejection here
        // propagates verbatim and leaves the whole batch unapplied.
        for ((_, value), (_, validator, current)) in entries.iter().zip(&checks) {
            if let Some(validator) = validator {
                validator(value, current)?;
            }
        }

        // Phase 4: apply every write under one borrow, capturing old values.
        let staged: Vec<StagedChange> = {
            let mut props = self.shared.props.borrow_mut();
            entries
                .into_iter()
                .map(|(name, value)| {
                    let prop = props
                        .get_mut(&name)
                        .expect("phase 1 checked existence; properties are never removed");
                    let old = std::mem::replace(&mut prop.value, value.clone());
                    tracing::trace!(name = %name, "store.write");
                    StagedChange {
                        name,
                        new_value: value,
                        old_value: Some(old),
                        rule: Rc::clone(&prop.change_rule),
                    }
                })
                .collect()
        };

        // Phase 5: change rules + notifications, in entry order.
        self.notify(staged);
        Ok(())
    }

    /// Read one property through the unrestricted path.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.get_gated(&Unrestricted, name)
    }

    pub(crate) fn get_gated(&self, policy: &dyn AccessPolicy, name: &str) -> Result<Value> {
        let value = {
            let props = self.shared.props.borrow();
            props
                .get(name)
                .map(|p| p.value.clone())
                .ok_or_else(|| PropError::unknown(name))?
        };
        policy.check_read(name)?;
        Ok(value)
    }

    /// Snapshot of every property, in definition order.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Map<String, Value> {
        self.to_json_filtered(|_| true)
    }

    /// Snapshot of the properties accepted by `filter`, in definition order.
    pub fn to_json_filtered(&self, filter: impl Fn(&str) -> bool) -> serde_json::Map<String, Value> {
        self.entries_snapshot()
            .into_iter()
            .filter(|(name, _)| filter(name))
            .collect()
    }

    pub(crate) fn to_json_gated(&self, policy: &dyn AccessPolicy) -> serde_json::Map<String, Value> {
        self.entries_snapshot()
            .into_iter()
            .filter(|(name, _)| policy.check_read(name).is_ok())
            .collect()
    }

    /// Clone out `(name, value)` pairs so filters run without a live borrow.
    fn entries_snapshot(&self) -> Vec<(String, Value)> {
        self.shared
            .props
            .borrow()
            .iter()
            .map(|(name, prop)| (name.clone(), prop.value.clone()))
            .collect()
    }

    /// The mutation/notification tail shared by every write path: run each
    /// staged entry's change rule and emit on its changed topic. Called with
    /// no borrow held, so bus handlers may re-enter the store freely.
    pub(crate) fn notify(&self, staged: Vec<StagedChange>) {
        for change in staged {
            if (change.rule)(&change.new_value, change.old_value.as_ref()) {
                let event = ChangeEvent {
                    name: change.name,
                    new_value: change.new_value,
                    old_value: change.old_value,
                };
                tracing::debug!(name = %event.name, "store.notify");
                self.shared.bus.emit(&changed_topic(&event.name), &event);
            }
        }
    }
}
