#![forbid(unsafe_code)]

//! Utilizers: closures over a fixed, ordered set of property values.
//!
//! A [`Utilizer`] re-reads its properties on every invocation and forwards
//! the current values, followed by any trailing arguments, to its handler.
//! [`StoreView::create_change_handler`] additionally subscribes the
//! utilizer to each named property's changed topic, so the handler always
//! sees the whole value set, not just the property that changed.
//!
//! Utilizers hold only a `Weak` reference to the store; invoking one after
//! the store is dropped fails with [`PropError::StoreDropped`], and a
//! change-handler subscription on a dropped store is simply inert.

use std::rc::{Rc, Weak};

use serde_json::Value;

use crate::access::{AccessPolicy, StoreView, Unrestricted};
use crate::bus::changed_topic;
use crate::error::{PropError, Result};
use crate::store::{PropertyStore, StoreShared};

/// Receives the current property values (in declared order) followed by
/// the caller's trailing arguments.
pub type UtilizerHandler = Rc<dyn Fn(&[Value]) -> Value>;

struct UtilizerInner {
    shared: Weak<StoreShared>,
    policy: Rc<dyn AccessPolicy>,
    names: Vec<String>,
    handler: UtilizerHandler,
}

/// A live reader over a fixed set of properties. Cloning shares the
/// underlying closure; the clone backing a change-handler subscription and
/// the one returned to the caller are the same utilizer.
pub struct Utilizer {
    inner: Rc<UtilizerInner>,
}

impl Clone for Utilizer {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Utilizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Utilizer")
            .field("names", &self.inner.names)
            .finish()
    }
}

impl Utilizer {
    /// Fetch the current value of every named property, append `extra`,
    /// and invoke the handler. Values are read live on every call, through
    /// the same read gate the utilizer was created with.
    pub fn call(&self, extra: &[Value]) -> Result<Value> {
        let shared = self.inner.shared.upgrade().ok_or(PropError::StoreDropped)?;
        let store = PropertyStore::from_shared(shared);
        let mut args = Vec::with_capacity(self.inner.names.len() + extra.len());
        for name in &self.inner.names {
            args.push(store.get_gated(&*self.inner.policy, name)?);
        }
        args.extend_from_slice(extra);
        Ok((self.inner.handler)(&args))
    }

    /// Property names this utilizer reads, in invocation order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.inner.names
    }
}

impl PropertyStore {
    /// Ungated utilizer over `prop_names`; see
    /// [`StoreView::create_utilizer`].
    pub fn create_utilizer(
        &self,
        prop_names: &[&str],
        handler: impl Fn(&[Value]) -> Value + 'static,
    ) -> Result<Utilizer> {
        self.create_utilizer_gated(Rc::new(Unrestricted), prop_names, Rc::new(handler))
    }

    /// Ungated change handler over `responds_to`; see
    /// [`StoreView::create_change_handler`].
    pub fn create_change_handler(
        &self,
        responds_to: &[&str],
        handler: impl Fn(&[Value]) -> Value + 'static,
    ) -> Result<Utilizer> {
        self.create_change_handler_gated(Rc::new(Unrestricted), responds_to, Rc::new(handler))
    }

    pub(crate) fn create_utilizer_gated(
        &self,
        policy: Rc<dyn AccessPolicy>,
        prop_names: &[&str],
        handler: UtilizerHandler,
    ) -> Result<Utilizer> {
        let names: Vec<String> = prop_names.iter().map(ToString::to_string).collect();
        {
            let props = self.shared.props.borrow();
            for name in &names {
                if !props.contains_key(name) {
                    return Err(PropError::unknown(name.clone()));
                }
            }
        }
        for name in &names {
            policy.check_read(name)?;
        }
        Ok(Utilizer {
            inner: Rc::new(UtilizerInner {
                shared: Rc::downgrade(&self.shared),
                policy,
                names,
                handler,
            }),
        })
    }

    pub(crate) fn create_change_handler_gated(
        &self,
        policy: Rc<dyn AccessPolicy>,
        responds_to: &[&str],
        handler: UtilizerHandler,
    ) -> Result<Utilizer> {
        let utilizer = self.create_utilizer_gated(policy, responds_to, handler)?;
        for name in utilizer.names().to_vec() {
            let utilizer = utilizer.clone();
            self.shared.bus.on(
                &changed_topic(&name),
                Rc::new(move |_event| {
                    if let Err(err) = utilizer.call(&[]) {
                        tracing::warn!(%err, "change handler invocation failed");
                    }
                }),
            );
        }
        Ok(utilizer)
    }
}

impl StoreView {
    /// Build a utilizer over `prop_names`, validated against this view's
    /// read gate at creation time: an unknown or unreadable name fails and
    /// nothing is created.
    pub fn create_utilizer(
        &self,
        prop_names: &[&str],
        handler: impl Fn(&[Value]) -> Value + 'static,
    ) -> Result<Utilizer> {
        self.store()
            .create_utilizer_gated(Rc::clone(self.policy()), prop_names, Rc::new(handler))
    }

    /// Build a utilizer over `responds_to` and subscribe it (with no
    /// trailing arguments) to every `"{name}-changed"` topic. The returned
    /// utilizer is the subscribed one.
    pub fn create_change_handler(
        &self,
        responds_to: &[&str],
        handler: impl Fn(&[Value]) -> Value + 'static,
    ) -> Result<Utilizer> {
        self.store()
            .create_change_handler_gated(Rc::clone(self.policy()), responds_to, Rc::new(handler))
    }
}
