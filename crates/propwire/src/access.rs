#![forbid(unsafe_code)]

//! Access-controlled facades over a [`PropertyStore`].
//!
//! A [`StoreView`] pairs a store handle with an [`AccessPolicy`] and
//! delegates every operation to the store's internal gated paths with that
//! policy injected. Views are stateless beyond their policy; any number may
//! coexist over one store, and all of them publish on the store's one bus.
//!
//! Two standard policies ship with the crate:
//!
//! - [`PublicPolicy`]: underscore-prefixed names are invisible; derived
//!   properties are readable but never writable.
//! - [`PrivatePolicy`]: everything is readable; derived properties are
//!   still never writable.
//!
//! Custom policies come either from implementing [`AccessPolicy`] directly
//! or from [`CustomPolicy`], which builds the validator pair from a single
//! read-check closure the way callers usually want.

use std::rc::Rc;

use crate::error::{PropError, Result};
use crate::store::{PropKind, PropertyStore};

/// Read/write gate consulted by every view operation.
///
/// `check_write` receives the property's kind so kind-based rules (the
/// derived-write gate) need no store access of their own.
pub trait AccessPolicy {
    fn check_read(&self, name: &str) -> Result<()>;
    fn check_write(&self, name: &str, kind: PropKind) -> Result<()>;
}

/// Identity gate used by the raw store surface.
pub(crate) struct Unrestricted;

impl AccessPolicy for Unrestricted {
    fn check_read(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn check_write(&self, _name: &str, _kind: PropKind) -> Result<()> {
        Ok(())
    }
}

/// Non-underscore names only; derived properties are read-only.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublicPolicy;

impl AccessPolicy for PublicPolicy {
    fn check_read(&self, name: &str) -> Result<()> {
        if name.starts_with('_') {
            return Err(PropError::NotPubliclyAccessible { name: name.into() });
        }
        Ok(())
    }

    fn check_write(&self, name: &str, kind: PropKind) -> Result<()> {
        self.check_read(name)?;
        if kind == PropKind::Derived {
            return Err(PropError::DerivedWriteDenied { name: name.into() });
        }
        Ok(())
    }
}

/// Everything readable; derived properties are read-only.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrivatePolicy;

impl AccessPolicy for PrivatePolicy {
    fn check_read(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn check_write(&self, name: &str, kind: PropKind) -> Result<()> {
        if kind == PropKind::Derived {
            return Err(PropError::DerivedWriteDenied { name: name.into() });
        }
        Ok(())
    }
}

/// Read check returning allowed / not allowed / a specific error.
pub type ReadCheck = Rc<dyn Fn(&str) -> Result<bool>>;
/// Raising form of a read gate.
pub type ReadValidator = Rc<dyn Fn(&str) -> Result<()>>;
/// Raising form of a write gate; receives the property kind.
pub type WriteValidator = Rc<dyn Fn(&str, PropKind) -> Result<()>>;

/// Policy assembled from caller-supplied validator closures.
pub struct CustomPolicy {
    read: ReadValidator,
    write: WriteValidator,
}

impl CustomPolicy {
    /// Build a policy from a single read check. `Ok(false)` becomes a
    /// generic [`PropError::AccessDenied`]; an `Err` is re-raised as-is.
    /// Writes default to the same gate.
    #[must_use]
    pub fn from_check(check: ReadCheck) -> Self {
        let read = validator_from_check(check);
        Self::new(read, None)
    }

    /// Build a policy from an explicit read validator and, optionally, a
    /// distinct write validator. When `write` is omitted the read validator
    /// gates writes too.
    #[must_use]
    pub fn new(read: ReadValidator, write: Option<WriteValidator>) -> Self {
        let write = write.unwrap_or_else(|| {
            let read = Rc::clone(&read);
            Rc::new(move |name: &str, _kind: PropKind| read(name))
        });
        Self { read, write }
    }
}

impl AccessPolicy for CustomPolicy {
    fn check_read(&self, name: &str) -> Result<()> {
        (self.read)(name)
    }

    fn check_write(&self, name: &str, kind: PropKind) -> Result<()> {
        (self.write)(name, kind)
    }
}

fn validator_from_check(check: ReadCheck) -> ReadValidator {
    Rc::new(move |name: &str| match check(name) {
        Ok(true) => Ok(()),
        Ok(false) => Err(PropError::denied(name)),
        Err(err) => Err(err),
    })
}

/// Restricted facade over a [`PropertyStore`].
///
/// Cloning a view clones the handle, not the store.
#[derive(Clone)]
pub struct StoreView {
    store: PropertyStore,
    policy: Rc<dyn AccessPolicy>,
}

impl std::fmt::Debug for StoreView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreView")
            .field("store", &self.store)
            .finish()
    }
}

impl StoreView {
    pub(crate) fn new(store: PropertyStore, policy: Rc<dyn AccessPolicy>) -> Self {
        Self { store, policy }
    }

    pub(crate) fn store(&self) -> &PropertyStore {
        &self.store
    }

    pub(crate) fn policy(&self) -> &Rc<dyn AccessPolicy> {
        &self.policy
    }

    /// Read a property, subject to this view's read gate.
    pub fn get(&self, name: &str) -> Result<serde_json::Value> {
        self.store.get_gated(&*self.policy, name)
    }

    /// Write a property, subject to this view's write gate.
    pub fn set(&self, name: &str, value: serde_json::Value) -> Result<()> {
        self.store
            .set_entries(&*self.policy, vec![(name.to_string(), value)])
    }

    /// Batch write with the same atomic semantics as
    /// [`PropertyStore::set_many`], gated per entry by this view.
    pub fn set_many(&self, entries: Vec<(String, serde_json::Value)>) -> Result<()> {
        self.store.set_entries(&*self.policy, entries)
    }

    /// Snapshot of every property this view may read, in definition order.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.store.to_json_gated(&*self.policy)
    }
}

impl PropertyStore {
    /// View with the given policy. The general factory behind the standard
    /// and custom views.
    #[must_use]
    pub fn api(&self, policy: Rc<dyn AccessPolicy>) -> StoreView {
        StoreView::new(self.clone(), policy)
    }

    /// Standard public view: non-underscore names, derived read-only.
    #[must_use]
    pub fn public_api(&self) -> StoreView {
        self.api(Rc::new(PublicPolicy))
    }

    /// Standard private view: all names, derived read-only.
    #[must_use]
    pub fn private_api(&self) -> StoreView {
        self.api(Rc::new(PrivatePolicy))
    }

    /// Custom view from a read check; see [`CustomPolicy::from_check`].
    #[must_use]
    pub fn custom_api(&self, check: impl Fn(&str) -> Result<bool> + 'static) -> StoreView {
        self.api(Rc::new(CustomPolicy::from_check(Rc::new(check))))
    }

    /// Custom view from explicit read/write validators; see
    /// [`CustomPolicy::new`].
    #[must_use]
    pub fn custom_api_with(
        &self,
        read: ReadValidator,
        write: Option<WriteValidator>,
    ) -> StoreView {
        self.api(Rc::new(CustomPolicy::new(read, write)))
    }
}
