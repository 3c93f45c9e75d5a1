#![forbid(unsafe_code)]

//! Error taxonomy for the property store.
//!
//! Every failure in this crate is local, deterministic, and recoverable by
//! the caller: there are no transient conditions and nothing is retried.
//! Each operation fails fast, before any mutation or notification for the
//! failing call (and before any mutation for an entire batch `set`).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PropError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PropError {
    /// Defining a name that already exists (primary or derived).
    #[error("property already defined: {name}")]
    DuplicateProperty { name: String },

    /// A `get`/`set`/utilizer/accessor referenced a name never defined.
    #[error("unknown property: {name}")]
    UnknownProperty { name: String },

    /// A derived-property definition named a dependency not yet defined.
    /// This is also the cycle/self-reference guard: a dependency can only
    /// be named once it is fully defined.
    #[error("cannot define derived property '{name}': unknown property '{dependency}'")]
    UnknownDependency { name: String, dependency: String },

    /// A primary property's value validator rejected an incoming write.
    #[error("validation rejected for property '{name}': {reason}")]
    ValidationRejected { name: String, reason: String },

    /// Name-based read/write gate of the standard public view.
    #[error("Property is not publicly accessible: {name}")]
    NotPubliclyAccessible { name: String },

    /// Kind-based write gate: derived properties are never writable
    /// through an access-controlled view.
    #[error("Write access to {name} is not allowed because the property is a derived property")]
    DerivedWriteDenied { name: String },

    /// Generic gate raised for custom policies without their own error.
    #[error("access to property '{name}' is not allowed")]
    AccessDenied { name: String },

    /// Unrecognized accessor-installation mode string.
    #[error("unknown access type: {mode}")]
    InvalidAccessMode { mode: String },

    /// Accessor installation named a property never defined. Distinct from
    /// [`PropError::UnknownProperty`] so installers can report the failing
    /// operation, not just the missing name.
    #[error("cannot create accessors for non-existent property: {name}")]
    AccessorForUnknownProperty { name: String },

    /// A utilizer or accessor outlived the store it was created from.
    #[error("property store was dropped")]
    StoreDropped,
}

impl PropError {
    #[must_use]
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::UnknownProperty { name: name.into() }
    }

    #[must_use]
    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::DuplicateProperty { name: name.into() }
    }

    #[must_use]
    pub fn rejected(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ValidationRejected {
            name: name.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn denied(name: impl Into<String>) -> Self {
        Self::AccessDenied { name: name.into() }
    }
}
