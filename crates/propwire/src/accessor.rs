#![forbid(unsafe_code)]

//! Bean-style accessor installation.
//!
//! Instead of synthesizing methods onto a foreign object, the installer
//! returns the accessors as data: a map from deterministic accessor name
//! (`foo` becomes `getFoo` / `setFoo`) to a bound closure that delegates to
//! the originating view. Hosts that want method-call ergonomics wire the
//! map into whatever dispatch they use.
//!
//! Installation is all-or-nothing: every entry's mode string, property
//! existence, and access rights are checked before any accessor is built,
//! so a single disallowed entry prevents the whole call.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Value;

use crate::access::{StoreView, Unrestricted};
use crate::error::{PropError, Result};
use crate::store::PropertyStore;

/// How a property is exposed through installed accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Getter only.
    ReadOnly,
    /// Getter and setter.
    ReadWrite,
    /// Nothing installed; present so callers can be explicit.
    None,
}

impl AccessMode {
    /// Parse a mode string, case-insensitively.
    pub fn parse(mode: &str) -> Result<Self> {
        match mode.to_ascii_lowercase().as_str() {
            "readonly" => Ok(Self::ReadOnly),
            "readwrite" => Ok(Self::ReadWrite),
            "none" => Ok(Self::None),
            _ => Err(PropError::InvalidAccessMode { mode: mode.into() }),
        }
    }
}

impl std::str::FromStr for AccessMode {
    type Err = PropError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Accessor method name for `prop` under `prefix`: first character
/// upper-cased, prefix prepended (`("get", "foo")` → `"getFoo"`).
#[must_use]
pub fn accessor_name(prefix: &str, prop: &str) -> String {
    let mut chars = prop.chars();
    match chars.next() {
        Some(first) => format!("{prefix}{}{}", first.to_uppercase(), chars.as_str()),
        None => prefix.to_string(),
    }
}

/// A bound accessor closure, exposed as data.
#[derive(Clone)]
pub enum Accessor {
    Getter(Rc<dyn Fn() -> Result<Value>>),
    Setter(Rc<dyn Fn(Value) -> Result<()>>),
}

impl std::fmt::Debug for Accessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Getter(_) => f.write_str("Accessor::Getter"),
            Self::Setter(_) => f.write_str("Accessor::Setter"),
        }
    }
}

impl Accessor {
    /// The bound getter closure, if this accessor is one.
    #[must_use]
    pub fn as_getter(&self) -> Option<&Rc<dyn Fn() -> Result<Value>>> {
        match self {
            Self::Getter(get) => Some(get),
            Self::Setter(_) => None,
        }
    }

    /// The bound setter closure, if this accessor is one.
    #[must_use]
    pub fn as_setter(&self) -> Option<&Rc<dyn Fn(Value) -> Result<()>>> {
        match self {
            Self::Getter(_) => None,
            Self::Setter(set) => Some(set),
        }
    }
}

/// Accessor-name → bound-closure map produced by installation.
pub type AccessorMap = BTreeMap<String, Accessor>;

impl StoreView {
    /// Build accessors for `spec`, a list of `(property, mode)` pairs where
    /// `mode` parses per [`AccessMode::parse`].
    ///
    /// Every entry is validated first: unknown properties fail with
    /// [`PropError::AccessorForUnknownProperty`], unreadable ones with this
    /// view's read gate, and `readwrite` entries additionally with its
    /// write gate. Only then are any closures built.
    pub fn install_accessors(&self, spec: &[(&str, &str)]) -> Result<AccessorMap> {
        let mut parsed = Vec::with_capacity(spec.len());
        for (name, mode) in spec {
            let mode = AccessMode::parse(mode)?;
            if !self.store().contains(name) {
                return Err(PropError::AccessorForUnknownProperty {
                    name: (*name).to_string(),
                });
            }
            parsed.push((name.to_string(), mode));
        }

        for (name, mode) in &parsed {
            match mode {
                AccessMode::ReadOnly => self.policy().check_read(name)?,
                AccessMode::ReadWrite => {
                    self.policy().check_read(name)?;
                    let kind = self.store().kind_of(name)?;
                    self.policy().check_write(name, kind)?;
                }
                AccessMode::None => {}
            }
        }

        let mut map = AccessorMap::new();
        for (name, mode) in parsed {
            if mode == AccessMode::None {
                continue;
            }
            let getter_view = self.clone();
            let getter_name = name.clone();
            map.insert(
                accessor_name("get", &name),
                Accessor::Getter(Rc::new(move || getter_view.get(&getter_name))),
            );
            if mode == AccessMode::ReadWrite {
                let setter_view = self.clone();
                let setter_name = name.clone();
                map.insert(
                    accessor_name("set", &name),
                    Accessor::Setter(Rc::new(move |value| setter_view.set(&setter_name, value))),
                );
            }
        }
        Ok(map)
    }
}

impl PropertyStore {
    /// Ungated accessor installation; see [`StoreView::install_accessors`].
    pub fn install_accessors(&self, spec: &[(&str, &str)]) -> Result<AccessorMap> {
        self.api(Rc::new(Unrestricted)).install_accessors(spec)
    }
}
