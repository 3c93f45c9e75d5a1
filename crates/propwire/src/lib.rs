#![forbid(unsafe_code)]

//! Reactive property store for small in-process object models.
//!
//! A [`PropertyStore`] holds named, heterogeneously typed values
//! ([`serde_json::Value`]) with get/set semantics, caller-supplied
//! validation, synchronous change notification over an [`EventBus`], and
//! derived properties that recompute automatically when any dependency
//! changes. Restricted [`StoreView`] facades gate which properties a caller
//! may read or write.
//!
//! # Architecture
//!
//! The store is single-threaded shared state (`Rc<RefCell<..>>`); handles
//! and views are cheap clones over the same store. Change notifications are
//! delivered synchronously on the caller's stack via the bus, and handlers
//! may re-enter the store, which is how derived recomputation cascades: a
//! `set` returns only after its downstream effects have fully completed.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use propwire::{PropertyStore, SyncBus};
//! use serde_json::json;
//!
//! let store = PropertyStore::new(Rc::new(SyncBus::new()));
//! store.define_prop("width", json!(3))?
//!     .define_prop("height", json!(4))?;
//! store.define_derived(
//!     "area",
//!     &["width", "height"],
//!     |v| json!(v[0].as_i64().unwrap() * v[1].as_i64().unwrap()),
//!     None,
//! )?;
//!
//! store.set("width", json!(10))?;
//! assert_eq!(store.get("area")?, json!(40));
//!
//! // The public view hides nothing here, but refuses to write a
//! // derived property.
//! assert!(store.public_api().set("area", json!(0)).is_err());
//! # Ok::<(), propwire::PropError>(())
//! ```

pub mod access;
pub mod accessor;
pub mod bus;
pub mod derived;
pub mod error;
pub mod store;
pub mod utilizer;

pub use access::{
    AccessPolicy, CustomPolicy, PrivatePolicy, PublicPolicy, ReadCheck, ReadValidator, StoreView,
    WriteValidator,
};
pub use accessor::{AccessMode, Accessor, AccessorMap, accessor_name};
pub use bus::{BusHandler, ChangeEvent, EventBus, SyncBus, changed_topic};
pub use derived::Calculator;
pub use error::{PropError, Result};
pub use store::{ChangeRule, PropKind, PropertyStore, Validator, default_change_rule};
pub use utilizer::{Utilizer, UtilizerHandler};

pub use serde_json::Value;
