// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Builtin module registry

use rquickjs::{Ctx, Value};
use serde_json::Value as Json;
use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::sync::Arc;

/// A module implemented by the host.
///
/// `build` materializes the module's value inside one environment. Bridge
/// functions it creates may keep a clone of `host` to reach request-scoped
/// state when they are called.
pub trait HostModule: Send + Sync {
    /// Build the module value
    fn build<'js>(&self, ctx: &Ctx<'js>, host: &Host) -> rquickjs::Result<Value<'js>>;
}

/// Content registered under a builtin module id
#[derive(Clone)]
pub enum Builtin {
    /// JSON-like data, converted into the VM on install
    Data(Json),
    /// Host module built on install
    Native(Arc<dyn HostModule>),
    /// Host module built on first `require`, then cached for the
    /// environment's lifetime
    Factory(Arc<dyn HostModule>),
    /// Host object scripts cannot see into; bridge functions fetch it
    /// through [`Host::opaque`]
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Builtin {
    /// Data builtin
    pub fn data(value: impl Into<Json>) -> Self {
        Self::Data(value.into())
    }

    /// Eagerly built host module
    pub fn native(module: impl HostModule + 'static) -> Self {
        Self::Native(Arc::new(module))
    }

    /// Lazily built host module
    pub fn factory(module: impl HostModule + 'static) -> Self {
        Self::Factory(Arc::new(module))
    }

    /// Opaque host object
    pub fn opaque<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self::Opaque(value)
    }
}

impl std::fmt::Debug for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Builtin::Data(json) => f.debug_tuple("Data").field(json).finish(),
            Builtin::Native(_) => f.write_str("Native(..)"),
            Builtin::Factory(_) => f.write_str("Factory(..)"),
            Builtin::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

/// Builtin ids of one environment.
///
/// Materialized values live in the VM; the registry only records which ids
/// are materialized, the factories still waiting for their first `require`,
/// and the opaque host objects.
#[derive(Default)]
pub struct BuiltinRegistry {
    materialized: BTreeSet<String>,
    factories: BTreeMap<String, Arc<dyn HostModule>>,
    opaque: BTreeMap<String, Arc<dyn Any + Send + Sync>>,
}

impl BuiltinRegistry {
    /// Whether `id` names a builtin of either kind
    pub fn contains(&self, id: &str) -> bool {
        self.materialized.contains(id) || self.factories.contains_key(id)
    }

    /// Whether `id` already has a value in the VM
    pub fn is_materialized(&self, id: &str) -> bool {
        self.materialized.contains(id)
    }

    /// Factory waiting under `id`
    pub fn factory(&self, id: &str) -> Option<Arc<dyn HostModule>> {
        self.factories.get(id).cloned()
    }

    /// Register a lazy factory, replacing any earlier registration
    pub fn register_factory(&mut self, id: String, module: Arc<dyn HostModule>) {
        self.materialized.remove(&id);
        self.factories.insert(id, module);
    }

    /// Record that `id` now has a value in the VM
    pub fn mark_materialized(&mut self, id: String) {
        self.factories.remove(&id);
        self.materialized.insert(id);
    }

    /// Store an opaque host object
    pub fn set_opaque(&mut self, id: String, value: Arc<dyn Any + Send + Sync>) {
        self.opaque.insert(id, value);
    }

    /// Ids of every builtin
    pub fn ids(&self) -> Vec<String> {
        self.materialized
            .iter()
            .chain(self.factories.keys())
            .cloned()
            .collect()
    }
}

/// Handle to the registry of the current environment
#[derive(Clone, Default)]
pub struct Host {
    registry: Rc<RefCell<BuiltinRegistry>>,
}

impl Host {
    /// Create a host with an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Opaque host object registered under `id`, if it has type `T`
    pub fn opaque<T: Any + Send + Sync>(&self, id: &str) -> Option<Arc<T>> {
        let value = self.registry.borrow().opaque.get(id)?.clone();
        value.downcast::<T>().ok()
    }

    /// Whether `id` names a builtin
    pub fn is_builtin(&self, id: &str) -> bool {
        self.registry.borrow().contains(id)
    }

    /// Shared view of the registry
    pub fn registry(&self) -> Ref<'_, BuiltinRegistry> {
        self.registry.borrow()
    }

    /// Mutable view of the registry. Never hold it across a module build.
    pub fn registry_mut(&self) -> RefMut<'_, BuiltinRegistry> {
        self.registry.borrow_mut()
    }
}
