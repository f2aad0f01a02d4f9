//! Resource identity and cache key composition.
//!
//! Namespaced resources are keyed as `namespace/name`; cluster-scoped
//! resources are keyed by `name` alone. Splitting a key happens on the first
//! `/`, and a key without one is cluster-scoped.

use std::fmt;
use std::str::FromStr;

use dashmap::DashSet;
use serde::{Deserialize, Serialize};

use crate::constants::KEY_SEPARATOR;

/// A watched resource that can be identified by namespace and name.
pub trait Resource {
    /// Namespace of the resource, `None` for cluster-scoped resources.
    fn namespace(&self) -> Option<&str>;

    /// Name of the resource, unique within its namespace.
    fn name(&self) -> &str;
}

/// Compose the cache key for a resource.
pub fn namespace_key(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{ns}{KEY_SEPARATOR}{name}"),
        None => name.to_string(),
    }
}

/// Split a cache key back into `(namespace, name)`.
pub fn split_key(key: &str) -> (Option<&str>, &str) {
    match key.split_once(KEY_SEPARATOR) {
        Some((namespace, name)) => (Some(namespace), name),
        None => (None, key),
    }
}

/// Stable identifier for one logical resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    namespace: Option<String>,
    name: String,
}

impl ResourceId {
    /// Identifier for a namespaced resource.
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Identifier for a cluster-scoped resource.
    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Identifier of an existing resource.
    pub fn from_resource<R: Resource + ?Sized>(resource: &R) -> Self {
        Self {
            namespace: resource.namespace().map(str::to_string),
            name: resource.name().to_string(),
        }
    }

    /// Parse a composite cache key.
    pub fn from_key(key: &str) -> Self {
        let (namespace, name) = split_key(key);
        Self {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The composite cache key for this identifier.
    pub fn key(&self) -> String {
        namespace_key(self.namespace(), &self.name)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}{KEY_SEPARATOR}{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl FromStr for ResourceId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_key(s))
    }
}

impl Resource for ResourceId {
    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Answers whether a resource currently exists in some local cache.
///
/// Consumed by the periodic expectation cleaner to drop registrations whose
/// owning resource has been deleted.
pub trait ResourcePresence: Send + Sync {
    fn contains(&self, id: &ResourceId) -> bool;
}

impl ResourcePresence for DashSet<ResourceId> {
    fn contains(&self, id: &ResourceId) -> bool {
        DashSet::contains(self, id)
    }
}

impl<T: ResourcePresence + ?Sized> ResourcePresence for std::sync::Arc<T> {
    fn contains(&self, id: &ResourceId) -> bool {
        (**self).contains(id)
    }
}

/// Adapts a closure into a [`ResourcePresence`].
pub struct FnPresence<F>(pub F);

impl<F> ResourcePresence for FnPresence<F>
where
    F: Fn(&ResourceId) -> bool + Send + Sync,
{
    fn contains(&self, id: &ResourceId) -> bool {
        (self.0)(id)
    }
}
