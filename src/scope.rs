//! Component scopes
//!
//! Singletons and prototypes are built in. Any other scope name must be
//! backed by a [`CustomScope`] registered with
//! [`Container::register_scope`](crate::Container::register_scope).

use crate::error::{DiError, Result};
use crate::provider::Instance;
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "logging")]
use tracing::{debug, warn};

pub const SINGLETON: &str = "singleton";
pub const PROTOTYPE: &str = "prototype";

/// Lifetime tag carried by a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ScopeKind {
    /// One shared instance per container
    #[default]
    Singleton,
    /// A new instance per request
    Prototype,
    /// Delegated to a registered [`CustomScope`]
    Custom(String),
}

impl ScopeKind {
    /// Parse a scope name; the built-in names map to their variants.
    pub fn named(name: &str) -> Self {
        match name {
            "" | SINGLETON => ScopeKind::Singleton,
            PROTOTYPE => ScopeKind::Prototype,
            other => ScopeKind::Custom(other.to_string()),
        }
    }

    #[inline]
    pub fn is_singleton(&self) -> bool {
        matches!(self, ScopeKind::Singleton)
    }

    #[inline]
    pub fn is_prototype(&self) -> bool {
        matches!(self, ScopeKind::Prototype)
    }

    pub fn name(&self) -> &str {
        match self {
            ScopeKind::Singleton => SINGLETON,
            ScopeKind::Prototype => PROTOTYPE,
            ScopeKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Callback run when a scoped object is discarded.
pub type DestructionCallback = Box<dyn FnOnce() + Send>;

/// A user-defined lifetime (request, session, conversation, ...).
pub trait CustomScope: Send + Sync {
    /// Return the object stored under `name`, creating it with `creator` if absent.
    fn get(&self, name: &str, creator: &mut dyn FnMut() -> Result<Instance>) -> Result<Instance>;

    /// Drop the object stored under `name` from the scope.
    fn remove(&self, name: &str) -> Option<Instance>;

    /// Run `callback` when the object named `name` is discarded.
    fn register_destruction_callback(&self, name: &str, callback: DestructionCallback);

    fn conversation_id(&self) -> Option<String> {
        None
    }
}

/// Unique scope identifier.
///
/// Each map scope gets a unique ID for tracking and debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Generate a new unique scope ID.
    #[inline]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

/// Map-backed scope: objects live until removed or until [`MapScope::close`].
///
/// # Examples
///
/// ```rust
/// use component_factory::{CustomScope, Instance, MapScope};
///
/// let scope = MapScope::new();
/// let first = scope.get("ctx", &mut || Ok(Instance::new(1u32))).unwrap();
/// let again = scope.get("ctx", &mut || Ok(Instance::new(2u32))).unwrap();
/// assert!(first.ptr_eq(&again));
/// ```
pub struct MapScope {
    id: ScopeId,
    objects: DashMap<String, Instance, RandomState>,
    callbacks: Mutex<Vec<(String, DestructionCallback)>>,
}

impl MapScope {
    pub fn new() -> Self {
        let id = ScopeId::new();

        #[cfg(feature = "logging")]
        debug!(target: "component_factory", scope_id = id.id(), "Creating map scope");

        Self {
            id,
            objects: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 4),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    /// Discard every object, running destruction callbacks in reverse registration order.
    pub fn close(&self) {
        let callbacks = std::mem::take(&mut *self.callbacks.lock());

        #[cfg(feature = "logging")]
        debug!(
            target: "component_factory",
            scope_id = self.id.id(),
            objects = self.objects.len(),
            callbacks = callbacks.len(),
            "Closing map scope"
        );

        self.objects.clear();
        for (_name, callback) in callbacks.into_iter().rev() {
            callback();
        }
    }
}

impl Default for MapScope {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomScope for MapScope {
    fn get(&self, name: &str, creator: &mut dyn FnMut() -> Result<Instance>) -> Result<Instance> {
        if let Some(existing) = self.objects.get(name) {
            return Ok(existing.value().clone());
        }
        // Create outside the shard lock: the creator may re-enter this scope.
        let created = creator()?;
        let stored = self
            .objects
            .entry(name.to_string())
            .or_insert(created)
            .value()
            .clone();
        Ok(stored)
    }

    fn remove(&self, name: &str) -> Option<Instance> {
        let removed = self.objects.remove(name).map(|(_, v)| v);
        if removed.is_some() {
            let callback = {
                let mut callbacks = self.callbacks.lock();
                callbacks
                    .iter()
                    .position(|(n, _)| n == name)
                    .map(|pos| callbacks.remove(pos).1)
            };
            if let Some(callback) = callback {
                callback();
            }
        }
        removed
    }

    /// A callback already registered under `name` is replaced and dropped
    /// without running; the object it guarded is the one `callback` now covers.
    fn register_destruction_callback(&self, name: &str, callback: DestructionCallback) {
        let mut callbacks = self.callbacks.lock();
        if let Some(pos) = callbacks.iter().position(|(n, _)| n == name) {
            #[cfg(feature = "logging")]
            warn!(
                target: "component_factory",
                scope_id = self.id.id(),
                component = name,
                "Replacing destruction callback"
            );
            callbacks.remove(pos);
        }
        callbacks.push((name.to_string(), callback));
    }

    fn conversation_id(&self) -> Option<String> {
        Some(self.id.to_string())
    }
}

impl fmt::Debug for MapScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapScope")
            .field("id", &self.id)
            .field("objects", &self.objects.len())
            .finish()
    }
}

/// Reject names reserved for the built-in scopes.
pub(crate) fn check_custom_name(name: &str) -> Result<()> {
    if name.is_empty() || name == SINGLETON || name == PROTOTYPE {
        return Err(DiError::invalid(
            name,
            "cannot replace the built-in singleton or prototype scope",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_scope_kind_parse() {
        assert_eq!(ScopeKind::named("singleton"), ScopeKind::Singleton);
        assert_eq!(ScopeKind::named(""), ScopeKind::Singleton);
        assert_eq!(ScopeKind::named("prototype"), ScopeKind::Prototype);
        assert_eq!(ScopeKind::named("request"), ScopeKind::Custom("request".into()));
        assert_eq!(ScopeKind::Custom("request".into()).to_string(), "request");
    }

    #[test]
    fn test_scope_ids_unique() {
        let s1 = ScopeId::new();
        let s2 = ScopeId::new();
        assert_ne!(s1.id(), s2.id());
        assert!(format!("{}", s1).starts_with("scope-"));
    }

    #[test]
    fn test_map_scope_caches() {
        let scope = MapScope::new();
        let calls = AtomicUsize::new(0);
        let mut creator = || -> Result<Instance> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Instance::new(String::from("v")))
        };
        let a = scope.get("x", &mut creator).unwrap();
        let b = scope.get("x", &mut creator).unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(scope.len(), 1);
    }

    #[test]
    fn test_close_runs_callbacks_in_reverse() {
        let scope = MapScope::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b", "c"] {
            scope.get(name, &mut || Ok(Instance::new(1u8))).unwrap();
            let order = order.clone();
            scope.register_destruction_callback(name, Box::new(move || order.lock().push(name)));
        }
        scope.close();
        assert_eq!(*order.lock(), vec!["c", "b", "a"]);
        assert!(scope.is_empty());
    }

    #[test]
    fn test_remove_runs_callback() {
        let scope = MapScope::new();
        let hit = Arc::new(AtomicUsize::new(0));
        scope.get("x", &mut || Ok(Instance::new(1u8))).unwrap();
        let h = hit.clone();
        scope.register_destruction_callback("x", Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(scope.remove("x").is_some());
        assert!(scope.remove("x").is_none());
        assert_eq!(hit.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_replaced_callback_is_dropped() {
        let scope = MapScope::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        scope.get("x", &mut || Ok(Instance::new(1u8))).unwrap();
        for label in ["first", "second"] {
            let order = order.clone();
            scope.register_destruction_callback("x", Box::new(move || order.lock().push(label)));
        }
        scope.close();
        assert_eq!(*order.lock(), vec!["second"]);
    }

    #[test]
    fn test_reserved_names() {
        assert!(check_custom_name("singleton").is_err());
        assert!(check_custom_name("prototype").is_err());
        assert!(check_custom_name("request").is_ok());
    }
}
