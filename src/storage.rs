//! Descriptor storage
//!
//! Uses DashMap for concurrent lookups, plus a registration-order name list
//! and an alias table.

use crate::descriptor::ComponentDescriptor;
use crate::error::{DiError, Result};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::Arc;

/// Thread-safe storage for component descriptors and aliases.
pub(crate) struct DefinitionStore {
    /// Map from component name to its raw descriptor
    definitions: DashMap<String, Arc<ComponentDescriptor>, RandomState>,
    /// Names in registration order
    names: RwLock<Vec<String>>,
    /// Map from alias to the name it points at (may itself be an alias)
    aliases: DashMap<String, String, RandomState>,
    /// Serializes multi-step registration sequences
    registration: Mutex<()>,
}

fn shard_amount(capacity: usize) -> usize {
    // Scale shards based on expected capacity and concurrency needs
    if capacity <= 16 {
        8
    } else if capacity <= 64 {
        16
    } else {
        32
    }
}

impl DefinitionStore {
    /// Create with pre-allocated capacity and optimized shards.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            definitions: DashMap::with_capacity_and_hasher_and_shard_amount(
                capacity,
                RandomState::new(),
                shard_amount(capacity),
            ),
            names: RwLock::new(Vec::with_capacity(capacity)),
            aliases: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 4),
            registration: Mutex::new(()),
        }
    }

    /// Hold while registering or removing so invalidation happens atomically.
    pub(crate) fn registration_lock(&self) -> MutexGuard<'_, ()> {
        self.registration.lock()
    }

    /// Insert, returning the descriptor previously stored under `name`.
    pub(crate) fn insert(&self, name: &str, descriptor: ComponentDescriptor) -> Option<Arc<ComponentDescriptor>> {
        let previous = self.definitions.insert(name.to_string(), Arc::new(descriptor));
        if previous.is_none() {
            self.names.write().push(name.to_string());
        }
        previous
    }

    pub(crate) fn remove(&self, name: &str) -> Option<Arc<ComponentDescriptor>> {
        let removed = self.definitions.remove(name).map(|(_, d)| d);
        if removed.is_some() {
            self.names.write().retain(|n| n != name);
        }
        removed
    }

    #[inline]
    pub(crate) fn get(&self, name: &str) -> Option<Arc<ComponentDescriptor>> {
        self.definitions.get(name).map(|d| Arc::clone(d.value()))
    }

    #[inline]
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Snapshot of names in registration order.
    pub(crate) fn names(&self) -> Vec<String> {
        self.names.read().clone()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Names of descriptors whose parent is `name`.
    pub(crate) fn children_of(&self, name: &str) -> Vec<String> {
        self.names()
            .into_iter()
            .filter(|n| {
                self.get(n)
                    .is_some_and(|d| d.parent_name() == Some(name))
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Aliases
    // -------------------------------------------------------------------------

    /// Register `alias` for `name`.
    ///
    /// An alias equal to its name is removed instead. Re-pointing an alias
    /// needs `allow_override`. Cycles are rejected.
    pub(crate) fn register_alias(&self, name: &str, alias: &str, allow_override: bool) -> Result<()> {
        if name.is_empty() || alias.is_empty() {
            return Err(DiError::invalid(alias, "alias and name must not be empty"));
        }
        if alias == name {
            self.aliases.remove(alias);
            return Ok(());
        }
        if let Some(existing) = self.aliases.get(alias).map(|e| e.value().clone()) {
            if existing == name {
                return Ok(());
            }
            if !allow_override {
                return Err(DiError::already_registered(
                    alias,
                    format!("alias is already registered for '{existing}'"),
                ));
            }
        }
        if self.resolves_to(name, alias) {
            return Err(DiError::invalid(
                alias,
                format!("circular reference: '{alias}' is a direct or indirect alias for '{name}' already"),
            ));
        }
        self.aliases.insert(alias.to_string(), name.to_string());
        Ok(())
    }

    pub(crate) fn remove_alias(&self, alias: &str) -> Result<()> {
        self.aliases
            .remove(alias)
            .map(|_| ())
            .ok_or_else(|| DiError::invalid(alias, "no alias registered under that name"))
    }

    #[inline]
    pub(crate) fn is_alias(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }

    /// Whether following aliases from `from` reaches `to`.
    fn resolves_to(&self, from: &str, to: &str) -> bool {
        let mut current = from.to_string();
        let mut steps = 0;
        while let Some(next) = self.aliases.get(&current).map(|n| n.value().clone()) {
            if next == to {
                return true;
            }
            current = next;
            steps += 1;
            if steps > self.aliases.len() {
                break;
            }
        }
        false
    }

    /// Follow alias chains to the registered name.
    pub(crate) fn canonical_name(&self, name: &str) -> String {
        let mut current = name.to_string();
        let mut steps = 0;
        while let Some(next) = self.aliases.get(&current).map(|n| n.value().clone()) {
            current = next;
            steps += 1;
            if steps > self.aliases.len() {
                break;
            }
        }
        current
    }

    /// Every alias that resolves to `name`, directly or transitively.
    pub(crate) fn aliases_of(&self, name: &str) -> Vec<String> {
        let mut found = Vec::new();
        let mut frontier = vec![name.to_string()];
        while let Some(target) = frontier.pop() {
            for entry in self.aliases.iter() {
                if *entry.value() == target && !found.contains(entry.key()) {
                    found.push(entry.key().clone());
                    frontier.push(entry.key().clone());
                }
            }
        }
        found.sort();
        found
    }
}

impl std::fmt::Debug for DefinitionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionStore")
            .field("definitions", &self.definitions.len())
            .field("aliases", &self.aliases.len())
            .finish()
    }
}
