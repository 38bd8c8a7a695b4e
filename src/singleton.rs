//! Singleton registry
//!
//! Holds fully created singletons, early references handed out while a
//! singleton is still being built, the names currently in creation, the
//! disposal registry and the dependency edges used to order teardown.
//!
//! Creation of any singleton happens under one reentrant lock, so
//! concurrent requesters block and then observe the same instance. The
//! already-created lookup is lock-free.

use crate::context::CreationContext;
use crate::disposal::DisposableAdapter;
use crate::error::{DiError, Phase, Result};
use crate::provider::Instance;
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard, RwLock};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "logging")]
use tracing::{debug, trace, warn};

/// Lazily produces the early reference for a singleton in creation.
pub(crate) type EarlyReferenceFactory = Box<dyn FnOnce() -> Result<Instance> + Send>;

type Edges = Mutex<HashMap<String, Vec<String>>>;

pub(crate) struct SingletonRegistry {
    singletons: DashMap<String, Instance, RandomState>,
    early: Mutex<HashMap<String, Instance>>,
    factories: Mutex<HashMap<String, EarlyReferenceFactory>>,
    /// Singleton names in registration order
    registered: RwLock<Vec<String>>,
    in_creation: Mutex<HashSet<String>>,
    creation_lock: ReentrantMutex<()>,
    in_destruction: AtomicBool,
    disposables: Mutex<Vec<(String, DisposableAdapter)>>,
    /// outer component -> inner components
    contained: Edges,
    /// provider -> components depending on it
    dependents: Edges,
    /// consumer -> components it depends on
    dependencies: Edges,
    /// Products of singleton factory beans
    products: DashMap<String, Instance, RandomState>,
}

fn push_unique(map: &mut HashMap<String, Vec<String>>, key: &str, value: &str) {
    let entry = map.entry(key.to_string()).or_default();
    if !entry.iter().any(|v| v == value) {
        entry.push(value.to_string());
    }
}

impl SingletonRegistry {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            singletons: DashMap::with_capacity_and_hasher_and_shard_amount(
                capacity,
                RandomState::new(),
                if capacity <= 16 { 8 } else { 16 },
            ),
            early: Mutex::new(HashMap::new()),
            factories: Mutex::new(HashMap::new()),
            registered: RwLock::new(Vec::with_capacity(capacity)),
            in_creation: Mutex::new(HashSet::new()),
            creation_lock: ReentrantMutex::new(()),
            in_destruction: AtomicBool::new(false),
            disposables: Mutex::new(Vec::new()),
            contained: Mutex::new(HashMap::new()),
            dependents: Mutex::new(HashMap::new()),
            dependencies: Mutex::new(HashMap::new()),
            products: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 4),
        }
    }

    /// Lock serializing singleton creation. Reentrant on the owning thread.
    #[inline]
    pub(crate) fn creation_lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.creation_lock.lock()
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    /// Register an externally created singleton.
    pub(crate) fn register_singleton(&self, name: &str, instance: Instance) -> Result<()> {
        let _guard = self.creation_lock();
        if self.singletons.contains_key(name) {
            return Err(DiError::already_registered(name, "a singleton is already registered under this name"));
        }
        self.add_singleton(name, instance);
        Ok(())
    }

    pub(crate) fn add_singleton(&self, name: &str, instance: Instance) {
        self.singletons.insert(name.to_string(), instance);
        self.early.lock().remove(name);
        self.factories.lock().remove(name);
        let mut registered = self.registered.write();
        if !registered.iter().any(|n| n == name) {
            registered.push(name.to_string());
        }
    }

    /// Register the early-reference factory of a singleton in creation.
    pub(crate) fn add_singleton_factory(&self, name: &str, factory: EarlyReferenceFactory) {
        let _guard = self.creation_lock();
        if !self.singletons.contains_key(name) {
            self.factories.lock().insert(name.to_string(), factory);
            self.early.lock().remove(name);
        }
    }

    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------

    /// Fully created singleton only.
    #[inline]
    pub(crate) fn get(&self, name: &str) -> Option<Instance> {
        self.singletons.get(name).map(|s| s.value().clone())
    }

    /// Fully created singleton, or the early reference of one in creation.
    ///
    /// With `allow_early` the early-reference factory is run on first request.
    pub(crate) fn get_singleton(&self, name: &str, allow_early: bool) -> Result<Option<Instance>> {
        if let Some(existing) = self.get(name) {
            return Ok(Some(existing));
        }
        if !self.is_currently_in_creation(name) {
            return Ok(None);
        }
        let _guard = self.creation_lock();
        if let Some(existing) = self.get(name) {
            return Ok(Some(existing));
        }
        if let Some(early) = self.early.lock().get(name).cloned() {
            return Ok(Some(early));
        }
        if !allow_early {
            return Ok(None);
        }
        let factory = self.factories.lock().remove(name);
        match factory {
            Some(factory) => {
                let early = factory()?;

                #[cfg(feature = "logging")]
                trace!(target: "component_factory", component = name, "Exposing early reference");

                self.early.lock().insert(name.to_string(), early.clone());
                Ok(Some(early))
            }
            None => Ok(None),
        }
    }

    /// Early reference already handed out for `name`, if any.
    pub(crate) fn early_reference(&self, name: &str) -> Option<Instance> {
        self.early.lock().get(name).cloned()
    }

    /// Return the singleton `name`, creating it with `create` under the creation lock.
    ///
    /// Re-entering creation of a name already in creation fails with
    /// [`DiError::CircularReference`]. On failure nothing is registered; the
    /// caller is responsible for evicting partial state.
    pub(crate) fn get_or_create<F>(&self, name: &str, ctx: &mut CreationContext, create: F) -> Result<Instance>
    where
        F: FnOnce(&mut CreationContext) -> Result<Instance>,
    {
        let _guard = self.creation_lock();
        if let Some(existing) = self.get(name) {
            return Ok(existing);
        }
        if self.in_destruction.load(Ordering::Acquire) {
            return Err(DiError::creation_message(
                name,
                Phase::Instantiation,
                "singleton creation is not allowed while singletons are being destroyed",
            ));
        }
        if !self.in_creation.lock().insert(name.to_string()) {
            return Err(DiError::CircularReference {
                name: name.to_string(),
                chain: ctx.chain_with(name),
            });
        }

        #[cfg(feature = "logging")]
        debug!(target: "component_factory", component = name, depth = ctx.depth(), "Creating singleton");

        ctx.enter_singleton(name);
        let result = create(ctx);
        ctx.exit_singleton(name);
        self.in_creation.lock().remove(name);

        let instance = result?;
        self.add_singleton(name, instance.clone());
        Ok(instance)
    }

    #[inline]
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.singletons.contains_key(name)
    }

    pub(crate) fn is_currently_in_creation(&self, name: &str) -> bool {
        self.in_creation.lock().contains(name)
    }

    /// Singleton names in registration order.
    pub(crate) fn names(&self) -> Vec<String> {
        self.registered.read().clone()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.singletons.len()
    }

    // -------------------------------------------------------------------------
    // Factory bean products
    // -------------------------------------------------------------------------

    pub(crate) fn product(&self, name: &str) -> Option<Instance> {
        self.products.get(name).map(|p| p.value().clone())
    }

    /// Cache a product; a product cached concurrently wins.
    pub(crate) fn put_product(&self, name: &str, product: Instance) -> Instance {
        self.products
            .entry(name.to_string())
            .or_insert(product)
            .value()
            .clone()
    }

    // -------------------------------------------------------------------------
    // Dependency edges
    // -------------------------------------------------------------------------

    /// Record that `dependent` depends on `name`.
    pub(crate) fn register_dependent(&self, name: &str, dependent: &str) {
        if name == dependent {
            return;
        }
        push_unique(&mut self.dependents.lock(), name, dependent);
        push_unique(&mut self.dependencies.lock(), dependent, name);
    }

    /// Record that `inner` lives inside `outer`; `outer` is destroyed first.
    pub(crate) fn register_contained(&self, inner: &str, outer: &str) {
        push_unique(&mut self.contained.lock(), outer, inner);
        self.register_dependent(inner, outer);
    }

    /// Whether `dependent` depends on `name`, directly or transitively.
    pub(crate) fn is_dependent(&self, name: &str, dependent: &str) -> bool {
        let dependents = self.dependents.lock();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut frontier = vec![name];
        while let Some(current) = frontier.pop() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(direct) = dependents.get(current) {
                if direct.iter().any(|d| d == dependent) {
                    return true;
                }
                frontier.extend(direct.iter().map(String::as_str));
            }
        }
        false
    }

    pub(crate) fn dependents_of(&self, name: &str) -> Vec<String> {
        self.dependents.lock().get(name).cloned().unwrap_or_default()
    }

    pub(crate) fn dependencies_of(&self, name: &str) -> Vec<String> {
        self.dependencies.lock().get(name).cloned().unwrap_or_default()
    }

    // -------------------------------------------------------------------------
    // Destruction
    // -------------------------------------------------------------------------

    /// Register the destruction adapter of a singleton; replaces any earlier one.
    pub(crate) fn register_disposable(&self, adapter: DisposableAdapter) {
        let mut disposables = self.disposables.lock();
        disposables.retain(|(n, _)| n != adapter.name());
        disposables.push((adapter.name().to_string(), adapter));
    }

    /// Remove every trace of `name` without running destruction callbacks.
    pub(crate) fn remove_singleton(&self, name: &str) {
        let _guard = self.creation_lock();
        self.singletons.remove(name);
        self.early.lock().remove(name);
        self.factories.lock().remove(name);
        self.products.remove(name);
        self.registered.write().retain(|n| n != name);
    }

    /// Destroy `name`, its dependents first, then the components it contains.
    pub(crate) fn destroy_singleton(&self, name: &str) {
        self.remove_singleton(name);
        let adapter = {
            let mut disposables = self.disposables.lock();
            disposables
                .iter()
                .position(|(n, _)| n == name)
                .map(|pos| disposables.remove(pos).1)
        };
        self.destroy_with_dependents(name, adapter);
    }

    fn destroy_with_dependents(&self, name: &str, adapter: Option<DisposableAdapter>) {
        let dependents = self.dependents.lock().remove(name).unwrap_or_default();
        for dependent in dependents {
            self.destroy_singleton(&dependent);
        }

        if let Some(adapter) = adapter {
            let _outcome = adapter.destroy();
            #[cfg(feature = "logging")]
            if let Err(err) = _outcome {
                warn!(target: "component_factory", component = name, error = %err, "Destruction failed");
            }
        }

        let contained = self.contained.lock().remove(name).unwrap_or_default();
        for inner in contained {
            self.destroy_singleton(&inner);
        }

        {
            let mut dependents = self.dependents.lock();
            dependents.values_mut().for_each(|v| v.retain(|n| n != name));
            dependents.retain(|_, v| !v.is_empty());
        }
        self.dependencies.lock().remove(name);
    }

    /// Destroy every singleton, most recently registered disposable first.
    pub(crate) fn destroy_singletons(&self) {
        self.in_destruction.store(true, Ordering::Release);

        let names: Vec<String> = self
            .disposables
            .lock()
            .iter()
            .map(|(n, _)| n.clone())
            .collect();

        #[cfg(feature = "logging")]
        debug!(
            target: "component_factory",
            singletons = self.singletons.len(),
            disposables = names.len(),
            "Destroying singletons"
        );

        for name in names.iter().rev() {
            self.destroy_singleton(name);
        }

        self.contained.lock().clear();
        self.dependents.lock().clear();
        self.dependencies.lock().clear();
        {
            let _guard = self.creation_lock();
            self.singletons.clear();
            self.early.lock().clear();
            self.factories.lock().clear();
            self.products.clear();
            self.registered.write().clear();
        }

        self.in_destruction.store(false, Ordering::Release);
    }
}

impl fmt::Debug for SingletonRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonRegistry")
            .field("singletons", &self.singletons.len())
            .field("in_creation", &self.in_creation.lock().len())
            .field("disposables", &self.disposables.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_manual_registration() {
        let registry = SingletonRegistry::with_capacity(0);
        registry.register_singleton("a", Instance::new(1u8)).unwrap();
        assert!(matches!(
            registry.register_singleton("a", Instance::new(2u8)),
            Err(DiError::AlreadyRegistered { .. })
        ));
        assert_eq!(registry.names(), vec!["a"]);
    }

    #[test]
    fn test_get_or_create_once() {
        let registry = SingletonRegistry::with_capacity(0);
        let calls = AtomicUsize::new(0);
        let mut ctx = CreationContext::new();
        for _ in 0..3 {
            registry
                .get_or_create("a", &mut ctx, |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Instance::new(String::from("a")))
                })
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_reentry_is_circular() {
        let registry = SingletonRegistry::with_capacity(0);
        let mut ctx = CreationContext::new();
        let err = registry
            .get_or_create("a", &mut ctx, |ctx| {
                registry.get_or_create("a", ctx, |_| Ok(Instance::new(1u8)))
            })
            .unwrap_err();
        match err {
            DiError::CircularReference { chain, .. } => assert_eq!(chain, vec!["a", "a"]),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!registry.is_currently_in_creation("a"));
        assert!(!registry.contains("a"));
    }

    #[test]
    fn test_early_reference_factory_runs_once() {
        let registry = SingletonRegistry::with_capacity(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let mut ctx = CreationContext::new();
        registry
            .get_or_create("a", &mut ctx, |_| {
                let raw = Instance::new(7u32);
                let exposed = raw.clone();
                let c = calls.clone();
                registry.add_singleton_factory(
                    "a",
                    Box::new(move || {
                        c.fetch_add(1, Ordering::SeqCst);
                        Ok(exposed)
                    }),
                );
                assert!(registry.get_singleton("a", false).unwrap().is_none());
                let first = registry.get_singleton("a", true).unwrap().unwrap();
                let second = registry.get_singleton("a", true).unwrap().unwrap();
                assert!(first.ptr_eq(&second));
                Ok(raw)
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.early_reference("a").is_none());
    }

    #[test]
    fn test_transitive_dependents() {
        let registry = SingletonRegistry::with_capacity(0);
        registry.register_dependent("db", "repo");
        registry.register_dependent("repo", "service");
        assert!(registry.is_dependent("db", "service"));
        assert!(!registry.is_dependent("service", "db"));
        assert_eq!(registry.dependents_of("db"), vec!["repo"]);
        assert_eq!(registry.dependencies_of("service"), vec!["repo"]);
    }

    #[test]
    fn test_products_first_wins() {
        let registry = SingletonRegistry::with_capacity(0);
        let first = registry.put_product("f", Instance::new(1u8));
        let second = registry.put_product("f", Instance::new(2u8));
        assert!(first.ptr_eq(&second));
        registry.remove_singleton("f");
        assert!(registry.product("f").is_none());
    }
}
