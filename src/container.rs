//! Component container
//!
//! The `Container` owns the descriptor store, the merged-descriptor cache,
//! the singleton registry, the hook chain and the registered scopes. It is
//! a cheap handle (`Arc` inside); clones share everything.
//!
//! Containers form a hierarchy: a [`child`](Container::child) sees every
//! component of its ancestors and may shadow them with local descriptors.

use crate::class::{ClassIndex, ComponentClass};
use crate::config::ContainerConfig;
use crate::context::CreationContext;
use crate::descriptor::ComponentDescriptor;
use crate::error::{DiError, Result};
use crate::factory::strip_factory_prefix;
use crate::hooks::{ComponentPostProcessor, HookRegistry};
use crate::merge::{MergedDescriptor, merge};
use crate::provider::{Injectable, Instance, TypeKey};
use crate::resolver::{DependencyRequirement, ObjectProvider, Provider};
use crate::scope::{CustomScope, check_custom_name};
use crate::singleton::SingletonRegistry;
use crate::storage::DefinitionStore;
use crate::value::{ParamType, Value};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::{ReentrantMutex, RwLock};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Number of shards for the merged-descriptor cache
const SHARD_AMOUNT: usize = 8;

pub(crate) struct ContainerInner {
    pub(crate) config: ContainerConfig,
    pub(crate) allow_circular: AtomicBool,
    pub(crate) allow_overriding: AtomicBool,
    pub(crate) store: DefinitionStore,
    pub(crate) merged: DashMap<String, Arc<MergedDescriptor>, RandomState>,
    merge_lock: ReentrantMutex<()>,
    pub(crate) classes: ClassIndex,
    pub(crate) registry: SingletonRegistry,
    pub(crate) hooks: HookRegistry,
    pub(crate) scopes: DashMap<String, Arc<dyn CustomScope>, RandomState>,
    /// Values injectable by type without being components
    pub(crate) resolvable: RwLock<Vec<(TypeKey, Instance)>>,
    /// Names requested at least once
    pub(crate) already_created: DashMap<String, (), RandomState>,
    /// Candidate names per (type, allow eager init); only filled once frozen
    pub(crate) names_by_type: DashMap<(TypeKey, bool), Arc<Vec<String>>, RandomState>,
    pub(crate) parent: Option<Container>,
    pub(crate) locked: AtomicBool,
    pub(crate) frozen: AtomicBool,
    pub(crate) inner_counter: AtomicUsize,
    depth: u32,
}

/// The component container.
///
/// # Examples
///
/// ```rust
/// use component_factory::{ComponentClass, ComponentDescriptor, Container};
///
/// struct Database {
///     url: String,
/// }
///
/// let container = Container::new();
/// container
///     .register_descriptor(
///         "database",
///         ComponentDescriptor::new(
///             ComponentClass::builder::<Database>()
///                 .constructor(|url: String| Database { url })
///                 .build(),
///         )
///         .with_arg("postgres://localhost"),
///     )
///     .unwrap();
///
/// let db = container.get_named::<Database>("database").unwrap();
/// assert_eq!(db.url, "postgres://localhost");
/// ```
#[derive(Clone)]
pub struct Container {
    pub(crate) inner: Arc<ContainerInner>,
}

/// Non-owning handle to a [`Container`], held by deferred providers.
#[derive(Clone)]
pub struct WeakContainer(Weak<ContainerInner>);

impl WeakContainer {
    pub fn upgrade(&self) -> Option<Container> {
        self.0.upgrade().map(|inner| Container { inner })
    }
}

impl fmt::Debug for WeakContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakContainer")
            .field("alive", &(self.0.strong_count() > 0))
            .finish()
    }
}

impl Container {
    /// Create a new root container with the default configuration.
    #[inline]
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    /// Create a root container with pre-allocated capacity.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_config(ContainerConfig::default().with_capacity(capacity))
    }

    pub fn with_config(config: ContainerConfig) -> Self {
        #[cfg(feature = "logging")]
        debug!(target: "component_factory", depth = 0, "Creating new root container");

        Self::build(config, None, 0)
    }

    fn build(config: ContainerConfig, parent: Option<Container>, depth: u32) -> Self {
        let capacity = config.initial_capacity;
        Self {
            inner: Arc::new(ContainerInner {
                allow_circular: AtomicBool::new(config.allow_circular_references),
                allow_overriding: AtomicBool::new(config.allow_definition_overriding),
                store: DefinitionStore::with_capacity(capacity),
                merged: DashMap::with_capacity_and_hasher_and_shard_amount(
                    capacity,
                    RandomState::new(),
                    SHARD_AMOUNT,
                ),
                merge_lock: ReentrantMutex::new(()),
                classes: ClassIndex::new(),
                registry: SingletonRegistry::with_capacity(capacity),
                hooks: HookRegistry::new(),
                scopes: DashMap::with_hasher(RandomState::new()),
                resolvable: RwLock::new(Vec::new()),
                already_created: DashMap::with_capacity_and_hasher(capacity, RandomState::new()),
                names_by_type: DashMap::with_hasher(RandomState::new()),
                parent,
                locked: AtomicBool::new(false),
                frozen: AtomicBool::new(false),
                inner_counter: AtomicUsize::new(0),
                depth,
                config,
            }),
        }
    }

    /// Create a child container that resolves through this one.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use component_factory::{ComponentClass, ComponentDescriptor, Container};
    ///
    /// struct AppConfig;
    ///
    /// let root = Container::new();
    /// root.register_descriptor(
    ///     "config",
    ///     ComponentDescriptor::new(ComponentClass::builder::<AppConfig>().constructor(|| AppConfig).build()),
    /// )
    /// .unwrap();
    ///
    /// let request = root.child();
    /// assert!(request.contains_component("config"));
    /// assert!(!request.contains_descriptor("config"));
    /// ```
    pub fn child(&self) -> Self {
        let depth = self.inner.depth + 1;

        #[cfg(feature = "logging")]
        debug!(
            target: "component_factory",
            parent_depth = self.inner.depth,
            child_depth = depth,
            parent_descriptors = self.inner.store.len(),
            "Creating child container"
        );

        Self::build(self.inner.config.clone(), Some(self.clone()), depth)
    }

    #[inline]
    pub fn parent(&self) -> Option<&Container> {
        self.inner.parent.as_ref()
    }

    /// Nesting depth (0 = root).
    #[inline]
    pub fn depth(&self) -> u32 {
        self.inner.depth
    }

    #[inline]
    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    #[inline]
    pub fn downgrade(&self) -> WeakContainer {
        WeakContainer(Arc::downgrade(&self.inner))
    }

    // =========================================================================
    // Descriptor registration
    // =========================================================================

    /// Register `descriptor` under `name`.
    ///
    /// Replacing an existing descriptor (when overriding is allowed) resets
    /// it: its merged form goes stale, its singleton is destroyed, and the
    /// same happens to every descriptor inheriting from it.
    pub fn register_descriptor(&self, name: impl Into<String>, descriptor: ComponentDescriptor) -> Result<()> {
        let name = name.into();
        self.check_not_locked()?;
        if name.is_empty() {
            return Err(DiError::invalid(name, "component name must not be empty"));
        }
        descriptor.validate().map_err(|reason| DiError::invalid(&name, reason))?;
        if let Some(class) = descriptor.class() {
            self.inner.classes.register(class);
        }

        let overriding = self.inner.allow_overriding.load(Ordering::Acquire);
        let existing = {
            let _guard = self.inner.store.registration_lock();
            if self.inner.store.contains(&name) && !overriding {
                return Err(DiError::already_registered(
                    &name,
                    "a descriptor is already registered under this name and overriding is disabled",
                ));
            }
            if self.inner.store.is_alias(&name) {
                if !overriding {
                    return Err(DiError::already_registered(&name, "name is already in use as an alias"));
                }
                self.inner.store.remove_alias(&name)?;
            }
            self.inner.store.insert(&name, descriptor)
        };

        #[cfg(feature = "logging")]
        debug!(
            target: "component_factory",
            component = %name,
            replaced = existing.is_some(),
            depth = self.inner.depth,
            descriptors = self.inner.store.len(),
            "Registered component descriptor"
        );

        if existing.is_some() || self.inner.registry.contains(&name) {
            self.reset_descriptor(&name);
        }
        self.inner.names_by_type.clear();
        Ok(())
    }

    pub fn unregister_descriptor(&self, name: &str) -> Result<()> {
        self.check_not_locked()?;
        let name = self.canonical_name(name);
        if self.inner.store.remove(&name).is_none() {
            return Err(DiError::no_such_descriptor(name));
        }

        #[cfg(feature = "logging")]
        debug!(target: "component_factory", component = %name, "Unregistered component descriptor");

        self.reset_descriptor(&name);
        self.inner.names_by_type.clear();
        Ok(())
    }

    /// Stale merged form, destroyed singleton, hooks notified; cascades to children.
    fn reset_descriptor(&self, name: &str) {
        let mut visited = HashSet::new();
        self.reset_recursive(name, &mut visited);
    }

    fn reset_recursive(&self, name: &str, visited: &mut HashSet<String>) {
        if !visited.insert(name.to_string()) {
            return;
        }
        if let Some(merged) = self.inner.merged.get(name).map(|m| Arc::clone(m.value())) {
            merged.mark_stale();
        }
        self.inner.registry.destroy_singleton(name);
        for hook in self.inner.hooks.snapshot().iter() {
            hook.reset_descriptor(name);
        }
        for child in self.inner.store.children_of(name) {
            self.reset_recursive(&child, visited);
        }
    }

    /// Raw descriptor registered under `name` in this container.
    pub fn descriptor(&self, name: &str) -> Result<Arc<ComponentDescriptor>> {
        let name = self.canonical_name(name);
        self.inner
            .store
            .get(&name)
            .ok_or_else(|| DiError::no_such_descriptor(name))
    }

    #[inline]
    pub fn contains_descriptor(&self, name: &str) -> bool {
        self.inner.store.contains(&self.canonical_name(name))
    }

    /// Descriptor names in registration order.
    pub fn descriptor_names(&self) -> Vec<String> {
        self.inner.store.names()
    }

    #[inline]
    pub fn descriptor_count(&self) -> usize {
        self.inner.store.len()
    }

    // =========================================================================
    // Aliases
    // =========================================================================

    pub fn register_alias(&self, name: &str, alias: &str) -> Result<()> {
        self.check_not_locked()?;
        self.inner
            .store
            .register_alias(name, alias, self.inner.allow_overriding.load(Ordering::Acquire))?;
        self.inner.names_by_type.clear();
        Ok(())
    }

    pub fn remove_alias(&self, alias: &str) -> Result<()> {
        self.check_not_locked()?;
        self.inner.store.remove_alias(alias)
    }

    /// Every alias of `name`, this container's first, then its ancestors'.
    pub fn aliases(&self, name: &str) -> Vec<String> {
        let canonical = self.canonical_name(strip_factory_prefix(name));
        let mut aliases = self.inner.store.aliases_of(&canonical);
        if let Some(parent) = &self.inner.parent {
            for alias in parent.aliases(&canonical) {
                if !aliases.contains(&alias) {
                    aliases.push(alias);
                }
            }
        }
        aliases.retain(|a| a != name);
        aliases
    }

    /// Follow alias chains to the registered name.
    #[inline]
    pub fn canonical_name(&self, name: &str) -> String {
        self.inner.store.canonical_name(name)
    }

    // =========================================================================
    // Other registrations
    // =========================================================================

    /// Register a ready-made object as the singleton `name`.
    pub fn register_singleton<T: Injectable>(&self, name: &str, value: T) -> Result<()> {
        self.register_singleton_instance(name, Instance::new(value), None)
    }

    /// Register a ready-made object; `class` supplies its views for by-type matching.
    pub fn register_singleton_instance(
        &self,
        name: &str,
        instance: Instance,
        class: Option<Arc<ComponentClass>>,
    ) -> Result<()> {
        self.check_not_locked()?;
        if let Some(class) = &class {
            self.inner.classes.register(class);
        }
        self.inner.registry.register_singleton(name, instance)?;

        #[cfg(feature = "logging")]
        debug!(target: "component_factory", component = name, "Registered singleton instance");

        self.inner.names_by_type.clear();
        Ok(())
    }

    /// Make `class` known for view casts and factory detection.
    pub fn register_class(&self, class: Arc<ComponentClass>) {
        self.inner.classes.register(&class);
    }

    /// Register a custom scope; the built-in names are rejected.
    pub fn register_scope(&self, name: &str, scope: Arc<dyn CustomScope>) -> Result<()> {
        check_custom_name(name)?;

        #[cfg(feature = "logging")]
        debug!(target: "component_factory", scope = name, "Registered custom scope");

        self.inner.scopes.insert(name.to_string(), scope);
        Ok(())
    }

    pub fn registered_scope(&self, name: &str) -> Option<Arc<dyn CustomScope>> {
        self.inner.scopes.get(name).map(|s| Arc::clone(s.value()))
    }

    /// Make `instance` injectable wherever `key` (or a supertype of it) is required.
    pub fn register_resolvable_dependency(&self, key: TypeKey, instance: Instance) {
        let mut resolvable = self.inner.resolvable.write();
        resolvable.retain(|(k, _)| *k != key);
        resolvable.push((key, instance));
        self.inner.names_by_type.clear();
    }

    pub fn register_resolvable<T: ?Sized + Send + Sync + 'static>(&self, value: Arc<T>) {
        self.register_resolvable_dependency(TypeKey::of::<T>(), Instance::from_arc(value));
    }

    pub fn add_hook(&self, hook: Arc<dyn ComponentPostProcessor>) {
        self.inner.hooks.add(hook);

        #[cfg(feature = "logging")]
        debug!(target: "component_factory", hooks = self.inner.hooks.len(), "Registered component hook");
    }

    pub fn remove_hook(&self, hook: &Arc<dyn ComponentPostProcessor>) -> bool {
        self.inner.hooks.remove(hook)
    }

    #[inline]
    pub fn hook_count(&self) -> usize {
        self.inner.hooks.len()
    }

    // =========================================================================
    // Retrieval
    // =========================================================================

    /// Instance registered under `name` (an alias, or `&name` for a factory itself).
    pub fn get_component(&self, name: &str) -> Result<Instance> {
        #[cfg(feature = "logging")]
        trace!(target: "component_factory", component = name, depth = self.inner.depth, "Resolving component by name");

        let mut ctx = CreationContext::new();
        self.do_get(name, &mut ctx)
    }

    /// Create `name` with explicit arguments, bypassing constructor caches.
    pub fn get_component_with_args(&self, name: &str, args: Vec<Value>) -> Result<Instance> {
        let mut ctx = CreationContext::new();
        self.do_get_with_args(name, Some(&args), &mut ctx)
    }

    /// Typed lookup by name; the instance is adapted to `T` through its views.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use component_factory::{ComponentClass, ComponentDescriptor, Container};
    /// use std::sync::Arc;
    ///
    /// trait Greeter: Send + Sync {
    ///     fn greet(&self) -> String;
    /// }
    ///
    /// struct English;
    /// impl Greeter for English {
    ///     fn greet(&self) -> String {
    ///         "hello".into()
    ///     }
    /// }
    ///
    /// let container = Container::new();
    /// container
    ///     .register_descriptor(
    ///         "greeter",
    ///         ComponentDescriptor::new(
    ///             ComponentClass::builder::<English>()
    ///                 .implements(|e| e as Arc<dyn Greeter>)
    ///                 .constructor(|| English)
    ///                 .build(),
    ///         ),
    ///     )
    ///     .unwrap();
    ///
    /// let greeter = container.get_named::<dyn Greeter>("greeter").unwrap();
    /// assert_eq!(greeter.greet(), "hello");
    /// ```
    pub fn get_named<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        let instance = self.get_component(name)?;
        self.typed::<T>(name, &instance)
    }

    fn typed<T: ?Sized + Send + Sync + 'static>(&self, name: &str, instance: &Instance) -> Result<Arc<T>> {
        if let Some(typed) = instance.cast::<T>() {
            return Ok(typed);
        }
        self.adapt_named(name, instance, TypeKey::of::<T>())?
            .cast::<T>()
            .ok_or_else(|| DiError::type_mismatch(name, std::any::type_name::<T>(), instance.type_name()))
    }

    /// The unique component assignable to `T`.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let requirement = DependencyRequirement::new(ParamType::bean::<T>());
        match self.resolve_dependency(&requirement, None)? {
            Value::Bean(instance) => self.typed::<T>(std::any::type_name::<T>(), &instance),
            _ => Err(DiError::no_such_candidate(std::any::type_name::<T>(), None)),
        }
    }

    #[inline]
    pub fn try_get<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.get::<T>().ok()
    }

    /// Whether any component is assignable to `T`, here or in an ancestor.
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        !self.component_names_for_type(TypeKey::of::<T>()).is_empty()
    }

    /// A lazy handle that resolves `T` on every call.
    pub fn get_provider<T: ?Sized + Send + Sync + 'static>(&self) -> Provider<T> {
        Provider::from_object_provider(ObjectProvider::new(
            self.downgrade(),
            DependencyRequirement::new(ParamType::bean::<T>()),
            None,
        ))
    }

    /// Every component assignable to `T`, keyed by name, in registration order.
    pub fn components_of_type<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<(String, Arc<T>)>> {
        self.names_for_type(TypeKey::of::<T>(), true)
            .into_iter()
            .map(|name| {
                let instance = self.get_component(&name)?;
                let typed = self.typed::<T>(&name, &instance)?;
                Ok((name, typed))
            })
            .collect()
    }

    /// Whether `name` is known here or in an ancestor (descriptor or singleton).
    pub fn contains_component(&self, name: &str) -> bool {
        let canonical = self.canonical_name(strip_factory_prefix(name));
        self.inner.store.contains(&canonical)
            || self.inner.registry.contains(&canonical)
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(|p| p.contains_component(&canonical))
    }

    pub fn is_singleton(&self, name: &str) -> Result<bool> {
        let canonical = self.canonical_name(strip_factory_prefix(name));
        if self.inner.registry.contains(&canonical) && !self.inner.store.contains(&canonical) {
            return Ok(true);
        }
        Ok(self.merged_descriptor(&canonical)?.is_singleton())
    }

    pub fn is_prototype(&self, name: &str) -> Result<bool> {
        let canonical = self.canonical_name(strip_factory_prefix(name));
        if self.inner.registry.contains(&canonical) && !self.inner.store.contains(&canonical) {
            return Ok(false);
        }
        Ok(self.merged_descriptor(&canonical)?.is_prototype())
    }

    // =========================================================================
    // Merged descriptors
    // =========================================================================

    /// Flattened descriptor for `name`, recomputed when stale.
    pub fn merged_descriptor(&self, name: &str) -> Result<Arc<MergedDescriptor>> {
        let name = self.canonical_name(name);
        if let Some(fresh) = self.cached_merged(&name) {
            return Ok(fresh);
        }
        if !self.inner.store.contains(&name) {
            return match &self.inner.parent {
                Some(parent) => parent.merged_descriptor(&name),
                None => Err(DiError::no_such_descriptor(name)),
            };
        }
        let _guard = self.inner.merge_lock.lock();
        let mut visiting = Vec::new();
        self.merge_named(&name, &mut visiting)
    }

    fn cached_merged(&self, name: &str) -> Option<Arc<MergedDescriptor>> {
        self.inner
            .merged
            .get(name)
            .map(|m| Arc::clone(m.value()))
            .filter(|m| !m.is_stale())
    }

    fn merge_named(&self, name: &str, visiting: &mut Vec<String>) -> Result<Arc<MergedDescriptor>> {
        if let Some(fresh) = self.cached_merged(name) {
            return Ok(fresh);
        }
        let raw = self
            .inner
            .store
            .get(name)
            .ok_or_else(|| DiError::no_such_descriptor(name))?;
        if visiting.iter().any(|v| v == name) {
            visiting.push(name.to_string());
            return Err(DiError::invalid(
                name,
                format!("cyclic parent chain: {}", visiting.join(" -> ")),
            ));
        }
        visiting.push(name.to_string());

        let parent = match raw.parent_name() {
            None => None,
            Some(parent_name) => {
                let parent_name = self.canonical_name(parent_name);
                if parent_name != name && self.inner.store.contains(&parent_name) {
                    Some(self.merge_named(&parent_name, visiting)?)
                } else {
                    let Some(ancestor) = &self.inner.parent else {
                        return Err(DiError::invalid(
                            name,
                            format!("parent descriptor '{parent_name}' is not registered"),
                        ));
                    };
                    Some(ancestor.merged_descriptor(&parent_name).map_err(|err| match err {
                        DiError::NoSuchDescriptor { .. } => DiError::invalid(
                            name,
                            format!("parent descriptor '{parent_name}' is not registered in any ancestor"),
                        ),
                        other => other,
                    })?)
                }
            }
        };
        visiting.pop();

        let merged = Arc::new(merge(name, &raw, parent.as_deref().map(|p| p.descriptor()), None));

        #[cfg(feature = "logging")]
        trace!(target: "component_factory", component = name, "Merged component descriptor");

        self.inner.merged.insert(name.to_string(), Arc::clone(&merged));
        Ok(merged)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Destroy every singleton, dependents before their dependencies.
    pub fn destroy_singletons(&self) {
        self.inner.registry.destroy_singletons();
        self.inner.already_created.clear();
    }

    pub fn destroy_singleton(&self, name: &str) {
        let name = self.canonical_name(name);
        self.inner.registry.destroy_singleton(&name);
    }

    #[inline]
    pub fn singleton_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Singleton names in registration order.
    pub fn singleton_names(&self) -> Vec<String> {
        self.inner.registry.names()
    }

    #[inline]
    pub fn contains_singleton(&self, name: &str) -> bool {
        self.inner.registry.contains(&self.canonical_name(name))
    }

    /// Components that were injected with `name`.
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.inner.registry.dependents_of(&self.canonical_name(name))
    }

    /// Components `name` was injected with.
    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        self.inner.registry.dependencies_of(&self.canonical_name(name))
    }

    /// Reject further registrations.
    #[inline]
    pub fn lock(&self) {
        self.inner.locked.store(true, Ordering::Release);

        #[cfg(feature = "logging")]
        debug!(
            target: "component_factory",
            depth = self.inner.depth,
            descriptors = self.inner.store.len(),
            "Container locked - no further registrations allowed"
        );
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.inner.locked.load(Ordering::Acquire)
    }

    #[inline]
    fn check_not_locked(&self) -> Result<()> {
        if self.is_locked() {
            return Err(DiError::Locked);
        }
        Ok(())
    }

    /// Declare the configuration final; by-type lookups are cached from now on.
    pub fn freeze_configuration(&self) {
        self.inner.frozen.store(true, Ordering::Release);
        self.inner.names_by_type.clear();
    }

    #[inline]
    pub fn is_configuration_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::Acquire)
    }

    /// Mark merged descriptors stale for every name not yet requested.
    pub fn clear_metadata_cache(&self) {
        for entry in self.inner.merged.iter() {
            if !self.inner.already_created.contains_key(entry.key()) {
                entry.value().mark_stale();
            }
        }
        self.inner.names_by_type.clear();
    }

    pub fn set_allow_circular_references(&self, allow: bool) {
        self.inner.allow_circular.store(allow, Ordering::Release);
    }

    #[inline]
    pub fn allows_circular_references(&self) -> bool {
        self.inner.allow_circular.load(Ordering::Acquire)
    }

    pub fn set_allow_definition_overriding(&self, allow: bool) {
        self.inner.allow_overriding.store(allow, Ordering::Release);
    }

    #[inline]
    pub fn allows_definition_overriding(&self) -> bool {
        self.inner.allow_overriding.load(Ordering::Acquire)
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("descriptors", &self.inner.store.len())
            .field("singletons", &self.inner.registry.len())
            .field("hooks", &self.inner.hooks.len())
            .field("depth", &self.inner.depth)
            .field("has_parent", &self.inner.parent.is_some())
            .field("locked", &self.is_locked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::Flow;
    use crate::scope::{MapScope, ScopeKind};
    use std::sync::atomic::AtomicU64;

    struct Database {
        url: String,
    }

    fn database_at(url: &str) -> ComponentDescriptor {
        ComponentDescriptor::new(
            ComponentClass::builder::<Database>()
                .constructor(|url: String| Database { url })
                .build(),
        )
        .with_arg(url)
    }

    fn database() -> ComponentDescriptor {
        database_at("postgres://localhost")
    }

    #[test]
    fn test_singleton() {
        let container = Container::new();
        container.register_descriptor("db", database()).unwrap();

        let a = container.get_named::<Database>("db").unwrap();
        let b = container.get_named::<Database>("db").unwrap();
        assert_eq!(a.url, "postgres://localhost");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(container.singleton_count(), 1);
    }

    #[test]
    fn test_prototype() {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        struct RequestId(u64);

        let container = Container::new();
        container
            .register_descriptor(
                "id",
                ComponentDescriptor::new(
                    ComponentClass::builder::<RequestId>()
                        .constructor(|| RequestId(COUNTER.fetch_add(1, Ordering::SeqCst)))
                        .build(),
                )
                .prototype(),
            )
            .unwrap();

        let a = container.get_named::<RequestId>("id").unwrap();
        let b = container.get_named::<RequestId>("id").unwrap();
        assert_ne!(a.0, b.0);
        assert_eq!(container.singleton_count(), 0);
    }

    #[test]
    fn test_by_type() {
        let container = Container::new();
        container.register_descriptor("db", database()).unwrap();
        assert!(container.contains::<Database>());
        assert_eq!(container.get::<Database>().unwrap().url, "postgres://localhost");
        assert!(container.try_get::<String>().is_none());
    }

    #[test]
    fn test_not_found() {
        let container = Container::new();
        assert!(matches!(
            container.get_component("missing"),
            Err(DiError::NoSuchDescriptor { .. })
        ));
    }

    #[test]
    fn test_lock() {
        let container = Container::new();
        assert!(!container.is_locked());
        container.lock();
        assert!(container.is_locked());
        assert!(matches!(
            container.register_descriptor("db", database()),
            Err(DiError::Locked)
        ));
    }

    #[test]
    fn test_child_inheritance_and_shadowing() {
        let root = Container::new();
        root.register_descriptor("db", database()).unwrap();

        let child = root.child();
        assert_eq!(child.depth(), 1);
        let from_root = child.get_named::<Database>("db").unwrap();
        assert!(Arc::ptr_eq(&from_root, &root.get_named::<Database>("db").unwrap()));

        child
            .register_descriptor("db", database_at("sqlite://memory"))
            .unwrap();
        assert_eq!(child.get_named::<Database>("db").unwrap().url, "sqlite://memory");
        assert_eq!(root.get_named::<Database>("db").unwrap().url, "postgres://localhost");
    }

    #[test]
    fn test_overriding_disabled() {
        let container = Container::with_config(ContainerConfig::default().with_definition_overriding(false));
        container.register_descriptor("db", database()).unwrap();
        assert!(matches!(
            container.register_descriptor("db", database()),
            Err(DiError::AlreadyRegistered { .. })
        ));
    }

    #[test]
    fn test_manual_singleton() {
        let container = Container::new();
        container
            .register_singleton("db", Database { url: "manual".into() })
            .unwrap();
        assert_eq!(container.get_named::<Database>("db").unwrap().url, "manual");
        assert!(matches!(
            container.register_singleton("db", Database { url: "again".into() }),
            Err(DiError::AlreadyRegistered { .. })
        ));
    }

    #[test]
    fn test_cyclic_parent_chain() {
        let container = Container::new();
        container
            .register_descriptor("a", ComponentDescriptor::child_of("b"))
            .unwrap();
        container
            .register_descriptor("b", ComponentDescriptor::child_of("a"))
            .unwrap();
        assert!(matches!(
            container.merged_descriptor("a"),
            Err(DiError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn test_custom_scope() {
        let container = Container::new();
        let scope = Arc::new(MapScope::new());
        container.register_scope("request", scope.clone()).unwrap();
        container
            .register_descriptor("db", database().with_scope(ScopeKind::named("request")))
            .unwrap();

        let a = container.get_named::<Database>("db").unwrap();
        let b = container.get_named::<Database>("db").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(scope.contains("db"));
        assert_eq!(container.singleton_count(), 0);

        assert!(container.register_scope("singleton", Arc::new(MapScope::new())).is_err());
    }

    #[test]
    fn test_unknown_scope() {
        let container = Container::new();
        container
            .register_descriptor("db", database().with_scope(ScopeKind::named("session")))
            .unwrap();
        assert!(matches!(
            container.get_component("db"),
            Err(DiError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn test_hook_short_circuit() {
        struct Substitute;
        impl ComponentPostProcessor for Substitute {
            fn before_instantiation(
                &self,
                _class: Option<&Arc<ComponentClass>>,
                name: &str,
            ) -> std::result::Result<Flow<(), Instance>, crate::error::BoxError> {
                if name == "db" {
                    return Ok(Flow::ShortCircuit(Instance::new(Database { url: "substitute".into() })));
                }
                Ok(Flow::Continue(()))
            }
        }

        let container = Container::new();
        container.add_hook(Arc::new(Substitute));
        container.register_descriptor("db", database()).unwrap();
        assert_eq!(container.get_named::<Database>("db").unwrap().url, "substitute");
    }

    #[test]
    fn test_debug() {
        let container = Container::new();
        let rendered = format!("{container:?}");
        assert!(rendered.contains("Container"));
        assert!(rendered.contains("depth"));
    }
}
