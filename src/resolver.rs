//! Dependency resolution
//!
//! Turns a [`DependencyRequirement`] (a parameter or property waiting for a
//! value) into a [`Value`]: a single component picked among the candidates
//! of the requested type, a list or map of all of them, a lazy
//! [`ObjectProvider`], or nothing when the requirement is optional.

use crate::class::ComponentClass;
use crate::container::{Container, WeakContainer};
use crate::context::CreationContext;
use crate::error::{DiError, Result};
use crate::factory::{FACTORY_PREFIX, is_factory_dereference, strip_factory_prefix};
use crate::merge::MergedDescriptor;
use crate::provider::{Instance, TypeKey};
use crate::value::{Injected, ParamType, Value};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::Ordering;

#[cfg(feature = "logging")]
use tracing::trace;

/// A parameter or property that needs a value from the container.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyRequirement {
    param_type: ParamType,
    name_hint: Option<String>,
    qualifier: Option<String>,
    required: bool,
    eager: bool,
    injection_point: Option<String>,
}

impl DependencyRequirement {
    /// Requirement for a value of type `param_type`; required unless it is optional.
    pub fn new(param_type: ParamType) -> Self {
        let required = !matches!(param_type, ParamType::Optional(_));
        Self {
            param_type,
            name_hint: None,
            qualifier: None,
            required,
            eager: true,
            injection_point: None,
        }
    }

    /// Requirement for whatever Rust type `X` the value will be extracted as.
    pub fn of<X: Injected>() -> Self {
        Self::new(X::param_type())
    }

    /// Parameter or property name, used to pick among several candidates.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name_hint = Some(name.into());
        self
    }

    /// Only candidates carrying this qualifier, or named or aliased by it, match.
    pub fn qualified(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Do not instantiate factory components just to learn their product type.
    pub fn lazy(mut self) -> Self {
        self.eager = false;
        self
    }

    /// Human-readable location used in error messages.
    pub fn at(mut self, injection_point: impl Into<String>) -> Self {
        self.injection_point = Some(injection_point.into());
        self
    }

    pub fn param_type(&self) -> &ParamType {
        &self.param_type
    }

    pub fn name_hint(&self) -> Option<&str> {
        self.name_hint.as_deref()
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    #[inline]
    pub fn is_required(&self) -> bool {
        self.required
    }

    #[inline]
    pub fn is_eager(&self) -> bool {
        self.eager
    }

    #[inline]
    pub fn nesting_level(&self) -> usize {
        self.param_type.nesting_level()
    }

    pub fn injection_point(&self) -> String {
        match &self.injection_point {
            Some(point) => point.clone(),
            None => format!("dependency of type '{}'", self.param_type),
        }
    }

    fn with_type(&self, param_type: ParamType) -> Self {
        Self {
            param_type,
            ..self.clone()
        }
    }
}

/// Lazy handle that resolves its requirement on every call.
///
/// Holds the container weakly; calls after the container is dropped fail
/// with [`DiError::ContainerDropped`].
#[derive(Clone)]
pub struct ObjectProvider {
    container: WeakContainer,
    requirement: DependencyRequirement,
    requesting: Option<String>,
}

impl ObjectProvider {
    pub(crate) fn new(container: WeakContainer, requirement: DependencyRequirement, requesting: Option<&str>) -> Self {
        Self {
            container,
            requirement,
            requesting: requesting.map(String::from),
        }
    }

    pub fn requirement(&self) -> &DependencyRequirement {
        &self.requirement
    }

    fn container(&self) -> Result<Container> {
        self.container.upgrade().ok_or(DiError::ContainerDropped)
    }

    fn resolve(&self, requirement: &DependencyRequirement) -> Result<Value> {
        self.container()?
            .resolve_dependency(requirement, self.requesting.as_deref())
    }

    fn expect_instance(&self, value: Value) -> Result<Option<Instance>> {
        match value {
            Value::Null => Ok(None),
            Value::Bean(instance) => Ok(Some(instance)),
            other => Err(DiError::conversion(self.requirement.param_type.to_string(), other.describe())),
        }
    }

    /// Resolve now; fails if nothing or more than one candidate matches.
    pub fn get(&self) -> Result<Instance> {
        let mut requirement = self.requirement.clone();
        requirement.required = true;
        let value = self.resolve(&requirement)?;
        self.expect_instance(value)?
            .ok_or_else(|| DiError::no_such_candidate(self.requirement.param_type.to_string(), None))
    }

    /// `None` when nothing matches; still fails when several match.
    pub fn get_if_available(&self) -> Result<Option<Instance>> {
        match self.get() {
            Ok(instance) => Ok(Some(instance)),
            Err(DiError::NoSuchCandidate { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// `None` unless exactly one candidate can be chosen.
    pub fn get_if_unique(&self) -> Result<Option<Instance>> {
        match self.get() {
            Ok(instance) => Ok(Some(instance)),
            Err(DiError::NoSuchCandidate { .. }) | Err(DiError::NoUniqueCandidate { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Every candidate, in collection order.
    pub fn stream(&self) -> Result<Vec<Instance>> {
        let requirement = self
            .requirement
            .with_type(ParamType::List(Box::new(self.requirement.param_type.clone())));
        match self.resolve(&requirement)? {
            Value::List(items) => items
                .into_iter()
                .filter_map(|item| self.expect_instance(item).transpose())
                .collect(),
            other => Err(DiError::conversion("list", other.describe())),
        }
    }
}

impl fmt::Debug for ObjectProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectProvider")
            .field("type", &self.requirement.param_type.to_string())
            .field("requesting", &self.requesting)
            .finish()
    }
}

/// Typed [`ObjectProvider`], injectable as a constructor parameter or property.
///
/// # Examples
///
/// ```rust
/// use component_factory::{ComponentClass, ComponentDescriptor, Container, Provider};
/// use std::sync::Arc;
///
/// struct Clock;
/// struct Scheduler {
///     clock: Provider<Clock>,
/// }
///
/// let container = Container::new();
/// container
///     .register_descriptor(
///         "scheduler",
///         ComponentDescriptor::new(
///             ComponentClass::builder::<Scheduler>()
///                 .constructor(|clock: Provider<Clock>| Scheduler { clock })
///                 .build(),
///         ),
///     )
///     .unwrap();
///
/// // The clock does not exist yet; the provider looks it up when asked.
/// let scheduler = container.get_named::<Scheduler>("scheduler").unwrap();
/// container
///     .register_descriptor("clock", ComponentDescriptor::new(
///         ComponentClass::builder::<Clock>().constructor(|| Clock).build(),
///     ))
///     .unwrap();
/// let clock: Arc<Clock> = scheduler.clock.get().unwrap();
/// # let _ = clock;
/// ```
pub struct Provider<T: ?Sized> {
    inner: ObjectProvider,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Provider<T> {
    pub(crate) fn from_object_provider(inner: ObjectProvider) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    fn typed(instance: Instance) -> Result<Arc<T>> {
        let type_name = instance.type_name();
        instance
            .cast::<T>()
            .ok_or_else(|| DiError::conversion(std::any::type_name::<T>(), type_name))
    }

    pub fn get(&self) -> Result<Arc<T>> {
        self.inner.get().and_then(Self::typed)
    }

    pub fn get_if_available(&self) -> Result<Option<Arc<T>>> {
        self.inner.get_if_available()?.map(Self::typed).transpose()
    }

    pub fn get_if_unique(&self) -> Result<Option<Arc<T>>> {
        self.inner.get_if_unique()?.map(Self::typed).transpose()
    }

    pub fn stream(&self) -> Result<Vec<Arc<T>>> {
        self.inner.stream()?.into_iter().map(Self::typed).collect()
    }

    pub fn object_provider(&self) -> &ObjectProvider {
        &self.inner
    }
}

impl<T: ?Sized> Clone for Provider<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> fmt::Debug for Provider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl<T: ?Sized + Send + Sync + 'static> Injected for Provider<T> {
    fn param_type() -> ParamType {
        ParamType::Provider(Box::new(ParamType::bean::<T>()))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Provider(inner) => Ok(Self::from_object_provider(inner)),
            other => Err(DiError::conversion("provider", other.describe())),
        }
    }
}

// =============================================================================
// Resolution
// =============================================================================

#[derive(Debug, Clone)]
enum Candidate {
    Named(String),
    Resolvable(TypeKey, Instance),
}

impl Container {
    /// Resolve a dependency on behalf of the component named `requesting`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use component_factory::{Container, DependencyRequirement};
    /// use std::sync::Arc;
    ///
    /// struct Config;
    ///
    /// let container = Container::new();
    /// container.register_singleton("config", Config).unwrap();
    ///
    /// let value = container
    ///     .resolve_dependency(&DependencyRequirement::of::<Arc<Config>>(), None)
    ///     .unwrap();
    /// assert!(!value.is_null());
    /// ```
    pub fn resolve_dependency(&self, requirement: &DependencyRequirement, requesting: Option<&str>) -> Result<Value> {
        let mut ctx = CreationContext::new();
        self.resolve(requirement, requesting, &mut ctx)
    }

    pub(crate) fn resolve(
        &self,
        requirement: &DependencyRequirement,
        requesting: Option<&str>,
        ctx: &mut CreationContext,
    ) -> Result<Value> {
        #[cfg(feature = "logging")]
        trace!(
            target: "component_factory",
            requesting = ?requesting,
            param_type = %requirement.param_type,
            "Resolving dependency"
        );

        match &requirement.param_type {
            ParamType::Provider(inner) => Ok(Value::Provider(ObjectProvider::new(
                self.downgrade(),
                requirement.with_type((**inner).clone()),
                requesting,
            ))),
            ParamType::Optional(inner) => {
                let inner = requirement.with_type((**inner).clone()).optional();
                self.resolve(&inner, requesting, ctx)
            }
            ParamType::List(element) => self.resolve_multiple(element, false, requirement, requesting, ctx),
            ParamType::Map(element) => self.resolve_multiple(element, true, requirement, requesting, ctx),
            ParamType::Bean(key) => self.resolve_single(*key, requirement, requesting, ctx),
            simple => {
                if requirement.required {
                    Err(DiError::no_such_candidate(
                        simple.to_string(),
                        Some(&requirement.injection_point()),
                    ))
                } else {
                    Ok(Value::Null)
                }
            }
        }
    }

    fn resolve_single(
        &self,
        key: TypeKey,
        requirement: &DependencyRequirement,
        requesting: Option<&str>,
        ctx: &mut CreationContext,
    ) -> Result<Value> {
        let candidates = self.find_candidates(key, requirement, requesting, false);
        let chosen = match candidates.len() {
            0 => None,
            1 => candidates.into_iter().next(),
            _ => match self.determine_candidate(key, &candidates, requirement)? {
                Some(chosen) => Some(chosen),
                None if requirement.required => {
                    return Err(DiError::no_unique_candidate(
                        key.name(),
                        candidates.iter().map(candidate_label).collect(),
                    ));
                }
                None => return Ok(Value::Null),
            },
        };

        let Some(chosen) = chosen else {
            return if requirement.required {
                Err(DiError::no_such_candidate(key.name(), Some(&requirement.injection_point())))
            } else {
                Ok(Value::Null)
            };
        };

        match self.obtain(&chosen, key, requesting, ctx)? {
            Some(instance) => Ok(Value::Bean(instance)),
            None if requirement.required => Err(DiError::no_such_candidate(
                key.name(),
                Some(&requirement.injection_point()),
            )),
            None => Ok(Value::Null),
        }
    }

    fn resolve_multiple(
        &self,
        element: &ParamType,
        as_map: bool,
        requirement: &DependencyRequirement,
        requesting: Option<&str>,
        ctx: &mut CreationContext,
    ) -> Result<Value> {
        let ParamType::Bean(key) = element else {
            return Ok(if as_map { Value::Map(Vec::new()) } else { Value::List(Vec::new()) });
        };
        let key = *key;

        let mut entries: Vec<(String, Option<i32>, Instance)> = Vec::new();
        for candidate in self.find_candidates(key, requirement, requesting, true) {
            let label = candidate_label(&candidate);
            let order = match &candidate {
                Candidate::Named(name) => self
                    .find_merged(name)
                    .and_then(|m| m.order().or(m.priority())),
                Candidate::Resolvable(..) => None,
            };
            if let Some(instance) = self.obtain(&candidate, key, requesting, ctx)? {
                entries.push((label, order, instance));
            }
        }

        if as_map {
            return Ok(Value::Map(
                entries
                    .into_iter()
                    .map(|(name, _, instance)| (name, Value::Bean(instance)))
                    .collect(),
            ));
        }
        if self.inner.config.order_collections {
            // stable: unordered candidates keep registration order at the end
            entries.sort_by_key(|(_, order, _)| order.unwrap_or(i32::MAX));
        }
        Ok(Value::List(
            entries
                .into_iter()
                .map(|(_, _, instance)| Value::Bean(instance))
                .collect(),
        ))
    }

    /// Fetch a chosen candidate and expose it as `key`. `None` for the null component.
    fn obtain(
        &self,
        candidate: &Candidate,
        key: TypeKey,
        requesting: Option<&str>,
        ctx: &mut CreationContext,
    ) -> Result<Option<Instance>> {
        match candidate {
            Candidate::Named(name) => {
                let instance = self.do_get(name, ctx)?;
                if let Some(requesting) = requesting {
                    self.inner
                        .registry
                        .register_dependent(strip_factory_prefix(name), requesting);
                }
                if instance.is_null() {
                    return Ok(None);
                }
                self.adapt_named(name, &instance, key).map(Some)
            }
            Candidate::Resolvable(_, instance) => self.adapt_named(key.name(), instance, key).map(Some),
        }
    }

    /// Expose `instance` (obtained under `name`) as `key` through its class views.
    pub(crate) fn adapt_named(&self, name: &str, instance: &Instance, key: TypeKey) -> Result<Instance> {
        if instance.type_key() == key {
            return Ok(instance.clone());
        }
        let declared = self
            .find_merged(strip_factory_prefix(name))
            .and_then(|m| m.class().and_then(|c| c.cast_to(instance, key)));
        declared
            .or_else(|| self.inner.classes.adapt(instance, key))
            .ok_or_else(|| DiError::type_mismatch(name, key.name(), instance.type_name()))
    }

    fn find_candidates(
        &self,
        key: TypeKey,
        requirement: &DependencyRequirement,
        requesting: Option<&str>,
        multiple: bool,
    ) -> Vec<Candidate> {
        let mut found = Vec::new();
        let mut self_references = Vec::new();

        if requirement.qualifier.is_none() {
            for (declared, instance) in self.inner.resolvable.read().iter() {
                if self.inner.classes.distance(*declared, key).is_some() {
                    found.push(Candidate::Resolvable(*declared, instance.clone()));
                }
            }
        }

        for name in self.names_for_type(key, requirement.eager) {
            if !self.is_autowire_candidate(&name, requirement) {
                continue;
            }
            if self.is_self_reference(requesting, &name) {
                self_references.push(name);
            } else {
                found.push(Candidate::Named(name));
            }
        }

        if found.is_empty() {
            for name in self_references {
                if !multiple || Some(name.as_str()) != requesting {
                    found.push(Candidate::Named(name));
                }
            }
        }
        found
    }

    fn is_self_reference(&self, requesting: Option<&str>, candidate: &str) -> bool {
        let Some(requesting) = requesting else {
            return false;
        };
        let candidate = strip_factory_prefix(candidate);
        if candidate == requesting {
            return true;
        }
        self.find_merged(candidate)
            .and_then(|m| m.factory_component_name().map(|f| self.canonical_name(f) == requesting))
            .unwrap_or(false)
    }

    fn is_autowire_candidate(&self, name: &str, requirement: &DependencyRequirement) -> bool {
        let merged = self.find_merged(strip_factory_prefix(name));
        if merged.as_ref().is_some_and(|m| !m.is_autowire_candidate()) {
            return false;
        }
        match &requirement.qualifier {
            None => true,
            Some(qualifier) => {
                self.matches_name(name, qualifier)
                    || merged.is_some_and(|m| m.qualifiers().iter().any(|q| q == qualifier))
            }
        }
    }

    fn matches_name(&self, candidate: &str, hint: &str) -> bool {
        candidate == hint || self.aliases(strip_factory_prefix(candidate)).iter().any(|a| a == hint)
    }

    /// Pick one among several candidates: primary, then priority, then name, then a lone resolvable value.
    fn determine_candidate(
        &self,
        key: TypeKey,
        candidates: &[Candidate],
        requirement: &DependencyRequirement,
    ) -> Result<Option<Candidate>> {
        let named: Vec<&str> = candidates
            .iter()
            .filter_map(|c| match c {
                Candidate::Named(name) => Some(name.as_str()),
                Candidate::Resolvable(..) => None,
            })
            .collect();

        // primary: the nearest container level wins, two at one level is ambiguous
        let primaries: Vec<(usize, &str)> = named
            .iter()
            .filter_map(|name| {
                let (level, merged) = self.locate(name)?;
                merged.is_primary().then_some((level, *name))
            })
            .collect();
        if let Some(nearest) = primaries.iter().map(|(level, _)| *level).min() {
            let at_level: Vec<&str> = primaries
                .iter()
                .filter(|(level, _)| *level == nearest)
                .map(|(_, name)| *name)
                .collect();
            if at_level.len() > 1 {
                return Err(DiError::no_unique_candidate(
                    key.name(),
                    at_level.iter().map(|n| n.to_string()).collect(),
                ));
            }
            return Ok(Some(Candidate::Named(at_level[0].to_string())));
        }

        // priority: lowest value wins, ties are ambiguous
        let prioritized: Vec<(i32, &str)> = named
            .iter()
            .filter_map(|name| {
                self.find_merged(strip_factory_prefix(name))
                    .and_then(|m| m.priority())
                    .map(|p| (p, *name))
            })
            .collect();
        if let Some(highest) = prioritized.iter().map(|(p, _)| *p).min() {
            let top: Vec<&str> = prioritized
                .iter()
                .filter(|(p, _)| *p == highest)
                .map(|(_, name)| *name)
                .collect();
            if top.len() > 1 {
                return Err(DiError::no_unique_candidate(
                    key.name(),
                    top.iter().map(|n| n.to_string()).collect(),
                ));
            }
            return Ok(Some(Candidate::Named(top[0].to_string())));
        }

        for hint in [requirement.name_hint.as_deref(), requirement.qualifier.as_deref()]
            .into_iter()
            .flatten()
        {
            if let Some(name) = named.iter().find(|name| self.matches_name(name, hint)) {
                return Ok(Some(Candidate::Named(name.to_string())));
            }
        }

        let mut resolvable = candidates.iter().filter(|c| matches!(c, Candidate::Resolvable(..)));
        if let (Some(only), None) = (resolvable.next(), resolvable.next()) {
            return Ok(Some(only.clone()));
        }
        Ok(None)
    }

    // -------------------------------------------------------------------------
    // Type prediction
    // -------------------------------------------------------------------------

    /// Names of every component whose product is assignable to `key`,
    /// including ancestor containers.
    pub fn component_names_for_type(&self, key: TypeKey) -> Vec<String> {
        self.names_for_type(key, true)
    }

    pub(crate) fn names_for_type(&self, key: TypeKey, allow_eager: bool) -> Vec<String> {
        let frozen = self.inner.frozen.load(Ordering::Acquire);
        if frozen {
            if let Some(cached) = self.inner.names_by_type.get(&(key, allow_eager)) {
                return cached.value().as_ref().clone();
            }
        }

        let mut names = Vec::new();
        for name in self.inner.store.names() {
            if self.type_distance(&name, key, allow_eager).is_some() {
                names.push(name);
            } else {
                let factory = format!("{FACTORY_PREFIX}{name}");
                if self.type_distance(&factory, key, allow_eager).is_some() {
                    names.push(factory);
                }
            }
        }
        for name in self.inner.registry.names() {
            if !self.inner.store.contains(&name)
                && !names.contains(&name)
                && self.type_distance(&name, key, allow_eager).is_some()
            {
                names.push(name);
            }
        }
        if let Some(parent) = &self.inner.parent {
            for name in parent.names_for_type(key, allow_eager) {
                let local = strip_factory_prefix(&name);
                if !names.contains(&name) && !self.inner.store.contains(local) && !self.inner.registry.contains(local) {
                    names.push(name);
                }
            }
        }

        if frozen {
            self.inner.names_by_type.insert((key, allow_eager), Arc::new(names.clone()));
        }
        names
    }

    /// Whether `get_component(name)` would return something assignable to `key`.
    pub fn is_type_match(&self, name: &str, key: TypeKey) -> bool {
        self.type_distance(name, key, true).is_some()
    }

    /// Type `get_component(name)` would return, without creating it where possible.
    pub fn type_of(&self, name: &str) -> Option<TypeKey> {
        let deref = is_factory_dereference(name);
        let canonical = self.canonical_name(strip_factory_prefix(name));
        if let Some(instance) = self.inner.registry.get(&canonical) {
            if !deref {
                if let Some(factory) = self.factory_of(&instance) {
                    return factory.object_type();
                }
            }
            return Some(instance.type_key());
        }
        if !self.inner.store.contains(&canonical) {
            return self.inner.parent.as_ref().and_then(|p| p.type_of(name));
        }
        let merged = self.merged_descriptor(&canonical).ok()?;
        let class = self.predicted_class(&merged)?;
        if class.is_factory_bean() && !deref {
            return class.factory_product().map(|p| p.key());
        }
        Some(class.key())
    }

    /// Inheritance distance from what `name` produces to `key`, or `None`.
    pub(crate) fn type_distance(&self, name: &str, key: TypeKey, allow_eager: bool) -> Option<u32> {
        let deref = is_factory_dereference(name);
        let canonical = self.canonical_name(strip_factory_prefix(name));

        if let Some(instance) = self.inner.registry.get(&canonical) {
            let factory = self.factory_of(&instance);
            return match (factory, deref) {
                (Some(factory), false) => factory
                    .object_type()
                    .and_then(|t| self.inner.classes.distance(t, key)),
                (None, true) => None,
                _ => self.inner.classes.distance(instance.type_key(), key),
            };
        }

        if !self.inner.store.contains(&canonical) {
            return self
                .inner
                .parent
                .as_ref()
                .and_then(|p| p.type_distance(name, key, allow_eager));
        }

        let merged = self.merged_descriptor(&canonical).ok()?;
        if merged.is_abstract() {
            return None;
        }
        let class = self.predicted_class(&merged)?;
        if !class.is_factory_bean() {
            return if deref { None } else { class.distance_to(key) };
        }
        if deref {
            return class.distance_to(key);
        }
        if let Some(product) = class.factory_product() {
            return product.distance_to(key);
        }
        // probe the factory for its product type
        let eager = allow_eager && self.inner.config.allow_eager_init && !merged.is_lazy_init();
        if !eager || self.inner.registry.is_currently_in_creation(&canonical) {
            return None;
        }
        let factory = self.get_component(&format!("{FACTORY_PREFIX}{canonical}")).ok()?;
        self.factory_of(&factory)?
            .object_type()
            .and_then(|t| self.inner.classes.distance(t, key))
    }

    /// Class of the object the descriptor creates (the factory itself for factory components).
    pub(crate) fn predicted_class(&self, merged: &MergedDescriptor) -> Option<Arc<ComponentClass>> {
        if merged.factory_method_name().is_none() {
            return merged.class().cloned();
        }
        let key = (*merged
            .predicted_type
            .get_or_init(|| self.factory_method_type(merged)))?;
        Some(
            self.inner
                .classes
                .get(key)
                .unwrap_or_else(|| ComponentClass::for_key(key)),
        )
    }

    fn factory_method_type(&self, merged: &MergedDescriptor) -> Option<TypeKey> {
        let method = merged.factory_method_name()?;
        let owner = match merged.factory_component_name() {
            Some(factory) => {
                let factory = self.canonical_name(factory);
                if factory == merged.name() {
                    return None;
                }
                match self.inner.registry.get(&factory) {
                    Some(instance) => self.inner.classes.get(instance.type_key())?,
                    None => {
                        let factory_merged = self.find_merged(&factory)?;
                        self.predicted_class(&factory_merged)?
                    }
                }
            }
            None => merged.class()?.clone(),
        };
        let first = owner.factory_methods_named(method).next()?;
        Some(first.return_class().map_or(first.returns(), |c| c.key()))
    }

    /// The factory-bean view of a live instance, if its class declares one.
    pub(crate) fn factory_of(&self, instance: &Instance) -> Option<Arc<dyn crate::factory::FactoryBean>> {
        self.inner
            .classes
            .get(instance.type_key())
            .and_then(|class| class.as_factory(instance))
    }

    /// Merged descriptor for `name` here or in an ancestor.
    pub(crate) fn find_merged(&self, name: &str) -> Option<Arc<MergedDescriptor>> {
        self.locate(name).map(|(_, merged)| merged)
    }

    /// Merged descriptor and the container level (0 = this one) it lives at.
    fn locate(&self, name: &str) -> Option<(usize, Arc<MergedDescriptor>)> {
        let canonical = self.canonical_name(strip_factory_prefix(name));
        if self.inner.store.contains(&canonical) {
            return self.merged_descriptor(&canonical).ok().map(|m| (0, m));
        }
        if self.inner.registry.contains(&canonical) {
            return None;
        }
        self.inner
            .parent
            .as_ref()
            .and_then(|p| p.locate(&canonical))
            .map(|(level, merged)| (level + 1, merged))
    }
}

fn candidate_label(candidate: &Candidate) -> String {
    match candidate {
        Candidate::Named(name) => name.clone(),
        Candidate::Resolvable(declared, _) => declared.name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirement_defaults() {
        let req = DependencyRequirement::of::<Arc<String>>();
        assert!(req.is_required());
        assert!(req.is_eager());
        assert_eq!(req.nesting_level(), 0);
        assert!(req.injection_point().contains("String"));

        let optional = DependencyRequirement::of::<Option<Arc<String>>>();
        assert!(!optional.is_required());
        assert_eq!(optional.nesting_level(), 1);
    }

    #[test]
    fn test_requirement_builders() {
        let req = DependencyRequirement::of::<Arc<String>>()
            .named("greeting")
            .qualified("english")
            .lazy()
            .at("parameter 0 of new");
        assert_eq!(req.name_hint(), Some("greeting"));
        assert_eq!(req.qualifier(), Some("english"));
        assert!(!req.is_eager());
        assert_eq!(req.injection_point(), "parameter 0 of new");
    }

    #[test]
    fn test_provider_param_type() {
        assert_eq!(
            <Provider<String>>::param_type(),
            ParamType::Provider(Box::new(ParamType::bean::<String>()))
        );
    }

    #[test]
    fn test_provider_after_drop() {
        let container = Container::new();
        let provider = ObjectProvider::new(
            container.downgrade(),
            DependencyRequirement::of::<Arc<String>>(),
            None,
        );
        drop(container);
        assert!(matches!(provider.get(), Err(DiError::ContainerDropped)));
    }
}
