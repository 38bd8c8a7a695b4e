//! Component lifecycle
//!
//! Everything between "somebody asked for `name`" and "here is the finished
//! instance": scope dispatch, before-instantiation hooks, instantiation,
//! early reference exposure for circular references, property population,
//! initialization, cycle reconciliation, destruction registration and
//! factory-bean product handling.

use crate::class::{ComponentClass, INIT_CALLBACK};
use crate::container::Container;
use crate::context::CreationContext;
use crate::descriptor::{AutowireMode, InnerComponent, ValueSpec};
use crate::disposal::DisposableAdapter;
use crate::error::{DiError, Phase, Result};
use crate::factory::{FACTORY_PREFIX, FactoryBean, is_factory_dereference, strip_factory_prefix};
use crate::hooks::{ComponentPostProcessor, Flow};
use crate::merge::{MergedDescriptor, merge};
use crate::provider::Instance;
use crate::resolver::DependencyRequirement;
use crate::scope::{CustomScope, ScopeKind};
use crate::value::Value;
use std::sync::Arc;
use std::sync::atomic::Ordering;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

type Hooks = [Arc<dyn ComponentPostProcessor>];

impl Container {
    pub(crate) fn do_get(&self, name: &str, ctx: &mut CreationContext) -> Result<Instance> {
        self.do_get_with_args(name, None, ctx)
    }

    /// Return the instance for `requested`, creating it per its scope.
    ///
    /// Explicit `args` bypass the shared instance and the resolution cache.
    pub(crate) fn do_get_with_args(
        &self,
        requested: &str,
        args: Option<&[Value]>,
        ctx: &mut CreationContext,
    ) -> Result<Instance> {
        let dereference = is_factory_dereference(requested);
        let name = self.canonical_name(strip_factory_prefix(requested));

        if args.is_none() {
            let shared = if ctx.is_creating_singleton(&name) {
                self.inner
                    .registry
                    .get_singleton(&name, self.inner.allow_circular.load(Ordering::Acquire))?
            } else {
                self.inner.registry.get(&name)
            };
            if let Some(shared) = shared {
                #[cfg(feature = "logging")]
                trace!(target: "component_factory", component = %name, "Returning shared instance");

                let merged = self.find_merged(&name);
                return self.object_for_instance(shared, dereference, &name, merged.as_deref());
            }
        }

        if ctx.is_creating_prototype(&name) {
            return Err(DiError::CircularPrototypeReference {
                chain: ctx.chain_with(&name),
                name,
            });
        }

        if !self.inner.store.contains(&name) {
            return match &self.inner.parent {
                Some(parent) => {
                    let forwarded = if dereference {
                        format!("{FACTORY_PREFIX}{name}")
                    } else {
                        name
                    };
                    parent.do_get_with_args(&forwarded, args, ctx)
                }
                None => Err(DiError::no_such_descriptor(name)),
            };
        }

        self.inner.already_created.insert(name.clone(), ());
        let merged = self.merged_descriptor(&name)?;
        if merged.is_abstract() {
            return Err(DiError::invalid(&name, "descriptor is abstract and cannot be instantiated"));
        }

        for dependency in merged.depends_on_names() {
            let dependency = self.canonical_name(dependency);
            if self.inner.registry.is_dependent(&name, &dependency) {
                return Err(DiError::invalid(
                    &name,
                    format!("circular depends-on relationship with '{dependency}'"),
                ));
            }
            self.inner.registry.register_dependent(&dependency, &name);
            self.do_get(&dependency, ctx).map_err(|err| match err {
                DiError::NoSuchDescriptor { .. } => {
                    DiError::invalid(&name, format!("depends on missing component '{dependency}'"))
                }
                other => other,
            })?;
        }

        let instance = match merged.scope_kind() {
            ScopeKind::Singleton => self.inner.registry.get_or_create(&name, ctx, |ctx| {
                self.create_component(&name, &merged, args, ctx).map_err(|err| {
                    self.inner.registry.destroy_singleton(&name);
                    err
                })
            })?,
            ScopeKind::Prototype => {
                ctx.enter_prototype(&name)?;
                let created = self.create_component(&name, &merged, args, ctx);
                ctx.exit_prototype(&name);
                created?
            }
            ScopeKind::Custom(scope_name) => {
                let scope = self.custom_scope(&name, scope_name)?;
                let mut creator = || {
                    ctx.enter_prototype(&name)?;
                    let created = self.create_component(&name, &merged, args, ctx);
                    ctx.exit_prototype(&name);
                    created
                };
                scope.get(&name, &mut creator)?
            }
        };

        self.object_for_instance(instance, dereference, &name, Some(&merged))
    }

    pub(crate) fn custom_scope(&self, name: &str, scope_name: &str) -> Result<Arc<dyn CustomScope>> {
        self.inner
            .scopes
            .get(scope_name)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| DiError::invalid(name, format!("no scope registered for scope name '{scope_name}'")))
    }

    // -------------------------------------------------------------------------
    // Factory beans
    // -------------------------------------------------------------------------

    /// The factory itself for `&name`, its product otherwise.
    fn object_for_instance(
        &self,
        instance: Instance,
        dereference: bool,
        name: &str,
        merged: Option<&MergedDescriptor>,
    ) -> Result<Instance> {
        if dereference {
            if instance.is_null() || self.factory_of(&instance).is_some() {
                return Ok(instance);
            }
            return Err(DiError::type_mismatch(
                format!("{FACTORY_PREFIX}{name}"),
                "FactoryBean",
                instance.type_name(),
            ));
        }

        let Some(factory) = self.factory_of(&instance) else {
            return Ok(instance);
        };
        let synthetic = merged.is_some_and(|m| m.is_synthetic());

        if !(factory.is_singleton() && self.inner.registry.contains(name)) {
            let product = produce(factory.as_ref(), name)?;
            return if synthetic {
                Ok(product)
            } else {
                self.apply_after_initialization(&self.inner.hooks.snapshot(), product, name)
            };
        }

        if let Some(product) = self.inner.registry.product(name) {
            return Ok(product);
        }
        let _guard = self.inner.registry.creation_lock();
        if let Some(product) = self.inner.registry.product(name) {
            return Ok(product);
        }
        let product = produce(factory.as_ref(), name)?;
        if synthetic {
            return Ok(self.inner.registry.put_product(name, product));
        }
        if self.inner.registry.is_currently_in_creation(name) {
            // not post-processed or cached while its factory is still being built
            return Ok(product);
        }
        let product = self.apply_after_initialization(&self.inner.hooks.snapshot(), product, name)?;
        Ok(self.inner.registry.put_product(name, product))
    }

    // -------------------------------------------------------------------------
    // Creation
    // -------------------------------------------------------------------------

    /// Run the full creation lifecycle for one instance of `name`.
    pub(crate) fn create_component(
        &self,
        name: &str,
        merged: &MergedDescriptor,
        args: Option<&[Value]>,
        ctx: &mut CreationContext,
    ) -> Result<Instance> {
        #[cfg(feature = "logging")]
        debug!(
            target: "component_factory",
            component = name,
            scope = %merged.scope_kind(),
            depth = ctx.depth(),
            "Creating instance of component"
        );

        let hooks = self.inner.hooks.snapshot();

        if !merged.is_synthetic() && !hooks.is_empty() {
            let class = self.predicted_class(merged);
            for hook in hooks.iter() {
                let flow = hook
                    .before_instantiation(class.as_ref(), name)
                    .map_err(|e| DiError::creation_failed(name, Phase::BeforeInstantiation, e))?;
                if let Flow::ShortCircuit(substitute) = flow {
                    #[cfg(feature = "logging")]
                    debug!(
                        target: "component_factory",
                        component = name,
                        "Instantiation short-circuited by hook"
                    );
                    return self.apply_after_initialization(&hooks, substitute, name);
                }
            }
        }

        self.do_create(name, merged, args, &hooks, ctx)
    }

    fn do_create(
        &self,
        name: &str,
        merged: &MergedDescriptor,
        args: Option<&[Value]>,
        hooks: &crate::hooks::HookList,
        ctx: &mut CreationContext,
    ) -> Result<Instance> {
        let raw = self
            .create_instance(name, merged, args, hooks, ctx)
            .map_err(|e| e.in_phase(name, Phase::Instantiation))?;

        merged.post_processed.get_or_try_init(|| {
            for hook in hooks.iter() {
                hook.on_merged_descriptor(merged, name)
                    .map_err(|e| DiError::creation_failed(name, Phase::DescriptorProcessing, e))?;
            }
            Ok::<(), DiError>(())
        })?;

        let early_exposure = merged.is_singleton()
            && self.inner.allow_circular.load(Ordering::Acquire)
            && self.inner.registry.is_currently_in_creation(name);
        if early_exposure {
            #[cfg(feature = "logging")]
            trace!(target: "component_factory", component = name, "Eagerly caching component for circular references");

            let hooks = Arc::clone(hooks);
            let early_name = name.to_string();
            let early_raw = raw.clone();
            self.inner.registry.add_singleton_factory(
                name,
                Box::new(move || {
                    let mut exposed = early_raw;
                    for hook in hooks.iter() {
                        exposed = hook
                            .early_reference(exposed, &early_name)
                            .map_err(|e| DiError::creation_failed(&early_name, Phase::Instantiation, e))?;
                    }
                    Ok(exposed)
                }),
            );
        }

        self.populate(name, merged, &raw, hooks, ctx)
            .map_err(|e| e.in_phase(name, Phase::PropertyPopulation))?;
        let mut exposed = self
            .initialize(name, merged, &raw, hooks)
            .map_err(|e| e.in_phase(name, Phase::Initialization))?;

        if early_exposure {
            if let Some(early) = self.inner.registry.early_reference(name) {
                if exposed.ptr_eq(&raw) {
                    exposed = early;
                } else if !self.inner.config.allow_raw_injection_despite_wrapping {
                    let dependents: Vec<String> = self
                        .inner
                        .registry
                        .dependents_of(name)
                        .into_iter()
                        .filter(|d| self.inner.already_created.contains_key(d))
                        .collect();
                    if !dependents.is_empty() {
                        return Err(DiError::RawReferenceEscaped {
                            name: name.to_string(),
                            dependents,
                        });
                    }
                }
            }
        }

        self.register_disposable_if_necessary(name, merged, &raw, &exposed, hooks)?;
        Ok(exposed)
    }

    /// Supplier, then factory method, then cached constructor, then a freshly selected one.
    fn create_instance(
        &self,
        name: &str,
        merged: &MergedDescriptor,
        args: Option<&[Value]>,
        hooks: &Hooks,
        ctx: &mut CreationContext,
    ) -> Result<Instance> {
        if let Some(supplier) = merged.instance_supplier() {
            return supplier().map_err(|e| DiError::creation_failed(name, Phase::Instantiation, e));
        }

        if merged.factory_method_name().is_some() {
            return self.instantiate_using_factory_method(name, merged, args, ctx);
        }

        if args.is_none() {
            let (resolved, autowire) = {
                let cache = merged.cache.lock();
                (cache.executable.is_some(), cache.arguments_resolved)
            };
            if resolved {
                return if autowire {
                    self.autowire_constructor(name, merged, None, None, ctx)
                } else {
                    self.instantiate_default(name, merged)
                };
            }
        }

        let class = merged
            .class()
            .cloned()
            .ok_or_else(|| DiError::invalid(name, "no component class, factory method or supplier"))?;

        let mut hook_candidates: Option<Vec<_>> = None;
        if !merged.is_synthetic() {
            for hook in hooks {
                let found = hook
                    .determine_constructors(&class, name)
                    .map_err(|e| DiError::creation_failed(name, Phase::Instantiation, e))?;
                if found.is_some() {
                    hook_candidates = found;
                    break;
                }
            }
        }

        if hook_candidates.is_some()
            || merged.autowire_mode() == AutowireMode::Constructor
            || merged.has_constructor_args()
            || args.is_some()
        {
            return self.autowire_constructor(name, merged, hook_candidates, args, ctx);
        }

        if let [only] = class.constructors() {
            return self.autowire_constructor(name, merged, Some(vec![Arc::clone(only)]), None, ctx);
        }

        self.instantiate_default(name, merged)
    }

    // -------------------------------------------------------------------------
    // Property population
    // -------------------------------------------------------------------------

    fn populate(
        &self,
        name: &str,
        merged: &MergedDescriptor,
        raw: &Instance,
        hooks: &Hooks,
        ctx: &mut CreationContext,
    ) -> Result<()> {
        if raw.is_null() {
            if merged.properties().is_empty() {
                return Ok(());
            }
            return Err(DiError::creation_message(
                name,
                Phase::PropertyPopulation,
                "cannot apply property values to the null component",
            ));
        }

        if !merged.is_synthetic() {
            for hook in hooks {
                let flow = hook
                    .after_instantiation(raw, name)
                    .map_err(|e| DiError::creation_failed(name, Phase::PropertyPopulation, e))?;
                if let Flow::ShortCircuit(()) = flow {
                    return Ok(());
                }
            }
        }

        let class = self.instance_class(raw, merged);
        let mut properties = merged.properties().clone();

        if let Some(class) = &class {
            match merged.autowire_mode() {
                AutowireMode::ByName => self.autowire_by_name(name, class, &mut properties, ctx)?,
                AutowireMode::ByType => self.autowire_by_type(name, class, &mut properties, ctx)?,
                AutowireMode::No | AutowireMode::Constructor => {}
            }
        }

        for hook in hooks {
            match hook
                .process_properties(properties, raw, name)
                .map_err(|e| DiError::creation_failed(name, Phase::PropertyPopulation, e))?
            {
                Flow::Continue(next) => properties = next,
                Flow::ShortCircuit(last) => {
                    properties = last;
                    break;
                }
            }
        }

        let Some(class) = class else {
            if properties.is_empty() {
                return Ok(());
            }
            return Err(DiError::invalid(name, "property values configured but the class is unknown"));
        };

        if let Some(missing) = class
            .setters()
            .iter()
            .find(|s| s.is_required() && !properties.contains(s.name()))
        {
            return Err(DiError::unsatisfied_reason(
                name,
                format!("property '{}'", missing.name()),
                missing.param_type().to_string(),
                "required property is not set",
            ));
        }

        for property in properties.iter() {
            let setter = class.setter(&property.name).ok_or_else(|| {
                DiError::invalid(
                    name,
                    format!("invalid property '{}': {} declares no such setter", property.name, class.name()),
                )
            })?;
            let point = format!("property '{}'", property.name);
            let expected = setter.param_type().to_string();
            let value = self
                .resolve_value_spec(name, &property.value, ctx)
                .and_then(|v| self.convert_value(name, v, setter.param_type()))
                .map_err(|e| DiError::unsatisfied(name, point, expected, e))?;
            setter
                .apply(raw, value)
                .map_err(|e| DiError::creation_failed(name, Phase::PropertyPopulation, e))?;
        }
        Ok(())
    }

    fn autowire_by_name(
        &self,
        name: &str,
        class: &ComponentClass,
        properties: &mut crate::descriptor::PropertyValues,
        ctx: &mut CreationContext,
    ) -> Result<()> {
        for setter in class.setters() {
            if setter.param_type().is_simple() || properties.contains(setter.name()) {
                continue;
            }
            if !self.contains_component(setter.name()) {
                #[cfg(feature = "logging")]
                trace!(
                    target: "component_factory",
                    component = name,
                    property = setter.name(),
                    "Not autowiring property by name: no matching component"
                );
                continue;
            }
            let instance = self.do_get(setter.name(), ctx)?;
            self.inner
                .registry
                .register_dependent(&self.canonical_name(setter.name()), name);
            properties.add(setter.name(), ValueSpec::Resolved(Value::Bean(instance)));
        }
        Ok(())
    }

    fn autowire_by_type(
        &self,
        name: &str,
        class: &ComponentClass,
        properties: &mut crate::descriptor::PropertyValues,
        ctx: &mut CreationContext,
    ) -> Result<()> {
        for setter in class.setters() {
            if setter.param_type().is_simple() || properties.contains(setter.name()) {
                continue;
            }
            let point = format!("property '{}'", setter.name());
            let requirement = DependencyRequirement::new(setter.param_type().clone())
                .optional()
                .at(point.clone());
            let value = self
                .resolve(&requirement, Some(name), ctx)
                .map_err(|e| DiError::unsatisfied(name, point, setter.param_type().to_string(), e))?;
            if !value.is_null() {
                properties.add(setter.name(), ValueSpec::Resolved(value));
            }
        }
        Ok(())
    }

    /// Resolve a configured value: references are fetched, inner components created.
    pub(crate) fn resolve_value_spec(&self, name: &str, spec: &ValueSpec, ctx: &mut CreationContext) -> Result<Value> {
        match spec {
            ValueSpec::Null => Ok(Value::Null),
            ValueSpec::Literal(literal) => Ok(Value::Literal(literal.clone())),
            ValueSpec::Resolved(value) => Ok(value.clone()),
            ValueSpec::Ref(target) => {
                let instance = self.do_get(target, ctx)?;
                self.inner
                    .registry
                    .register_dependent(&self.canonical_name(strip_factory_prefix(target)), name);
                Ok(if instance.is_null() {
                    Value::Null
                } else {
                    Value::Bean(instance)
                })
            }
            ValueSpec::Inner(inner) => self.create_inner(name, inner, ctx),
            ValueSpec::List(items) => items
                .iter()
                .map(|item| self.resolve_value_spec(name, item, ctx))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            ValueSpec::Map(entries) => entries
                .iter()
                .map(|(key, item)| self.resolve_value_spec(name, item, ctx).map(|v| (key.clone(), v)))
                .collect::<Result<Vec<_>>>()
                .map(Value::Map),
        }
    }

    fn create_inner(&self, outer: &str, inner: &InnerComponent, ctx: &mut CreationContext) -> Result<Value> {
        let inner_name = match &inner.name {
            Some(n) => n.clone(),
            None => format!(
                "{outer}#inner{}",
                self.inner.inner_counter.fetch_add(1, Ordering::Relaxed)
            ),
        };
        let containing = self.find_merged(outer);
        let parent = match inner.descriptor.parent_name() {
            Some(parent) => Some(self.merged_descriptor(parent)?),
            None => None,
        };
        let merged = merge(
            &inner_name,
            &inner.descriptor,
            parent.as_deref().map(|p| p.descriptor()),
            containing.as_deref(),
        );

        let instance = self.create_component(&inner_name, &merged, None, ctx)?;
        // Edges of scoped or prototype outers are never torn down.
        if merged.is_singleton() && containing.as_ref().is_none_or(|c| c.is_singleton()) {
            self.inner.registry.register_contained(&inner_name, outer);
        }

        let instance = self.object_for_instance(instance, false, &inner_name, Some(&merged))?;
        Ok(if instance.is_null() {
            Value::Null
        } else {
            Value::Bean(instance)
        })
    }

    // -------------------------------------------------------------------------
    // Initialization
    // -------------------------------------------------------------------------

    fn initialize(&self, name: &str, merged: &MergedDescriptor, raw: &Instance, hooks: &Hooks) -> Result<Instance> {
        if raw.is_null() {
            return Ok(raw.clone());
        }
        let class = self.instance_class(raw, merged);
        if let Some(class) = &class {
            class.set_name(raw, name);
        }

        let mut current = raw.clone();
        if !merged.is_synthetic() {
            for hook in hooks {
                match hook
                    .before_initialization(current, name)
                    .map_err(|e| DiError::creation_failed(name, Phase::Initialization, e))?
                {
                    Flow::Continue(next) => current = next,
                    Flow::ShortCircuit(last) => {
                        current = last;
                        break;
                    }
                }
            }
        }

        if let Some(class) = &class {
            if let Some(callback) = class.init_callback() {
                callback(raw).map_err(|e| DiError::creation_failed(name, Phase::Initialization, e))?;
            }
        }
        if let Some(method) = merged.init_method_name() {
            let covered = method == INIT_CALLBACK && class.as_ref().is_some_and(|c| c.is_initializing());
            if !covered {
                let callback = class.as_ref().and_then(|c| c.method(method)).ok_or_else(|| {
                    DiError::invalid(name, format!("init method '{method}' is not declared on the component class"))
                })?;
                callback(raw).map_err(|e| DiError::creation_failed(name, Phase::Initialization, e))?;
            }
        }

        if merged.is_synthetic() {
            return Ok(current);
        }
        self.apply_after_initialization(hooks, current, name)
    }

    /// Post-init hooks; the chain stops at the first `ShortCircuit`.
    pub(crate) fn apply_after_initialization(&self, hooks: &Hooks, instance: Instance, name: &str) -> Result<Instance> {
        let mut current = instance;
        for hook in hooks {
            match hook
                .after_initialization(current, name)
                .map_err(|e| DiError::creation_failed(name, Phase::Initialization, e))?
            {
                Flow::Continue(next) => current = next,
                Flow::ShortCircuit(last) => return Ok(last),
            }
        }
        Ok(current)
    }

    /// Class the created object actually has; falls back to the declared one.
    fn instance_class(&self, raw: &Instance, merged: &MergedDescriptor) -> Option<Arc<ComponentClass>> {
        match merged.class() {
            Some(class) if class.key() == raw.type_key() => Some(Arc::clone(class)),
            _ => self
                .inner
                .classes
                .get(raw.type_key())
                .or_else(|| merged.class().filter(|_| merged.factory_method_name().is_none()).cloned()),
        }
    }

    // -------------------------------------------------------------------------
    // Destruction
    // -------------------------------------------------------------------------

    fn register_disposable_if_necessary(
        &self,
        name: &str,
        merged: &MergedDescriptor,
        raw: &Instance,
        exposed: &Instance,
        hooks: &Hooks,
    ) -> Result<()> {
        if merged.is_prototype() || raw.is_null() {
            return Ok(());
        }
        let class = self.instance_class(raw, merged);
        let Some(adapter) = DisposableAdapter::for_component(name, raw, exposed, class.as_ref(), merged, hooks)? else {
            return Ok(());
        };
        match merged.scope_kind() {
            ScopeKind::Custom(scope_name) => {
                let scope = self.custom_scope(name, scope_name)?;
                scope.register_destruction_callback(name, adapter.into_callback());
            }
            _ => self.inner.registry.register_disposable(adapter),
        }
        Ok(())
    }

    /// Run the destruction callbacks of a prototype (or otherwise unmanaged) instance.
    pub fn destroy_component(&self, name: &str, instance: &Instance) -> Result<()> {
        let merged = self.merged_descriptor(name)?;
        let hooks = self.inner.hooks.snapshot();
        let class = self.instance_class(instance, &merged);
        match DisposableAdapter::for_component(name, instance, instance, class.as_ref(), &merged, &hooks)? {
            Some(adapter) => adapter.destroy(),
            None => Ok(()),
        }
    }

    // -------------------------------------------------------------------------
    // Eager initialization
    // -------------------------------------------------------------------------

    /// Create every non-abstract, non-lazy singleton, in registration order.
    ///
    /// Products of factory components are only created when the factory asks
    /// for eager initialization. Afterwards every singleton whose class is
    /// smart-initializing gets its callback.
    pub fn pre_instantiate_singletons(&self) -> Result<()> {
        let names = self.inner.store.names();

        #[cfg(feature = "logging")]
        debug!(
            target: "component_factory",
            count = names.len(),
            depth = self.depth(),
            "Pre-instantiating singletons"
        );

        for name in &names {
            let merged = self.merged_descriptor(name)?;
            if merged.is_abstract() || !merged.is_singleton() || merged.is_lazy_init() {
                continue;
            }
            if merged.capabilities().factory_bean {
                let factory = self.get_component(&format!("{FACTORY_PREFIX}{name}"))?;
                if self.factory_of(&factory).is_some_and(|f| f.is_eager_init()) {
                    self.get_component(name)?;
                }
            } else {
                self.get_component(name)?;
            }
        }

        for name in &names {
            if let Some(instance) = self.inner.registry.get(name) {
                if let Some(class) = self.inner.classes.get(instance.type_key()) {
                    if class.is_smart_initializing() {
                        class.after_singletons_instantiated(&instance);
                    }
                }
            }
        }
        Ok(())
    }
}

fn produce(factory: &dyn FactoryBean, name: &str) -> Result<Instance> {
    match factory.get_object() {
        Ok(Some(product)) => Ok(product),
        Ok(None) => Ok(Instance::null()),
        Err(e) => Err(DiError::creation_failed(name, Phase::FactoryProduct, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{InitializingComponent, NameAware};
    use crate::descriptor::ComponentDescriptor;
    use crate::error::BoxError;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Tracked {
        name: Mutex<Option<String>>,
        events: Mutex<Vec<&'static str>>,
        label: Mutex<String>,
    }

    impl NameAware for Tracked {
        fn set_component_name(&self, name: &str) {
            *self.name.lock() = Some(name.to_string());
        }
    }

    impl InitializingComponent for Tracked {
        fn after_properties_set(&self) -> std::result::Result<(), BoxError> {
            self.events.lock().push("after_properties_set");
            Ok(())
        }
    }

    fn tracked_class() -> Arc<ComponentClass> {
        ComponentClass::builder::<Tracked>()
            .constructor(Tracked::default)
            .setter("label", |t: &Tracked, label: String| *t.label.lock() = label)
            .name_aware()
            .initializing()
            .method("start", |t: &Tracked| -> std::result::Result<(), BoxError> {
                t.events.lock().push("start");
                Ok(())
            })
            .build()
    }

    #[test]
    fn test_initialization_order() {
        let container = Container::new();
        container
            .register_descriptor(
                "tracked",
                ComponentDescriptor::new(tracked_class())
                    .with_property("label", "main")
                    .with_init_method("start"),
            )
            .unwrap();

        let tracked = container.get_named::<Tracked>("tracked").unwrap();
        assert_eq!(tracked.name.lock().as_deref(), Some("tracked"));
        assert_eq!(*tracked.label.lock(), "main");
        assert_eq!(*tracked.events.lock(), vec!["after_properties_set", "start"]);
    }

    #[test]
    fn test_init_method_named_like_callback_runs_once() {
        let container = Container::new();
        container
            .register_descriptor(
                "tracked",
                ComponentDescriptor::new(tracked_class()).with_init_method(INIT_CALLBACK),
            )
            .unwrap();
        let tracked = container.get_named::<Tracked>("tracked").unwrap();
        assert_eq!(*tracked.events.lock(), vec!["after_properties_set"]);
    }

    #[test]
    fn test_unknown_property() {
        let container = Container::new();
        container
            .register_descriptor(
                "tracked",
                ComponentDescriptor::new(tracked_class()).with_property("colour", "red"),
            )
            .unwrap();
        let err = container.get_component("tracked").unwrap_err();
        assert!(matches!(err.root_cause(), DiError::InvalidDescriptor { .. }));
    }

    #[test]
    fn test_abstract_descriptor() {
        let container = Container::new();
        container
            .register_descriptor("base", ComponentDescriptor::new(tracked_class()).as_abstract())
            .unwrap();
        assert!(matches!(
            container.get_component("base"),
            Err(DiError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn test_inner_component_reference() {
        struct Holder {
            tracked: Mutex<Option<Arc<Tracked>>>,
        }
        let holder = ComponentClass::builder::<Holder>()
            .constructor(|| Holder {
                tracked: Mutex::new(None),
            })
            .setter("tracked", |h: &Holder, t: Arc<Tracked>| *h.tracked.lock() = Some(t))
            .build();

        let container = Container::new();
        container
            .register_descriptor(
                "holder",
                ComponentDescriptor::new(holder).with_property(
                    "tracked",
                    ValueSpec::inner(ComponentDescriptor::new(tracked_class()).with_property("label", "inner")),
                ),
            )
            .unwrap();

        let holder = container.get_named::<Holder>("holder").unwrap();
        let inner = holder.tracked.lock().clone().unwrap();
        assert_eq!(*inner.label.lock(), "inner");
        assert!(inner.name.lock().as_deref().unwrap().starts_with("holder#inner"));
        assert_eq!(container.dependencies_of("holder").len(), 1);
    }

    #[test]
    fn test_prototype_inner_components_leave_no_edges() {
        struct Holder {
            tracked: Mutex<Option<Arc<Tracked>>>,
        }
        let holder = ComponentClass::builder::<Holder>()
            .constructor(|| Holder {
                tracked: Mutex::new(None),
            })
            .setter("tracked", |h: &Holder, t: Arc<Tracked>| *h.tracked.lock() = Some(t))
            .build();

        let container = Container::new();
        container
            .register_descriptor(
                "holder",
                ComponentDescriptor::new(holder)
                    .with_property("tracked", ValueSpec::inner(ComponentDescriptor::new(tracked_class())))
                    .prototype(),
            )
            .unwrap();

        for _ in 0..100 {
            let holder = container.get_named::<Holder>("holder").unwrap();
            assert!(holder.tracked.lock().is_some());
        }
        assert!(container.dependencies_of("holder").is_empty());
        assert_eq!(container.singleton_count(), 0);
    }
}
