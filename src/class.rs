//! Declared component metadata
//!
//! A [`ComponentClass`] lists everything the container needs to know about a
//! type: the trait objects it can be viewed as, its constructors and factory
//! methods, its property setters, named methods and lifecycle capabilities.
//! Parameter types are inferred from closure signatures.
//!
//! # Example
//!
//! ```rust
//! use component_factory::ComponentClass;
//! use std::sync::Arc;
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! struct English {
//!     name: String,
//! }
//!
//! impl Greeter for English {
//!     fn greet(&self) -> String {
//!         format!("hello {}", self.name)
//!     }
//! }
//!
//! let class = ComponentClass::builder::<English>()
//!     .implements(|e| e as Arc<dyn Greeter>)
//!     .constructor(|name: String| English { name })
//!     .build();
//!
//! assert_eq!(class.constructors().len(), 1);
//! assert_eq!(class.constructors()[0].signature(), "new(String)");
//! ```

use crate::error::BoxError;
use crate::factory::FactoryBean;
use crate::provider::{Injectable, Instance, TypeKey};
use crate::value::{Args, Injected, ParamType, Value};
use ahash::RandomState;
use dashmap::DashMap;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Name of the interface init callback, skipped when also configured by name.
pub const INIT_CALLBACK: &str = "after_properties_set";
/// Name of the interface destroy callback, skipped when also configured by name.
pub const DESTROY_CALLBACK: &str = "destroy";

// =============================================================================
// Capability traits
// =============================================================================

/// Called after all properties are set.
pub trait InitializingComponent: Send + Sync {
    fn after_properties_set(&self) -> Result<(), BoxError>;
}

/// Called when the component is destroyed.
pub trait DisposableComponent: Send + Sync {
    fn destroy(&self) -> Result<(), BoxError>;
}

/// Receives the name the component is registered under.
pub trait NameAware: Send + Sync {
    fn set_component_name(&self, name: &str);
}

/// Called once every eager singleton has been created.
pub trait SmartInitializing: Send + Sync {
    fn after_singletons_instantiated(&self);
}

// =============================================================================
// Executables
// =============================================================================

/// Erased call into a constructor or factory method.
pub type InvokeFn =
    Arc<dyn Fn(Option<&Instance>, Args) -> Result<Option<Instance>, BoxError> + Send + Sync>;

/// Erased no-argument method on an instance.
pub type MethodCallback = Arc<dyn Fn(&Instance) -> Result<(), BoxError> + Send + Sync>;

type SetterFn = Arc<dyn Fn(&Instance, Value) -> Result<(), BoxError> + Send + Sync>;
type ViewFn = Arc<dyn Fn(&Instance) -> Option<Instance> + Send + Sync>;
type NameAwareFn = Arc<dyn Fn(&Instance, &str) + Send + Sync>;
type SmartInitFn = Arc<dyn Fn(&Instance) + Send + Sync>;
type FactoryCastFn = Arc<dyn Fn(&Instance) -> Option<Arc<dyn FactoryBean>> + Send + Sync>;

/// Access level. Lower sorts first during constructor selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Visibility {
    #[default]
    Public,
    Crate,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutableKind {
    Constructor,
    StaticFactory,
    InstanceFactory,
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub index: usize,
    pub name: Option<String>,
    pub param_type: ParamType,
}

/// A constructor or factory method.
#[derive(Clone)]
pub struct Executable {
    name: String,
    kind: ExecutableKind,
    visibility: Visibility,
    params: Vec<Parameter>,
    returns: TypeKey,
    return_class: Option<Arc<ComponentClass>>,
    invoke: InvokeFn,
}

fn parameters(types: Vec<ParamType>) -> Vec<Parameter> {
    types
        .into_iter()
        .enumerate()
        .map(|(index, param_type)| Parameter {
            index,
            name: None,
            param_type,
        })
        .collect()
}

impl Executable {
    /// A constructor from a closure returning `T`.
    pub fn constructor<T, M, F>(f: F) -> Self
    where
        T: Injectable,
        M: 'static,
        F: ConstructorFn<T, M>,
    {
        Self {
            name: "new".into(),
            kind: ExecutableKind::Constructor,
            visibility: Visibility::Public,
            params: parameters(F::param_types()),
            returns: TypeKey::of::<T>(),
            return_class: None,
            invoke: Arc::new(move |_: Option<&Instance>, mut args: Args| {
                f.call(&mut args).map(|v| Some(Instance::new(v)))
            }),
        }
    }

    /// A constructor from a closure returning `Result<T, E>`.
    pub fn try_constructor<T, M, F>(f: F) -> Self
    where
        T: Injectable,
        M: 'static,
        F: TryConstructorFn<T, M>,
    {
        Self {
            name: "new".into(),
            kind: ExecutableKind::Constructor,
            visibility: Visibility::Public,
            params: parameters(F::param_types()),
            returns: TypeKey::of::<T>(),
            return_class: None,
            invoke: Arc::new(move |_: Option<&Instance>, mut args: Args| {
                f.call(&mut args).map(|v| Some(Instance::new(v)))
            }),
        }
    }

    /// A static factory method producing `R`.
    pub fn static_factory<R, M, F>(name: impl Into<String>, f: F) -> Self
    where
        R: Injectable,
        M: 'static,
        F: ConstructorFn<R, M>,
    {
        Self {
            name: name.into(),
            kind: ExecutableKind::StaticFactory,
            visibility: Visibility::Public,
            params: parameters(F::param_types()),
            returns: TypeKey::of::<R>(),
            return_class: None,
            invoke: Arc::new(move |_: Option<&Instance>, mut args: Args| {
                f.call(&mut args).map(|v| Some(Instance::new(v)))
            }),
        }
    }

    /// A factory method invoked on an instance of `T`.
    pub fn instance_factory<T, R, M, F>(name: impl Into<String>, f: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        R: Injectable,
        M: 'static,
        F: MethodFn<T, R, M>,
    {
        let name = name.into();
        let method = name.clone();
        Self {
            name,
            kind: ExecutableKind::InstanceFactory,
            visibility: Visibility::Public,
            params: parameters(F::param_types()),
            returns: TypeKey::of::<R>(),
            return_class: None,
            invoke: Arc::new(move |target: Option<&Instance>, mut args: Args| -> Result<Option<Instance>, BoxError> {
                let target = target
                    .ok_or_else(|| format!("factory method '{method}' needs a target instance"))?;
                let target = target.cast::<T>().ok_or_else(|| {
                    format!(
                        "factory method '{method}' declared on {} invoked on {}",
                        std::any::type_name::<T>(),
                        target.type_name()
                    )
                })?;
                f.call(target, &mut args).map(|v| Some(Instance::new(v)))
            }),
        }
    }

    /// Fully erased executable; the invoker may return `None` for an absent product.
    pub fn raw(
        name: impl Into<String>,
        kind: ExecutableKind,
        params: Vec<ParamType>,
        returns: TypeKey,
        invoke: InvokeFn,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            visibility: Visibility::Public,
            params: parameters(params),
            returns,
            return_class: None,
            invoke,
        }
    }

    /// Parameter names, in order. Used as autowiring name hints.
    pub fn named<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for (param, name) in self.params.iter_mut().zip(names) {
            param.name = Some(name.into());
        }
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Class of the returned object, so its views are known before creation.
    pub fn returning(mut self, class: Arc<ComponentClass>) -> Self {
        self.return_class = Some(class);
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> ExecutableKind {
        self.kind
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.kind != ExecutableKind::InstanceFactory
    }

    #[inline]
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    #[inline]
    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    #[inline]
    pub fn parameter_count(&self) -> usize {
        self.params.len()
    }

    #[inline]
    pub fn returns(&self) -> TypeKey {
        self.returns
    }

    pub fn return_class(&self) -> Option<&Arc<ComponentClass>> {
        self.return_class.as_ref()
    }

    /// `name(Type, Type)`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.param_type.to_string()).collect();
        format!("{}({})", self.name, params.join(", "))
    }

    pub(crate) fn invoke(&self, target: Option<&Instance>, args: Vec<Value>) -> Result<Option<Instance>, BoxError> {
        (self.invoke)(target, Args::new(args))
    }

    /// Same parameter types in the same order.
    pub(crate) fn same_params(&self, other: &Executable) -> bool {
        self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| a.param_type == b.param_type)
    }
}

impl fmt::Debug for Executable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executable")
            .field("signature", &self.signature())
            .field("kind", &self.kind)
            .field("visibility", &self.visibility)
            .field("returns", &self.returns)
            .finish()
    }
}

// =============================================================================
// Closure adapters - parameter types inferred from the closure signature
// =============================================================================

/// Closure usable as a constructor or static factory for `T`.
///
/// Implemented for `Fn(A, B, ..) -> T` up to six parameters, where every
/// parameter is [`Injected`].
pub trait ConstructorFn<T, M>: Send + Sync + 'static {
    fn param_types() -> Vec<ParamType>;

    fn call(&self, args: &mut Args) -> Result<T, BoxError>;
}

/// Closure usable as a fallible constructor: `Fn(A, B, ..) -> Result<T, E>`.
pub trait TryConstructorFn<T, M>: Send + Sync + 'static {
    fn param_types() -> Vec<ParamType>;

    fn call(&self, args: &mut Args) -> Result<T, BoxError>;
}

/// Closure usable as an instance factory method: `Fn(Arc<F>, A, ..) -> R`.
pub trait MethodFn<F: ?Sized, R, M>: Send + Sync + 'static {
    fn param_types() -> Vec<ParamType>;

    fn call(&self, target: Arc<F>, args: &mut Args) -> Result<R, BoxError>;
}

macro_rules! impl_executable_fns {
    ($($A:ident => $i:tt),*) => {
        impl<T, Func, $($A,)*> ConstructorFn<T, ($($A,)*)> for Func
        where
            Func: Fn($($A),*) -> T + Send + Sync + 'static,
            $($A: Injected,)*
        {
            fn param_types() -> Vec<ParamType> {
                vec![$($A::param_type()),*]
            }

            #[allow(unused_variables)]
            fn call(&self, args: &mut Args) -> Result<T, BoxError> {
                Ok(self($(args.take::<$A>($i)?),*))
            }
        }

        impl<T, E, Func, $($A,)*> TryConstructorFn<T, ($($A,)*)> for Func
        where
            Func: Fn($($A),*) -> Result<T, E> + Send + Sync + 'static,
            E: Into<BoxError>,
            $($A: Injected,)*
        {
            fn param_types() -> Vec<ParamType> {
                vec![$($A::param_type()),*]
            }

            #[allow(unused_variables)]
            fn call(&self, args: &mut Args) -> Result<T, BoxError> {
                self($(args.take::<$A>($i)?),*).map_err(Into::into)
            }
        }

        impl<F, R, Func, $($A,)*> MethodFn<F, R, ($($A,)*)> for Func
        where
            F: ?Sized,
            Func: Fn(Arc<F>, $($A),*) -> R + Send + Sync + 'static,
            $($A: Injected,)*
        {
            fn param_types() -> Vec<ParamType> {
                vec![$($A::param_type()),*]
            }

            #[allow(unused_variables)]
            fn call(&self, target: Arc<F>, args: &mut Args) -> Result<R, BoxError> {
                Ok(self(target, $(args.take::<$A>($i)?),*))
            }
        }
    };
}

impl_executable_fns!();
impl_executable_fns!(A1 => 0);
impl_executable_fns!(A1 => 0, A2 => 1);
impl_executable_fns!(A1 => 0, A2 => 1, A3 => 2);
impl_executable_fns!(A1 => 0, A2 => 1, A3 => 2, A4 => 3);
impl_executable_fns!(A1 => 0, A2 => 1, A3 => 2, A4 => 3, A5 => 4);
impl_executable_fns!(A1 => 0, A2 => 1, A3 => 2, A4 => 3, A5 => 4, A6 => 5);

// =============================================================================
// ComponentClass
// =============================================================================

/// A cast from the concrete type to one of its supertypes.
#[derive(Clone)]
pub struct View {
    key: TypeKey,
    distance: u32,
    cast: ViewFn,
}

impl View {
    #[inline]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    #[inline]
    pub fn distance(&self) -> u32 {
        self.distance
    }
}

/// A property setter.
#[derive(Clone)]
pub struct Setter {
    name: String,
    param_type: ParamType,
    required: bool,
    apply: SetterFn,
}

impl Setter {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn param_type(&self) -> &ParamType {
        &self.param_type
    }

    #[inline]
    pub fn is_required(&self) -> bool {
        self.required
    }

    pub(crate) fn apply(&self, instance: &Instance, value: Value) -> Result<(), BoxError> {
        (self.apply)(instance, value)
    }
}

#[derive(Clone)]
pub(crate) struct FactoryCapability {
    pub(crate) cast: FactoryCastFn,
    pub(crate) product: Option<Arc<ComponentClass>>,
}

/// Declared metadata for one component type.
#[derive(Clone)]
pub struct ComponentClass {
    key: TypeKey,
    views: Vec<View>,
    constructors: Vec<Arc<Executable>>,
    factory_methods: Vec<Arc<Executable>>,
    setters: Vec<Setter>,
    methods: HashMap<String, MethodCallback>,
    init: Option<MethodCallback>,
    destroy: Option<MethodCallback>,
    name_aware: Option<NameAwareFn>,
    smart_init: Option<SmartInitFn>,
    factory: Option<FactoryCapability>,
}

impl ComponentClass {
    /// Start declaring the class of `T`.
    pub fn builder<T: Injectable>() -> ComponentClassBuilder<T> {
        ComponentClassBuilder {
            class: ComponentClass::bare(TypeKey::of::<T>()),
            _marker: PhantomData,
        }
    }

    /// A class that declares nothing beyond its identity.
    pub fn of<T: Injectable>() -> Arc<Self> {
        Arc::new(Self::bare(TypeKey::of::<T>()))
    }

    /// Identity-only class for a type known just by its key.
    pub(crate) fn for_key(key: TypeKey) -> Arc<Self> {
        Arc::new(Self::bare(key))
    }

    fn bare(key: TypeKey) -> Self {
        Self {
            key,
            views: Vec::new(),
            constructors: Vec::new(),
            factory_methods: Vec::new(),
            setters: Vec::new(),
            methods: HashMap::new(),
            init: None,
            destroy: None,
            name_aware: None,
            smart_init: None,
            factory: None,
        }
    }

    #[inline]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.key.name()
    }

    pub fn views(&self) -> &[View] {
        &self.views
    }

    /// Distance from this class to `target`: 0 for itself, the view's distance
    /// for a declared supertype, `None` when not assignable.
    pub fn distance_to(&self, target: TypeKey) -> Option<u32> {
        if self.key == target {
            return Some(0);
        }
        self.views.iter().find(|v| v.key == target).map(|v| v.distance)
    }

    #[inline]
    pub fn is_assignable_to(&self, target: TypeKey) -> bool {
        self.distance_to(target).is_some()
    }

    /// Expose a concrete instance of this class as `target`.
    pub fn cast_to(&self, instance: &Instance, target: TypeKey) -> Option<Instance> {
        if instance.type_key() == target {
            return Some(instance.clone());
        }
        self.views
            .iter()
            .find(|v| v.key == target)
            .and_then(|v| (v.cast)(instance))
    }

    pub fn constructors(&self) -> &[Arc<Executable>] {
        &self.constructors
    }

    pub fn default_constructor(&self) -> Option<&Arc<Executable>> {
        self.constructors.iter().find(|c| c.parameter_count() == 0)
    }

    pub fn factory_methods(&self) -> &[Arc<Executable>] {
        &self.factory_methods
    }

    pub fn factory_methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Arc<Executable>> + 'a {
        self.factory_methods.iter().filter(move |m| m.name() == name)
    }

    pub fn setters(&self) -> &[Setter] {
        &self.setters
    }

    pub fn setter(&self, name: &str) -> Option<&Setter> {
        self.setters.iter().find(|s| s.name == name)
    }

    pub fn method(&self, name: &str) -> Option<&MethodCallback> {
        self.methods.get(name)
    }

    #[inline]
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub(crate) fn init_callback(&self) -> Option<&MethodCallback> {
        self.init.as_ref()
    }

    pub(crate) fn destroy_callback(&self) -> Option<&MethodCallback> {
        self.destroy.as_ref()
    }

    #[inline]
    pub fn is_initializing(&self) -> bool {
        self.init.is_some()
    }

    #[inline]
    pub fn is_disposable(&self) -> bool {
        self.destroy.is_some()
    }

    #[inline]
    pub fn is_name_aware(&self) -> bool {
        self.name_aware.is_some()
    }

    #[inline]
    pub fn is_smart_initializing(&self) -> bool {
        self.smart_init.is_some()
    }

    #[inline]
    pub fn is_factory_bean(&self) -> bool {
        self.factory.is_some()
    }

    /// Declared class of the factory product, if this is a factory bean.
    pub fn factory_product(&self) -> Option<&Arc<ComponentClass>> {
        self.factory.as_ref().and_then(|f| f.product.as_ref())
    }

    pub(crate) fn as_factory(&self, instance: &Instance) -> Option<Arc<dyn FactoryBean>> {
        self.factory.as_ref().and_then(|f| (f.cast)(instance))
    }

    pub(crate) fn set_name(&self, instance: &Instance, name: &str) {
        if let Some(cb) = &self.name_aware {
            cb(instance, name);
        }
    }

    pub(crate) fn after_singletons_instantiated(&self, instance: &Instance) {
        if let Some(cb) = &self.smart_init {
            cb(instance);
        }
    }
}

impl fmt::Debug for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentClass")
            .field("type", &self.key)
            .field("views", &self.views.iter().map(|v| v.key).collect::<Vec<_>>())
            .field("constructors", &self.constructors.len())
            .field("factory_methods", &self.factory_methods.len())
            .field("setters", &self.setters.iter().map(|s| s.name.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

fn wrong_target<T: ?Sized>(instance: &Instance) -> BoxError {
    format!(
        "expected instance of {} but got {}",
        std::any::type_name::<T>(),
        instance.type_name()
    )
    .into()
}

/// Typed builder for [`ComponentClass`].
pub struct ComponentClassBuilder<T: Injectable> {
    class: ComponentClass,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Injectable> ComponentClassBuilder<T> {
    /// Declare that `T` can be viewed as `U` (distance 1).
    pub fn implements<U>(self, cast: fn(Arc<T>) -> Arc<U>) -> Self
    where
        U: ?Sized + Send + Sync + 'static,
    {
        self.implements_at(1, cast)
    }

    /// Declare a view at an explicit inheritance distance.
    pub fn implements_at<U>(mut self, distance: u32, cast: fn(Arc<T>) -> Arc<U>) -> Self
    where
        U: ?Sized + Send + Sync + 'static,
    {
        let key = TypeKey::of::<U>();
        self.class.views.retain(|v| v.key != key);
        self.class.views.push(View {
            key,
            distance,
            cast: Arc::new(move |inst: &Instance| inst.cast::<T>().map(|arc| Instance::from_arc(cast(arc)))),
        });
        self
    }

    pub fn constructor<M: 'static, F: ConstructorFn<T, M>>(self, f: F) -> Self {
        self.with_constructor(Executable::constructor(f))
    }

    pub fn try_constructor<M: 'static, F: TryConstructorFn<T, M>>(self, f: F) -> Self {
        self.with_constructor(Executable::try_constructor(f))
    }

    /// Add a prepared constructor (named parameters, visibility).
    pub fn with_constructor(mut self, executable: Executable) -> Self {
        self.class.constructors.push(Arc::new(executable));
        self
    }

    pub fn static_factory<R, M, F>(self, name: impl Into<String>, f: F) -> Self
    where
        R: Injectable,
        M: 'static,
        F: ConstructorFn<R, M>,
    {
        self.with_factory_method(Executable::static_factory(name, f))
    }

    pub fn instance_factory<R, M, F>(self, name: impl Into<String>, f: F) -> Self
    where
        R: Injectable,
        M: 'static,
        F: MethodFn<T, R, M>,
    {
        self.with_factory_method(Executable::instance_factory::<T, R, M, F>(name, f))
    }

    pub fn with_factory_method(mut self, executable: Executable) -> Self {
        self.class.factory_methods.push(Arc::new(executable));
        self
    }

    /// Declare a property setter. The value type is inferred from `X`.
    pub fn setter<X, F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        X: Injected + 'static,
        F: Fn(&T, X) + Send + Sync + 'static,
    {
        let name = name.into();
        self.class.setters.retain(|s| s.name != name);
        self.class.setters.push(Setter {
            name,
            param_type: X::param_type(),
            required: false,
            apply: Arc::new(move |inst: &Instance, value: Value| -> Result<(), BoxError> {
                let target = inst.cast::<T>().ok_or_else(|| wrong_target::<T>(inst))?;
                f(&target, X::from_value(value)?);
                Ok(())
            }),
        });
        self
    }

    /// Mark an already declared setter as required.
    pub fn required(mut self, name: &str) -> Self {
        if let Some(setter) = self.class.setters.iter_mut().find(|s| s.name == name) {
            setter.required = true;
        }
        self
    }

    /// Declare a named no-argument method (init or destroy by name).
    pub fn method<E, F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        E: Into<BoxError>,
        F: Fn(&T) -> Result<(), E> + Send + Sync + 'static,
    {
        self.class.methods.insert(
            name.into(),
            Arc::new(move |inst: &Instance| -> Result<(), BoxError> {
                let target = inst.cast::<T>().ok_or_else(|| wrong_target::<T>(inst))?;
                f(&target).map_err(Into::into)
            }),
        );
        self
    }

    pub fn initializing(mut self) -> Self
    where
        T: InitializingComponent,
    {
        self.class.init = Some(Arc::new(|inst: &Instance| -> Result<(), BoxError> {
            let target = inst.cast::<T>().ok_or_else(|| wrong_target::<T>(inst))?;
            target.after_properties_set()
        }));
        self
    }

    pub fn disposable(mut self) -> Self
    where
        T: DisposableComponent,
    {
        self.class.destroy = Some(Arc::new(|inst: &Instance| -> Result<(), BoxError> {
            let target = inst.cast::<T>().ok_or_else(|| wrong_target::<T>(inst))?;
            target.destroy()
        }));
        self
    }

    pub fn name_aware(mut self) -> Self
    where
        T: NameAware,
    {
        self.class.name_aware = Some(Arc::new(|inst: &Instance, name: &str| {
            if let Some(target) = inst.cast::<T>() {
                target.set_component_name(name);
            }
        }));
        self
    }

    pub fn smart_initializing(mut self) -> Self
    where
        T: SmartInitializing,
    {
        self.class.smart_init = Some(Arc::new(|inst: &Instance| {
            if let Some(target) = inst.cast::<T>() {
                target.after_singletons_instantiated();
            }
        }));
        self
    }

    /// Declare `T` a factory bean, optionally with the class of its product.
    pub fn factory_bean(mut self, product: Option<Arc<ComponentClass>>) -> Self
    where
        T: FactoryBean,
    {
        self.class.factory = Some(FactoryCapability {
            cast: Arc::new(|inst: &Instance| inst.cast::<T>().map(|f| f as Arc<dyn FactoryBean>)),
            product,
        });
        self
    }

    pub fn build(self) -> Arc<ComponentClass> {
        Arc::new(self.class)
    }
}

// =============================================================================
// Per-container class index
// =============================================================================

/// Classes known to one container, keyed by concrete type.
///
/// Used to find views for instances whose descriptor is not at hand
/// (manual singletons, factory products, factory-method results).
pub(crate) struct ClassIndex {
    classes: DashMap<TypeId, Arc<ComponentClass>, RandomState>,
}

impl ClassIndex {
    pub(crate) fn new() -> Self {
        Self {
            classes: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
        }
    }

    /// Index a class and every class reachable from it.
    pub(crate) fn register(&self, class: &Arc<ComponentClass>) {
        let known = self
            .classes
            .get(&class.key.id())
            .is_some_and(|existing| Arc::ptr_eq(existing.value(), class));
        if known {
            return;
        }
        self.classes.insert(class.key.id(), Arc::clone(class));
        for method in &class.factory_methods {
            if let Some(ret) = &method.return_class {
                self.register(ret);
            }
        }
        if let Some(product) = class.factory_product() {
            self.register(product);
        }
    }

    pub(crate) fn get(&self, key: TypeKey) -> Option<Arc<ComponentClass>> {
        self.classes.get(&key.id()).map(|c| Arc::clone(c.value()))
    }

    /// Assignability between two types known to this container.
    pub(crate) fn distance(&self, from: TypeKey, to: TypeKey) -> Option<u32> {
        if from == to {
            return Some(0);
        }
        self.get(from).and_then(|c| c.distance_to(to))
    }

    /// Expose `instance` as `to`, through its class's views.
    pub(crate) fn adapt(&self, instance: &Instance, to: TypeKey) -> Option<Instance> {
        if instance.type_key() == to {
            return Some(instance.clone());
        }
        self.get(instance.type_key()).and_then(|c| c.cast_to(instance, to))
    }
}
