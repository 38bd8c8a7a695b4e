//! Component descriptors as authored
//!
//! A [`ComponentDescriptor`] is the declarative recipe for one component:
//! which class or factory method creates it, its scope, its constructor
//! arguments and property values, and its lifecycle settings. Descriptors
//! may inherit from a parent descriptor; the container flattens them into a
//! [`MergedDescriptor`](crate::MergedDescriptor) before use.

use crate::class::ComponentClass;
use crate::factory::InstanceSupplier;
use crate::scope::ScopeKind;
use crate::value::{Literal, ParamType, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Destroy method name that asks the container to look for `close` or `shutdown`.
pub const INFER_METHOD: &str = "(inferred)";

/// How unset dependencies are filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AutowireMode {
    #[default]
    No,
    ByName,
    ByType,
    Constructor,
}

/// What the component is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    #[default]
    Application,
    Support,
    Infrastructure,
}

/// An unresolved argument or property value.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSpec {
    Null,
    Literal(Literal),
    /// Another component, by name
    Ref(String),
    /// A nested descriptor created for this value only
    Inner(Box<InnerComponent>),
    List(Vec<ValueSpec>),
    Map(Vec<(String, ValueSpec)>),
    /// Already resolved (autowired properties)
    Resolved(Value),
}

impl ValueSpec {
    pub fn reference(name: impl Into<String>) -> Self {
        ValueSpec::Ref(name.into())
    }

    pub fn inner(descriptor: ComponentDescriptor) -> Self {
        ValueSpec::Inner(Box::new(InnerComponent {
            name: None,
            descriptor,
        }))
    }

    pub fn named_inner(name: impl Into<String>, descriptor: ComponentDescriptor) -> Self {
        ValueSpec::Inner(Box::new(InnerComponent {
            name: Some(name.into()),
            descriptor,
        }))
    }

    /// Whether resolving this spec can yield a different value each time.
    pub fn needs_resolution(&self) -> bool {
        match self {
            ValueSpec::Null | ValueSpec::Literal(_) => false,
            ValueSpec::Ref(_) | ValueSpec::Inner(_) | ValueSpec::Resolved(_) => true,
            ValueSpec::List(items) => items.iter().any(ValueSpec::needs_resolution),
            ValueSpec::Map(entries) => entries.iter().any(|(_, v)| v.needs_resolution()),
        }
    }
}

macro_rules! impl_spec_from_literal {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ValueSpec {
                fn from(value: $t) -> Self {
                    ValueSpec::Literal(value.into())
                }
            }
        )*
    };
}

impl_spec_from_literal!(&str, String, i64, i32, f64, bool);

impl From<Literal> for ValueSpec {
    fn from(literal: Literal) -> Self {
        ValueSpec::Literal(literal)
    }
}

/// A nested descriptor, optionally named.
#[derive(Debug, Clone, PartialEq)]
pub struct InnerComponent {
    pub name: Option<String>,
    pub descriptor: ComponentDescriptor,
}

/// A constructor argument with optional type and name hints.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgSpec {
    pub value: ValueSpec,
    pub type_hint: Option<ParamType>,
    pub name: Option<String>,
}

impl ArgSpec {
    pub fn new(value: impl Into<ValueSpec>) -> Self {
        Self {
            value: value.into(),
            type_hint: None,
            name: None,
        }
    }

    pub fn typed(mut self, param_type: ParamType) -> Self {
        self.type_hint = Some(param_type);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Indexed and generic constructor arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstructorArgs {
    indexed: BTreeMap<usize, ArgSpec>,
    generic: Vec<ArgSpec>,
}

impl ConstructorArgs {
    pub fn add_indexed(&mut self, index: usize, arg: ArgSpec) {
        self.indexed.insert(index, arg);
    }

    pub fn add_generic(&mut self, arg: ArgSpec) {
        self.generic.push(arg);
    }

    pub fn indexed(&self) -> &BTreeMap<usize, ArgSpec> {
        &self.indexed
    }

    pub fn generic(&self) -> &[ArgSpec] {
        &self.generic
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indexed.is_empty() && self.generic.is_empty()
    }

    /// Number of values that must be matched.
    pub fn len(&self) -> usize {
        self.indexed.len() + self.generic.len()
    }

    /// Minimum parameter count a candidate needs: highest index + 1, plus generics.
    pub fn argument_count(&self) -> usize {
        let indexed = self.indexed.keys().next_back().map_or(0, |max| max + 1);
        indexed + self.generic.len()
    }

    /// Child args replace parent args by index; generic args are appended.
    pub(crate) fn merge_from(&mut self, other: &ConstructorArgs) {
        for (index, arg) in &other.indexed {
            self.indexed.insert(*index, arg.clone());
        }
        for arg in &other.generic {
            if !self.generic.contains(arg) {
                self.generic.push(arg.clone());
            }
        }
    }
}

/// One configured property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyValue {
    pub name: String,
    pub value: ValueSpec,
}

/// Ordered property values; adding an existing name replaces it in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyValues {
    entries: Vec<PropertyValue>,
}

impl PropertyValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<ValueSpec>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(existing) => existing.value = value,
            None => self.entries.push(PropertyValue { name, value }),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ValueSpec>) -> Self {
        self.add(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ValueSpec> {
        self.entries.iter().find(|e| e.name == name).map(|e| &e.value)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ValueSpec> {
        let pos = self.entries.iter().position(|e| e.name == name)?;
        Some(self.entries.remove(pos).value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyValue> {
        self.entries.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn merge_from(&mut self, other: &PropertyValues) {
        for pv in &other.entries {
            self.add(pv.name.clone(), pv.value.clone());
        }
    }
}

impl IntoIterator for PropertyValues {
    type Item = PropertyValue;
    type IntoIter = std::vec::IntoIter<PropertyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Declarative recipe for one component.
///
/// # Examples
///
/// ```rust
/// use component_factory::{ComponentClass, ComponentDescriptor, ScopeKind, ValueSpec};
///
/// struct Server {
///     host: String,
///     port: i64,
/// }
///
/// let class = ComponentClass::builder::<Server>()
///     .constructor(|host: String, port: i64| Server { host, port })
///     .build();
///
/// let descriptor = ComponentDescriptor::new(class)
///     .with_scope(ScopeKind::Prototype)
///     .with_indexed_arg(0, "localhost")
///     .with_indexed_arg(1, 8080);
///
/// assert_eq!(descriptor.constructor_args().argument_count(), 2);
/// ```
#[derive(Clone)]
pub struct ComponentDescriptor {
    pub(crate) class: Option<Arc<ComponentClass>>,
    pub(crate) parent_name: Option<String>,
    pub(crate) scope: Option<ScopeKind>,
    pub(crate) is_abstract: bool,
    pub(crate) lazy_init: Option<bool>,
    pub(crate) primary: bool,
    pub(crate) priority: Option<i32>,
    pub(crate) order: Option<i32>,
    pub(crate) autowire_candidate: bool,
    pub(crate) qualifiers: Vec<String>,
    pub(crate) autowire_mode: AutowireMode,
    pub(crate) depends_on: Vec<String>,
    pub(crate) constructor_args: ConstructorArgs,
    pub(crate) properties: PropertyValues,
    pub(crate) factory_component_name: Option<String>,
    pub(crate) factory_method_name: Option<String>,
    pub(crate) init_method_name: Option<String>,
    pub(crate) destroy_method_name: Option<String>,
    pub(crate) instance_supplier: Option<InstanceSupplier>,
    pub(crate) lenient_constructor_resolution: Option<bool>,
    pub(crate) non_public_access_allowed: bool,
    pub(crate) synthetic: bool,
    pub(crate) role: Role,
    pub(crate) description: Option<String>,
}

impl Default for ComponentDescriptor {
    fn default() -> Self {
        Self {
            class: None,
            parent_name: None,
            scope: None,
            is_abstract: false,
            lazy_init: None,
            primary: false,
            priority: None,
            order: None,
            autowire_candidate: true,
            qualifiers: Vec::new(),
            autowire_mode: AutowireMode::No,
            depends_on: Vec::new(),
            constructor_args: ConstructorArgs::default(),
            properties: PropertyValues::default(),
            factory_component_name: None,
            factory_method_name: None,
            init_method_name: None,
            destroy_method_name: None,
            instance_supplier: None,
            lenient_constructor_resolution: None,
            non_public_access_allowed: true,
            synthetic: false,
            role: Role::Application,
            description: None,
        }
    }
}

impl ComponentDescriptor {
    /// Descriptor created through `class`.
    pub fn new(class: Arc<ComponentClass>) -> Self {
        Self {
            class: Some(class),
            ..Self::default()
        }
    }

    /// Descriptor inheriting from the descriptor named `parent`.
    pub fn child_of(parent: impl Into<String>) -> Self {
        Self {
            parent_name: Some(parent.into()),
            ..Self::default()
        }
    }

    /// Descriptor created by calling `method` on the component named `factory`.
    pub fn from_factory(factory: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            factory_component_name: Some(factory.into()),
            factory_method_name: Some(method.into()),
            ..Self::default()
        }
    }

    /// Descriptor created by a static factory method declared on `class`.
    pub fn from_static_factory(class: Arc<ComponentClass>, method: impl Into<String>) -> Self {
        Self {
            class: Some(class),
            factory_method_name: Some(method.into()),
            ..Self::default()
        }
    }

    /// Descriptor created by a supplier callback.
    pub fn from_supplier(class: Arc<ComponentClass>, supplier: InstanceSupplier) -> Self {
        Self {
            class: Some(class),
            instance_supplier: Some(supplier),
            ..Self::default()
        }
    }

    // ----- builder -----

    pub fn with_class(mut self, class: Arc<ComponentClass>) -> Self {
        self.class = Some(class);
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_name = Some(parent.into());
        self
    }

    pub fn with_scope(mut self, scope: ScopeKind) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn prototype(self) -> Self {
        self.with_scope(ScopeKind::Prototype)
    }

    pub fn as_abstract(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy_init = Some(lazy);
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn autowire_candidate(mut self, candidate: bool) -> Self {
        self.autowire_candidate = candidate;
        self
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifiers.push(qualifier.into());
        self
    }

    pub fn with_autowire(mut self, mode: AutowireMode) -> Self {
        self.autowire_mode = mode;
        self
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    pub fn with_indexed_arg(mut self, index: usize, value: impl Into<ValueSpec>) -> Self {
        self.constructor_args.add_indexed(index, ArgSpec::new(value));
        self
    }

    pub fn with_arg(mut self, value: impl Into<ValueSpec>) -> Self {
        self.constructor_args.add_generic(ArgSpec::new(value));
        self
    }

    pub fn with_arg_spec(mut self, index: Option<usize>, arg: ArgSpec) -> Self {
        match index {
            Some(i) => self.constructor_args.add_indexed(i, arg),
            None => self.constructor_args.add_generic(arg),
        }
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<ValueSpec>) -> Self {
        self.properties.add(name, value);
        self
    }

    pub fn with_factory_method(mut self, method: impl Into<String>) -> Self {
        self.factory_method_name = Some(method.into());
        self
    }

    pub fn with_init_method(mut self, name: impl Into<String>) -> Self {
        self.init_method_name = Some(name.into());
        self
    }

    pub fn with_destroy_method(mut self, name: impl Into<String>) -> Self {
        self.destroy_method_name = Some(name.into());
        self
    }

    pub fn with_supplier(mut self, supplier: InstanceSupplier) -> Self {
        self.instance_supplier = Some(supplier);
        self
    }

    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient_constructor_resolution = Some(lenient);
        self
    }

    pub fn non_public_access(mut self, allowed: bool) -> Self {
        self.non_public_access_allowed = allowed;
        self
    }

    pub fn synthetic(mut self) -> Self {
        self.synthetic = true;
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    // ----- accessors -----

    pub fn class(&self) -> Option<&Arc<ComponentClass>> {
        self.class.as_ref()
    }

    pub fn parent_name(&self) -> Option<&str> {
        self.parent_name.as_deref()
    }

    pub fn scope(&self) -> Option<&ScopeKind> {
        self.scope.as_ref()
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn is_lazy_init(&self) -> bool {
        self.lazy_init.unwrap_or(false)
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn priority(&self) -> Option<i32> {
        self.priority
    }

    pub fn order(&self) -> Option<i32> {
        self.order
    }

    pub fn is_autowire_candidate(&self) -> bool {
        self.autowire_candidate
    }

    pub fn qualifiers(&self) -> &[String] {
        &self.qualifiers
    }

    pub fn autowire_mode(&self) -> AutowireMode {
        self.autowire_mode
    }

    pub fn depends_on_names(&self) -> &[String] {
        &self.depends_on
    }

    pub fn constructor_args(&self) -> &ConstructorArgs {
        &self.constructor_args
    }

    pub fn has_constructor_args(&self) -> bool {
        !self.constructor_args.is_empty()
    }

    pub fn properties(&self) -> &PropertyValues {
        &self.properties
    }

    pub fn factory_component_name(&self) -> Option<&str> {
        self.factory_component_name.as_deref()
    }

    pub fn factory_method_name(&self) -> Option<&str> {
        self.factory_method_name.as_deref()
    }

    pub fn init_method_name(&self) -> Option<&str> {
        self.init_method_name.as_deref()
    }

    pub fn destroy_method_name(&self) -> Option<&str> {
        self.destroy_method_name.as_deref()
    }

    pub fn instance_supplier(&self) -> Option<&InstanceSupplier> {
        self.instance_supplier.as_ref()
    }

    pub fn lenient_constructor_resolution(&self) -> Option<bool> {
        self.lenient_constructor_resolution
    }

    pub fn is_non_public_access_allowed(&self) -> bool {
        self.non_public_access_allowed
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Check the descriptor can be used at all.
    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        if self.class.is_none()
            && self.parent_name.is_none()
            && self.factory_method_name.is_none()
            && self.instance_supplier.is_none()
        {
            return Err("needs a class, a parent, a factory method or an instance supplier".into());
        }
        if self.instance_supplier.is_some() && self.factory_method_name.is_some() {
            return Err("cannot combine an instance supplier with a factory method".into());
        }
        if self.factory_component_name.is_some() && self.factory_method_name.is_none() {
            return Err("factory component named without a factory method".into());
        }
        Ok(())
    }
}

fn same_arc<T: ?Sized>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
        (None, None) => true,
        _ => false,
    }
}

impl PartialEq for ComponentDescriptor {
    fn eq(&self, other: &Self) -> bool {
        same_arc(&self.class, &other.class)
            && same_arc(&self.instance_supplier, &other.instance_supplier)
            && self.parent_name == other.parent_name
            && self.scope == other.scope
            && self.is_abstract == other.is_abstract
            && self.lazy_init == other.lazy_init
            && self.primary == other.primary
            && self.priority == other.priority
            && self.order == other.order
            && self.autowire_candidate == other.autowire_candidate
            && self.qualifiers == other.qualifiers
            && self.autowire_mode == other.autowire_mode
            && self.depends_on == other.depends_on
            && self.constructor_args == other.constructor_args
            && self.properties == other.properties
            && self.factory_component_name == other.factory_component_name
            && self.factory_method_name == other.factory_method_name
            && self.init_method_name == other.init_method_name
            && self.destroy_method_name == other.destroy_method_name
            && self.lenient_constructor_resolution == other.lenient_constructor_resolution
            && self.non_public_access_allowed == other.non_public_access_allowed
            && self.synthetic == other.synthetic
            && self.role == other.role
            && self.description == other.description
    }
}

impl fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("class", &self.class.as_ref().map(|c| c.name()))
            .field("parent", &self.parent_name)
            .field("scope", &self.scope)
            .field("abstract", &self.is_abstract)
            .field("lazy", &self.lazy_init)
            .field("primary", &self.primary)
            .field("autowire", &self.autowire_mode)
            .field("factory_component", &self.factory_component_name)
            .field("factory_method", &self.factory_method_name)
            .field("args", &self.constructor_args.len())
            .field("properties", &self.properties.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget;

    #[test]
    fn test_defaults() {
        let d = ComponentDescriptor::new(ComponentClass::of::<Widget>());
        assert!(d.is_autowire_candidate());
        assert!(!d.is_lazy_init());
        assert_eq!(d.scope(), None);
        assert_eq!(d.autowire_mode(), AutowireMode::No);
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(ComponentDescriptor::default().validate().is_err());
        assert!(ComponentDescriptor::child_of("base").validate().is_ok());

        let both = ComponentDescriptor::from_static_factory(ComponentClass::of::<Widget>(), "create")
            .with_supplier(crate::factory::supplier(|| Widget));
        assert!(both.validate().is_err());
    }

    #[test]
    fn test_argument_count() {
        let d = ComponentDescriptor::default()
            .with_indexed_arg(2, "c")
            .with_arg(1)
            .with_arg(true);
        assert_eq!(d.constructor_args().argument_count(), 5);
        assert_eq!(d.constructor_args().len(), 3);
    }

    #[test]
    fn test_property_replace_keeps_position() {
        let mut pvs = PropertyValues::new().with("a", 1).with("b", 2);
        pvs.add("a", 3);
        let names: Vec<&str> = pvs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(pvs.get("a"), Some(&ValueSpec::from(3)));
    }

    #[test]
    fn test_needs_resolution() {
        assert!(!ValueSpec::from("x").needs_resolution());
        assert!(ValueSpec::reference("db").needs_resolution());
        assert!(ValueSpec::List(vec![ValueSpec::from(1), ValueSpec::reference("x")]).needs_resolution());
    }

    #[test]
    fn test_structural_equality() {
        let class = ComponentClass::of::<Widget>();
        let a = ComponentDescriptor::new(class.clone()).with_property("x", 1);
        let b = ComponentDescriptor::new(class).with_property("x", 1);
        assert_eq!(a, b);
        assert_ne!(a, b.clone().primary());
    }
}
