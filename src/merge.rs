//! Flattened descriptors
//!
//! A [`MergedDescriptor`] is the descriptor the engine actually works with:
//! the raw descriptor with its parent chain folded in, scope defaulted, and
//! the lifecycle capabilities of its class computed once. It also carries the
//! per-descriptor resolution cache used by constructor selection.

use crate::class::{ComponentClass, Executable};
use crate::descriptor::{ComponentDescriptor, ValueSpec};
use crate::provider::TypeKey;
use crate::scope::ScopeKind;
use crate::value::Value;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Lifecycle capabilities of the component class, computed at merge time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub has_init_callback: bool,
    pub has_destroy_callback: bool,
    pub name_aware: bool,
    pub factory_bean: bool,
    pub smart_initializing: bool,
    /// Setters that take a component rather than a literal
    pub autowirable_setters: Vec<String>,
}

impl Capabilities {
    fn of(class: Option<&Arc<ComponentClass>>) -> Self {
        let Some(class) = class else {
            return Self::default();
        };
        Self {
            has_init_callback: class.is_initializing(),
            has_destroy_callback: class.is_disposable(),
            name_aware: class.is_name_aware(),
            factory_bean: class.is_factory_bean(),
            smart_initializing: class.is_smart_initializing(),
            autowirable_setters: class
                .setters()
                .iter()
                .filter(|s| !s.param_type().is_simple())
                .map(|s| s.name().to_string())
                .collect(),
        }
    }
}

/// One slot of a cached argument template.
#[derive(Debug, Clone)]
pub(crate) enum PreparedArg {
    /// Converted once, reused as is
    Ready(Value),
    /// Re-resolve the configured spec on every creation
    Spec(ValueSpec),
    /// Re-run the dependency resolver on every creation
    Autowired,
}

/// Outcome of constructor or factory-method selection, reused on later creations.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResolutionCache {
    pub(crate) executable: Option<Arc<Executable>>,
    pub(crate) arguments_resolved: bool,
    pub(crate) resolved_args: Option<Vec<Value>>,
    pub(crate) prepared_args: Option<Vec<PreparedArg>>,
}

/// A descriptor with its parent chain flattened.
pub struct MergedDescriptor {
    name: String,
    descriptor: ComponentDescriptor,
    capabilities: Capabilities,
    stale: AtomicBool,
    pub(crate) cache: Mutex<ResolutionCache>,
    pub(crate) post_processed: OnceCell<()>,
    pub(crate) predicted_type: OnceCell<Option<TypeKey>>,
}

impl MergedDescriptor {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn descriptor(&self) -> &ComponentDescriptor {
        &self.descriptor
    }

    #[inline]
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Effective scope; always set after merging.
    pub fn scope_kind(&self) -> &ScopeKind {
        const DEFAULT: &ScopeKind = &ScopeKind::Singleton;
        self.descriptor.scope().unwrap_or(DEFAULT)
    }

    #[inline]
    pub fn is_singleton(&self) -> bool {
        self.scope_kind().is_singleton()
    }

    #[inline]
    pub fn is_prototype(&self) -> bool {
        self.scope_kind().is_prototype()
    }

    #[inline]
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    pub(crate) fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }

    /// Constructor or factory method chosen on first creation, if any.
    pub fn resolved_executable(&self) -> Option<Arc<Executable>> {
        self.cache.lock().executable.clone()
    }

    /// Lenient constructor resolution, falling back to the container default.
    pub fn is_lenient(&self, default: bool) -> bool {
        self.descriptor.lenient_constructor_resolution().unwrap_or(default)
    }
}

impl Deref for MergedDescriptor {
    type Target = ComponentDescriptor;

    fn deref(&self) -> &ComponentDescriptor {
        &self.descriptor
    }
}

impl PartialEq for MergedDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.descriptor == other.descriptor
            && self.capabilities == other.capabilities
    }
}

impl fmt::Debug for MergedDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedDescriptor")
            .field("name", &self.name)
            .field("descriptor", &self.descriptor)
            .field("capabilities", &self.capabilities)
            .field("stale", &self.is_stale())
            .finish()
    }
}

/// Apply the settings `child` declares on top of `target` (a copy of the parent).
fn override_from(target: &mut ComponentDescriptor, child: &ComponentDescriptor) {
    if child.class.is_some() {
        target.class = child.class.clone();
    }
    if child.scope.is_some() {
        target.scope = child.scope.clone();
    }
    if child.lazy_init.is_some() {
        target.lazy_init = child.lazy_init;
    }
    if child.factory_component_name.is_some() {
        target.factory_component_name = child.factory_component_name.clone();
    }
    if child.factory_method_name.is_some() {
        target.factory_method_name = child.factory_method_name.clone();
    }
    if child.init_method_name.is_some() {
        target.init_method_name = child.init_method_name.clone();
    }
    if child.destroy_method_name.is_some() {
        target.destroy_method_name = child.destroy_method_name.clone();
    }
    if child.instance_supplier.is_some() {
        target.instance_supplier = child.instance_supplier.clone();
    }
    if child.description.is_some() {
        target.description = child.description.clone();
    }
    if child.priority.is_some() {
        target.priority = child.priority;
    }
    if child.order.is_some() {
        target.order = child.order;
    }
    if child.lenient_constructor_resolution.is_some() {
        target.lenient_constructor_resolution = child.lenient_constructor_resolution;
    }

    target.is_abstract = child.is_abstract;
    target.autowire_mode = child.autowire_mode;
    target.depends_on = child.depends_on.clone();
    target.autowire_candidate = child.autowire_candidate;
    target.primary = child.primary;
    target.non_public_access_allowed = child.non_public_access_allowed;
    target.synthetic = child.synthetic;
    target.role = child.role;
    for qualifier in &child.qualifiers {
        if !target.qualifiers.contains(qualifier) {
            target.qualifiers.push(qualifier.clone());
        }
    }

    target.constructor_args.merge_from(&child.constructor_args);
    target.properties.merge_from(&child.properties);
}

/// Flatten `raw` on top of its already merged `parent`.
///
/// A descriptor nested inside a non-singleton `containing` descriptor takes
/// the containing scope.
pub(crate) fn merge(
    name: &str,
    raw: &ComponentDescriptor,
    parent: Option<&ComponentDescriptor>,
    containing: Option<&MergedDescriptor>,
) -> MergedDescriptor {
    let mut descriptor = match parent {
        Some(parent) => {
            let mut merged = parent.clone();
            override_from(&mut merged, raw);
            merged
        }
        None => raw.clone(),
    };
    descriptor.parent_name = None;
    if descriptor.scope.is_none() {
        descriptor.scope = Some(ScopeKind::Singleton);
    }
    if let Some(containing) = containing {
        if !containing.is_singleton() && descriptor.scope == Some(ScopeKind::Singleton) {
            descriptor.scope = Some(containing.scope_kind().clone());
        }
    }

    let capabilities = if descriptor.factory_method_name.is_some() {
        Capabilities::default()
    } else {
        Capabilities::of(descriptor.class.as_ref())
    };

    MergedDescriptor {
        name: name.to_string(),
        descriptor,
        capabilities,
        stale: AtomicBool::new(false),
        cache: Mutex::new(ResolutionCache::default()),
        post_processed: OnceCell::new(),
        predicted_type: OnceCell::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ComponentClass, InitializingComponent};
    use crate::descriptor::{AutowireMode, ComponentDescriptor};
    use crate::error::BoxError;

    struct Base;
    struct Special;

    struct Pool;

    impl InitializingComponent for Pool {
        fn after_properties_set(&self) -> Result<(), BoxError> {
            Ok(())
        }
    }

    #[test]
    fn test_no_parent_defaults_scope() {
        let raw = ComponentDescriptor::new(ComponentClass::of::<Base>());
        let merged = merge("base", &raw, None, None);
        assert!(merged.is_singleton());
        assert_eq!(merged.scope_kind(), &ScopeKind::Singleton);
        assert!(!merged.is_stale());
    }

    #[test]
    fn test_child_overrides() {
        let parent = ComponentDescriptor::new(ComponentClass::of::<Base>())
            .as_abstract()
            .prototype()
            .primary()
            .with_indexed_arg(0, "parent-0")
            .with_indexed_arg(1, "parent-1")
            .with_arg("generic-parent")
            .with_property("a", 1)
            .with_property("b", 2)
            .with_init_method("start")
            .depends_on("x");

        let child = ComponentDescriptor::child_of("parent")
            .with_class(ComponentClass::of::<Special>())
            .with_indexed_arg(1, "child-1")
            .with_arg("generic-child")
            .with_property("b", 3)
            .with_autowire(AutowireMode::ByType);

        let merged = merge("child", &child, Some(&parent), None);

        assert_eq!(merged.class().unwrap().key(), TypeKey::of::<Special>());
        // set only on parent: inherited
        assert!(merged.is_prototype());
        assert_eq!(merged.init_method_name(), Some("start"));
        // always from the child
        assert!(!merged.is_abstract());
        assert!(!merged.is_primary());
        assert!(merged.depends_on_names().is_empty());
        assert_eq!(merged.autowire_mode(), AutowireMode::ByType);
        assert_eq!(merged.parent_name(), None);

        let args = merged.constructor_args();
        assert_eq!(args.indexed()[&0].value, ValueSpec::from("parent-0"));
        assert_eq!(args.indexed()[&1].value, ValueSpec::from("child-1"));
        assert_eq!(args.generic().len(), 2);

        assert_eq!(merged.properties().get("a"), Some(&ValueSpec::from(1)));
        assert_eq!(merged.properties().get("b"), Some(&ValueSpec::from(3)));
    }

    #[test]
    fn test_inner_takes_containing_scope() {
        let outer = merge(
            "outer",
            &ComponentDescriptor::new(ComponentClass::of::<Base>()).prototype(),
            None,
            None,
        );
        let inner = merge(
            "inner",
            &ComponentDescriptor::new(ComponentClass::of::<Special>()),
            None,
            Some(&outer),
        );
        assert!(inner.is_prototype());
    }

    #[test]
    fn test_merge_idempotent() {
        let parent = ComponentDescriptor::new(ComponentClass::of::<Base>()).with_property("a", 1);
        let child = ComponentDescriptor::child_of("p").with_property("b", 2);
        let first = merge("c", &child, Some(&parent), None);
        let second = merge("c", &child, Some(&parent), None);
        assert_eq!(first, second);
    }

    #[test]
    fn test_capabilities_computed() {
        let merged = merge("b", &ComponentDescriptor::new(ComponentClass::of::<Base>()), None, None);
        assert_eq!(merged.capabilities(), &Capabilities::default());

        let class = ComponentClass::builder::<Pool>()
            .constructor(|| Pool)
            .setter("peer", |_: &Pool, _peer: std::sync::Arc<Base>| {})
            .setter("size", |_: &Pool, _size: i64| {})
            .initializing()
            .build();
        let merged = merge("pool", &ComponentDescriptor::new(class), None, None);
        assert!(merged.capabilities().has_init_callback);
        assert!(!merged.capabilities().has_destroy_callback);
        assert_eq!(merged.capabilities().autowirable_setters, vec!["peer"]);
    }
}
