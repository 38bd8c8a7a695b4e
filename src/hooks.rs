//! Extension hooks
//!
//! A [`ComponentPostProcessor`] observes and may rewrite components at every
//! lifecycle transition. All methods have no-op defaults; implement only the
//! ones you need. Methods that can cut the chain short return a [`Flow`].

use crate::class::{ComponentClass, Executable};
use crate::descriptor::PropertyValues;
use crate::error::BoxError;
use crate::merge::MergedDescriptor;
use crate::provider::Instance;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Continue with the (possibly replaced) value, or stop the hook chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow<T, S = T> {
    Continue(T),
    ShortCircuit(S),
}

/// Position of a hook in the chain.
///
/// `Priority` hooks run before `Ordered` hooks, which run before
/// `Unordered` ones. Within a tier lower numbers run first, then
/// registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookOrder {
    Priority(i32),
    Ordered(i32),
    #[default]
    Unordered,
}

impl HookOrder {
    fn sort_key(&self) -> (u8, i32) {
        match self {
            HookOrder::Priority(n) => (0, *n),
            HookOrder::Ordered(n) => (1, *n),
            HookOrder::Unordered => (2, 0),
        }
    }
}

/// Callbacks around component creation and destruction.
///
/// # Examples
///
/// ```rust
/// use component_factory::{BoxError, ComponentPostProcessor, Flow, HookOrder, Instance};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// #[derive(Default)]
/// struct CountingHook {
///     initialized: AtomicUsize,
/// }
///
/// impl ComponentPostProcessor for CountingHook {
///     fn order(&self) -> HookOrder {
///         HookOrder::Ordered(10)
///     }
///
///     fn after_initialization(&self, instance: Instance, _name: &str) -> Result<Flow<Instance>, BoxError> {
///         self.initialized.fetch_add(1, Ordering::SeqCst);
///         Ok(Flow::Continue(instance))
///     }
/// }
/// ```
#[allow(unused_variables)]
pub trait ComponentPostProcessor: Send + Sync {
    fn order(&self) -> HookOrder {
        HookOrder::Unordered
    }

    /// Runs once per merged descriptor, after the first instantiation.
    fn on_merged_descriptor(&self, merged: &MergedDescriptor, name: &str) -> Result<(), BoxError> {
        Ok(())
    }

    /// May return a substitute and skip normal creation entirely.
    fn before_instantiation(
        &self,
        class: Option<&Arc<ComponentClass>>,
        name: &str,
    ) -> Result<Flow<(), Instance>, BoxError> {
        Ok(Flow::Continue(()))
    }

    /// Candidate constructors to autowire through, overriding the defaults.
    fn determine_constructors(
        &self,
        class: &Arc<ComponentClass>,
        name: &str,
    ) -> Result<Option<Vec<Arc<Executable>>>, BoxError> {
        Ok(None)
    }

    /// `ShortCircuit` skips property population.
    fn after_instantiation(&self, instance: &Instance, name: &str) -> Result<Flow<()>, BoxError> {
        Ok(Flow::Continue(()))
    }

    /// May replace the property values; `ShortCircuit` stops later hooks.
    fn process_properties(
        &self,
        properties: PropertyValues,
        instance: &Instance,
        name: &str,
    ) -> Result<Flow<PropertyValues>, BoxError> {
        Ok(Flow::Continue(properties))
    }

    /// Reference handed to components that close a circular dependency.
    fn early_reference(&self, instance: Instance, name: &str) -> Result<Instance, BoxError> {
        Ok(instance)
    }

    fn before_initialization(&self, instance: Instance, name: &str) -> Result<Flow<Instance>, BoxError> {
        Ok(Flow::Continue(instance))
    }

    /// The only point where a hook may wrap the final instance.
    fn after_initialization(&self, instance: Instance, name: &str) -> Result<Flow<Instance>, BoxError> {
        Ok(Flow::Continue(instance))
    }

    fn requires_destruction(&self, instance: &Instance) -> bool {
        false
    }

    fn before_destruction(&self, instance: &Instance, name: &str) -> Result<(), BoxError> {
        Ok(())
    }

    /// The descriptor named `name` was replaced or removed.
    fn reset_descriptor(&self, name: &str) {}
}

pub(crate) type HookList = Arc<Vec<Arc<dyn ComponentPostProcessor>>>;

/// Ordered hook chain with copy-on-write snapshots.
pub(crate) struct HookRegistry {
    hooks: RwLock<HookList>,
}

fn same_hook(a: &Arc<dyn ComponentPostProcessor>, b: &Arc<dyn ComponentPostProcessor>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl HookRegistry {
    pub(crate) fn new() -> Self {
        Self {
            hooks: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Add a hook; re-adding the same hook moves it to the end of its tier.
    pub(crate) fn add(&self, hook: Arc<dyn ComponentPostProcessor>) {
        let mut guard = self.hooks.write();
        let mut hooks: Vec<_> = guard.iter().filter(|h| !same_hook(h, &hook)).cloned().collect();
        hooks.push(hook);
        // stable: equal keys keep registration order
        hooks.sort_by_key(|h| h.order().sort_key());
        *guard = Arc::new(hooks);
    }

    pub(crate) fn remove(&self, hook: &Arc<dyn ComponentPostProcessor>) -> bool {
        let mut guard = self.hooks.write();
        let before = guard.len();
        let hooks: Vec<_> = guard.iter().filter(|h| !same_hook(h, hook)).cloned().collect();
        let removed = hooks.len() != before;
        *guard = Arc::new(hooks);
        removed
    }

    #[inline]
    pub(crate) fn snapshot(&self) -> HookList {
        Arc::clone(&self.hooks.read())
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.hooks.read().len()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry").field("hooks", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tagged(&'static str, HookOrder);

    impl ComponentPostProcessor for Tagged {
        fn order(&self) -> HookOrder {
            self.1
        }
    }

    #[test]
    fn test_tier_ordering() {
        let registry = HookRegistry::new();
        registry.add(Arc::new(Tagged("u", HookOrder::Unordered)));
        registry.add(Arc::new(Tagged("o2", HookOrder::Ordered(2))));
        registry.add(Arc::new(Tagged("p2", HookOrder::Priority(2))));
        registry.add(Arc::new(Tagged("o1", HookOrder::Ordered(1))));
        registry.add(Arc::new(Tagged("p1", HookOrder::Priority(1))));

        let orders: Vec<HookOrder> = registry.snapshot().iter().map(|h| h.order()).collect();
        assert_eq!(
            orders,
            vec![
                HookOrder::Priority(1),
                HookOrder::Priority(2),
                HookOrder::Ordered(1),
                HookOrder::Ordered(2),
                HookOrder::Unordered,
            ]
        );
    }

    #[test]
    fn test_re_adding_moves_to_end() {
        let registry = HookRegistry::new();
        let first: Arc<dyn ComponentPostProcessor> = Arc::new(Tagged("a", HookOrder::Unordered));
        let second: Arc<dyn ComponentPostProcessor> = Arc::new(Tagged("b", HookOrder::Unordered));
        registry.add(first.clone());
        registry.add(second.clone());
        registry.add(first.clone());

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(same_hook(&snapshot[0], &second));
        assert!(same_hook(&snapshot[1], &first));
    }

    #[test]
    fn test_remove() {
        let registry = HookRegistry::new();
        let hook: Arc<dyn ComponentPostProcessor> = Arc::new(Tagged("a", HookOrder::Unordered));
        registry.add(hook.clone());
        assert!(registry.remove(&hook));
        assert!(!registry.remove(&hook));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_default_flows() {
        let hook = Tagged("a", HookOrder::Unordered);
        let inst = Instance::new(1u8);
        assert!(matches!(hook.after_instantiation(&inst, "x"), Ok(Flow::Continue(()))));
        match hook.after_initialization(inst.clone(), "x") {
            Ok(Flow::Continue(out)) => assert!(out.ptr_eq(&inst)),
            _ => panic!("expected continue"),
        }
        assert!(!hook.requires_destruction(&inst));
    }
}
