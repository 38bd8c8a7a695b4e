//! Runtime type identity and type-erased component handles
//!
//! There is no reflection to discover what a component is, so every live
//! component travels as an [`Instance`]: a cheaply clonable handle that keeps
//! the original `Arc<T>` and remembers which type it was created as.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Marker trait for types that can be managed by the container.
///
/// This is automatically implemented for all types that are `Send + Sync + 'static`.
/// You never need to implement this manually.
///
/// # Examples
///
/// ```rust
/// // Any type that is Send + Sync + 'static works automatically
/// struct MyService {
///     name: String,
/// }
///
/// // No impl needed - it just works!
/// ```
pub trait Injectable: Send + Sync + 'static {
    /// Returns the key of this type (for internal use)
    #[inline]
    fn type_key_of() -> TypeKey
    where
        Self: Sized,
    {
        TypeKey::of::<Self>()
    }
}

// Blanket implementation - everything that's Send + Sync + 'static is Injectable
impl<T: Send + Sync + 'static> Injectable for T {}

/// Identity of a type, sized or not (`dyn Trait` works too).
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Full type name as reported by the compiler
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Placeholder stored for a factory method or factory bean that produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NullComponent;

/// A live component.
///
/// Holds an `Arc<T>` behind `dyn Any`, so the same object can be handed out
/// as its concrete type or, after a view cast, as one of its trait objects.
/// Identity compares the address of the underlying object, which survives
/// view casts.
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    type_key: TypeKey,
    addr: usize,
}

impl Instance {
    /// Wrap a freshly built value.
    #[inline]
    pub fn new<T: Injectable>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wrap an existing shared value; the instance is typed as `T`.
    pub fn from_arc<T: ?Sized + Send + Sync + 'static>(arc: Arc<T>) -> Self {
        let addr = Arc::as_ptr(&arc) as *const () as usize;
        Self {
            value: Arc::new(arc),
            type_key: TypeKey::of::<T>(),
            addr,
        }
    }

    /// The null component.
    pub fn null() -> Self {
        Self::new(NullComponent)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.type_key.id() == TypeId::of::<NullComponent>()
    }

    /// Type the instance is currently exposed as.
    #[inline]
    pub fn type_key(&self) -> TypeKey {
        self.type_key
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_key.name()
    }

    #[inline]
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.type_key.id() == TypeId::of::<T>()
    }

    /// Typed access. Only succeeds for the exact type the instance is exposed as.
    #[inline]
    pub fn cast<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.downcast_ref::<Arc<T>>().cloned()
    }

    /// Same underlying object, regardless of the exposed type.
    #[inline]
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        self.addr == other.addr
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type", &self.type_key.name())
            .field("addr", &format_args!("{:#x}", self.addr))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Speaker: Send + Sync {
        fn speak(&self) -> String;
    }

    struct Dog;

    impl Speaker for Dog {
        fn speak(&self) -> String {
            "woof".into()
        }
    }

    #[test]
    fn test_type_key_equality() {
        assert_eq!(TypeKey::of::<Dog>(), TypeKey::of::<Dog>());
        assert_ne!(TypeKey::of::<Dog>(), TypeKey::of::<dyn Speaker>());
        assert!(TypeKey::of::<dyn Speaker>().name().contains("Speaker"));
    }

    #[test]
    fn test_instance_cast() {
        let inst = Instance::new(Dog);
        assert!(inst.is::<Dog>());
        assert!(inst.cast::<Dog>().is_some());
        assert!(inst.cast::<String>().is_none());
    }

    #[test]
    fn test_view_keeps_identity() {
        let dog = Arc::new(Dog);
        let concrete = Instance::from_arc(dog.clone());
        let view = Instance::from_arc(dog as Arc<dyn Speaker>);

        assert!(concrete.ptr_eq(&view));
        assert_eq!(view.cast::<dyn Speaker>().map(|s| s.speak()), Some("woof".to_string()));
        assert!(view.cast::<Dog>().is_none());
    }

    #[test]
    fn test_distinct_instances() {
        let a = Instance::new(Dog);
        let b = Instance::new(Dog);
        assert!(!a.ptr_eq(&b));
        assert!(a.ptr_eq(&a.clone()));
    }

    #[test]
    fn test_null_component() {
        assert!(Instance::null().is_null());
        assert!(!Instance::new(Dog).is_null());
    }
}
