//! Factory components and instance suppliers
//!
//! A component whose class is a [`FactoryBean`] is not handed out itself:
//! `get("name")` returns the object it produces, `get("&name")` returns the
//! factory.

use crate::error::BoxError;
use crate::provider::{Instance, TypeKey};
use std::sync::Arc;

/// Prefix that asks for a factory component itself rather than its product.
pub const FACTORY_PREFIX: &str = "&";

/// A component that produces another object.
///
/// # Examples
///
/// ```rust
/// use component_factory::{BoxError, FactoryBean, Instance, TypeKey};
///
/// struct Connection {
///     url: String,
/// }
///
/// struct ConnectionFactory {
///     url: String,
/// }
///
/// impl FactoryBean for ConnectionFactory {
///     fn get_object(&self) -> Result<Option<Instance>, BoxError> {
///         Ok(Some(Instance::new(Connection { url: self.url.clone() })))
///     }
///
///     fn object_type(&self) -> Option<TypeKey> {
///         Some(TypeKey::of::<Connection>())
///     }
/// }
/// ```
pub trait FactoryBean: Send + Sync {
    /// Produce the object. `None` yields the null component.
    fn get_object(&self) -> Result<Option<Instance>, BoxError>;

    /// Type of the produced object, if known without producing it.
    fn object_type(&self) -> Option<TypeKey>;

    /// Whether the product is shared (cached) or produced on every request.
    fn is_singleton(&self) -> bool {
        true
    }

    /// Whether eager pre-instantiation should also create the product.
    fn is_eager_init(&self) -> bool {
        false
    }
}

/// Callback that creates an instance directly, bypassing constructor selection.
pub type InstanceSupplier = Arc<dyn Fn() -> Result<Instance, BoxError> + Send + Sync>;

/// Build an [`InstanceSupplier`] from a typed closure.
pub fn supplier<T, F>(f: F) -> InstanceSupplier
where
    T: Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Arc::new(move || Ok(Instance::new(f())))
}

/// Whether `name` asks for the factory itself.
#[inline]
pub fn is_factory_dereference(name: &str) -> bool {
    name.starts_with(FACTORY_PREFIX)
}

/// Strip every leading factory prefix.
#[inline]
pub fn strip_factory_prefix(name: &str) -> &str {
    name.trim_start_matches(FACTORY_PREFIX)
}
