//! # Component Factory - descriptor-driven dependency injection for Rust
//!
//! A bean-factory style container: components are described by
//! [`ComponentDescriptor`]s, merged with their parent descriptors, created
//! through the best matching constructor or factory method, populated,
//! initialized, run through a chain of [`ComponentPostProcessor`] hooks and
//! destroyed in reverse dependency order.
//!
//! ## Features
//!
//! - **Declared metadata** - a [`ComponentClass`] lists constructors, factory
//!   methods, setters, trait views and lifecycle capabilities
//! - **Constructor autowiring** - the greediest satisfiable constructor wins,
//!   ties are broken by a type-difference weight
//! - **Singleton, prototype and custom scopes** with per-name at-most-once creation
//! - **Circular references** between singletons through early references
//! - **Factory components** - `&name` returns the factory, `name` its product
//! - **Hierarchical containers** - children see and may shadow parent descriptors
//! - **Observable** - optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use component_factory::{ComponentClass, ComponentDescriptor, Container};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! let container = Container::new();
//!
//! container
//!     .register_descriptor(
//!         "db",
//!         ComponentDescriptor::new(
//!             ComponentClass::builder::<Database>()
//!                 .constructor(|url: String| Database { url })
//!                 .build(),
//!         )
//!         .with_arg("postgres://localhost"),
//!     )
//!     .unwrap();
//!
//! // The Database parameter is autowired by type
//! container
//!     .register_descriptor(
//!         "users",
//!         ComponentDescriptor::new(
//!             ComponentClass::builder::<UserService>()
//!                 .constructor(|db: Arc<Database>| UserService { db })
//!                 .build(),
//!         ),
//!     )
//!     .unwrap();
//!
//! let users = container.get::<UserService>().unwrap();
//! assert_eq!(users.db.url, "postgres://localhost");
//! assert!(Arc::ptr_eq(&users.db, &container.get_named::<Database>("db").unwrap()));
//! ```
//!
//! ## Scopes
//!
//! ```rust
//! use component_factory::{ComponentClass, ComponentDescriptor, Container, MapScope, ScopeKind};
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::sync::Arc;
//!
//! static COUNTER: AtomicU64 = AtomicU64::new(0);
//!
//! struct RequestId(u64);
//!
//! let class = ComponentClass::builder::<RequestId>()
//!     .constructor(|| RequestId(COUNTER.fetch_add(1, Ordering::SeqCst)))
//!     .build();
//!
//! let container = Container::new();
//! let request = Arc::new(MapScope::new());
//! container.register_scope("request", request.clone()).unwrap();
//!
//! // Fresh instance on every lookup
//! container
//!     .register_descriptor("id", ComponentDescriptor::new(class.clone()).prototype())
//!     .unwrap();
//! // One instance per scope
//! container
//!     .register_descriptor(
//!         "request_id",
//!         ComponentDescriptor::new(class).with_scope(ScopeKind::named("request")),
//!     )
//!     .unwrap();
//!
//! let a = container.get_named::<RequestId>("id").unwrap();
//! let b = container.get_named::<RequestId>("id").unwrap();
//! assert_ne!(a.0, b.0);
//!
//! let r1 = container.get_named::<RequestId>("request_id").unwrap();
//! let r2 = container.get_named::<RequestId>("request_id").unwrap();
//! assert!(Arc::ptr_eq(&r1, &r2));
//! request.close();
//! ```
//!
//! ## Concurrency
//!
//! - Descriptors, merged descriptors and singletons live in `DashMap`s
//! - Singleton creation is serialized by one reentrant lock; reads of
//!   finished singletons never take it
//! - `AHash` for name and `TypeId` keys

mod class;
mod config;
mod constructor;
mod container;
mod context;
mod descriptor;
mod disposal;
mod error;
mod factory;
mod hooks;
mod lifecycle;
#[cfg(feature = "logging")]
pub mod logging;
mod merge;
mod provider;
mod resolver;
mod scope;
mod singleton;
mod storage;
mod value;

pub use class::{
    ComponentClass, ComponentClassBuilder, ConstructorFn, DESTROY_CALLBACK, DisposableComponent, Executable,
    ExecutableKind, INIT_CALLBACK, InitializingComponent, InvokeFn, MethodCallback, MethodFn, NameAware, Parameter,
    Setter, SmartInitializing, TryConstructorFn, View, Visibility,
};
pub use config::ContainerConfig;
pub use container::{Container, WeakContainer};
pub use descriptor::{
    ArgSpec, AutowireMode, ComponentDescriptor, ConstructorArgs, INFER_METHOD, InnerComponent, PropertyValue,
    PropertyValues, Role, ValueSpec,
};
pub use error::{BoxError, DiError, Phase, Result};
pub use factory::{
    FACTORY_PREFIX, FactoryBean, InstanceSupplier, is_factory_dereference, strip_factory_prefix, supplier,
};
pub use hooks::{ComponentPostProcessor, Flow, HookOrder};
pub use merge::{Capabilities, MergedDescriptor};
pub use provider::{Injectable, Instance, NullComponent, TypeKey};
pub use resolver::{DependencyRequirement, ObjectProvider, Provider};
pub use scope::{CustomScope, DestructionCallback, MapScope, PROTOTYPE, SINGLETON, ScopeId, ScopeKind};
pub use value::{Args, Injected, Literal, ParamType, Value};

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ComponentClass, ComponentDescriptor, ComponentPostProcessor, Container, ContainerConfig, DiError, Flow,
        Instance, Provider, Result, ScopeKind, TypeKey, Value, ValueSpec,
    };
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Database {
        url: String,
    }

    struct UserService {
        db: Arc<Database>,
    }

    fn register_database(container: &Container, url: &str) {
        container
            .register_descriptor(
                "db",
                ComponentDescriptor::new(
                    ComponentClass::builder::<Database>()
                        .constructor(|url: String| Database { url })
                        .build(),
                )
                .with_arg(url),
            )
            .unwrap();
    }

    #[test]
    fn test_autowired_constructor() {
        let container = Container::new();
        register_database(&container, "test");
        container
            .register_descriptor(
                "users",
                ComponentDescriptor::new(
                    ComponentClass::builder::<UserService>()
                        .constructor(|db: Arc<Database>| UserService { db })
                        .build(),
                ),
            )
            .unwrap();

        let users = container.get_named::<UserService>("users").unwrap();
        assert_eq!(users.db.url, "test");
    }

    #[test]
    fn test_lazy_singleton() {
        static CREATED: AtomicU32 = AtomicU32::new(0);
        struct LazyService;

        let container = Container::new();
        container
            .register_descriptor(
                "lazy",
                ComponentDescriptor::new(
                    ComponentClass::builder::<LazyService>()
                        .constructor(|| {
                            CREATED.fetch_add(1, Ordering::SeqCst);
                            LazyService
                        })
                        .build(),
                )
                .lazy(true),
            )
            .unwrap();

        container.pre_instantiate_singletons().unwrap();
        assert_eq!(CREATED.load(Ordering::SeqCst), 0);

        let _ = container.get::<LazyService>().unwrap();
        let _ = container.get::<LazyService>().unwrap();
        assert_eq!(CREATED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_override_in_child() {
        let root = Container::new();
        register_database(&root, "production");

        let child = root.child();
        register_database(&child, "test");

        assert_eq!(root.get::<Database>().unwrap().url, "production");
        assert_eq!(child.get::<Database>().unwrap().url, "test");
    }

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;
        let container: Container = Container::new();
        let result: Result<Arc<Database>> = container.get::<Database>();
        assert!(matches!(result, Err(DiError::NoSuchCandidate { .. })));
    }
}
