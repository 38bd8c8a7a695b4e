//! Creation, circular references, destruction and hooks.

use component_factory::{
    BoxError, ComponentClass, ComponentDescriptor, ComponentPostProcessor, Container, ContainerConfig, DiError,
    DisposableComponent, Executable, FactoryBean, Flow, HookOrder, InitializingComponent, Instance, MapScope,
    ScopeKind, TypeKey, ValueSpec,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

type Log = Arc<Mutex<Vec<String>>>;

// =============================================================================
// Circular references
// =============================================================================

struct Left {
    right: Mutex<Option<Arc<Right>>>,
}

struct Right {
    left: Mutex<Option<Arc<Left>>>,
}

fn register_cycle(container: &Container) {
    container
        .register_descriptor(
            "left",
            ComponentDescriptor::new(
                ComponentClass::builder::<Left>()
                    .constructor(|| Left {
                        right: Mutex::new(None),
                    })
                    .setter("right", |l: &Left, r: Arc<Right>| *l.right.lock() = Some(r))
                    .build(),
            )
            .with_property("right", ValueSpec::reference("right")),
        )
        .unwrap();
    container
        .register_descriptor(
            "right",
            ComponentDescriptor::new(
                ComponentClass::builder::<Right>()
                    .constructor(|| Right { left: Mutex::new(None) })
                    .setter("left", |r: &Right, l: Arc<Left>| *r.left.lock() = Some(l))
                    .build(),
            )
            .with_property("left", ValueSpec::reference("left")),
        )
        .unwrap();
}

#[test]
fn test_circular_singletons_resolve_with_tolerance() {
    let container = Container::new();
    register_cycle(&container);

    let left = container.get_named::<Left>("left").unwrap();
    let right = container.get_named::<Right>("right").unwrap();

    let right_of_left = left.right.lock().clone().unwrap();
    let left_of_right = right.left.lock().clone().unwrap();
    assert!(Arc::ptr_eq(&right_of_left, &right));
    assert!(Arc::ptr_eq(&left_of_right, &left));

    // break the reference cycle
    left.right.lock().take();
    right.left.lock().take();
}

#[test]
fn test_circular_singletons_fail_without_tolerance() {
    let container = Container::with_config(ContainerConfig::default().with_circular_references(false));
    register_cycle(&container);

    let err = container.get_component("left").unwrap_err();
    assert!(err.is_circular(), "{err}");
    assert!(!container.contains_singleton("left"));
    assert!(!container.contains_singleton("right"));
}

#[test]
fn test_circular_constructors_fail() {
    struct Ping(#[allow(dead_code)] Arc<Pong>);
    struct Pong(#[allow(dead_code)] Arc<Ping>);

    let container = Container::new();
    container
        .register_descriptor(
            "ping",
            ComponentDescriptor::new(ComponentClass::builder::<Ping>().constructor(Ping).build()),
        )
        .unwrap();
    container
        .register_descriptor(
            "pong",
            ComponentDescriptor::new(ComponentClass::builder::<Pong>().constructor(Pong).build()),
        )
        .unwrap();

    let err = container.get_component("ping").unwrap_err();
    assert!(err.is_circular(), "{err}");
}

#[test]
fn test_prototype_cycle_detected() {
    struct Node {
        #[allow(dead_code)]
        next: Option<Arc<Node>>,
    }

    let container = Container::new();
    container
        .register_descriptor(
            "node",
            ComponentDescriptor::new(
                ComponentClass::builder::<Node>()
                    .constructor(|next: Arc<Node>| Node { next: Some(next) })
                    .build(),
            )
            .with_arg(ValueSpec::reference("node"))
            .prototype(),
        )
        .unwrap();

    let err = container.get_component("node").unwrap_err();
    assert!(matches!(err.root_cause(), DiError::CircularPrototypeReference { .. }), "{err}");
}

struct Wrapped {
    #[allow(dead_code)]
    inner: Instance,
}

/// Replaces `left` with a wrapper after initialization.
struct Wrapping;

impl ComponentPostProcessor for Wrapping {
    fn after_initialization(&self, instance: Instance, name: &str) -> Result<Flow<Instance>, BoxError> {
        if name == "left" {
            return Ok(Flow::Continue(Instance::new(Wrapped { inner: instance })));
        }
        Ok(Flow::Continue(instance))
    }
}

#[test]
fn test_raw_reference_escape_detected() {
    let container = Container::new();
    container.add_hook(Arc::new(Wrapping));
    register_cycle(&container);

    let err = container.get_component("left").unwrap_err();
    match err.root_cause() {
        DiError::RawReferenceEscaped { name, dependents } => {
            assert_eq!(name, "left");
            assert_eq!(dependents, &vec!["right".to_string()]);
        }
        other => panic!("expected raw reference escape, got {other:?}"),
    }
    assert!(!container.contains_singleton("left"));
}

#[test]
fn test_raw_reference_escape_allowed() {
    let container = Container::with_config(ContainerConfig::default().with_raw_injection_despite_wrapping(true));
    container.add_hook(Arc::new(Wrapping));
    register_cycle(&container);

    let left = container.get_component("left").unwrap();
    assert!(left.is::<Wrapped>());

    let right = container.get_named::<Right>("right").unwrap();
    right.left.lock().take();
}

// =============================================================================
// Scopes and failure handling
// =============================================================================

#[test]
fn test_prototype_and_singleton_identity() {
    struct Item;
    let class = ComponentClass::builder::<Item>().constructor(|| Item).build();

    let container = Container::new();
    container
        .register_descriptor("shared", ComponentDescriptor::new(class.clone()))
        .unwrap();
    container
        .register_descriptor("fresh", ComponentDescriptor::new(class).prototype())
        .unwrap();

    let a = container.get_component("shared").unwrap();
    let b = container.get_component("shared").unwrap();
    assert!(a.ptr_eq(&b));

    let c = container.get_component("fresh").unwrap();
    let d = container.get_component("fresh").unwrap();
    assert!(!c.ptr_eq(&d));
    assert!(container.is_singleton("shared").unwrap());
    assert!(container.is_prototype("fresh").unwrap());
}

#[test]
fn test_failed_singleton_is_evicted_and_retried() {
    static BROKEN: AtomicBool = AtomicBool::new(true);
    static ATTEMPTS: AtomicUsize = AtomicUsize::new(0);

    struct Flaky;

    let container = Container::new();
    container
        .register_descriptor(
            "flaky",
            ComponentDescriptor::new(
                ComponentClass::builder::<Flaky>()
                    .try_constructor(|| -> Result<Flaky, &'static str> {
                        ATTEMPTS.fetch_add(1, Ordering::SeqCst);
                        if BROKEN.load(Ordering::SeqCst) {
                            Err("backend unavailable")
                        } else {
                            Ok(Flaky)
                        }
                    })
                    .build(),
            ),
        )
        .unwrap();

    let err = container.get_component("flaky").unwrap_err();
    assert!(err.to_string().contains("backend unavailable"), "{err}");
    assert!(!container.contains_singleton("flaky"));
    assert_eq!(container.singleton_count(), 0);

    BROKEN.store(false, Ordering::SeqCst);
    let first = container.get_component("flaky").unwrap();
    let second = container.get_component("flaky").unwrap();
    assert!(first.ptr_eq(&second));
    assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 2);
}

#[test]
fn test_failed_dependency_retried_after_fixing_configuration() {
    struct Config {
        port: i64,
    }
    struct Server {
        config: Arc<Config>,
    }

    let config_class = ComponentClass::builder::<Config>()
        .constructor(|port: i64| Config { port })
        .build();

    let container = Container::new();
    container
        .register_descriptor("config", ComponentDescriptor::new(config_class.clone()))
        .unwrap();
    container
        .register_descriptor(
            "server",
            ComponentDescriptor::new(
                ComponentClass::builder::<Server>()
                    .constructor(|config: Arc<Config>| Server { config })
                    .build(),
            ),
        )
        .unwrap();

    assert!(container.get_component("server").is_err());
    assert_eq!(container.singleton_count(), 0);

    container
        .register_descriptor("config", ComponentDescriptor::new(config_class).with_arg(8080i64))
        .unwrap();
    assert_eq!(container.get_named::<Server>("server").unwrap().config.port, 8080);
}

struct Closable {
    label: &'static str,
    log: Log,
}

impl DisposableComponent for Closable {
    fn destroy(&self) -> Result<(), BoxError> {
        self.log.lock().push(format!("destroy {}", self.label));
        Ok(())
    }
}

fn closable(label: &'static str, log: &Log) -> ComponentDescriptor {
    let log = log.clone();
    ComponentDescriptor::new(
        ComponentClass::builder::<Closable>()
            .constructor(move || {
                log.lock().push(format!("create {label}"));
                Closable { label, log: log.clone() }
            })
            .disposable()
            .build(),
    )
}

#[test]
fn test_depends_on_order_and_reverse_destruction() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let container = Container::new();
    container
        .register_descriptor("app", closable("app", &log).depends_on("pool"))
        .unwrap();
    container.register_descriptor("pool", closable("pool", &log)).unwrap();

    container.get_component("app").unwrap();
    assert_eq!(*log.lock(), vec!["create pool", "create app"]);
    assert_eq!(container.dependents_of("pool"), vec!["app".to_string()]);

    container.destroy_singletons();
    assert_eq!(
        *log.lock(),
        vec!["create pool", "create app", "destroy app", "destroy pool"]
    );
    assert_eq!(container.singleton_count(), 0);
}

#[test]
fn test_circular_depends_on_rejected() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let container = Container::new();
    container.register_descriptor("a", closable("a", &log).depends_on("b")).unwrap();
    container.register_descriptor("b", closable("b", &log).depends_on("a")).unwrap();

    assert!(matches!(
        container.get_component("a").unwrap_err().root_cause(),
        DiError::InvalidDescriptor { .. }
    ));
}

#[test]
fn test_destroying_dependency_destroys_dependents_first() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let container = Container::new();
    container
        .register_descriptor("app", closable("app", &log).depends_on("pool"))
        .unwrap();
    container.register_descriptor("pool", closable("pool", &log)).unwrap();
    container.get_component("app").unwrap();

    container.destroy_singleton("pool");
    assert_eq!(
        log.lock().iter().filter(|e| e.starts_with("destroy")).cloned().collect::<Vec<_>>(),
        vec!["destroy app", "destroy pool"]
    );
    assert!(!container.contains_singleton("app"));
}

#[test]
fn test_custom_scope_lifecycle() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let container = Container::new();
    let scope = Arc::new(MapScope::new());
    container.register_scope("session", scope.clone()).unwrap();
    container
        .register_descriptor(
            "cart",
            closable("cart", &log).with_scope(ScopeKind::named("session")),
        )
        .unwrap();

    let a = container.get_component("cart").unwrap();
    let b = container.get_component("cart").unwrap();
    assert!(a.ptr_eq(&b));
    assert_eq!(scope.len(), 1);

    scope.close();
    assert!(scope.is_empty());
    assert_eq!(*log.lock(), vec!["create cart", "destroy cart"]);

    let c = container.get_component("cart").unwrap();
    assert!(!c.ptr_eq(&a));
}

#[test]
fn test_redefinition_marks_merged_descriptor_stale() {
    struct Setting(String);
    let class = ComponentClass::builder::<Setting>()
        .constructor(|value: String| Setting(value))
        .build();

    let container = Container::new();
    container
        .register_descriptor("base", ComponentDescriptor::new(class).with_arg("v1").as_abstract())
        .unwrap();
    container
        .register_descriptor("setting", ComponentDescriptor::child_of("base"))
        .unwrap();

    let before = container.merged_descriptor("setting").unwrap();
    assert_eq!(container.get_named::<Setting>("setting").unwrap().0, "v1");

    let class = ComponentClass::builder::<Setting>()
        .constructor(|value: String| Setting(value))
        .build();
    container
        .register_descriptor("base", ComponentDescriptor::new(class).with_arg("v2").as_abstract())
        .unwrap();

    assert!(before.is_stale());
    assert!(!container.contains_singleton("setting"));
    assert_eq!(container.get_named::<Setting>("setting").unwrap().0, "v2");
}

#[test]
fn test_merge_is_idempotent() {
    struct Plain;
    let container = Container::new();
    container
        .register_descriptor(
            "base",
            ComponentDescriptor::new(ComponentClass::builder::<Plain>().constructor(|| Plain).build())
                .with_order(3)
                .as_abstract(),
        )
        .unwrap();
    container
        .register_descriptor("child", ComponentDescriptor::child_of("base").primary())
        .unwrap();

    let first = container.merged_descriptor("child").unwrap();
    container.clear_metadata_cache();
    let second = container.merged_descriptor("child").unwrap();
    assert_eq!(*first, *second);
    assert!(second.is_primary());
    assert_eq!(second.order(), Some(3));
    assert!(!second.is_abstract());
}

// =============================================================================
// Factory components
// =============================================================================

struct Connection {
    url: String,
}

struct ConnectionFactory {
    url: String,
    produced: AtomicUsize,
}

impl FactoryBean for ConnectionFactory {
    fn get_object(&self) -> Result<Option<Instance>, BoxError> {
        self.produced.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Instance::new(Connection { url: self.url.clone() })))
    }

    fn object_type(&self) -> Option<TypeKey> {
        Some(TypeKey::of::<Connection>())
    }
}

#[test]
fn test_factory_dereference() {
    let container = Container::new();
    container
        .register_descriptor(
            "connection",
            ComponentDescriptor::new(
                ComponentClass::builder::<ConnectionFactory>()
                    .constructor(|url: String| ConnectionFactory {
                        url,
                        produced: AtomicUsize::new(0),
                    })
                    .factory_bean(Some(ComponentClass::of::<Connection>()))
                    .build(),
            )
            .with_arg("tcp://db"),
        )
        .unwrap();

    let a = container.get_named::<Connection>("connection").unwrap();
    let b = container.get_named::<Connection>("connection").unwrap();
    assert_eq!(a.url, "tcp://db");
    assert!(Arc::ptr_eq(&a, &b));

    let factory = container.get_named::<ConnectionFactory>("&connection").unwrap();
    assert_eq!(factory.produced.load(Ordering::SeqCst), 1);

    assert_eq!(container.get::<Connection>().unwrap().url, "tcp://db");
    assert_eq!(container.type_of("connection"), Some(TypeKey::of::<Connection>()));
    assert_eq!(container.type_of("&connection"), Some(TypeKey::of::<ConnectionFactory>()));
}

#[test]
fn test_dereferencing_plain_component_fails() {
    struct Plain;
    let container = Container::new();
    container
        .register_descriptor(
            "plain",
            ComponentDescriptor::new(ComponentClass::builder::<Plain>().constructor(|| Plain).build()),
        )
        .unwrap();
    assert!(matches!(
        container.get_component("&plain"),
        Err(DiError::TypeMismatch { .. })
    ));
}

// =============================================================================
// Hooks
// =============================================================================

struct Recording {
    tag: &'static str,
    order: HookOrder,
    log: Log,
}

impl ComponentPostProcessor for Recording {
    fn order(&self) -> HookOrder {
        self.order
    }

    fn after_initialization(&self, instance: Instance, name: &str) -> Result<Flow<Instance>, BoxError> {
        self.log.lock().push(format!("{} {name}", self.tag));
        Ok(Flow::Continue(instance))
    }
}

/// Stops the after-initialization chain.
struct Stopper;

impl ComponentPostProcessor for Stopper {
    fn order(&self) -> HookOrder {
        HookOrder::Ordered(0)
    }

    fn after_initialization(&self, instance: Instance, _name: &str) -> Result<Flow<Instance>, BoxError> {
        Ok(Flow::ShortCircuit(instance))
    }
}

fn plain_descriptor() -> ComponentDescriptor {
    struct Plain;
    ComponentDescriptor::new(ComponentClass::builder::<Plain>().constructor(|| Plain).build())
}

#[test]
fn test_hook_ordering() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let container = Container::new();
    for (tag, order) in [
        ("unordered", HookOrder::Unordered),
        ("ordered", HookOrder::Ordered(1)),
        ("priority", HookOrder::Priority(1)),
    ] {
        container.add_hook(Arc::new(Recording {
            tag,
            order,
            log: log.clone(),
        }));
    }
    container.register_descriptor("plain", plain_descriptor()).unwrap();
    container.get_component("plain").unwrap();

    assert_eq!(
        *log.lock(),
        vec!["priority plain", "ordered plain", "unordered plain"]
    );
    assert_eq!(container.hook_count(), 3);
}

#[test]
fn test_hook_short_circuit_stops_chain() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let container = Container::new();
    container.add_hook(Arc::new(Recording {
        tag: "first",
        order: HookOrder::Priority(0),
        log: log.clone(),
    }));
    container.add_hook(Arc::new(Stopper));
    container.add_hook(Arc::new(Recording {
        tag: "never",
        order: HookOrder::Unordered,
        log: log.clone(),
    }));
    container.register_descriptor("plain", plain_descriptor()).unwrap();
    container.get_component("plain").unwrap();

    assert_eq!(*log.lock(), vec!["first plain"]);
}

#[test]
fn test_after_instantiation_skips_population() {
    struct Skip;
    impl ComponentPostProcessor for Skip {
        fn after_instantiation(&self, _instance: &Instance, _name: &str) -> Result<Flow<()>, BoxError> {
            Ok(Flow::ShortCircuit(()))
        }
    }

    struct Holder {
        value: Mutex<String>,
    }

    let container = Container::new();
    container.add_hook(Arc::new(Skip));
    container
        .register_descriptor(
            "holder",
            ComponentDescriptor::new(
                ComponentClass::builder::<Holder>()
                    .constructor(|| Holder {
                        value: Mutex::new("unset".into()),
                    })
                    .setter("value", |h: &Holder, v: String| *h.value.lock() = v)
                    .build(),
            )
            .with_property("value", "set"),
        )
        .unwrap();

    assert_eq!(*container.get_named::<Holder>("holder").unwrap().value.lock(), "unset");
}

#[test]
fn test_eager_pre_instantiation() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let container = Container::new();
    container.register_descriptor("eager", closable("eager", &log)).unwrap();
    container
        .register_descriptor("lazy", closable("lazy", &log).lazy(true))
        .unwrap();
    container
        .register_descriptor("proto", closable("proto", &log).prototype())
        .unwrap();

    container.pre_instantiate_singletons().unwrap();
    assert_eq!(*log.lock(), vec!["create eager"]);
    assert_eq!(container.singleton_names(), vec!["eager".to_string()]);
}

// =============================================================================
// Factory-method products
// =============================================================================

static POOL_INIT: AtomicUsize = AtomicUsize::new(0);
static POOL_DESTROY: AtomicUsize = AtomicUsize::new(0);
static POOLS_DESTROY: AtomicUsize = AtomicUsize::new(0);

struct Pool;

impl InitializingComponent for Pool {
    fn after_properties_set(&self) -> Result<(), BoxError> {
        POOL_INIT.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl DisposableComponent for Pool {
    fn destroy(&self) -> Result<(), BoxError> {
        POOL_DESTROY.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Pools;

impl DisposableComponent for Pools {
    fn destroy(&self) -> Result<(), BoxError> {
        POOLS_DESTROY.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_factory_method_product_lifecycle_uses_product_class() {
    let pool = ComponentClass::builder::<Pool>().initializing().disposable().build();
    let pools = ComponentClass::builder::<Pools>()
        .disposable()
        .with_factory_method(Executable::static_factory("create", || Pool).returning(pool))
        .build();

    let container = Container::new();
    container
        .register_descriptor("pool", ComponentDescriptor::new(pools).with_factory_method("create"))
        .unwrap();

    let _pool = container.get_named::<Pool>("pool").unwrap();
    assert_eq!(POOL_INIT.load(Ordering::SeqCst), 1);

    container.destroy_singletons();
    assert_eq!(POOL_DESTROY.load(Ordering::SeqCst), 1);
    assert_eq!(POOLS_DESTROY.load(Ordering::SeqCst), 0);
}
