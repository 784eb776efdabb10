// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// API method registry: page-callable host operations keyed by `Root.method`.
//
// Handler types describe their operations once through `BridgeObject`; each
// operation is erased into an `ApiMethod` whose invoker decodes the JSON
// parameter, runs the handler and encodes the result.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use spidereye_core::error::{BridgeError, HandlerError, Result};
use spidereye_core::types::{normalize_to_js_name, short_type_name};
use tokio::task::JoinError;
use tracing::{debug, info};

use crate::codec::{JsonCodec, JsonCodecExt, SerdeJsonCodec};
use crate::di::ServiceProvider;

/// Result type returned by handler operations.
pub type HandlerResult<T> = std::result::Result<T, HandlerError>;

type Instance = Arc<dyn Any + Send + Sync>;
type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult<Value>> + Send>>;
type Invoker =
    Arc<dyn Fn(Instance, Option<String>, Arc<dyn JsonCodec>) -> HandlerFuture + Send + Sync>;

/// A host type whose operations can be called from the page.
///
/// ```ignore
/// impl BridgeObject for Calculator {
///     fn register_methods(methods: &mut MethodTable<Self>) {
///         methods
///             .method("add", |calc, args: AddArgs| Ok(calc.add(args.a, args.b)))
///             .method_async("slow_square", |calc, x: i64| async move {
///                 calc.slow_square(x).await
///             });
///     }
/// }
/// ```
pub trait BridgeObject: Send + Sync + Sized + 'static {
    /// Root of the page-side names, `Calculator` in `Calculator.add`.
    fn root_name() -> String {
        short_type_name(std::any::type_name::<Self>()).to_string()
    }

    fn register_methods(methods: &mut MethodTable<Self>);
}

/// Operations collected from one [`BridgeObject`].
pub struct MethodTable<T> {
    methods: Vec<MethodSpec>,
    _target: PhantomData<fn() -> T>,
}

struct MethodSpec {
    name: String,
    parameter_type: Option<&'static str>,
    return_type: Option<&'static str>,
    is_async: bool,
    invoker: Invoker,
}

impl<T: BridgeObject> MethodTable<T> {
    fn new() -> Self {
        Self {
            methods: Vec::new(),
            _target: PhantomData,
        }
    }

    fn collect() -> Vec<MethodSpec> {
        let mut table = Self::new();
        T::register_methods(&mut table);
        table.methods
    }

    /// Add a synchronous operation. Use `()` for `P` when it takes no
    /// parameter and for `R` when it returns nothing.
    ///
    /// The handler runs on the blocking thread pool.
    pub fn method<P, R, F>(&mut self, name: &str, handler: F) -> &mut Self
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(&T, P) -> HandlerResult<R> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let invoker = erase(move |instance, parameters, codec| {
            Box::pin(run_blocking::<T, P, R, F>(handler.clone(), instance, parameters, codec))
        });
        self.push::<P, R>(name, false, invoker)
    }

    /// Add an asynchronous operation.
    pub fn method_async<P, R, F, Fut>(&mut self, name: &str, handler: F) -> &mut Self
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(Arc<T>, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<R>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let invoker = erase(move |instance, parameters, codec| {
            Box::pin(run_async::<T, P, R, F, Fut>(handler.clone(), instance, parameters, codec))
        });
        self.push::<P, R>(name, true, invoker)
    }

    fn push<P: 'static, R: 'static>(
        &mut self,
        name: &str,
        is_async: bool,
        invoker: Invoker,
    ) -> &mut Self {
        self.methods.push(MethodSpec {
            name: normalize_to_js_name(name),
            parameter_type: type_tag::<P>(),
            return_type: type_tag::<R>(),
            is_async,
            invoker,
        });
        self
    }
}

fn erase<F>(f: F) -> Invoker
where
    F: Fn(Instance, Option<String>, Arc<dyn JsonCodec>) -> HandlerFuture + Send + Sync + 'static,
{
    Arc::new(f)
}

async fn run_blocking<T, P, R, F>(
    handler: Arc<F>,
    instance: Instance,
    parameters: Option<String>,
    codec: Arc<dyn JsonCodec>,
) -> HandlerResult<Value>
where
    T: Send + Sync + 'static,
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(&T, P) -> HandlerResult<R> + Send + Sync + 'static,
{
    let target = downcast::<T>(instance)?;
    let parameter = decode_parameter::<P>(codec.as_ref(), parameters.as_deref())?;
    let result = tokio::task::spawn_blocking(move || (*handler)(&target, parameter))
        .await
        .map_err(handler_panic)??;
    Ok(serde_json::to_value(result)?)
}

async fn run_async<T, P, R, F, Fut>(
    handler: Arc<F>,
    instance: Instance,
    parameters: Option<String>,
    codec: Arc<dyn JsonCodec>,
) -> HandlerResult<Value>
where
    T: Send + Sync + 'static,
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(Arc<T>, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<R>> + Send + 'static,
{
    let target = downcast::<T>(instance)?;
    let parameter = decode_parameter::<P>(codec.as_ref(), parameters.as_deref())?;
    let result = (*handler)(target, parameter).await?;
    Ok(serde_json::to_value(result)?)
}

fn type_tag<X: 'static>() -> Option<&'static str> {
    if TypeId::of::<X>() == TypeId::of::<()>() {
        None
    } else {
        Some(std::any::type_name::<X>())
    }
}

fn downcast<T: Send + Sync + 'static>(instance: Instance) -> HandlerResult<Arc<T>> {
    instance.downcast::<T>().map_err(|_| {
        HandlerError::msg(format!(
            "handler instance is not a {}",
            std::any::type_name::<T>()
        ))
    })
}

/// Decode the raw parameter. A missing parameter decodes from JSON `null`,
/// so `Option<_>` parameters become `None`; a parameterless operation ignores
/// whatever the page sent.
fn decode_parameter<P>(codec: &dyn JsonCodec, raw: Option<&str>) -> HandlerResult<P>
where
    P: DeserializeOwned + 'static,
{
    match raw {
        Some(text) if TypeId::of::<P>() != TypeId::of::<()>() => Ok(codec.deserialize::<P>(text)?),
        _ => Ok(serde_json::from_value(Value::Null)?),
    }
}

/// Turn a failed handler task into the error reported to the page.
pub(crate) fn handler_panic(err: JoinError) -> HandlerError {
    if !err.is_panic() {
        return HandlerError::msg("handler task was cancelled");
    }
    HandlerError::panicked(panic_message(&*err.into_panic()))
}

/// Text of a panic payload, when it is a string.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> Option<String> {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
}

/// How the receiver of an [`ApiMethod`] is obtained.
#[derive(Clone)]
enum Receiver {
    Instance(Instance),
    /// Resolved from a fresh DI scope for each call.
    Scoped { type_id: TypeId, type_name: &'static str },
}

/// Descriptor of one registered operation. Immutable once registered.
pub struct ApiMethod {
    full_name: String,
    root: String,
    parameter_type: Option<&'static str>,
    return_type: Option<&'static str>,
    is_async: bool,
    receiver: Receiver,
    invoker: Invoker,
}

impl ApiMethod {
    /// `Root.method`, the id the page calls.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn has_parameter(&self) -> bool {
        self.parameter_type.is_some()
    }

    pub fn parameter_type(&self) -> Option<&'static str> {
        self.parameter_type
    }

    pub fn has_return_value(&self) -> bool {
        self.return_type.is_some()
    }

    pub fn return_type(&self) -> Option<&'static str> {
        self.return_type
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn is_scoped(&self) -> bool {
        matches!(self.receiver, Receiver::Scoped { .. })
    }
}

impl std::fmt::Debug for ApiMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiMethod")
            .field("full_name", &self.full_name)
            .field("parameter_type", &self.parameter_type)
            .field("return_type", &self.return_type)
            .field("is_async", &self.is_async)
            .field("scoped", &self.is_scoped())
            .finish()
    }
}

#[derive(Default)]
struct Tables {
    roots: HashSet<String>,
    methods: HashMap<String, Arc<ApiMethod>>,
}

/// Name → descriptor table of one bridge.
///
/// Registration takes the write lock once per root; dispatch clones the
/// `Arc<ApiMethod>` out under the read lock and invokes without holding it.
pub struct ApiRegistry {
    tables: RwLock<Tables>,
    services: Option<Arc<ServiceProvider>>,
    codec: Arc<dyn JsonCodec>,
}

impl ApiRegistry {
    pub fn new(services: Option<Arc<ServiceProvider>>, codec: Arc<dyn JsonCodec>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            services,
            codec,
        }
    }

    pub fn is_dependency_injection_enabled(&self) -> bool {
        self.services.is_some()
    }

    /// Register the operations of an existing handler instance.
    pub fn add_instance<T: BridgeObject>(
        &self,
        root: Option<&str>,
        instance: Arc<T>,
        replace: bool,
    ) -> Result<()> {
        let root = root.map(str::to_string).unwrap_or_else(T::root_name);
        self.add_methods(root, MethodTable::<T>::collect(), Receiver::Instance(instance), replace)
    }

    /// Register a handler type whose instance is resolved from the service
    /// provider on every call.
    pub fn add_type<T: BridgeObject>(&self, root: Option<&str>, replace: bool) -> Result<()> {
        if self.services.is_none() {
            return Err(BridgeError::DependencyInjectionDisabled);
        }
        let root = root.map(str::to_string).unwrap_or_else(T::root_name);
        let receiver = Receiver::Scoped {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        };
        self.add_methods(root, MethodTable::<T>::collect(), receiver, replace)
    }

    fn add_methods(
        &self,
        root: String,
        specs: Vec<MethodSpec>,
        receiver: Receiver,
        replace: bool,
    ) -> Result<()> {
        let mut seen = HashSet::new();
        let methods: Vec<ApiMethod> = specs
            .into_iter()
            .map(|spec| ApiMethod {
                full_name: format!("{root}.{}", spec.name),
                root: root.clone(),
                parameter_type: spec.parameter_type,
                return_type: spec.return_type,
                is_async: spec.is_async,
                receiver: receiver.clone(),
                invoker: spec.invoker,
            })
            .collect();
        for method in &methods {
            if !seen.insert(method.full_name.as_str()) {
                return Err(BridgeError::DuplicateMethodName(method.full_name.clone()));
            }
        }

        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        if tables.roots.contains(&root) && !replace {
            return Err(BridgeError::DuplicateHandlerName(root));
        }
        if !replace {
            if let Some(taken) =
                methods.iter().find(|m| tables.methods.contains_key(&m.full_name))
            {
                return Err(BridgeError::DuplicateMethodName(taken.full_name.clone()));
            }
        }

        let replaced = tables.roots.contains(&root);
        if replaced {
            tables.methods.retain(|_, m| m.root != root);
        }
        let count = methods.len();
        for method in methods {
            debug!(method = %method.full_name, is_async = method.is_async, "api method registered");
            tables.methods.insert(method.full_name.clone(), Arc::new(method));
        }
        tables.roots.insert(root.clone());
        info!(root = %root, methods = count, replaced, "handler registered");
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<ApiMethod>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.methods.get(name).cloned()
    }

    pub fn contains_root(&self, root: &str) -> bool {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.roots.contains(root)
    }

    /// Registered ids, sorted.
    pub fn method_names(&self) -> Vec<String> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = tables.methods.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run `method` with the raw JSON parameter.
    ///
    /// The handler runs in its own task so a panic is reported as a handler
    /// error. A scoped receiver's scope is dropped when the call ends, whatever
    /// the outcome.
    pub async fn invoke(
        &self,
        method: &ApiMethod,
        parameters: Option<String>,
    ) -> HandlerResult<Value> {
        let (instance, scope) = match &method.receiver {
            Receiver::Instance(instance) => (instance.clone(), None),
            Receiver::Scoped { type_id, type_name } => {
                let provider = self
                    .services
                    .as_ref()
                    .ok_or(BridgeError::DependencyInjectionDisabled)?;
                let scope = provider.create_scope();
                let instance = scope.resolve_any(*type_id, type_name)?;
                (instance, Some(scope))
            }
        };

        let call = (method.invoker)(instance, parameters, self.codec.clone());
        let outcome = tokio::spawn(call).await;
        drop(scope);
        outcome.map_err(handler_panic)?
    }
}

impl Default for ApiRegistry {
    fn default() -> Self {
        Self::new(None, Arc::new(SerdeJsonCodec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::ServiceCollection;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Deserialize)]
    struct AddArgs {
        a: i64,
        b: i64,
    }

    struct Calculator;

    impl BridgeObject for Calculator {
        fn register_methods(methods: &mut MethodTable<Self>) {
            methods
                .method("add", |_, args: AddArgs| Ok(args.a + args.b))
                .method("Reset", |_, ()| Ok(()))
                .method("divide", |_, (a, b): (i64, i64)| {
                    if b == 0 {
                        return Err(HandlerError::msg("division by zero"));
                    }
                    Ok(a / b)
                })
                .method_async("square_later", |_, x: i64| async move { Ok(x * x) })
                .method("explode", |_, ()| -> HandlerResult<()> { panic!("kaboom") });
        }
    }

    struct Twice;

    impl BridgeObject for Twice {
        fn register_methods(methods: &mut MethodTable<Self>) {
            methods.method("go", |_, ()| Ok(1)).method("go", |_, ()| Ok(2));
        }
    }

    async fn call(registry: &ApiRegistry, id: &str, params: Option<&str>) -> HandlerResult<Value> {
        let method = registry.resolve(id).expect("registered");
        registry.invoke(&method, params.map(str::to_string)).await
    }

    #[tokio::test]
    async fn descriptors_capture_signature() {
        let registry = ApiRegistry::default();
        registry.add_instance(None, Arc::new(Calculator), false).unwrap();

        assert_eq!(
            registry.method_names(),
            vec![
                "Calculator.add",
                "Calculator.divide",
                "Calculator.explode",
                "Calculator.reset",
                "Calculator.squareLater",
            ]
        );
        let add = registry.resolve("Calculator.add").unwrap();
        assert!(add.has_parameter() && add.has_return_value() && !add.is_async());
        let reset = registry.resolve("Calculator.reset").unwrap();
        assert!(!reset.has_parameter() && !reset.has_return_value());
        assert!(registry.resolve("Calculator.squareLater").unwrap().is_async());
        assert!(registry.resolve("Calculator.nope").is_none());
    }

    #[tokio::test]
    async fn invoke_sync_and_async() {
        let registry = ApiRegistry::default();
        registry.add_instance(None, Arc::new(Calculator), false).unwrap();

        assert_eq!(
            call(&registry, "Calculator.add", Some(r#"{"a":2,"b":3}"#)).await.unwrap(),
            json!(5)
        );
        assert_eq!(call(&registry, "Calculator.squareLater", Some("9")).await.unwrap(), json!(81));
        assert_eq!(
            call(&registry, "Calculator.reset", Some("\"ignored\"")).await.unwrap(),
            Value::Null
        );
    }

    #[tokio::test]
    async fn handler_failures_become_handler_errors() {
        let registry = ApiRegistry::default();
        registry.add_instance(None, Arc::new(Calculator), false).unwrap();

        let err = call(&registry, "Calculator.divide", Some("[1,0]")).await.unwrap_err();
        assert_eq!(err.message(), "division by zero");

        let err = call(&registry, "Calculator.add", Some("not json")).await.unwrap_err();
        assert_eq!(err.type_name(), "Error");
        assert!(err.full_type_name().starts_with("serde_json"));

        let err = call(&registry, "Calculator.add", None).await.unwrap_err();
        assert!(err.message().contains("null"));

        let err = call(&registry, "Calculator.explode", None).await.unwrap_err();
        assert_eq!(err.message(), "handler panicked: kaboom");
    }

    #[test]
    fn panic_payload_text() {
        let formatted: Box<dyn Any + Send> = Box::new(format!("step {}", 3));
        let literal: Box<dyn Any + Send> = Box::new("static text");
        let opaque: Box<dyn Any + Send> = Box::new(17_u8);
        assert_eq!(panic_message(&*formatted).as_deref(), Some("step 3"));
        assert_eq!(panic_message(&*literal).as_deref(), Some("static text"));
        assert_eq!(panic_message(&*opaque), None);
    }

    #[test]
    fn duplicate_root_and_replace() {
        let registry = ApiRegistry::default();
        registry.add_instance(None, Arc::new(Calculator), false).unwrap();
        assert!(matches!(
            registry.add_instance(None, Arc::new(Calculator), false),
            Err(BridgeError::DuplicateHandlerName(root)) if root == "Calculator"
        ));
        registry.add_instance(None, Arc::new(Calculator), true).unwrap();
        assert_eq!(registry.method_names().len(), 5);

        registry.add_instance(Some("Math"), Arc::new(Calculator), false).unwrap();
        assert!(registry.resolve("Math.add").is_some());
    }

    #[test]
    fn duplicate_method_in_one_type() {
        let registry = ApiRegistry::default();
        assert!(matches!(
            registry.add_instance(None, Arc::new(Twice), false),
            Err(BridgeError::DuplicateMethodName(name)) if name == "Twice.go"
        ));
        assert!(!registry.contains_root("Twice"));
    }

    #[test]
    fn type_registration_requires_services() {
        let registry = ApiRegistry::default();
        assert!(matches!(
            registry.add_type::<Calculator>(None, false),
            Err(BridgeError::DependencyInjectionDisabled)
        ));
    }

    struct Session {
        dropped: Arc<AtomicUsize>,
    }

    impl Drop for Session {
        fn drop(&mut self) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl BridgeObject for Session {
        fn register_methods(methods: &mut MethodTable<Self>) {
            methods
                .method("ping", |_, ()| Ok("pong"))
                .method("fail", |_, ()| -> HandlerResult<()> { Err(HandlerError::msg("nope")) });
        }
    }

    #[tokio::test]
    async fn scoped_receiver_is_dropped_after_every_call() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let counter = dropped.clone();
        let mut services = ServiceCollection::new();
        services.add_scoped(move |_| {
            Ok(Session {
                dropped: counter.clone(),
            })
        });
        let registry = ApiRegistry::new(Some(services.build()), Arc::new(SerdeJsonCodec));
        registry.add_type::<Session>(None, false).unwrap();
        assert!(registry.resolve("Session.ping").unwrap().is_scoped());

        assert_eq!(call(&registry, "Session.ping", None).await.unwrap(), json!("pong"));
        assert!(call(&registry, "Session.fail", None).await.is_err());
        assert_eq!(dropped.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn scoped_type_without_service_is_a_handler_error() {
        let registry =
            ApiRegistry::new(Some(ServiceCollection::new().build()), Arc::new(SerdeJsonCodec));
        registry.add_type::<Session>(None, false).unwrap();
        let err = call(&registry, "Session.ping", None).await.unwrap_err();
        assert_eq!(err.type_name(), "BridgeError");
        assert!(err.message().contains("Session"));
    }
}
