// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Minimal service container for handlers registered by type.
//
// Services are keyed by `TypeId`. A singleton is created once per provider;
// a scoped service once per `Scope`, and dropped together with that scope.
// The bridge opens one scope per API call.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use spidereye_core::error::{BridgeError, Result};
use tracing::trace;

use crate::registry::{ApiRegistry, BridgeObject};

type AnyService = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&Scope) -> Result<AnyService> + Send + Sync>;
type HandlerRegistration = Arc<dyn Fn(&ApiRegistry) -> Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    Singleton,
    Scoped,
}

#[derive(Clone)]
struct Registration {
    lifetime: Lifetime,
    factory: Factory,
}

/// Builder for a [`ServiceProvider`].
#[derive(Default)]
pub struct ServiceCollection {
    services: HashMap<TypeId, Registration>,
    handlers: Vec<HandlerRegistration>,
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a singleton created lazily by `factory` on first use.
    pub fn add_singleton<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Scope) -> Result<T> + Send + Sync + 'static,
    {
        self.insert::<T, F>(Lifetime::Singleton, factory)
    }

    /// Register an already-built singleton.
    pub fn add_singleton_instance<T>(&mut self, instance: Arc<T>) -> &mut Self
    where
        T: Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |_| Ok(instance.clone() as AnyService));
        self.services.insert(
            TypeId::of::<T>(),
            Registration {
                lifetime: Lifetime::Singleton,
                factory,
            },
        );
        self
    }

    /// Register a service created once per scope.
    pub fn add_scoped<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Scope) -> Result<T> + Send + Sync + 'static,
    {
        self.insert::<T, F>(Lifetime::Scoped, factory)
    }

    /// Register `T` as a scoped service and as a handler type on every bridge
    /// built with the resulting provider.
    pub fn add_bridge_scoped<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: BridgeObject,
        F: Fn(&Scope) -> Result<T> + Send + Sync + 'static,
    {
        self.add_scoped::<T, F>(factory);
        self.handlers
            .push(Arc::new(|registry: &ApiRegistry| registry.add_type::<T>(None, false)));
        self
    }

    /// Singleton counterpart of [`add_bridge_scoped`](Self::add_bridge_scoped).
    pub fn add_bridge_singleton<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: BridgeObject,
        F: Fn(&Scope) -> Result<T> + Send + Sync + 'static,
    {
        self.add_singleton::<T, F>(factory);
        self.handlers
            .push(Arc::new(|registry: &ApiRegistry| registry.add_type::<T>(None, false)));
        self
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    pub fn build(self) -> Arc<ServiceProvider> {
        Arc::new(ServiceProvider {
            services: self.services,
            handlers: self.handlers,
            singletons: Mutex::new(HashMap::new()),
        })
    }

    fn insert<T, F>(&mut self, lifetime: Lifetime, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Scope) -> Result<T> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |scope| Ok(Arc::new(factory(scope)?) as AnyService));
        self.services
            .insert(TypeId::of::<T>(), Registration { lifetime, factory });
        self
    }
}

/// Resolved service registrations plus the singleton cache.
pub struct ServiceProvider {
    services: HashMap<TypeId, Registration>,
    handlers: Vec<HandlerRegistration>,
    singletons: Mutex<HashMap<TypeId, AnyService>>,
}

impl ServiceProvider {
    pub fn create_scope(self: &Arc<Self>) -> Scope {
        trace!("service scope opened");
        Scope {
            provider: self.clone(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn lifetime_of(&self, type_id: TypeId) -> Option<Lifetime> {
        self.services.get(&type_id).map(|r| r.lifetime)
    }

    /// Register the handler types added through `add_bridge_*` on `registry`.
    pub(crate) fn register_bridge_handlers(&self, registry: &ApiRegistry) -> Result<()> {
        for register in &self.handlers {
            register(registry)?;
        }
        Ok(())
    }

    fn singleton(
        &self,
        type_id: TypeId,
        registration: &Registration,
        scope: &Scope,
    ) -> Result<AnyService> {
        if let Some(existing) = self.lock_singletons().get(&type_id) {
            return Ok(existing.clone());
        }

        // The factory may resolve other services, so it runs without the lock.
        // If two callers race, the first insert wins and both get that instance.
        let created = (registration.factory)(scope)?;
        Ok(self
            .lock_singletons()
            .entry(type_id)
            .or_insert(created)
            .clone())
    }

    fn lock_singletons(&self) -> std::sync::MutexGuard<'_, HashMap<TypeId, AnyService>> {
        self.singletons.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One resolution scope. Scoped instances live as long as the scope does.
pub struct Scope {
    provider: Arc<ServiceProvider>,
    cache: Mutex<HashMap<TypeId, AnyService>>,
}

impl Scope {
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let type_name = std::any::type_name::<T>();
        self.resolve_any(TypeId::of::<T>(), type_name)?
            .downcast::<T>()
            .map_err(|_| BridgeError::ServiceNotRegistered(type_name.to_string()))
    }

    pub(crate) fn resolve_any(&self, type_id: TypeId, type_name: &str) -> Result<AnyService> {
        let registration = self
            .provider
            .services
            .get(&type_id)
            .ok_or_else(|| BridgeError::ServiceNotRegistered(type_name.to_string()))?;

        match registration.lifetime {
            Lifetime::Singleton => self.provider.singleton(type_id, registration, self),
            Lifetime::Scoped => {
                if let Some(existing) = self.lock_cache().get(&type_id) {
                    return Ok(existing.clone());
                }
                let created = (registration.factory)(self)?;
                Ok(self.lock_cache().entry(type_id).or_insert(created).clone())
            }
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<TypeId, AnyService>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        let cached = self.lock_cache().len();
        trace!(cached, "service scope closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Settings {
        greeting: String,
    }

    struct Greeter {
        settings: Arc<Settings>,
    }

    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn scoped_depends_on_singleton() {
        let mut services = ServiceCollection::new();
        services
            .add_singleton(|_| {
                Ok(Settings {
                    greeting: "hello".into(),
                })
            })
            .add_scoped(|scope| {
                Ok(Greeter {
                    settings: scope.resolve::<Settings>()?,
                })
            });
        let provider = services.build();

        let a = provider.create_scope();
        let b = provider.create_scope();
        let ga = a.resolve::<Greeter>().unwrap();
        let ga2 = a.resolve::<Greeter>().unwrap();
        let gb = b.resolve::<Greeter>().unwrap();

        assert!(Arc::ptr_eq(&ga, &ga2));
        assert!(!Arc::ptr_eq(&ga, &gb));
        assert!(Arc::ptr_eq(&ga.settings, &gb.settings));
        assert_eq!(ga.settings.greeting, "hello");
    }

    #[test]
    fn scoped_instances_are_dropped_with_scope() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let counter = dropped.clone();
        let mut services = ServiceCollection::new();
        services.add_scoped(move |_| Ok(Tracked(counter.clone())));
        let provider = services.build();

        {
            let scope = provider.create_scope();
            let instance = scope.resolve::<Tracked>().unwrap();
            drop(instance);
            assert_eq!(dropped.load(Ordering::SeqCst), 0);
        }
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregistered_service() {
        let provider = ServiceCollection::new().build();
        let scope = provider.create_scope();
        match scope.resolve::<Settings>() {
            Err(BridgeError::ServiceNotRegistered(name)) => assert!(name.ends_with("Settings")),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn factory_errors_propagate() {
        let mut services = ServiceCollection::new();
        services.add_scoped::<Settings, _>(|_| Err(BridgeError::Config("missing greeting".into())));
        let scope = services.build().create_scope();
        assert!(matches!(scope.resolve::<Settings>(), Err(BridgeError::Config(_))));
    }

    #[test]
    fn singleton_instance_is_shared() {
        let settings = Arc::new(Settings {
            greeting: "hi".into(),
        });
        let mut services = ServiceCollection::new();
        services.add_singleton_instance(settings.clone());
        let provider = services.build();
        assert_eq!(provider.lifetime_of(TypeId::of::<Settings>()), Some(Lifetime::Singleton));
        let resolved = provider.create_scope().resolve::<Settings>().unwrap();
        assert!(Arc::ptr_eq(&settings, &resolved));
    }
}
