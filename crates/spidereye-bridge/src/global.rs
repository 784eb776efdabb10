// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Handlers registered for every bridge of the process.
//
// A registry subscribes while holding the same lock that `add` takes, and the
// snapshot replay happens under that lock too. A handler added concurrently
// is therefore either in the snapshot or published to the new subscriber,
// never both and never neither.

use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError, Weak};

use spidereye_core::error::{BridgeError, Result};
use tracing::{info, warn};

use crate::registry::{ApiRegistry, BridgeObject};

type Register = Arc<dyn Fn(&ApiRegistry) -> Result<()> + Send + Sync>;

struct GlobalHandler {
    root: String,
    register: Register,
}

#[derive(Default)]
struct State {
    handlers: Vec<GlobalHandler>,
    subscribers: Vec<Weak<ApiRegistry>>,
}

static SHARED: LazyLock<Arc<GlobalHandlers>> = LazyLock::new(|| Arc::new(GlobalHandlers::new()));

/// Process-wide handler list with live fan-out to subscribed registries.
#[derive(Default)]
pub struct GlobalHandlers {
    state: Mutex<State>,
}

impl GlobalHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// The instance bridges use unless built with their own.
    pub fn shared() -> Arc<Self> {
        SHARED.clone()
    }

    /// Add a handler instance to every current and future bridge.
    pub fn add<T: BridgeObject>(&self, handler: Arc<T>) -> Result<()> {
        let register: Register = Arc::new(move |registry: &ApiRegistry| {
            registry.add_instance(None, handler.clone(), false)
        });
        self.publish(T::root_name(), register)
    }

    /// Add a handler type, resolved through each bridge's service provider.
    pub fn add_type<T: BridgeObject>(&self) -> Result<()> {
        let register: Register =
            Arc::new(|registry: &ApiRegistry| registry.add_type::<T>(None, false));
        self.publish(T::root_name(), register)
    }

    fn publish(&self, root: String, register: Register) -> Result<()> {
        let mut state = self.lock();
        if state.handlers.iter().any(|h| h.root == root) {
            return Err(BridgeError::DuplicateHandlerName(root));
        }

        state.subscribers.retain(|weak| weak.strong_count() > 0);
        for registry in state.subscribers.iter().filter_map(Weak::upgrade) {
            // One bridge refusing the handler must not keep it from the others.
            if let Err(e) = register(&registry) {
                warn!(root = %root, error = %e, "global handler rejected by a bridge");
            }
        }

        info!(root = %root, bridges = state.subscribers.len(), "global handler added");
        state.handlers.push(GlobalHandler { root, register });
        Ok(())
    }

    /// Register every known handler on `registry`, then deliver later ones to
    /// it as they are added.
    pub fn subscribe(&self, registry: &Arc<ApiRegistry>) -> Result<()> {
        let mut state = self.lock();
        for handler in &state.handlers {
            (handler.register)(registry)?;
        }
        state.subscribers.push(Arc::downgrade(registry));
        Ok(())
    }

    /// Forget every handler and subscriber. Registries keep what they already have.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.handlers.clear();
        state.subscribers.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
