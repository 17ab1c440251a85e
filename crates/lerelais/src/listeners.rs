use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use lecontrat::Request;
use once_cell::sync::Lazy;

use crate::error::{DispatchError, Result};
use crate::handler::Handler;
use crate::runtime::{BoxedHandler, HandlerProvider};

static GLOBAL: Lazy<Listeners> = Lazy::new(Listeners::new);

thread_local! {
    static LOCAL_SETS: RefCell<Vec<Arc<Listeners>>> = const { RefCell::new(Vec::new()) };
}

/// A handler registry keyed by request type. One process-wide set exists;
/// additional scope-local sets can be layered on top per thread.
pub struct Listeners {
    map: RwLock<HashMap<TypeId, Vec<BoxedHandler>>>,
}

impl Listeners {
    fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static Listeners {
        &GLOBAL
    }

    /// Create a registry visible only to the current thread until the
    /// returned scope is dropped. The default provider serves its entries
    /// after the global ones.
    pub fn local_scope() -> ListenerScope {
        let set = Arc::new(Listeners::new());
        LOCAL_SETS.with(|sets| sets.borrow_mut().push(Arc::clone(&set)));
        ListenerScope { set }
    }

    /// Register a handler for request type `R`.
    pub fn add<R: Request>(&self, handler: Arc<dyn Handler<R>>) {
        self.map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(TypeId::of::<R>())
            .or_default()
            .push(BoxedHandler::new(handler));
    }

    /// Remove a previously registered handler, matched by identity.
    pub fn remove<R: Request>(&self, handler: &Arc<dyn Handler<R>>) -> Result<()> {
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        let entries = map.get_mut(&TypeId::of::<R>());
        if let Some(entries) = entries {
            if let Some(index) = entries.iter().position(|boxed| boxed.is(handler)) {
                entries.remove(index);
                return Ok(());
            }
        }
        Err(DispatchError::UnknownListener {
            request_type: std::any::type_name::<R>(),
        })
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Registrations for the given request type, in registration order.
    pub fn handlers_for(&self, request: TypeId) -> Vec<BoxedHandler> {
        self.map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request)
            .cloned()
            .unwrap_or_default()
    }
}

/// A thread-scoped listener set removed from the lookup path on drop.
#[must_use = "dropping the scope immediately removes its listeners"]
pub struct ListenerScope {
    set: Arc<Listeners>,
}

impl std::ops::Deref for ListenerScope {
    type Target = Listeners;

    fn deref(&self) -> &Listeners {
        &self.set
    }
}

impl Drop for ListenerScope {
    fn drop(&mut self) {
        LOCAL_SETS.with(|sets| {
            sets.borrow_mut().retain(|set| !Arc::ptr_eq(set, &self.set));
        });
    }
}

/// The default handler provider: serves the global registry first, then
/// every listener scope active on the current thread, oldest first.
pub struct GlobalListenerProvider;

impl HandlerProvider for GlobalListenerProvider {
    fn handlers_for(&self, request: TypeId) -> Vec<BoxedHandler> {
        let mut handlers = Listeners::global().handlers_for(request);
        LOCAL_SETS.with(|sets| {
            for set in sets.borrow().iter() {
                handlers.extend(set.handlers_for(request));
            }
        });
        handlers
    }
}
