use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::sync::{Arc, PoisonError, RwLock};

use lecontrat::Request;
use once_cell::sync::Lazy;

use crate::action::ActionSource;
use crate::handler::Handler;
use crate::listeners::GlobalListenerProvider;
use crate::validation::{SchemaValidator, Validator};

/// A type-erased handler registration: an `Arc<dyn Handler<R>>` together
/// with the `TypeId` of the request type it serves.
#[derive(Clone)]
pub struct BoxedHandler {
    request: TypeId,
    request_type: &'static str,
    handler: Arc<dyn Any + Send + Sync>,
}

impl BoxedHandler {
    /// Erase a handler for request type `R`.
    pub fn new<R: Request>(handler: Arc<dyn Handler<R>>) -> Self {
        Self {
            request: TypeId::of::<R>(),
            request_type: std::any::type_name::<R>(),
            handler: Arc::new(handler),
        }
    }

    /// The request type this registration serves.
    pub fn request(&self) -> TypeId {
        self.request
    }

    /// Human-readable name of the request type, for traces.
    pub fn request_type(&self) -> &'static str {
        self.request_type
    }

    pub(crate) fn downcast<R: Request>(&self) -> Option<Arc<dyn Handler<R>>> {
        self.handler.downcast_ref::<Arc<dyn Handler<R>>>().cloned()
    }

    pub(crate) fn is<R: Request>(&self, handler: &Arc<dyn Handler<R>>) -> bool {
        self.downcast::<R>()
            .is_some_and(|own| Arc::ptr_eq(&own, handler))
    }
}

/// A pluggable origin of handler registrations. The runtime queries every
/// provider in registration order and concatenates their answers.
pub trait HandlerProvider: Send + Sync {
    /// All registrations serving the given request type, in registration
    /// order. A provider decides for itself which type ids it answers.
    fn handlers_for(&self, request: TypeId) -> Vec<BoxedHandler>;
}

/// The execution environment of the pipeline: the validator used by the
/// built-in validation steps, the ordered handler providers, and the
/// globally registered action sources.
pub struct Runtime {
    validator: Arc<dyn Validator>,
    providers: RwLock<Vec<Arc<dyn HandlerProvider>>>,
    global_sources: Vec<Arc<dyn ActionSource>>,
}

static PROCESS_RUNTIME: Lazy<RwLock<Arc<Runtime>>> =
    Lazy::new(|| RwLock::new(Arc::new(Runtime::default())));

thread_local! {
    static SCOPED_RUNTIMES: RefCell<Vec<Arc<Runtime>>> = const { RefCell::new(Vec::new()) };
}

impl Runtime {
    /// Start configuring a runtime.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// The runtime governing the current call path: the innermost scoped
    /// override of this thread if one is active, the process-wide instance
    /// otherwise.
    pub fn current() -> Arc<Runtime> {
        let scoped = SCOPED_RUNTIMES.with(|stack| stack.borrow().last().cloned());
        match scoped {
            Some(runtime) => runtime,
            None => PROCESS_RUNTIME
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    /// Replace the process-wide runtime.
    pub fn install(runtime: Arc<Runtime>) {
        *PROCESS_RUNTIME
            .write()
            .unwrap_or_else(PoisonError::into_inner) = runtime;
    }

    /// Override [`Runtime::current`] for the current thread until the
    /// returned guard is dropped. Restoration is guaranteed, unwinding
    /// included.
    pub fn enter(runtime: Arc<Runtime>) -> RuntimeGuard {
        SCOPED_RUNTIMES.with(|stack| stack.borrow_mut().push(runtime));
        RuntimeGuard { _private: () }
    }

    /// The validator used by the built-in validation steps.
    pub fn validator(&self) -> Arc<dyn Validator> {
        Arc::clone(&self.validator)
    }

    /// Globally registered action sources, composed into every handler.
    pub fn global_sources(&self) -> Vec<Arc<dyn ActionSource>> {
        self.global_sources.clone()
    }

    /// Append a handler provider behind the existing ones.
    pub fn add_provider(&self, provider: Arc<dyn HandlerProvider>) {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(provider);
    }

    /// Drop every added provider, keeping only the default listener
    /// registry.
    pub fn reset_providers(&self) {
        *self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner) = default_providers();
    }

    /// All handlers registered for request type `R`, in provider order.
    /// Registrations a provider hands out for the wrong type are skipped
    /// with a warning.
    pub fn resolve<R: Request>(&self) -> Vec<Arc<dyn Handler<R>>> {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut handlers = Vec::new();
        for provider in providers {
            for boxed in provider.handlers_for(TypeId::of::<R>()) {
                match boxed.downcast::<R>() {
                    Some(handler) => handlers.push(handler),
                    None => tracing::warn!(
                        requested = std::any::type_name::<R>(),
                        registered = boxed.request_type(),
                        "skipping handler registered for a different request type"
                    ),
                }
            }
        }
        handlers
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::builder().build()
    }
}

fn default_providers() -> Vec<Arc<dyn HandlerProvider>> {
    vec![Arc::new(GlobalListenerProvider)]
}

/// Builder for [`Runtime`]. The listener registry is always the first
/// provider; configured providers queue up behind it.
#[derive(Default)]
pub struct RuntimeBuilder {
    validator: Option<Arc<dyn Validator>>,
    providers: Vec<Arc<dyn HandlerProvider>>,
    global_sources: Vec<Arc<dyn ActionSource>>,
}

impl RuntimeBuilder {
    /// Replace the default [`SchemaValidator`].
    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Append a handler provider.
    pub fn provider(mut self, provider: Arc<dyn HandlerProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Register an action source composed into every handler.
    pub fn source(mut self, source: Arc<dyn ActionSource>) -> Self {
        self.global_sources.push(source);
        self
    }

    /// Build the runtime.
    pub fn build(self) -> Runtime {
        let mut providers = default_providers();
        providers.extend(self.providers);
        Runtime {
            validator: self
                .validator
                .unwrap_or_else(|| Arc::new(SchemaValidator)),
            providers: RwLock::new(providers),
            global_sources: self.global_sources,
        }
    }
}

/// Restores the previous [`Runtime::current`] of this thread on drop.
#[must_use = "dropping the guard immediately ends the runtime scope"]
pub struct RuntimeGuard {
    _private: (),
}

impl Drop for RuntimeGuard {
    fn drop(&mut self) {
        SCOPED_RUNTIMES.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}
