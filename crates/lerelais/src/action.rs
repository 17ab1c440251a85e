use std::fmt;
use std::sync::Arc;

use lecontrat::{Request, RequestBase};

use crate::context::CallContext;
use crate::phase::Phase;

type TypedFn<R> = Arc<dyn Fn(&mut R, &mut CallContext) -> anyhow::Result<()> + Send + Sync>;
type ErasedFn =
    Arc<dyn Fn(&mut dyn RequestBase, &mut CallContext) -> anyhow::Result<()> + Send + Sync>;

/// A named unit of work bound to one phase of a handler's execution chain.
pub struct ActionDef<R> {
    name: String,
    phase: Phase,
    run: TypedFn<R>,
}

// Derived Clone would demand `R: Clone`; requests never are.
impl<R> Clone for ActionDef<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            phase: self.phase,
            run: Arc::clone(&self.run),
        }
    }
}

impl<R: Request> ActionDef<R> {
    /// Define an action. An `Err` returned by `run` is a fault: it aborts
    /// the call and routes into the error phase.
    pub fn new(
        name: impl Into<String>,
        phase: Phase,
        run: impl Fn(&mut R, &mut CallContext) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            phase,
            run: Arc::new(run),
        }
    }

    /// Technical name, used for traces and as the context's "last action".
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position within the execution chain.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn invoke(&self, request: &mut R, ctx: &mut CallContext) -> anyhow::Result<()> {
        (self.run)(request, ctx)
    }
}

impl<R> fmt::Debug for ActionDef<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDef")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

/// A type-erased action contributed by an [`ActionSource`]; it sees the
/// request only through the [`RequestBase`] boundary and is adapted to the
/// handler's request type during composition.
#[derive(Clone)]
pub struct GenericAction {
    name: String,
    phase: Phase,
    run: ErasedFn,
}

impl GenericAction {
    /// Define a type-erased action.
    pub fn new(
        name: impl Into<String>,
        phase: Phase,
        run: impl Fn(&mut dyn RequestBase, &mut CallContext) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            phase,
            run: Arc::new(run),
        }
    }

    /// Technical name of the action.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position within the execution chain.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn adapt<R: Request>(&self) -> ActionDef<R> {
        let run = Arc::clone(&self.run);
        ActionDef::new(
            self.name.clone(),
            self.phase,
            move |request: &mut R, ctx: &mut CallContext| run(request, ctx),
        )
    }
}

impl fmt::Debug for GenericAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericAction")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

/// A source of extra actions, registered either per handler (via the
/// builder) or globally on the [`crate::Runtime`]. A source that cannot
/// provide its actions fails handler composition fast with an
/// initialization error naming it.
pub trait ActionSource: Send + Sync {
    /// Name of the source, used in initialization errors and traces.
    fn name(&self) -> &str;

    /// The actions this source contributes.
    fn actions(&self) -> anyhow::Result<Vec<GenericAction>>;
}
