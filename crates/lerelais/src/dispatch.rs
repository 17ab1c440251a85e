use std::sync::Arc;

use lecontrat::{Message, Request, RequestBase};

use crate::error::{DispatchError, Result};
use crate::handler::Handler;
use crate::runtime::Runtime;

/// Dispatch verbs available on every request type. Handlers are resolved
/// through [`Runtime::current`] at call time.
pub trait Dispatch: Request + Sized {
    /// Check whether the request could be executed, without executing it.
    /// Requires exactly one registered handler.
    fn evaluate(&mut self) -> Result<()> {
        let handler = single_handler::<Self>()?;
        trace_verb::<Self>("evaluate", self.id());
        handler.evaluate(self)
    }

    /// Execute the request. Requires exactly one registered handler; a
    /// soft failure is only visible on the response.
    fn try_execute(&mut self) -> Result<()> {
        let handler = single_handler::<Self>()?;
        trace_verb::<Self>("try_execute", self.id());
        handler.execute(self)
    }

    /// Like [`Dispatch::try_execute`], but a missing handler is legal: the
    /// request comes back without a new response and `Ok(false)`.
    fn try_execute_optional(&mut self) -> Result<bool> {
        let Some(handler) = optional_handler::<Self>()? else {
            return Ok(false);
        };
        trace_verb::<Self>("try_execute_optional", self.id());
        handler.execute(self)?;
        Ok(true)
    }

    /// Execute the request and turn a failed response into an error
    /// carrying the flattened message text.
    fn execute(&mut self) -> Result<()> {
        self.try_execute()?;
        fail_on_failed_response(self)
    }

    /// Like [`Dispatch::execute`], but a missing handler is legal.
    fn execute_optional(&mut self) -> Result<bool> {
        if !self.try_execute_optional()? {
            return Ok(false);
        }
        fail_on_failed_response(self)?;
        Ok(true)
    }

    /// Execute the request against every registered handler in resolution
    /// order, one response per handler. Soft failures of individual
    /// handlers do not error. Returns the number of handlers run.
    fn call(&mut self) -> Result<usize> {
        let handlers = Runtime::current().resolve::<Self>();
        trace_verb::<Self>("call", self.id());
        let count = handlers.len();
        for handler in handlers {
            handler.execute(self)?;
        }
        Ok(count)
    }
}

impl<R: Request> Dispatch for R {}

fn trace_verb<R: Request>(verb: &str, id: impl std::fmt::Display) {
    tracing::debug!(
        verb,
        request_type = std::any::type_name::<R>(),
        request = %id,
        "dispatching request"
    );
}

fn single_handler<R: Request>() -> Result<Arc<dyn Handler<R>>> {
    match optional_handler::<R>()? {
        Some(handler) => Ok(handler),
        None => Err(DispatchError::NoHandler {
            request_type: std::any::type_name::<R>(),
        }),
    }
}

fn optional_handler<R: Request>() -> Result<Option<Arc<dyn Handler<R>>>> {
    let handlers = Runtime::current().resolve::<R>();
    match handlers.len() {
        0 => Ok(None),
        1 => Ok(handlers.into_iter().next()),
        count => Err(DispatchError::MultipleHandlers {
            request_type: std::any::type_name::<R>(),
            count,
        }),
    }
}

fn fail_on_failed_response<R: Request>(request: &R) -> Result<()> {
    let Some(meta) = RequestBase::meta(request) else {
        return Ok(());
    };
    if !meta.has_failed() {
        return Ok(());
    }
    let messages = meta
        .messages()
        .iter()
        .map(Message::complete_text)
        .collect::<Vec<_>>()
        .join("\n");
    Err(DispatchError::RequestFailed {
        request_type: std::any::type_name::<R>(),
        messages,
    })
}
