//! lerelais - Request Execution Pipeline
//!
//! *Le Relais* (The Relay) - Runs a request through a fixed, ordered sequence
//! of phases composed from built-in validation steps, handler-declared steps,
//! and externally registered action sources. Guarantees at-most-one
//! business-logic execution per call, consistent phase ordering regardless of
//! where actions were contributed from, caller-approved suppression of
//! validation findings, and uniform failure handling for soft failures and
//! action faults alike.

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

mod action;
mod compose;
mod context;
mod dispatch;
mod engine;
mod error;
mod handler;
mod listeners;
mod phase;
mod runtime;
mod validation;

pub use action::{ActionDef, ActionSource, GenericAction};
pub use compose::ExecutionPlan;
pub use context::CallContext;
pub use dispatch::Dispatch;
pub use error::{DispatchError, InitError, Result};
pub use handler::{Handler, StepHandler, StepHandlerBuilder};
pub use listeners::{GlobalListenerProvider, ListenerScope, Listeners};
pub use phase::Phase;
pub use runtime::{BoxedHandler, HandlerProvider, Runtime, RuntimeBuilder, RuntimeGuard};
pub use validation::{SchemaValidator, Validator, ILLEGAL_SUPPRESSION_ID};

pub use lecontrat::{
    categories, Envelope, FieldCheck, Message, Request, RequestBase, Response, ResponseMeta, Rule,
    Schema, Severity, Validate,
};
