//! lecontrat - Request/Response Contracts
//!
//! *Le Contrat* (The Contract) - Data carriers exchanged with the LeRelais
//! execution pipeline: severity-leveled message trees, response metadata with
//! derived outcome states, the request envelope with its response history,
//! and the declarative field-rule schema used by validation.

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

mod message;
mod request;
mod response;
mod schema;

pub use message::{categories, Message, Severity};
pub use request::{Envelope, Request, RequestBase};
pub use response::{Response, ResponseMeta};
pub use schema::{FieldCheck, Rule, Schema, Validate};
