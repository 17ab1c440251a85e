use std::any::Any;

use uuid::Uuid;

use crate::response::{Response, ResponseMeta};
use crate::schema::Validate;

/// Request bookkeeping embedded by every concrete request type: a unique
/// identity, the caller-approved suppression ids, and the LIFO history of
/// responses produced by repeated executions.
#[derive(Debug)]
pub struct Envelope<T: Response> {
    id: Uuid,
    suppress: Vec<String>,
    responses: Vec<T>,
}

impl<T: Response> Envelope<T> {
    /// Create an envelope with a fresh identity and no history.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            suppress: Vec::new(),
            responses: Vec::new(),
        }
    }

    /// Unique identity of the request.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Approve suppression of the validation finding with this source id.
    pub fn suppress(&mut self, source_id: impl Into<String>) {
        self.suppress.push(source_id.into());
    }

    /// Source ids the caller approved for suppression.
    pub fn suppressed_ids(&self) -> &[String] {
        &self.suppress
    }

    /// The current (most recently produced) response.
    pub fn response(&self) -> Option<&T> {
        self.responses.last()
    }

    /// Mutable access to the current response.
    pub fn response_mut(&mut self) -> Option<&mut T> {
        self.responses.last_mut()
    }

    /// All responses, most recent first.
    pub fn history(&self) -> impl Iterator<Item = &T> {
        self.responses.iter().rev()
    }

    /// Number of responses produced so far.
    pub fn response_count(&self) -> usize {
        self.responses.len()
    }

    /// Push the response of a new execution; it becomes the current one.
    pub fn push_response(&mut self, response: T) {
        self.responses.push(response);
    }
}

impl<T: Response> Default for Envelope<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Object-safe request boundary used by type-erased pipeline extensions
/// (global action sources) and engine internals. Implemented automatically
/// for every [`Request`].
pub trait RequestBase: Send {
    /// Unique identity of the request.
    fn id(&self) -> Uuid;
    /// Source ids the caller approved for suppression.
    fn suppressed_ids(&self) -> &[String];
    /// Outcome metadata of the current response, if one exists.
    fn meta(&self) -> Option<&ResponseMeta>;
    /// Mutable outcome metadata of the current response, if one exists.
    fn meta_mut(&mut self) -> Option<&mut ResponseMeta>;
    /// Downcast support for typed extensions.
    fn as_any(&self) -> &dyn Any;
    /// Mutable downcast support for typed extensions.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A typed request processed by the pipeline. Implementors embed an
/// [`Envelope`] and expose it; everything else is provided.
pub trait Request: Validate + Send + 'static {
    /// The response type produced per execution.
    type Response: Response + Validate;

    /// The embedded envelope.
    fn envelope(&self) -> &Envelope<Self::Response>;
    /// Mutable access to the embedded envelope.
    fn envelope_mut(&mut self) -> &mut Envelope<Self::Response>;

    /// The current (most recently produced) response.
    fn response(&self) -> Option<&Self::Response> {
        self.envelope().response()
    }

    /// Mutable access to the current response.
    fn response_mut(&mut self) -> Option<&mut Self::Response> {
        self.envelope_mut().response_mut()
    }

    /// Push the response of a new execution onto the history.
    fn push_response(&mut self, response: Self::Response) {
        self.envelope_mut().push_response(response);
    }
}

impl<R: Request> RequestBase for R {
    fn id(&self) -> Uuid {
        self.envelope().id()
    }

    fn suppressed_ids(&self) -> &[String] {
        self.envelope().suppressed_ids()
    }

    fn meta(&self) -> Option<&ResponseMeta> {
        self.envelope().response().map(Response::meta)
    }

    fn meta_mut(&mut self) -> Option<&mut ResponseMeta> {
        self.envelope_mut().response_mut().map(Response::meta_mut)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
