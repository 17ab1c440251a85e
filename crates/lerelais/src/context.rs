use std::any::Any;

use lecontrat::{Message, Validate};

/// A state-bag entry that carries its own validation schema; the pre/post
/// state-validation steps check every such entry.
trait ValidatedState: Validate + Send {
    fn as_validate(&self) -> &dyn Validate;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Validate + Send + 'static> ValidatedState for T {
    fn as_validate(&self) -> &dyn Validate {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

enum Slot {
    Plain(Box<dyn Any + Send>),
    Validated(Box<dyn ValidatedState>),
}

impl Slot {
    fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            Slot::Plain(value) => value.downcast_ref(),
            Slot::Validated(value) => value.as_any().downcast_ref(),
        }
    }

    fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        match self {
            Slot::Plain(value) => value.downcast_mut(),
            Slot::Validated(value) => value.as_any_mut().downcast_mut(),
        }
    }

    fn into_downcast<T: 'static>(self) -> Option<T> {
        let any = match self {
            Slot::Plain(value) => value as Box<dyn Any>,
            Slot::Validated(value) => value.into_any(),
        };
        any.downcast().ok().map(|boxed| *boxed)
    }
}

/// Per-call scratch space, created fresh for every `execute`/`evaluate`
/// call and dropped when it returns. Actions of one call share state only
/// through this object; nothing is kept on the handler between calls.
pub struct CallContext {
    span: tracing::Span,
    last_action: Option<String>,
    fault: Option<anyhow::Error>,
    suppressed: Vec<Message>,
    state: Vec<(&'static str, Slot)>,
}

impl CallContext {
    /// Create a context attached to the given trace span.
    pub fn new(span: tracing::Span) -> Self {
        Self {
            span,
            last_action: None,
            fault: None,
            suppressed: Vec::new(),
            state: Vec::new(),
        }
    }

    /// The trace span of the call.
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Name of the main-sequence action that ran last. Exit and error
    /// actions never overwrite it, so after a fault it still names the
    /// faulting action.
    pub fn last_action(&self) -> Option<&str> {
        self.last_action.as_deref()
    }

    pub(crate) fn record_action(&mut self, name: &str) {
        self.last_action = Some(name.to_owned());
    }

    /// The fault that aborted the call, if any; available to error-phase
    /// actions.
    pub fn fault(&self) -> Option<&anyhow::Error> {
        self.fault.as_ref()
    }

    pub(crate) fn set_fault(&mut self, fault: anyhow::Error) {
        self.fault = Some(fault);
    }

    /// Validation findings removed on the caller's request, in the order
    /// they were produced.
    pub fn suppressed(&self) -> &[Message] {
        &self.suppressed
    }

    pub(crate) fn retain_suppressed(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.suppressed.extend(messages);
    }

    /// Store a value under `key`, replacing any previous entry.
    pub fn set_state<T: Any + Send>(&mut self, key: &'static str, value: T) {
        self.insert(key, Slot::Plain(Box::new(value)));
    }

    /// Store a value whose schema the pre/post state-validation steps will
    /// check, replacing any previous entry under `key`.
    pub fn set_validated_state<T: Validate + Send + 'static>(&mut self, key: &'static str, value: T) {
        self.insert(key, Slot::Validated(Box::new(value)));
    }

    fn insert(&mut self, key: &'static str, slot: Slot) {
        if let Some(entry) = self.state.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = slot;
        } else {
            self.state.push((key, slot));
        }
    }

    /// The value stored under `key`, if present with type `T`.
    pub fn state<T: 'static>(&self, key: &str) -> Option<&T> {
        self.state
            .iter()
            .find(|(k, _)| *k == key)
            .and_then(|(_, slot)| slot.downcast_ref())
    }

    /// Mutable access to the value stored under `key`.
    pub fn state_mut<T: 'static>(&mut self, key: &str) -> Option<&mut T> {
        self.state
            .iter_mut()
            .find(|(k, _)| *k == key)
            .and_then(|(_, slot)| slot.downcast_mut())
    }

    /// Remove and return the value stored under `key`. The entry is removed
    /// even if the stored type is not `T`.
    pub fn take_state<T: 'static>(&mut self, key: &str) -> Option<T> {
        let index = self.state.iter().position(|(k, _)| *k == key)?;
        self.state.remove(index).1.into_downcast()
    }

    /// The validated entries of the state bag, in insertion order.
    pub(crate) fn validated_states(&self) -> impl Iterator<Item = (&'static str, &dyn Validate)> {
        self.state.iter().filter_map(|(key, slot)| match slot {
            Slot::Validated(value) => Some((*key, value.as_validate())),
            Slot::Plain(_) => None,
        })
    }
}
