use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Outcome metadata shared by every response type: the ordered message list
/// plus the `executed`/`failed` flags and the states derived from them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMeta {
    messages: Vec<Message>,
    executed: bool,
    failed: bool,
}

impl ResponseMeta {
    /// Messages attached so far, in attachment order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Append one message.
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append several messages, preserving their order.
    pub fn add_messages(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    /// Whether the business-logic phase was reached.
    pub fn executed(&self) -> bool {
        self.executed
    }

    /// Latch the executed flag; never cleared within an execution.
    pub fn mark_executed(&mut self) {
        self.executed = true;
    }

    /// Whether the outcome is unsuccessful.
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Latch the failed flag; never cleared within an execution.
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    /// The request was checked for executability and found valid.
    pub fn evaluated_with_success(&self) -> bool {
        !self.executed && !self.failed
    }

    /// The request ran its business logic and succeeded.
    pub fn executed_with_success(&self) -> bool {
        self.executed && !self.failed
    }

    /// Whether any attached message (including nested ones) satisfies
    /// `predicate`.
    pub fn contains_message(&self, predicate: &dyn Fn(&Message) -> bool) -> bool {
        self.messages.iter().any(|m| m.matches(predicate))
    }

    /// Whether any attached message carries the given source id.
    pub fn contains_source_id(&self, source_id: &str) -> bool {
        self.contains_message(&|m| m.source_id == source_id)
    }
}

/// A response produced by one handler execution. Application response types
/// embed a [`ResponseMeta`] next to their payload fields.
pub trait Response: Default + Any + Send {
    /// Outcome metadata.
    fn meta(&self) -> &ResponseMeta;
    /// Mutable outcome metadata.
    fn meta_mut(&mut self) -> &mut ResponseMeta;
}
