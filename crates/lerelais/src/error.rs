use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Handler misconfiguration discovered at first use. Fatal and not retried:
/// every later use of the handler reports the same error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InitError {
    /// A builder step name does not end with exactly one phase name.
    #[error("step `{step}` does not end with a phase name (expected a suffix out of: {expected})")]
    UnknownPhase {
        /// Name of the offending step.
        step: String,
        /// Comma-separated list of valid phase names.
        expected: String,
    },

    /// An external action source could not provide its actions.
    // The field must not be called `source`: thiserror would wire it up
    // as the error's cause, and a String is no error.
    #[error("action source `{source_name}` could not be adapted: {reason}")]
    Source {
        /// Name of the offending source.
        source_name: String,
        /// Why the source failed.
        reason: String,
    },
}

/// Errors surfaced by handler resolution and the dispatch verbs.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler is registered for the request type; raised by the verbs
    /// that require exactly one handler.
    #[error("no handler registered for request `{request_type}`")]
    NoHandler {
        /// The request type that failed to resolve.
        request_type: &'static str,
    },

    /// More than one handler is registered for a verb that requires
    /// exactly one.
    #[error("{count} handlers registered for request `{request_type}`, expected exactly one")]
    MultipleHandlers {
        /// The request type that resolved ambiguously.
        request_type: &'static str,
        /// Number of handlers found.
        count: usize,
    },

    /// A strict verb (`execute`/`execute_optional`) translated a failed
    /// response into this error, carrying the flattened message text.
    #[error("request `{request_type}` failed:\n{messages}")]
    RequestFailed {
        /// The request type whose execution failed.
        request_type: &'static str,
        /// Flattened `complete_text` of every response message.
        messages: String,
    },

    /// Handler misconfiguration surfaced at first use.
    #[error(transparent)]
    Init(#[from] InitError),

    /// An error-phase action itself faulted; the one unrecoverable case.
    #[error("error-phase action `{action}` faulted")]
    ErrorHookFailed {
        /// Name of the faulting error-phase action.
        action: String,
        /// The underlying fault.
        #[source]
        source: anyhow::Error,
    },

    /// A listener was removed that was never registered.
    #[error("listener is not registered for request `{request_type}`")]
    UnknownListener {
        /// The request type the removal targeted.
        request_type: &'static str,
    },
}
