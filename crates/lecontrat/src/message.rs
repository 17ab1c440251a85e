use serde::{Deserialize, Serialize};

/// Well-known message categories attached by the built-in pipeline steps.
pub mod categories {
    /// Message synthesized from an uncaught action fault.
    pub const EXCEPTION: &str = "exception";
    /// Message produced by request/state/response validation.
    pub const VALIDATION: &str = "validation";
}

/// Severity of a [`Message`], ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Diagnostic detail, normally hidden.
    Verbose,
    /// Neutral information for the caller.
    Informational,
    /// A finding the caller should not ignore; fails the response.
    Warning,
    /// An error; fails the response.
    Error,
    /// A critical error; fails the response.
    Critical,
}

impl Severity {
    /// Whether a message at this severity forces the owning response into
    /// the failed state once attached.
    pub fn is_failure(self) -> bool {
        self >= Severity::Warning
    }
}

/// A single finding attached to a response, optionally carrying a tree of
/// nested sub-findings (e.g. one validation head message with one nested
/// entry per offending field).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Severity classification.
    pub severity: Severity,
    /// Human-facing text.
    pub caption: String,
    /// Free-text details (fault chains, diagnostics).
    pub details: Option<String>,
    /// Stable identifier of the finding's origin; suppression matches on it.
    pub source_id: String,
    /// Categories describing the kind of message.
    pub categories: Vec<String>,
    /// Whether the handler declared this finding caller-waivable.
    pub suppressible: bool,
    /// Sub-findings composed under this message.
    pub nested: Vec<Message>,
}

impl Message {
    /// Create an informational message.
    pub fn new(source_id: impl Into<String>, caption: impl Into<String>) -> Self {
        Self {
            severity: Severity::Informational,
            caption: caption.into(),
            details: None,
            source_id: source_id.into(),
            categories: Vec::new(),
            suppressible: false,
            nested: Vec::new(),
        }
    }

    /// Create a warning message.
    pub fn warning(source_id: impl Into<String>, caption: impl Into<String>) -> Self {
        Self::new(source_id, caption).with_severity(Severity::Warning)
    }

    /// Create an error message.
    pub fn error(source_id: impl Into<String>, caption: impl Into<String>) -> Self {
        Self::new(source_id, caption).with_severity(Severity::Error)
    }

    /// Replace the severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Attach detail text.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Append a category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    /// Attach nested sub-findings.
    pub fn with_nested(mut self, nested: Vec<Message>) -> Self {
        self.nested = nested;
        self
    }

    /// Whether this message or any nested message satisfies `predicate`.
    pub fn matches(&self, predicate: &dyn Fn(&Message) -> bool) -> bool {
        predicate(self) || self.nested.iter().any(|nested| nested.matches(predicate))
    }

    /// Render the message and its nested tree as one block of text, used for
    /// traces and for the flattened text of a failed strict dispatch.
    pub fn complete_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("[{:?}:{}]\n", self.severity, self.source_id));
        if !self.categories.is_empty() {
            out.push_str(&format!("({})\n", self.categories.join(",")));
        }
        out.push_str(&self.caption);
        out.push('\n');
        if let Some(details) = &self.details {
            out.push_str(details);
            out.push('\n');
        }
        for nested in &self.nested {
            for (index, line) in nested.complete_text().lines().enumerate() {
                if index == 0 {
                    out.push_str("+---");
                } else {
                    out.push_str("    ");
                }
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }
}
