/// A single validation rule applied to one field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// The field must carry a non-empty value.
    Required,
    /// The value must not exceed the given number of characters.
    MaxLength(usize),
    /// The value must match the given regular expression.
    Pattern(String),
}

/// One field of a target object together with a snapshot of its value and
/// the rules to check it against.
#[derive(Debug, Clone)]
pub struct FieldCheck {
    name: &'static str,
    value: Option<String>,
    rules: Vec<Rule>,
}

impl FieldCheck {
    /// Declare a field check for `name` over the current `value`.
    pub fn new(name: &'static str, value: Option<String>) -> Self {
        Self {
            name,
            value,
            rules: Vec::new(),
        }
    }

    /// The value must be present and non-empty.
    pub fn required(mut self) -> Self {
        self.rules.push(Rule::Required);
        self
    }

    /// The value must not exceed `limit` characters.
    pub fn max_length(mut self, limit: usize) -> Self {
        self.rules.push(Rule::MaxLength(limit));
        self
    }

    /// The value must match `pattern`.
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.rules.push(Rule::Pattern(pattern.into()));
        self
    }

    /// Field name; doubles as the source id of findings raised for it.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Snapshot of the field value at schema construction.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Rules declared for this field.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

/// Declarative field-rule schema of a validatable object.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    checks: Vec<FieldCheck>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one field check.
    pub fn field(mut self, check: FieldCheck) -> Self {
        self.checks.push(check);
        self
    }

    /// All declared field checks.
    pub fn checks(&self) -> &[FieldCheck] {
        &self.checks
    }
}

/// Implemented by objects the pipeline validates: requests, responses, and
/// per-call state entries. The default schema is empty (always valid).
pub trait Validate {
    /// Declare the field rules for the object's current values.
    fn schema(&self) -> Schema {
        Schema::default()
    }
}
