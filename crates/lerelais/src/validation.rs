use lecontrat::{categories, Message, Rule, Validate};
use regex::Regex;

/// Source id of the warning raised when suppression is requested for a
/// finding the handler never declared suppressible. The warning itself can
/// never be suppressed.
pub const ILLEGAL_SUPPRESSION_ID: &str = "illegal-suppression";

/// Source id of the head message produced by schema validation.
const SCHEMA_SOURCE_ID: &str = "schema";

/// A pluggable validator checking one target object against its declared
/// schema.
pub trait Validator: Send + Sync {
    /// Validate `target`. `None` means valid; otherwise one head message
    /// carrying one nested finding per violated rule.
    fn validate(&self, target: &dyn Validate) -> Option<Message>;
}

/// Default validator evaluating the declarative [`lecontrat::Schema`] rules:
/// required, maximum length, and regex pattern.
#[derive(Debug, Default)]
pub struct SchemaValidator;

impl Validator for SchemaValidator {
    fn validate(&self, target: &dyn Validate) -> Option<Message> {
        let schema = target.schema();
        let mut findings = Vec::new();

        for check in schema.checks() {
            let value = check.value();
            for rule in check.rules() {
                if let Some(finding) = check_rule(check.name(), value, rule) {
                    findings.push(finding);
                }
            }
        }

        if findings.is_empty() {
            return None;
        }
        Some(
            Message::warning(SCHEMA_SOURCE_ID, "The supplied data is not valid.")
                .with_category(categories::VALIDATION)
                .with_nested(findings),
        )
    }
}

fn check_rule(field: &str, value: Option<&str>, rule: &Rule) -> Option<Message> {
    match rule {
        Rule::Required => match value {
            Some(value) if !value.is_empty() => None,
            _ => Some(finding(field, format!("The field `{field}` is required."))),
        },
        Rule::MaxLength(limit) => {
            let length = value.map_or(0, |v| v.chars().count());
            (length > *limit).then(|| {
                finding(
                    field,
                    format!("The field `{field}` exceeds the maximum length of {limit}."),
                )
            })
        }
        Rule::Pattern(pattern) => match Regex::new(pattern) {
            Ok(regex) => {
                let matched = value.map_or(true, |v| regex.is_match(v));
                (!matched).then(|| {
                    finding(
                        field,
                        format!("The field `{field}` does not match the required pattern."),
                    )
                })
            }
            // A broken pattern must surface, not pass silently.
            Err(error) => Some(
                Message::error(
                    field,
                    format!("The pattern declared for field `{field}` is not a valid regular expression."),
                )
                .with_details(error.to_string())
                .with_category(categories::VALIDATION),
            ),
        },
    }
}

fn finding(field: &str, caption: String) -> Message {
    Message::warning(field, caption).with_category(categories::VALIDATION)
}

/// Outcome of folding validation findings against the caller's suppression
/// request.
pub(crate) struct Folded {
    /// Findings that remain and must be attached to the response.
    pub kept: Vec<Message>,
    /// Findings removed on the caller's request, in original order.
    pub suppressed: Vec<Message>,
}

/// Fold `candidates` against the handler's declared suppressible ids and
/// the ids the caller asked to suppress.
///
/// Requested ids the handler never declared add one extra non-suppressible
/// warning. Declared ids mark their findings `suppressible`. Findings both
/// declared and requested move to `suppressed` instead of the response.
pub(crate) fn fold_findings(
    candidates: Vec<Message>,
    omittable: &[String],
    requested: &[String],
) -> Folded {
    let mut candidates = candidates;

    let illegal: Vec<&str> = requested
        .iter()
        .filter(|id| !omittable.contains(id))
        .map(String::as_str)
        .collect();
    if !illegal.is_empty() {
        candidates.push(
            Message::warning(
                ILLEGAL_SUPPRESSION_ID,
                format!(
                    "Suppression was requested for findings that are not suppressible: {}.",
                    illegal.join(", ")
                ),
            )
            .with_category(categories::VALIDATION),
        );
    }

    let mut kept = Vec::new();
    let mut suppressed = Vec::new();
    for mut candidate in candidates {
        let declared =
            candidate.source_id != ILLEGAL_SUPPRESSION_ID && omittable.contains(&candidate.source_id);
        if declared {
            candidate.suppressible = true;
            if requested.contains(&candidate.source_id) {
                suppressed.push(candidate);
                continue;
            }
        }
        kept.push(candidate);
    }

    Folded { kept, suppressed }
}
