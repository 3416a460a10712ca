//! Deterministic checks on agent output.
//!
//! Issues come out ordered by card, then by rule, so the repair prompt built
//! from them is reproducible.

use std::fmt;

use serde_json::Value;

use super::{
    models::CardCandidate,
    utils::JapaneseText,
};

pub const KANA_FIELD: &str = "Hiragana/Katakana";
pub const EXAMPLE_KANA_FIELD: &str = "Example sentence hiragana/katakana";
pub const EXAMPLE_KANJI_FIELD: &str = "Example sentence kanji";
pub const EXAMPLE_TRANSLATION_FIELD: &str = "Example sentence translation";

pub const KANA_ONLY_FIELDS: [&str; 2] = [KANA_FIELD, EXAMPLE_KANA_FIELD];
pub const EXAMPLE_FIELDS: [&str; 3] =
    [EXAMPLE_KANA_FIELD, EXAMPLE_KANJI_FIELD, EXAMPLE_TRANSLATION_FIELD];
pub const TERMINATED_FIELDS: [&str; 2] = [EXAMPLE_KANA_FIELD, EXAMPLE_KANJI_FIELD];
pub const REQUIRED_NON_EMPTY_FIELDS: [&str; 3] = [KANA_FIELD, "English", "Dutch"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationRule {
    KanjiInKanaField,
    MissingTerminator,
    ExampleInconsistent,
    MissingField,
    EmptyField,
    NonStringField,
    MalformedTags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// 1-based position in the batch.
    pub card: usize,
    pub rule: ValidationRule,
    pub field: Option<String>,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Card {}: {}", self.card, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }

    pub fn into_parts(self) -> (bool, Vec<String>) {
        (self.is_valid(), self.messages())
    }
}

struct CardChecker<'a> {
    index: usize,
    issues: &'a mut Vec<ValidationIssue>,
}

impl CardChecker<'_> {
    fn push(&mut self, rule: ValidationRule, field: Option<&str>, message: String) {
        self.issues.push(ValidationIssue {
            card: self.index,
            rule,
            field: field.map(str::to_string),
            message,
        });
    }
}

pub fn validate_card(
    candidate: &CardCandidate,
    required_fields: &[String],
    index: usize,
    issues: &mut Vec<ValidationIssue>,
) {
    let mut check = CardChecker { index, issues };

    for field in KANA_ONLY_FIELDS {
        let value = candidate.field_text(field);
        if value.has_kanji() {
            check.push(
                ValidationRule::KanjiInKanaField,
                Some(field),
                format!("Field '{field}' contains kanji but should be kana-only: '{value}'"),
            );
        }
    }

    let filled = EXAMPLE_FIELDS.map(|field| !candidate.field_text(field).trim().is_empty());
    let all_empty = filled.iter().all(|f| !f);
    let all_filled = filled.iter().all(|f| *f);
    if !all_empty && !all_filled {
        check.push(
            ValidationRule::ExampleInconsistent,
            None,
            "Example sentence fields must be either all empty (sentence card) or all filled (word/phrase card)"
                .to_string(),
        );
    }

    for field in TERMINATED_FIELDS {
        let value = candidate.field_text(field).trim();
        if !value.is_empty() && !value.ends_with_terminator() {
            check.push(
                ValidationRule::MissingTerminator,
                Some(field),
                format!("Field '{field}' should end with 。: '{value}'"),
            );
        }
    }

    for field in required_fields {
        if !candidate.has_field(field) {
            check.push(
                ValidationRule::MissingField,
                Some(field),
                format!("Missing required field: '{field}'"),
            );
        }
    }

    for field in REQUIRED_NON_EMPTY_FIELDS {
        let already_missing =
            !candidate.has_field(field) && required_fields.iter().any(|f| f == field);
        if !already_missing && candidate.field_text(field).trim().is_empty() {
            check.push(
                ValidationRule::EmptyField,
                Some(field),
                format!("Required field '{field}' is empty or whitespace-only"),
            );
        }
    }

    // The text rules above read anything but a string as empty.
    for (field, value) in candidate.fields().into_iter().flatten() {
        if !(value.is_string() || value.is_null()) {
            check.push(
                ValidationRule::NonStringField,
                Some(field.as_str()),
                format!("Field '{field}' must be a string"),
            );
        }
    }

    match candidate.tags().and_then(Value::as_array) {
        None => {
            check.push(ValidationRule::MalformedTags, None, "'tags' must be a list".to_string())
        }
        Some(tags) if !tags.iter().all(Value::is_string) => check.push(
            ValidationRule::MalformedTags,
            None,
            "'tags' must be a list of strings".to_string(),
        ),
        Some(_) => {}
    }
}

pub fn validate_batch(candidates: &[CardCandidate], required_fields: &[String]) -> ValidationReport {
    let mut issues = Vec::new();
    for (i, candidate) in candidates.iter().enumerate() {
        validate_card(candidate, required_fields, i + 1, &mut issues);
    }
    ValidationReport { issues }
}
