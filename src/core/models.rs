use std::{
    fmt,
    str::FromStr,
};

use indexmap::IndexMap;
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    Map,
    Value,
};

use super::{
    errors::ConfigError,
    CardError,
};

pub const MAX_RAW_INPUT_CHARS: usize = 10_000;
pub const MAX_FIXED_TEXT_CHARS: usize = 2_000;
pub const MAX_TAGS: usize = 50;
pub const MAX_CARD_FIELDS: usize = 50;
pub const MAX_DRAFTS_PER_REQUEST: usize = 100;

const MAX_CONFIG_FIELDS: usize = 50;
const MAX_CONFIG_SOURCES: usize = 20;
const MAX_SOURCE_LABEL_CHARS: usize = 100;
const MAX_SOURCE_TAG_CHARS: usize = 50;
const MAX_TAGS_COLUMN_NAME_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    #[default]
    Word,
    Phrase,
    Sentence,
}

impl CardType {
    pub const ALL: [CardType; 3] = [CardType::Word, CardType::Phrase, CardType::Sentence];

    pub fn as_str(self) -> &'static str {
        match self {
            CardType::Word => "word",
            CardType::Phrase => "phrase",
            CardType::Sentence => "sentence",
        }
    }

    /// Word and phrase cards carry an example sentence, sentence cards do not.
    pub fn has_example_sentence(self) -> bool {
        !matches!(self, CardType::Sentence)
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardType {
    type Err = CardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "word" => Ok(CardType::Word),
            "phrase" => Ok(CardType::Phrase),
            "sentence" => Ok(CardType::Sentence),
            other => Err(CardError::BadInput(format!("unknown card type {other:?}"))),
        }
    }
}

/// One user-submitted seed for a card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftCard {
    pub raw_input: String,
    #[serde(default)]
    pub fixed_english: Option<String>,
    #[serde(default)]
    pub fixed_dutch: Option<String>,
    #[serde(default)]
    pub extra_notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub card_type_override: Option<CardType>,
}

impl DraftCard {
    pub fn new(raw_input: impl Into<String>) -> Self {
        Self { raw_input: raw_input.into(), ..Default::default() }
    }

    pub fn validate(&self) -> Result<(), CardError> {
        check_len("raw_input", &self.raw_input, MAX_RAW_INPUT_CHARS)?;
        for (name, value) in [
            ("fixed_english", &self.fixed_english),
            ("fixed_dutch", &self.fixed_dutch),
            ("extra_notes", &self.extra_notes),
        ] {
            if let Some(value) = value {
                check_len(name, value, MAX_FIXED_TEXT_CHARS)?;
            }
        }
        if self.tags.len() > MAX_TAGS {
            return Err(CardError::BadInput(format!(
                "a draft may carry at most {MAX_TAGS} tags, got {}",
                self.tags.len()
            )));
        }
        Ok(())
    }
}

fn check_len(name: &str, value: &str, max: usize) -> Result<(), CardError> {
    let len = value.chars().count();
    if len > max {
        return Err(CardError::BadInput(format!("{name} exceeds {max} characters ({len})")));
    }
    Ok(())
}

/// Checks the size of a whole generation request before any agent call.
pub fn validate_drafts(drafts: &[DraftCard]) -> Result<(), CardError> {
    if drafts.is_empty() {
        return Err(CardError::BadInput("at least one draft card is required".to_string()));
    }
    if drafts.len() > MAX_DRAFTS_PER_REQUEST {
        return Err(CardError::BadInput(format!(
            "at most {MAX_DRAFTS_PER_REQUEST} draft cards per request, got {}",
            drafts.len()
        )));
    }
    drafts.iter().try_for_each(DraftCard::validate)
}

/// A fully validated card. Fields follow the configured field order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedCard {
    pub fields: IndexMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub auto_classified_type: CardType,
}

impl GeneratedCard {
    pub fn validate(&self) -> Result<(), CardError> {
        if self.fields.len() > MAX_CARD_FIELDS {
            return Err(CardError::BadInput(format!(
                "a card may have at most {MAX_CARD_FIELDS} fields, got {}",
                self.fields.len()
            )));
        }
        if self.tags.len() > MAX_TAGS {
            return Err(CardError::BadInput(format!(
                "a card may have at most {MAX_TAGS} tags, got {}",
                self.tags.len()
            )));
        }
        Ok(())
    }

    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or_default()
    }
}

/// Unvalidated card data as the agent produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardCandidate(pub Value);

impl CardCandidate {
    pub fn fields(&self) -> Option<&Map<String, Value>> {
        self.0.get("fields").and_then(Value::as_object)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields().is_some_and(|fields| fields.contains_key(name))
    }

    /// Text of a field; absent and non-string values read as empty.
    pub fn field_text(&self, name: &str) -> &str {
        self.fields().and_then(|fields| fields.get(name)).and_then(Value::as_str).unwrap_or_default()
    }

    pub fn tags(&self) -> Option<&Value> {
        self.0.get("tags")
    }

    pub fn classified_type(&self) -> Option<CardType> {
        self.0.get("auto_classified_type").and_then(Value::as_str).and_then(|s| s.parse().ok())
    }
}

impl From<Value> for CardCandidate {
    fn from(value: Value) -> Self {
        CardCandidate(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub label: String,
    pub tag: String,
}

fn default_true() -> bool {
    true
}

fn default_tags_column_name() -> String {
    "Tags".to_string()
}

/// The card configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnkiConfig {
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_true")]
    pub tags_column_enabled: bool,
    #[serde(default = "default_tags_column_name")]
    pub tags_column_name: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub default_source: Option<String>,
}

impl Default for AnkiConfig {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            tags: Vec::new(),
            tags_column_enabled: true,
            tags_column_name: default_tags_column_name(),
            sources: Vec::new(),
            default_source: None,
        }
    }
}

impl AnkiConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fields.len() > MAX_CONFIG_FIELDS {
            return Err(ConfigError::Invalid(format!(
                "at most {MAX_CONFIG_FIELDS} fields allowed, got {}",
                self.fields.len()
            )));
        }
        if self.tags.len() > MAX_TAGS {
            return Err(ConfigError::Invalid(format!(
                "at most {MAX_TAGS} tags allowed, got {}",
                self.tags.len()
            )));
        }
        if self.tags_column_name.chars().count() > MAX_TAGS_COLUMN_NAME_CHARS {
            return Err(ConfigError::Invalid("tagsColumnName is too long".to_string()));
        }
        if self.sources.len() > MAX_CONFIG_SOURCES {
            return Err(ConfigError::Invalid(format!(
                "at most {MAX_CONFIG_SOURCES} sources allowed, got {}",
                self.sources.len()
            )));
        }
        for source in &self.sources {
            let label = source.label.chars().count();
            let tag = source.tag.chars().count();
            if !(1..=MAX_SOURCE_LABEL_CHARS).contains(&label)
                || !(1..=MAX_SOURCE_TAG_CHARS).contains(&tag)
            {
                return Err(ConfigError::Invalid(format!(
                    "source {:?} must have a 1-{MAX_SOURCE_LABEL_CHARS} char label and a 1-{MAX_SOURCE_TAG_CHARS} char tag",
                    source.label
                )));
            }
        }
        Ok(())
    }

    pub fn source_tag(&self, label_or_tag: &str) -> Option<&str> {
        self.sources
            .iter()
            .find(|s| s.tag == label_or_tag || s.label == label_or_tag)
            .map(|s| s.tag.as_str())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn card_type_round_trips_lowercase() {
        assert_eq!(serde_json::to_value(CardType::Phrase).unwrap(), json!("phrase"));
        assert_eq!("sentence".parse::<CardType>().unwrap(), CardType::Sentence);
        assert!("Word".parse::<CardType>().is_err());
        assert!(serde_json::from_value::<CardType>(json!("idiom")).is_err());
    }

    #[test]
    fn draft_limits_are_enforced() {
        let mut draft = DraftCard::new("たべます");
        assert!(draft.validate().is_ok());

        draft.fixed_english = Some("x".repeat(MAX_FIXED_TEXT_CHARS + 1));
        assert!(draft.validate().is_err());

        let draft = DraftCard::new("あ".repeat(MAX_RAW_INPUT_CHARS));
        assert!(draft.validate().is_ok());

        assert!(validate_drafts(&[]).is_err());
        let too_many = vec![DraftCard::new("hon"); MAX_DRAFTS_PER_REQUEST + 1];
        assert!(validate_drafts(&too_many).is_err());
    }

    #[test]
    fn generated_card_field_bound() {
        let mut card = GeneratedCard {
            fields: (0..MAX_CARD_FIELDS).map(|i| (format!("f{i}"), String::new())).collect(),
            tags: Vec::new(),
            auto_classified_type: CardType::Word,
        };
        assert!(card.validate().is_ok());

        card.fields.insert("one too many".to_string(), String::new());
        assert!(card.validate().is_err());
    }

    #[test]
    fn config_uses_camel_case_and_defaults() {
        let config: AnkiConfig = serde_json::from_value(json!({
            "fields": ["Kana", "English"],
            "tags": ["word"],
            "sources": [{"label": "Textbook", "tag": "textbook"}],
            "defaultSource": "textbook"
        }))
        .unwrap();

        assert!(config.tags_column_enabled);
        assert_eq!(config.tags_column_name, "Tags");
        assert_eq!(config.default_source.as_deref(), Some("textbook"));
        assert_eq!(config.source_tag("Textbook"), Some("textbook"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_rejects_empty_source_tag() {
        let config = AnkiConfig {
            sources: vec![Source { label: "Book".to_string(), tag: String::new() }],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn candidate_accessors_tolerate_bad_shapes() {
        let candidate = CardCandidate(json!({
            "fields": {"Kana": "ほん", "Count": 3},
            "tags": "word"
        }));

        assert_eq!(candidate.field_text("Kana"), "ほん");
        assert_eq!(candidate.field_text("Count"), "");
        assert!(candidate.has_field("Count"));
        assert!(!candidate.has_field("English"));
        assert_eq!(candidate.classified_type(), None);

        let empty = CardCandidate(json!("not an object"));
        assert!(empty.fields().is_none());
        assert_eq!(empty.field_text("Kana"), "");
    }
}
