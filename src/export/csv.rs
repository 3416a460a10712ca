//! Anki text-import format (2.1.54+).
//!
//! `#` directive lines replace a header row; every value is quoted.

use std::{
    fmt::Write,
    str::FromStr,
};

use serde::{
    Deserialize,
    Serialize,
};

use crate::core::{
    AnkiConfig,
    CardError,
    GeneratedCard,
};

pub const DEFAULT_FILE_STEM: &str = "anki_cards";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Core,
    Extra,
}

impl Priority {
    pub fn tag(self) -> &'static str {
        match self {
            Priority::Core => "core",
            Priority::Extra => "extra",
        }
    }
}

impl FromStr for Priority {
    type Err = CardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "core" => Ok(Priority::Core),
            "extra" => Ok(Priority::Extra),
            other => Err(CardError::BadInput(format!("unknown priority {other:?}"))),
        }
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn write_row<'v>(out: &mut String, values: impl IntoIterator<Item = &'v str>) {
    let row: Vec<String> = values.into_iter().map(quote).collect();
    let _ = writeln!(out, "{}", row.join(","));
}

pub fn generate_csv(
    cards: &[GeneratedCard],
    config: &AnkiConfig,
    source: Option<&str>,
    priority: Option<Priority>,
) -> Result<String, CardError> {
    if cards.is_empty() {
        return Err(CardError::BadInput("no cards to export".to_string()));
    }

    let mut columns: Vec<&str> = config.fields.iter().map(String::as_str).collect();
    if config.tags_column_enabled {
        columns.push(&config.tags_column_name);
    }

    let mut out = String::from("#separator:Comma\n#html:false\n");
    let _ = writeln!(out, "#columns:{}", columns.join(","));
    if config.tags_column_enabled {
        let _ = writeln!(out, "#tags column:{}", config.fields.len() + 1);
    }

    let source = source.map(str::trim).filter(|s| !s.is_empty());
    for card in cards {
        let mut tags: Vec<&str> = Vec::new();
        tags.extend(source);
        tags.extend(priority.map(Priority::tag));
        tags.extend(card.tags.iter().map(String::as_str));
        let tags = tags.join(" ");

        let fields = config.fields.iter().map(|name| card.field(name));
        if config.tags_column_enabled {
            write_row(&mut out, fields.chain(std::iter::once(tags.as_str())));
        } else {
            write_row(&mut out, fields);
        }
    }

    Ok(out)
}

/// A file name safe to offer for download.
pub fn csv_filename(base: Option<&str>) -> String {
    let safe: String = base
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | ' '))
        .collect();
    let safe = safe.trim();
    let stem = if safe.is_empty() { DEFAULT_FILE_STEM } else { safe };
    format!("{stem}.csv")
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::core::CardType;

    fn card(pairs: &[(&str, &str)], tags: &[&str]) -> GeneratedCard {
        GeneratedCard {
            fields: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<IndexMap<_, _>>(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            auto_classified_type: CardType::Word,
        }
    }

    fn config() -> AnkiConfig {
        AnkiConfig {
            fields: vec!["Hiragana/Katakana".to_string(), "English".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn writes_directives_and_quoted_rows() {
        let cards = vec![
            card(&[("English", "book"), ("Hiragana/Katakana", "ほん")], &["word"]),
            card(&[("Hiragana/Katakana", "いぬ"), ("English", "the \"dog\", a pet")], &[]),
        ];

        let csv = generate_csv(&cards, &config(), Some("textbook"), Some(Priority::Core)).unwrap();
        assert_eq!(
            csv,
            "#separator:Comma\n\
             #html:false\n\
             #columns:Hiragana/Katakana,English,Tags\n\
             #tags column:3\n\
             \"ほん\",\"book\",\"textbook core word\"\n\
             \"いぬ\",\"the \"\"dog\"\", a pet\",\"textbook core\"\n"
        );
    }

    #[test]
    fn tags_column_can_be_disabled() {
        let config = AnkiConfig { tags_column_enabled: false, ..config() };
        let csv = generate_csv(&[card(&[("English", "book")], &["word"])], &config, None, None)
            .unwrap();

        assert_eq!(csv, "#separator:Comma\n#html:false\n#columns:Hiragana/Katakana,English\n\"\",\"book\"\n");
    }

    #[test]
    fn tags_skip_missing_source_and_priority() {
        let csv = generate_csv(&[card(&[], &["phrase"])], &config(), Some("  "), None).unwrap();
        assert!(csv.ends_with("\"\",\"\",\"phrase\"\n"));

        let csv = generate_csv(&[card(&[], &[])], &config(), None, Some(Priority::Extra)).unwrap();
        assert!(csv.ends_with("\"\",\"\",\"extra\"\n"));
    }

    #[test]
    fn empty_export_is_rejected() {
        assert!(matches!(generate_csv(&[], &config(), None, None), Err(CardError::BadInput(_))));
    }

    #[test]
    fn filenames_are_sanitised() {
        assert_eq!(csv_filename(Some("Lesson 3 - verbs")), "Lesson 3 - verbs.csv");
        assert_eq!(csv_filename(Some("../../etc/passwd")), "etcpasswd.csv");
        assert_eq!(csv_filename(Some("第1課")), "第1課.csv");
        assert_eq!(csv_filename(Some(" /// ")), "anki_cards.csv");
        assert_eq!(csv_filename(None), "anki_cards.csv");
    }
}
