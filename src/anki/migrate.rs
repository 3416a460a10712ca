//! Migrating notes of an older note type to cards written by the agent.

use std::sync::{
    Arc,
    LazyLock,
};

use indexmap::IndexMap;
use regex::Regex;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::{
    info,
    warn,
};

use super::{
    api::query_term,
    AnkiConnectClient,
    DeckInfo,
    NoteInfo,
};
use crate::{
    agent::CardAgent,
    config::MigrationSettings,
    core::{
        pipeline::DEFAULT_REPAIR_ATTEMPTS,
        AnkiConfig,
        AnkiConnectError,
        CardError,
        CardGenerator,
        CardType,
        DraftCard,
        FailureKind,
        GenerationError,
    },
};

pub const DEFAULT_OLD_NOTE_TYPE: &str = "Philippe's Japanese v3";
pub const DEFAULT_NEW_NOTE_TYPE: &str = "Japanese Vocabulary (Agent)";

pub const CARD_TYPE_TAGS: [&str; 3] = ["word", "phrase", "sentence"];
pub const MAX_DECK_NAME_CHARS: usize = 200;
pub const MAX_BATCH_PREVIEW: usize = 50;

const OLD_SOUND_FIELD: &str = "Sound";
const OLD_SOUND_EXAMPLE_FIELD: &str = "Sound Example";
const NEW_SOUND_FIELD: &str = "Sound";
const NEW_SOUND_EXAMPLE_FIELD: &str = "Sound example";
const MARKED_FIELDS: [&str; 2] = ["English", "Dutch"];

static DECK_NAME: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[\w\s\-_.,'():/]+$"));

// A `*` right before a comma or the end of the value.
static ASTERISK_MARKER: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\*(,|$)"));

pub fn default_field_mapping() -> IndexMap<String, String> {
    [
        ("Kana", "Hiragana/Katakana"),
        ("Romaji", "Romaji"),
        ("Kanji", "Kanji"),
        ("English", "English"),
        ("Nederlands", "Dutch"),
        ("Example", "Example sentence hiragana/katakana"),
        ("Example Kanji", "Example sentence kanji"),
        ("Example translation", "Example sentence translation"),
        ("Extra", "Extra notes"),
        ("Sound", "Sound"),
        ("Sound Example", "Sound example"),
    ]
    .into_iter()
    .map(|(old, new)| (old.to_string(), new.to_string()))
    .collect()
}

/// Deck names that are safe to put in a search query.
pub fn is_valid_deck_name(name: &str) -> bool {
    let len = name.chars().count();
    (1..=MAX_DECK_NAME_CHARS).contains(&len)
        && DECK_NAME.as_ref().is_ok_and(|re| re.is_match(name))
}

/// Drops the `*` the agent uses to flag user-fixed translations.
pub fn strip_asterisk_markers(mut fields: IndexMap<String, String>) -> IndexMap<String, String> {
    let Ok(marker) = ASTERISK_MARKER.as_ref() else {
        return fields;
    };
    for name in MARKED_FIELDS {
        if let Some(value) = fields.get_mut(name) {
            if value.contains('*') {
                *value = marker.replace_all(value, "${1}").into_owned();
            }
        }
    }
    fields
}

/// Renames old field names through `mapping`; unmapped fields are dropped.
pub fn map_old_fields(
    old_fields: &IndexMap<String, String>,
    mapping: &IndexMap<String, String>,
) -> IndexMap<String, String> {
    old_fields
        .iter()
        .filter_map(|(name, value)| mapping.get(name).map(|new| (new.clone(), value.clone())))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationNote {
    pub note_id: u64,
    pub model_name: String,
    pub old_fields: IndexMap<String, String>,
    pub sound: String,
    pub sound_example: String,
}

impl From<NoteInfo> for MigrationNote {
    fn from(note: NoteInfo) -> Self {
        MigrationNote {
            note_id: note.note_id,
            model_name: note.model_name,
            sound: note.fields.get(OLD_SOUND_FIELD).cloned().unwrap_or_default(),
            sound_example: note.fields.get(OLD_SOUND_EXAMPLE_FIELD).cloned().unwrap_or_default(),
            old_fields: note.fields,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewItem {
    #[serde(alias = "note_id")]
    pub note_id: u64,
    #[serde(alias = "raw_input")]
    pub raw_input: String,
    #[serde(default, alias = "fixed_english")]
    pub fixed_english: Option<String>,
    #[serde(default, alias = "fixed_dutch")]
    pub fixed_dutch: Option<String>,
    #[serde(default, alias = "extra_notes")]
    pub extra_notes: Option<String>,
    #[serde(default, alias = "preserve_sound")]
    pub preserve_sound: Option<String>,
    #[serde(default, alias = "preserve_sound_example")]
    pub preserve_sound_example: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

impl PreviewItem {
    /// Builds the agent input from an old note, reading it through `mapping`.
    pub fn from_note(note: &MigrationNote, mapping: &IndexMap<String, String>) -> Self {
        let fields = map_old_fields(&note.old_fields, mapping);
        PreviewItem {
            note_id: note.note_id,
            raw_input: fields.get("Hiragana/Katakana").cloned().unwrap_or_default(),
            fixed_english: non_empty(fields.get("English")),
            fixed_dutch: non_empty(fields.get("Dutch")),
            extra_notes: non_empty(fields.get("Extra notes")),
            preserve_sound: non_empty(Some(&note.sound)),
            preserve_sound_example: non_empty(Some(&note.sound_example)),
        }
    }

    fn to_draft(&self) -> DraftCard {
        DraftCard {
            raw_input: self.raw_input.clone(),
            fixed_english: self.fixed_english.clone(),
            fixed_dutch: self.fixed_dutch.clone(),
            extra_notes: self.extra_notes.clone(),
            tags: Vec::new(),
            card_type_override: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preview {
    pub note_id: u64,
    pub new_fields: IndexMap<String, String>,
    pub auto_classified_type: CardType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchItem {
    Ready(Preview),
    Failed { note_id: u64, message: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    AllSucceeded,
    Partial,
    AllFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchPreview {
    pub items: Vec<BatchItem>,
}

impl BatchPreview {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| matches!(i, BatchItem::Ready(_))).count()
    }

    pub fn outcome(&self) -> BatchOutcome {
        match self.succeeded() {
            n if n == self.items.len() => BatchOutcome::AllSucceeded,
            0 => BatchOutcome::AllFailed,
            _ => BatchOutcome::Partial,
        }
    }
}

pub struct Migrator<'a, A> {
    anki: Arc<AnkiConnectClient>,
    generator: &'a CardGenerator<A>,
    settings: &'a MigrationSettings,
}

impl<'a, A: CardAgent> Migrator<'a, A> {
    pub fn new(
        anki: Arc<AnkiConnectClient>,
        generator: &'a CardGenerator<A>,
        settings: &'a MigrationSettings,
    ) -> Self {
        Self { anki, generator, settings }
    }

    /// Decks holding notes of the old note type.
    pub async fn decks(&self) -> Result<Vec<DeckInfo>, AnkiConnectError> {
        self.anki.decks_with_note_type(&self.settings.old_note_type, true).await
    }

    pub async fn notes(&self, deck: &str) -> Result<Vec<MigrationNote>, AnkiConnectError> {
        if !is_valid_deck_name(deck) {
            return Err(AnkiConnectError::InvalidDeckName(deck.to_string()));
        }
        let query = format!(
            "{} {}",
            query_term("deck", deck),
            query_term("note", &self.settings.old_note_type)
        );
        let ids = self.anki.find_notes(&query).await?;
        let notes = self.anki.notes_info(&ids).await?;
        info!(deck, notes = notes.len(), "notes awaiting migration");

        Ok(notes.into_iter().map(MigrationNote::from).collect())
    }

    pub async fn note(&self, note_id: u64) -> Result<MigrationNote, AnkiConnectError> {
        self.anki
            .notes_info(&[note_id])
            .await?
            .into_iter()
            .next()
            .map(MigrationNote::from)
            .ok_or_else(|| AnkiConnectError::UnexpectedResult(format!("note {note_id} not found")))
    }

    /// Asks the agent for the new card and keeps the note's audio.
    pub async fn preview(
        &self,
        item: &PreviewItem,
        config: &AnkiConfig,
    ) -> Result<Preview, GenerationError> {
        let card = self
            .generator
            .generate(&[item.to_draft()], &config.fields, &config.tags, DEFAULT_REPAIR_ATTEMPTS)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::MalformedResponse("Agent returned no cards".to_string()))?;

        let mut new_fields = strip_asterisk_markers(card.fields);
        if let Some(sound) = non_empty(item.preserve_sound.as_ref()) {
            new_fields.insert(NEW_SOUND_FIELD.to_string(), sound);
        }
        if let Some(sound) = non_empty(item.preserve_sound_example.as_ref()) {
            new_fields.insert(NEW_SOUND_EXAMPLE_FIELD.to_string(), sound);
        }

        Ok(Preview {
            note_id: item.note_id,
            new_fields,
            auto_classified_type: card.auto_classified_type,
        })
    }

    /// Previews each item in turn; one failure does not stop the rest.
    pub async fn preview_batch(
        &self,
        items: &[PreviewItem],
        config: &AnkiConfig,
    ) -> Result<BatchPreview, CardError> {
        if items.is_empty() || items.len() > MAX_BATCH_PREVIEW {
            return Err(CardError::BadInput(format!(
                "a batch preview takes 1-{MAX_BATCH_PREVIEW} notes, got {}",
                items.len()
            )));
        }

        let mut results = Vec::with_capacity(items.len());
        for item in items {
            match self.preview(item, config).await {
                Ok(preview) => results.push(BatchItem::Ready(preview)),
                Err(e) => {
                    warn!(note_id = item.note_id, error = %e, "preview failed");
                    results.push(BatchItem::Failed {
                        note_id: item.note_id,
                        message: FailureKind::GenerationFailed.public_message(),
                    });
                }
            }
        }
        Ok(BatchPreview { items: results })
    }

    /// Writes the approved fields back, switching the note type if needed.
    pub async fn approve(
        &self,
        note_id: u64,
        fields: &IndexMap<String, String>,
        tags: &[String],
    ) -> Result<(), AnkiConnectError> {
        let note = self.note(note_id).await?;

        if note.model_name == self.settings.new_note_type {
            self.anki.update_note_fields(note_id, fields).await?;
        } else {
            info!(note_id, from = %note.model_name, to = %self.settings.new_note_type, "changing note type");
            self.anki
                .change_note_model(note_id, &self.settings.new_note_type, fields, tags)
                .await?;
        }

        if !tags.is_empty() {
            let card_types: Vec<String> = CARD_TYPE_TAGS.map(String::from).to_vec();
            self.anki.remove_tags(&[note_id], &card_types).await?;
            self.anki.add_tags(&[note_id], tags).await?;
        }
        info!(note_id, "note migrated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::Mutex,
        time::Duration,
    };

    use async_trait::async_trait;
    use serde_json::{
        json,
        Value,
    };
    use wiremock::{
        matchers::{
            body_partial_json,
            method,
        },
        Mock,
        MockServer,
        ResponseTemplate,
    };

    use super::*;

    struct CannedAgent(Mutex<VecDeque<Result<String, GenerationError>>>);

    #[async_trait]
    impl CardAgent for CannedAgent {
        async fn run_query(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.0.lock().unwrap().pop_front().unwrap_or(Err(GenerationError::NoContent))
        }
    }

    fn canned(answers: Vec<Result<String, GenerationError>>) -> CardGenerator<CannedAgent> {
        CardGenerator::new(CannedAgent(Mutex::new(answers.into())))
    }

    fn config() -> AnkiConfig {
        AnkiConfig {
            fields: ["Hiragana/Katakana", "English", "Dutch", "Sound", "Sound example"]
                .map(String::from)
                .to_vec(),
            ..Default::default()
        }
    }

    fn card_answer(english: &str) -> Result<String, GenerationError> {
        Ok(json!({ "cards": [{
            "fields": {
                "Hiragana/Katakana": "ほん",
                "English": english,
                "Dutch": "boek*",
                "Example sentence hiragana/katakana": "",
                "Example sentence kanji": "",
                "Example sentence translation": "",
                "Sound": "",
                "Sound example": ""
            },
            "tags": ["sentence"],
            "auto_classified_type": "sentence"
        }]})
        .to_string())
    }

    fn ok(result: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "result": result, "error": null }))
    }

    #[test]
    fn deck_names_are_checked() {
        for name in [
            "Japanese",
            "Deck_v2.0",
            "My Deck's Cards",
            "Deck (Main)",
            "Languages::Japanese::Vocabulary",
            "漢字デッキ",
        ] {
            assert!(is_valid_deck_name(name), "should accept {name}");
        }
        for name in ["", "Deck\"injection", "path\\to\\deck", "test*", "Deck|Name", "Deck#1"] {
            assert!(!is_valid_deck_name(name), "should reject {name}");
        }
        assert!(is_valid_deck_name(&"a".repeat(MAX_DECK_NAME_CHARS)));
        assert!(!is_valid_deck_name(&"a".repeat(MAX_DECK_NAME_CHARS + 1)));
    }

    #[test]
    fn asterisk_markers_are_removed_from_translations_only() {
        let fields: IndexMap<String, String> = [
            ("English", "Self-introduction*, introduction"),
            ("Dutch", "zelfintroductie*"),
            ("Extra notes", "note*"),
            ("Kanji", "5*3"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let stripped = strip_asterisk_markers(fields);
        assert_eq!(stripped["English"], "Self-introduction, introduction");
        assert_eq!(stripped["Dutch"], "zelfintroductie");
        assert_eq!(stripped["Extra notes"], "note*");
        assert_eq!(stripped["Kanji"], "5*3");
    }

    #[test]
    fn old_fields_are_renamed() {
        let old: IndexMap<String, String> = [("Kana", "ほん"), ("Nederlands", "boek"), ("Legacy", "x")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let mapped = map_old_fields(&old, &default_field_mapping());
        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped["Hiragana/Katakana"], "ほん");
        assert_eq!(mapped["Dutch"], "boek");
    }

    #[test]
    fn preview_item_accepts_both_key_styles() {
        let camel: PreviewItem =
            serde_json::from_value(json!({"noteId": 1, "rawInput": "hon", "preserveSound": "[sound:a.mp3]"}))
                .unwrap();
        let snake: PreviewItem =
            serde_json::from_value(json!({"note_id": 1, "raw_input": "hon", "preserve_sound": "[sound:a.mp3]"}))
                .unwrap();
        assert_eq!(camel, snake);
        assert_eq!(camel.preserve_sound.as_deref(), Some("[sound:a.mp3]"));
    }

    #[tokio::test]
    async fn preview_strips_markers_and_keeps_sounds() {
        let generator = canned(vec![card_answer("book*")]);
        let settings = MigrationSettings::default();
        let anki = Arc::new(AnkiConnectClient::new("http://127.0.0.1:9", Duration::from_secs(1)));
        let migrator = Migrator::new(anki, &generator, &settings);

        let item = PreviewItem {
            note_id: 42,
            raw_input: "hon".to_string(),
            preserve_sound: Some("[sound:hon.mp3]".to_string()),
            ..Default::default()
        };
        let preview = migrator.preview(&item, &config()).await.unwrap();

        assert_eq!(preview.note_id, 42);
        assert_eq!(preview.auto_classified_type, CardType::Sentence);
        assert_eq!(preview.new_fields["English"], "book");
        assert_eq!(preview.new_fields["Dutch"], "boek");
        assert_eq!(preview.new_fields["Sound"], "[sound:hon.mp3]");
        assert_eq!(preview.new_fields["Sound example"], "");
    }

    #[tokio::test]
    async fn batch_outcome_reflects_failures() {
        let generator = canned(vec![
            card_answer("book"),
            Err(GenerationError::Transport("boom".to_string())),
        ]);
        let settings = MigrationSettings::default();
        let anki = Arc::new(AnkiConnectClient::new("http://127.0.0.1:9", Duration::from_secs(1)));
        let migrator = Migrator::new(anki, &generator, &settings);

        let items = vec![
            PreviewItem { note_id: 1, raw_input: "hon".to_string(), ..Default::default() },
            PreviewItem { note_id: 2, raw_input: "inu".to_string(), ..Default::default() },
        ];
        let batch = migrator.preview_batch(&items, &config()).await.unwrap();
        assert_eq!(batch.outcome(), BatchOutcome::Partial);
        assert!(matches!(
            &batch.items[1],
            BatchItem::Failed { note_id: 2, message } if !message.contains("boom")
        ));

        assert!(migrator.preview_batch(&[], &config()).await.is_err());
    }

    #[test]
    fn batch_outcome_extremes() {
        let failed = BatchItem::Failed { note_id: 1, message: "x" };
        assert_eq!(BatchPreview { items: vec![failed.clone()] }.outcome(), BatchOutcome::AllFailed);

        let ready = BatchItem::Ready(Preview {
            note_id: 1,
            new_fields: IndexMap::new(),
            auto_classified_type: CardType::Word,
        });
        assert_eq!(BatchPreview { items: vec![ready] }.outcome(), BatchOutcome::AllSucceeded);
    }

    #[tokio::test]
    async fn notes_rejects_unsafe_deck_and_escapes_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "action": "findNotes",
                "params": { "query": "\"deck:Deck (Main)\" \"note:Philippe's Japanese v3\"" }
            })))
            .respond_with(ok(json!([5])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "action": "notesInfo" })))
            .respond_with(ok(json!([{
                "noteId": 5,
                "modelName": "Philippe's Japanese v3",
                "tags": [],
                "fields": {
                    "Kana": { "value": "ほん", "order": 0 },
                    "Sound": { "value": "[sound:hon.mp3]", "order": 1 },
                    "Sound Example": { "value": "", "order": 2 }
                }
            }])))
            .mount(&server)
            .await;

        let generator = canned(Vec::new());
        let settings = MigrationSettings::default();
        let anki = Arc::new(AnkiConnectClient::new(server.uri(), Duration::from_secs(5)));
        let migrator = Migrator::new(anki, &generator, &settings);

        assert!(matches!(
            migrator.notes("Deck\" OR \"").await,
            Err(AnkiConnectError::InvalidDeckName(_))
        ));

        let notes = migrator.notes("Deck (Main)").await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].sound, "[sound:hon.mp3]");

        let item = PreviewItem::from_note(&notes[0], &settings.field_mapping);
        assert_eq!(item.raw_input, "ほん");
        assert_eq!(item.preserve_sound.as_deref(), Some("[sound:hon.mp3]"));
        assert_eq!(item.preserve_sound_example, None);
    }

    #[tokio::test]
    async fn approve_changes_note_type_and_retags() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "action": "notesInfo" })))
            .respond_with(ok(json!([{
                "noteId": 9, "modelName": "Philippe's Japanese v3", "tags": ["word"], "fields": {}
            }])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "action": "updateNoteModel",
                "params": { "note": { "id": 9, "modelName": "Japanese Vocabulary (Agent)" } }
            })))
            .respond_with(ok(Value::Null))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "action": "removeTags",
                "params": { "notes": [9], "tags": "word phrase sentence" }
            })))
            .respond_with(ok(Value::Null))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "action": "addTags",
                "params": { "notes": [9], "tags": "sentence migrated" }
            })))
            .respond_with(ok(Value::Null))
            .expect(1)
            .mount(&server)
            .await;

        let generator = canned(Vec::new());
        let settings = MigrationSettings::default();
        let anki = Arc::new(AnkiConnectClient::new(server.uri(), Duration::from_secs(5)));
        let migrator = Migrator::new(anki, &generator, &settings);

        let fields: IndexMap<String, String> =
            [("Hiragana/Katakana".to_string(), "ほん".to_string())].into_iter().collect();
        let tags = vec!["sentence".to_string(), "migrated".to_string()];
        migrator.approve(9, &fields, &tags).await.unwrap();
    }

    #[tokio::test]
    async fn approve_updates_in_place_without_tags() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "action": "notesInfo" })))
            .respond_with(ok(json!([{
                "noteId": 3, "modelName": "Japanese Vocabulary (Agent)", "tags": [], "fields": {}
            }])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "action": "updateNoteFields" })))
            .respond_with(ok(Value::Null))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "action": "removeTags" })))
            .respond_with(ok(Value::Null))
            .expect(0)
            .mount(&server)
            .await;

        let generator = canned(Vec::new());
        let settings = MigrationSettings::default();
        let anki = Arc::new(AnkiConnectClient::new(server.uri(), Duration::from_secs(5)));
        let migrator = Migrator::new(anki, &generator, &settings);

        migrator.approve(3, &IndexMap::new(), &[]).await.unwrap();
    }
}
