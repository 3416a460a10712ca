use indexmap::IndexMap;
use serde::{
    Deserialize,
    Serialize,
};

/// AnkiConnect's reply envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub result: Option<T>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawField {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub order: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawNote {
    pub note_id: u64,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub fields: IndexMap<String, RawField>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteInfo {
    pub note_id: u64,
    pub model_name: String,
    pub fields: IndexMap<String, String>,
    pub tags: Vec<String>,
}

impl From<RawNote> for NoteInfo {
    fn from(raw: RawNote) -> Self {
        let mut fields: Vec<(String, RawField)> = raw.fields.into_iter().collect();
        fields.sort_by_key(|(_, field)| field.order);
        NoteInfo {
            note_id: raw.note_id,
            model_name: raw.model_name,
            fields: fields.into_iter().map(|(name, field)| (name, field.value)).collect(),
            tags: raw.tags,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckInfo {
    pub name: String,
    pub note_count: usize,
}
