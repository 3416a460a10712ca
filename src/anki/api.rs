use std::time::Duration;

use indexmap::IndexMap;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{
    json,
    Value,
};
use tokio::sync::Mutex;
use tracing::{
    debug,
    info,
};

use super::types::{
    ApiResponse,
    DeckInfo,
    NoteInfo,
    RawNote,
};
use crate::core::AnkiConnectError;

pub const API_VERSION: u32 = 6;

/// Escapes a value for use inside a double-quoted search term.
///
/// Backslashes are escaped before quotes so an escaped quote is never
/// re-escaped.
pub fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// `"key:value"` with the value escaped.
pub fn query_term(key: &str, value: &str) -> String {
    format!("\"{key}:{}\"", escape_query_value(value))
}

pub struct AnkiConnectClient {
    url: String,
    timeout: Duration,
    http: Mutex<Option<Client>>,
}

impl AnkiConnectClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self { url: url.into(), timeout, http: Mutex::new(None) }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The pooled HTTP client, built on first use or after [`close`](Self::close).
    async fn http(&self) -> Result<Client, AnkiConnectError> {
        let mut http = self.http.lock().await;
        if let Some(client) = http.as_ref() {
            return Ok(client.clone());
        }
        debug!(url = %self.url, "opening AnkiConnect HTTP client");
        let client = Client::builder().timeout(self.timeout).build()?;
        *http = Some(client.clone());
        Ok(client)
    }

    pub async fn is_open(&self) -> bool {
        self.http.lock().await.is_some()
    }

    /// Drops pooled connections; the next call reconnects.
    pub async fn close(&self) {
        if self.http.lock().await.take().is_some() {
            debug!(url = %self.url, "closed AnkiConnect HTTP client");
        }
    }

    async fn invoke<T: DeserializeOwned>(
        &self,
        action: &str,
        params: Value,
    ) -> Result<T, AnkiConnectError> {
        let body = json!({ "action": action, "version": API_VERSION, "params": params });
        debug!(action, "AnkiConnect request");

        let response = self.http().await?.post(&self.url).json(&body).send().await.map_err(|e| {
            if e.is_connect() {
                AnkiConnectError::Unreachable { url: self.url.clone() }
            } else {
                AnkiConnectError::from(e)
            }
        })?;
        let reply: ApiResponse<Value> = response.error_for_status()?.json().await?;

        if let Some(error) = reply.error.filter(|e| !e.is_empty()) {
            return Err(AnkiConnectError::Api(error));
        }
        serde_json::from_value(reply.result.unwrap_or(Value::Null))
            .map_err(|e| AnkiConnectError::UnexpectedResult(format!("{action}: {e}")))
    }

    pub async fn version(&self) -> Result<u32, AnkiConnectError> {
        self.invoke("version", json!({})).await
    }

    /// Fails unless AnkiConnect answers with a supported API version.
    pub async fn check_connection(&self) -> Result<u32, AnkiConnectError> {
        let version = self.version().await?;
        if version < API_VERSION {
            return Err(AnkiConnectError::VersionTooOld(version));
        }
        info!(version, "connected to AnkiConnect");
        Ok(version)
    }

    pub async fn deck_names(&self) -> Result<Vec<String>, AnkiConnectError> {
        self.invoke("deckNames", json!({})).await
    }

    pub async fn model_names(&self) -> Result<Vec<String>, AnkiConnectError> {
        self.invoke("modelNames", json!({})).await
    }

    pub async fn find_notes(&self, query: &str) -> Result<Vec<u64>, AnkiConnectError> {
        self.invoke("findNotes", json!({ "query": query })).await
    }

    pub async fn notes_info(&self, note_ids: &[u64]) -> Result<Vec<NoteInfo>, AnkiConnectError> {
        if note_ids.is_empty() {
            return Ok(Vec::new());
        }
        let notes: Vec<RawNote> = self.invoke("notesInfo", json!({ "notes": note_ids })).await?;
        Ok(notes.into_iter().map(NoteInfo::from).collect())
    }

    pub async fn update_note_fields(
        &self,
        note_id: u64,
        fields: &IndexMap<String, String>,
    ) -> Result<(), AnkiConnectError> {
        self.invoke("updateNoteFields", json!({ "note": { "id": note_id, "fields": fields } })).await
    }

    /// Switches a note to another note type, replacing its fields and tags.
    pub async fn change_note_model(
        &self,
        note_id: u64,
        model_name: &str,
        fields: &IndexMap<String, String>,
        tags: &[String],
    ) -> Result<(), AnkiConnectError> {
        let note = json!({ "id": note_id, "modelName": model_name, "fields": fields, "tags": tags });
        self.invoke("updateNoteModel", json!({ "note": note })).await
    }

    pub async fn add_tags(&self, note_ids: &[u64], tags: &[String]) -> Result<(), AnkiConnectError> {
        self.invoke("addTags", json!({ "notes": note_ids, "tags": tags.join(" ") })).await
    }

    pub async fn remove_tags(
        &self,
        note_ids: &[u64],
        tags: &[String],
    ) -> Result<(), AnkiConnectError> {
        self.invoke("removeTags", json!({ "notes": note_ids, "tags": tags.join(" ") })).await
    }

    /// Decks with their count of notes of `note_type`.
    pub async fn decks_with_note_type(
        &self,
        note_type: &str,
        exclude_empty: bool,
    ) -> Result<Vec<DeckInfo>, AnkiConnectError> {
        let mut decks = Vec::new();
        for name in self.deck_names().await? {
            let query = format!("{} {}", query_term("deck", &name), query_term("note", note_type));
            let note_count = self.find_notes(&query).await?.len();
            if exclude_empty && note_count == 0 {
                continue;
            }
            decks.push(DeckInfo { name, note_count });
        }
        Ok(decks)
    }
}
