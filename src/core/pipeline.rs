//! Generate, validate, repair.
//!
//! One agent call produces candidates; while the validator rejects them and
//! the repair budget lasts, the candidates and the error list go back to the
//! agent. Transport and parse failures are never repaired.

use std::time::Duration;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{
    debug,
    info,
    warn,
};

use super::{
    models::{
        CardCandidate,
        CardType,
        DraftCard,
        GeneratedCard,
    },
    prompt::{
        build_generation_prompt,
        build_repair_prompt,
    },
    utils::{
        preview,
        PREVIEW_LONG,
    },
    validator::{
        validate_batch,
        ValidationReport,
    },
    GenerationError,
};
use crate::agent::{
    parse_cards_response,
    CardAgent,
};

pub const REPAIR_BACKOFF_BASE: Duration = Duration::from_secs(1);
pub const REPAIR_BACKOFF_MAX: Duration = Duration::from_secs(10);
pub const DEFAULT_REPAIR_ATTEMPTS: u32 = 1;

/// Delay before repair attempt `attempt` (1-based). The first repair runs at once.
pub fn repair_backoff(attempt: u32) -> Option<Duration> {
    if attempt <= 1 {
        return None;
    }
    let factor = 2u32.saturating_pow(attempt - 1);
    Some(REPAIR_BACKOFF_BASE.saturating_mul(factor).min(REPAIR_BACKOFF_MAX))
}

/// State threaded through the repair loop.
#[derive(Debug)]
struct RepairSession {
    candidates: Vec<CardCandidate>,
    report: ValidationReport,
    attempts: u32,
}

pub struct CardGenerator<A> {
    agent: A,
}

impl<A: CardAgent> CardGenerator<A> {
    pub fn new(agent: A) -> Self {
        Self { agent }
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    async fn query_candidates(&self, prompt: &str) -> Result<Vec<CardCandidate>, GenerationError> {
        let text = self.agent.run_query(prompt).await?;
        parse_cards_response(&text)
    }

    pub async fn generate(
        &self,
        drafts: &[DraftCard],
        fields: &[String],
        tags: &[String],
        max_repair_attempts: u32,
    ) -> Result<Vec<GeneratedCard>, GenerationError> {
        info!(drafts = drafts.len(), "generating cards");
        let prompt = build_generation_prompt(drafts, fields, tags);
        debug!(prompt = preview(&prompt, PREVIEW_LONG), "generation prompt");

        let candidates = self.query_candidates(&prompt).await?;
        let report = validate_batch(&candidates, fields);
        let mut session = RepairSession { candidates, report, attempts: 0 };

        while !session.report.is_valid() && session.attempts < max_repair_attempts {
            session.attempts += 1;
            if let Some(delay) = repair_backoff(session.attempts) {
                debug!(attempt = session.attempts, ?delay, "backing off before repair");
                tokio::time::sleep(delay).await;
            }
            info!(
                attempt = session.attempts,
                errors = session.report.issues.len(),
                "repairing invalid cards"
            );

            let errors = session.report.messages();
            let repair_prompt = build_repair_prompt(&session.candidates, &errors);
            session.candidates = self.query_candidates(&repair_prompt).await?;
            session.report = validate_batch(&session.candidates, fields);
        }

        if !session.report.is_valid() {
            let errors = session.report.messages();
            warn!(attempts = session.attempts, ?errors, "card validation did not converge");
            return Err(GenerationError::ValidationFailed { attempts: session.attempts, errors });
        }

        if session.candidates.len() != drafts.len() {
            warn!(
                drafts = drafts.len(),
                cards = session.candidates.len(),
                "agent returned a different number of cards than drafts"
            );
        }

        session.candidates.iter().map(|candidate| into_generated(candidate, fields)).collect()
    }

    /// Generates a single card with its type forced to `target_type`.
    pub async fn regenerate_card(
        &self,
        draft: &DraftCard,
        target_type: CardType,
        fields: &[String],
        tags: &[String],
        max_repair_attempts: u32,
    ) -> Result<GeneratedCard, GenerationError> {
        let draft = DraftCard { card_type_override: Some(target_type), ..draft.clone() };
        self.generate(std::slice::from_ref(&draft), fields, tags, max_repair_attempts)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::MalformedResponse("no card returned".to_string()))
    }
}

fn field_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Builds the typed card from a validated candidate, configured fields first.
fn into_generated(
    candidate: &CardCandidate,
    fields: &[String],
) -> Result<GeneratedCard, GenerationError> {
    let mut mapped = IndexMap::new();
    if let Some(values) = candidate.fields() {
        for name in fields {
            if let Some(value) = values.get(name) {
                mapped.insert(name.clone(), field_value(value));
            }
        }
        for (name, value) in values {
            if !mapped.contains_key(name) {
                mapped.insert(name.clone(), field_value(value));
            }
        }
    }

    let tags = candidate
        .tags()
        .and_then(Value::as_array)
        .map(|tags| tags.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    let auto_classified_type = candidate.classified_type().unwrap_or_else(|| {
        debug!("agent omitted a usable auto_classified_type, defaulting to word");
        CardType::default()
    });

    let card = GeneratedCard { fields: mapped, tags, auto_classified_type };
    card.validate().map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;
    Ok(card)
}
