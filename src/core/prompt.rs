//! Prompt text for the card agent.
//!
//! Only the structure matters to the pipeline: numbered drafts, the ordered
//! field list and the `cards` JSON contract.

use std::fmt::Write;

use super::models::{
    CardCandidate,
    DraftCard,
};

const GENERATION_RULES: &str = r#"## Card type classification
Classify each input as "word" (one concept in English), "phrase" (a descriptive group of words
without a predicate) or "sentence" (a complete utterance: statement, request, command or question).
If card_type_override is not null, use it for the tags and for auto_classified_type.

## Example sentence rules
- sentence: leave "Example sentence hiragana/katakana", "Example sentence kanji" and
  "Example sentence translation" completely empty.
- word or phrase: fill all three with one simple, polite, beginner-friendly example.

## Script and punctuation
- All Japanese sentences are polite (です/ます) and end with 。 (not a period).
- "Hiragana/Katakana" and "Example sentence hiragana/katakana" contain kana only, never kanji.
  Katakana for loanwords, hiragana otherwise, a space before particles, verb endings attached.
- Separate multiple translations with commas, never slashes.
- Leave "Sound" and "Sound example" empty.
- When fixed_english or fixed_dutch is given, use it verbatim."#;

const OUTPUT_CONTRACT: &str = r#"## Output format
Respond with ONLY valid JSON in this exact structure:
{
  "cards": [
    {
      "fields": { "<field name>": "<value>", ... },
      "tags": ["word"],
      "auto_classified_type": "word"
    }
  ]
}
Every card MUST include "tags" (a list containing the classified type) and
"auto_classified_type" ("word", "phrase" or "sentence").
Generate one card object for each input, in input order."#;

const REPAIR_RULES: &str = r#"## Repair instructions
1. Kana field contains kanji: rewrite it in hiragana/katakana, a space before particles.
2. Sentence must end with 。: add 。 to the end.
3. Example sentence fields must be all empty (sentence) or all filled (word/phrase).
4. Missing or empty fields: provide a value.
5. "tags" must be a list; every card needs "auto_classified_type".
6. Keep all other fields unchanged.

Respond with ONLY the corrected JSON in the same format:
{
  "cards": [...]
}"#;

fn quoted_or_null(value: Option<&str>) -> String {
    match value.filter(|v| !v.is_empty()) {
        Some(v) => serde_json::Value::from(v).to_string(),
        None => "null".to_string(),
    }
}

pub fn build_generation_prompt(drafts: &[DraftCard], fields: &[String], tags: &[String]) -> String {
    let mut prompt = String::from(
        "You are an expert Japanese language instructor creating Anki flashcards.\n\n\
         ## Task\nGenerate complete flashcard data for each input below and classify each \
         input as \"word\", \"phrase\" or \"sentence\".\n\n## Output fields (in this exact order)\n",
    );
    for field in fields {
        let _ = writeln!(prompt, "- {field}");
    }
    if !tags.is_empty() {
        let _ = writeln!(prompt, "\n## Allowed tags\n{}", tags.join(", "));
    }

    let _ = write!(prompt, "\n{GENERATION_RULES}\n\n## Input cards\n");
    for (i, draft) in drafts.iter().enumerate() {
        let override_type = draft.card_type_override.map(|t| t.as_str());
        let _ = writeln!(
            prompt,
            "Card {}:\n- raw_input: {}\n- fixed_english: {}\n- fixed_dutch: {}\n- extra_notes: {}\n- card_type_override: {}",
            i + 1,
            serde_json::Value::from(draft.raw_input.as_str()),
            quoted_or_null(draft.fixed_english.as_deref()),
            quoted_or_null(draft.fixed_dutch.as_deref()),
            quoted_or_null(draft.extra_notes.as_deref()),
            quoted_or_null(override_type),
        );
    }

    let _ = write!(prompt, "\n{OUTPUT_CONTRACT}");
    prompt
}

pub fn build_repair_prompt(cards: &[CardCandidate], errors: &[String]) -> String {
    // serde_json leaves non-ASCII text unescaped
    let cards_json = serde_json::to_string_pretty(cards).unwrap_or_else(|_| "[]".to_string());

    let mut prompt = String::from(
        "The following generated Anki cards have validation errors that need to be fixed.\n\n\
         ## Errors found\n",
    );
    for error in errors {
        let _ = writeln!(prompt, "- {error}");
    }
    let _ = write!(prompt, "\n## Original cards (with errors)\n{cards_json}\n\n{REPAIR_RULES}");
    prompt
}
