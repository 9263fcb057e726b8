//! AI drafting collaborator.
//!
//! A [`Drafter`] turns prompts into [`DraftDocument`]s. Adapters own response
//! normalization: fence stripping and schema parsing happen here, and an
//! answer that does not parse is a [`WorkflowError::MalformedDraft`]. Marker
//! counts are checked afterwards by the reconciler.

mod openai;
mod prompts;
mod stub;

pub use openai::OpenAiDrafter;
pub use stub::StubDrafter;

use crate::contract::CurrentUser;
use crate::error::{Result, WorkflowError};
use async_trait::async_trait;
use covenant_blocks::DraftDocument;
use once_cell::sync::Lazy;
use regex::Regex;

/// Number of sentences in a contract summary
pub const SUMMARY_LINES: usize = 4;

const FALLBACK_SUMMARY: [&str; SUMMARY_LINES] = [
    "This contract sets out an agreement between the named parties",
    "Its terms and conditions are laid out clause by clause",
    "Payment and performance duties are described in the agreement",
    "Termination and governing law provisions apply as written",
];

#[async_trait]
pub trait Drafter: Send + Sync {
    /// Short identifier reported in capabilities
    fn id(&self) -> &'static str;

    async fn generate_document(&self, prompt: &str, author: &CurrentUser) -> Result<DraftDocument>;

    /// Rewrite block `index` of `current`. The answer is either the whole
    /// document or the single regenerated block.
    async fn regenerate_block(
        &self,
        current: &DraftDocument,
        index: usize,
        instructions: &str,
    ) -> Result<DraftDocument>;

    async fn regenerate_document(
        &self,
        current: &DraftDocument,
        instructions: &str,
    ) -> Result<DraftDocument>;

    /// Exactly [`SUMMARY_LINES`] plain sentences
    async fn summarize(&self, current: &DraftDocument) -> Result<Vec<String>>;
}

static FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_-]*[ \t]*\r?\n?").expect("valid fence regex"));
static FENCE_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r?\n?```\s*$").expect("valid fence regex"));

/// Strip a surrounding Markdown code fence from a model answer
pub fn normalize_response(raw: &str) -> String {
    let trimmed = raw.trim();
    let opened = FENCE_OPEN.replace(trimmed, "");
    let closed = FENCE_CLOSE.replace(&opened, "");
    closed.trim().to_string()
}

/// Parse a model answer into the document schema
pub fn parse_draft(raw: &str) -> Result<DraftDocument> {
    let cleaned = normalize_response(raw);
    if cleaned.is_empty() {
        return Err(WorkflowError::MalformedDraft("empty answer".to_string()));
    }
    serde_json::from_str(&cleaned).map_err(|err| {
        log::debug!("Unparseable draft answer: {cleaned}");
        WorkflowError::MalformedDraft(err.to_string())
    })
}

/// Parse a summary answer, falling back to fixed sentences when malformed
pub fn parse_summary(raw: &str) -> Vec<String> {
    let cleaned = normalize_response(raw);
    let parsed: Option<Vec<String>> = serde_json::from_str::<Vec<serde_json::Value>>(&cleaned)
        .ok()
        .filter(|items| items.len() >= SUMMARY_LINES)
        .map(|items| {
            items
                .into_iter()
                .take(SUMMARY_LINES)
                .map(|item| match item {
                    serde_json::Value::String(s) => s.trim().to_string(),
                    other => other.to_string(),
                })
                .collect()
        });

    parsed.unwrap_or_else(|| {
        log::warn!("Summary answer was not a list of {SUMMARY_LINES} strings, using fallback");
        fallback_summary()
    })
}

pub fn fallback_summary() -> Vec<String> {
    FALLBACK_SUMMARY.iter().map(|s| (*s).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_blocks::PartyId;
    use pretty_assertions::assert_eq;

    #[test]
    fn strips_json_fences() {
        assert_eq!(normalize_response("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(normalize_response("  ```\n[1]\n```  "), "[1]");
        assert_eq!(normalize_response("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(normalize_response("```json {\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn parses_wire_document() {
        let raw = r#"```json
{"blocks":[{"text":"Sign: ____________________","signatures":[{"party":"PartyB","img_url":"","index":0}]}],"unknowns":["Start date"]}
```"#;
        let draft = parse_draft(raw).unwrap();
        assert_eq!(draft.blocks.len(), 1);
        assert_eq!(draft.blocks[0].signatures[0].party, PartyId::Counterparty);
        assert_eq!(draft.unknowns, vec!["Start date".to_string()]);
    }

    #[test]
    fn prose_is_a_contract_violation() {
        let err = parse_draft("Sure! Here is your contract.").unwrap_err();
        assert_eq!(err.code(), "generation_contract_violation");
        assert!(err.is_retryable());
        assert!(parse_draft("```json\n```").is_err());
    }

    #[test]
    fn summary_takes_first_four() {
        let lines = parse_summary(r#"["a ", "b", "c", "d", "e"]"#);
        assert_eq!(lines, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn short_or_invalid_summary_falls_back() {
        assert_eq!(parse_summary(r#"["only one"]"#), fallback_summary());
        assert_eq!(parse_summary("four lines of prose"), fallback_summary());
        assert_eq!(fallback_summary().len(), SUMMARY_LINES);
    }
}
