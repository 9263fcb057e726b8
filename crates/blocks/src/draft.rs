//! Loose document shape exchanged with the drafter and used as the storage blob.
//!
//! Nothing here is validated; [`crate::Reconciler`] turns a draft into a
//! [`crate::DocumentModel`] and rejects drafts that break the marker contract.

use crate::types::PartyId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftDocument {
    #[serde(default)]
    pub blocks: Vec<DraftBlock>,

    #[serde(default)]
    pub unknowns: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftBlock {
    pub text: String,

    #[serde(default)]
    pub signatures: Vec<DraftSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSignature {
    pub party: PartyId,

    /// Empty string means unbound
    #[serde(default)]
    pub img_url: String,

    /// Ordinal of the marker inside the block text
    pub index: usize,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub needs_assignment: bool,
}

impl DraftSignature {
    #[must_use]
    pub const fn new(party: PartyId, index: usize) -> Self {
        Self {
            party,
            img_url: String::new(),
            index,
            needs_assignment: false,
        }
    }
}

impl DraftBlock {
    pub fn new(text: impl Into<String>, parties: &[PartyId]) -> Self {
        Self {
            text: text.into(),
            signatures: parties
                .iter()
                .enumerate()
                .map(|(index, party)| DraftSignature::new(*party, index))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_drafter_output_shape() {
        let raw = r#"{
            "blocks": [
                {"text": "Intro", "signatures": []},
                {"text": "Signed: ____________________", "signatures": [
                    {"party": "PartyA", "img_url": "", "index": 0}
                ]}
            ],
            "unknowns": ["Start date"]
        }"#;
        let draft: DraftDocument = serde_json::from_str(raw).unwrap();
        assert_eq!(draft.blocks.len(), 2);
        assert_eq!(draft.blocks[1].signatures[0].party, PartyId::Originator);
        assert_eq!(draft.unknowns, vec!["Start date".to_string()]);
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let raw = r#"{"blocks": [{"text": "x"}]}"#;
        let draft: DraftDocument = serde_json::from_str(raw).unwrap();
        assert!(draft.blocks[0].signatures.is_empty());
        assert!(draft.unknowns.is_empty());
    }
}
