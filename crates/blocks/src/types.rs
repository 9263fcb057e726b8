use crate::draft::{DraftBlock, DraftDocument, DraftSignature};
use crate::error::{BlocksError, Result};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;

/// Contract role owning a signature slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PartyId {
    /// Drafts the contract and requests the signature
    #[serde(rename = "PartyA", alias = "originator")]
    Originator,
    /// Receives the contract and signs it
    #[serde(rename = "PartyB", alias = "counterparty")]
    Counterparty,
}

impl PartyId {
    pub const ALL: [Self; 2] = [Self::Originator, Self::Counterparty];

    /// Wire name used in drafted documents
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Originator => "PartyA",
            Self::Counterparty => "PartyB",
        }
    }

    /// Fallback label for printed signature lines
    #[must_use]
    pub const fn default_label(self) -> &'static str {
        match self {
            Self::Originator => "Party A",
            Self::Counterparty => "Party B",
        }
    }

    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Originator => Self::Counterparty,
            Self::Counterparty => Self::Originator,
        }
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Captured signature image, kept as a `data:image/...;base64,` URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedImage(String);

impl EncodedImage {
    /// Parse and validate a data URL
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        let Some(rest) = trimmed.strip_prefix("data:image/") else {
            return Err(BlocksError::InvalidImage(
                "expected a data:image/... URL".to_string(),
            ));
        };
        let Some((media, payload)) = rest.split_once(',') else {
            return Err(BlocksError::InvalidImage("missing data payload".to_string()));
        };
        if !media.ends_with(";base64") {
            return Err(BlocksError::InvalidImage(
                "image payload must be base64 encoded".to_string(),
            ));
        }
        if payload.is_empty() {
            return Err(BlocksError::InvalidImage("empty image payload".to_string()));
        }
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|err| BlocksError::InvalidImage(format!("bad base64 payload: {err}")))?;

        Ok(Self(trimmed.to_string()))
    }

    /// Wrap a stored value without re-validating it
    pub(crate) fn from_stored(raw: String) -> Option<Self> {
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One signature slot: which party owns marker `ordinal` and what they drew
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureBinding {
    pub party: PartyId,
    pub image: Option<EncodedImage>,
    pub ordinal: usize,
    /// Added by a manual edit in a block shared with another party
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub needs_assignment: bool,
}

impl SignatureBinding {
    /// Fresh unbound binding
    #[must_use]
    pub const fn unbound(party: PartyId, ordinal: usize) -> Self {
        Self {
            party,
            image: None,
            ordinal,
            needs_assignment: false,
        }
    }

    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.image.is_some()
    }
}

/// A unit of contract text plus its binding table
///
/// `bindings.len()` always equals the number of signature markers in `text`
/// and `bindings[i].ordinal == i`. Blocks are only produced by the
/// reconciliation engine or the validated storage decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    text: String,
    bindings: Vec<SignatureBinding>,
}

impl Block {
    pub(crate) fn from_parts(text: String, bindings: Vec<SignatureBinding>) -> Self {
        Self { text, bindings }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn bindings(&self) -> &[SignatureBinding] {
        &self.bindings
    }

    #[must_use]
    pub fn binding(&self, ordinal: usize) -> Option<&SignatureBinding> {
        self.bindings.get(ordinal)
    }

    pub(crate) fn binding_mut(&mut self, ordinal: usize) -> Option<&mut SignatureBinding> {
        self.bindings.get_mut(ordinal)
    }
}

/// The full document: ordered blocks plus outstanding unknowns
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "DraftDocument")]
pub struct DocumentModel {
    blocks: Vec<Block>,
    pub unknowns: BTreeSet<String>,
}

impl DocumentModel {
    pub(crate) fn from_blocks(blocks: Vec<Block>, unknowns: BTreeSet<String>) -> Self {
        Self { blocks, unknowns }
    }

    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    #[must_use]
    pub fn block(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub(crate) fn block_mut(&mut self, index: usize) -> Option<&mut Block> {
        self.blocks.get_mut(index)
    }

    pub(crate) fn replace_block(&mut self, index: usize, block: Block) -> Result<()> {
        let slot = self
            .blocks
            .get_mut(index)
            .ok_or(BlocksError::block_out_of_range(index))?;
        *slot = block;
        Ok(())
    }

    /// Total number of signature markers across all blocks
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.blocks.iter().map(|b| b.bindings.len()).sum()
    }

    /// Every party referenced by at least one binding
    #[must_use]
    pub fn parties(&self) -> BTreeSet<PartyId> {
        self.blocks
            .iter()
            .flat_map(|b| b.bindings.iter().map(|s| s.party))
            .collect()
    }

    /// Iterate `(block, binding)` pairs in document order
    pub fn iter_bindings(&self) -> impl Iterator<Item = (usize, &SignatureBinding)> {
        self.blocks
            .iter()
            .enumerate()
            .flat_map(|(i, b)| b.bindings.iter().map(move |s| (i, s)))
    }

    /// SHA-256 over the storage encoding, hex encoded
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let draft = DraftDocument::from(self.clone());
        let bytes = serde_json::to_vec(&draft).unwrap_or_default();
        sha256_hex(&bytes)
    }
}

/// Lowercase hex SHA-256 of `bytes`
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

impl From<DocumentModel> for DraftDocument {
    fn from(doc: DocumentModel) -> Self {
        Self {
            blocks: doc
                .blocks
                .into_iter()
                .map(|block| DraftBlock {
                    signatures: block
                        .bindings
                        .into_iter()
                        .map(|s| DraftSignature {
                            party: s.party,
                            img_url: s.image.map(|i| i.0).unwrap_or_default(),
                            index: s.ordinal,
                            needs_assignment: s.needs_assignment,
                        })
                        .collect(),
                    text: block.text,
                })
                .collect(),
            unknowns: doc.unknowns.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_party_wire_names() {
        assert_eq!(
            serde_json::to_string(&PartyId::Originator).unwrap(),
            "\"PartyA\""
        );
        let party: PartyId = serde_json::from_str("\"PartyB\"").unwrap();
        assert_eq!(party, PartyId::Counterparty);
        let party: PartyId = serde_json::from_str("\"originator\"").unwrap();
        assert_eq!(party, PartyId::Originator);
        assert_eq!(PartyId::Originator.other(), PartyId::Counterparty);
    }

    #[test]
    fn test_image_parse() {
        assert!(EncodedImage::parse("data:image/png;base64,iVBORw0KGgo=").is_ok());
        assert!(EncodedImage::parse("https://example.com/sig.png").is_err());
        assert!(EncodedImage::parse("data:image/png,rawbytes").is_err());
        assert!(EncodedImage::parse("data:image/png;base64,").is_err());
        assert!(EncodedImage::parse("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn test_stored_image_empty_is_unbound() {
        assert!(EncodedImage::from_stored(String::new()).is_none());
        assert!(EncodedImage::from_stored("  ".to_string()).is_none());
        assert!(EncodedImage::from_stored("data:image/png;base64,AA==".to_string()).is_some());
    }
}
