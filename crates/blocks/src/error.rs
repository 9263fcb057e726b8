use crate::types::PartyId;
use serde::Serialize;
use thiserror::Error;

/// Result type for block operations
pub type Result<T> = std::result::Result<T, BlocksError>;

/// A binding that still lacks a signature (or a party assignment)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MissingSignature {
    pub block: usize,
    pub ordinal: usize,
    pub party: PartyId,
}

/// Errors raised by the scanner, reconciliation engine, capture and completion gate
#[derive(Error, Debug)]
pub enum BlocksError {
    /// Reconciliation produced a binding table whose length differs from the marker count
    #[error("Binding mismatch in block {block}: {markers} markers, {bindings} bindings")]
    BindingMismatch {
        block: usize,
        markers: usize,
        bindings: usize,
    },

    /// Drafted output violates the marker/binding contract
    #[error("Generation contract violation in block {block}: {reason}")]
    GenerationContractViolation { block: usize, reason: String },

    /// A party tried to write into another party's binding
    #[error("Binding {ordinal} of block {block} belongs to {expected}, not {actual}")]
    WrongParty {
        block: usize,
        ordinal: usize,
        expected: PartyId,
        actual: PartyId,
    },

    /// Block index or ordinal does not address an existing binding
    #[error("No binding at block {block}, ordinal {ordinal:?}")]
    OutOfRange {
        block: usize,
        ordinal: Option<usize>,
    },

    /// Finalization attempted before every binding was signed
    #[error("{} signature(s) still blank", missing.len())]
    IncompleteSignatures { missing: Vec<MissingSignature> },

    /// Mutation attempted on a completed contract
    #[error("Document is frozen")]
    DocumentFrozen,

    /// Captured signature is not a decodable image data URL
    #[error("Invalid signature image: {0}")]
    InvalidImage(String),

    /// Manual edit or fill-in that cannot be applied
    #[error("Invalid edit in block {block}: {reason}")]
    InvalidEdit { block: usize, reason: String },

    /// Invalid marker configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Storage blob could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BlocksError {
    /// Create a generation contract violation
    pub fn contract_violation(block: usize, reason: impl Into<String>) -> Self {
        Self::GenerationContractViolation {
            block,
            reason: reason.into(),
        }
    }

    /// Create an invalid edit error
    pub fn invalid_edit(block: usize, reason: impl Into<String>) -> Self {
        Self::InvalidEdit {
            block,
            reason: reason.into(),
        }
    }

    /// Create an out-of-range error for a block index
    pub const fn block_out_of_range(block: usize) -> Self {
        Self::OutOfRange {
            block,
            ordinal: None,
        }
    }

    /// Create an out-of-range error for a binding ordinal
    pub const fn ordinal_out_of_range(block: usize, ordinal: usize) -> Self {
        Self::OutOfRange {
            block,
            ordinal: Some(ordinal),
        }
    }

    /// Stable snake_case code for wire envelopes
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BindingMismatch { .. } => "binding_mismatch",
            Self::GenerationContractViolation { .. } => "generation_contract_violation",
            Self::WrongParty { .. } => "wrong_party",
            Self::OutOfRange { .. } => "out_of_range",
            Self::IncompleteSignatures { .. } => "incomplete_signatures",
            Self::DocumentFrozen => "document_frozen",
            Self::InvalidImage(_) => "invalid_image",
            Self::InvalidEdit { .. } => "invalid_edit",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Serialization(_) => "corrupted_document",
        }
    }

    /// Validation errors leave the document untouched and point at a field
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::WrongParty { .. }
                | Self::OutOfRange { .. }
                | Self::IncompleteSignatures { .. }
                | Self::DocumentFrozen
                | Self::InvalidImage(_)
                | Self::InvalidEdit { .. }
        )
    }

    /// Data-integrity failures must abort the whole mutation
    #[must_use]
    pub const fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::BindingMismatch { .. } | Self::GenerationContractViolation { .. }
        )
    }
}
