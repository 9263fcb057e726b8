use crate::draft::DraftDocument;
use crate::error::Result;
use crate::reconcile::Reconciler;
use crate::types::DocumentModel;

/// Serialize a document into the single text blob kept on the contract record
pub fn encode(doc: &DocumentModel) -> Result<String> {
    Ok(serde_json::to_string(doc)?)
}

/// Decode a stored blob, re-checking every block invariant
pub fn decode(reconciler: &Reconciler, blob: &str) -> Result<DocumentModel> {
    let stored: DraftDocument = serde_json::from_str(blob)?;
    reconciler.restore(stored)
}
