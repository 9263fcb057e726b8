use crate::error::{BlocksError, MissingSignature, Result};
use crate::types::{DocumentModel, PartyId};

/// Every binding still blank (or awaiting a party assignment), in document order
#[must_use]
pub fn outstanding(doc: &DocumentModel) -> Vec<MissingSignature> {
    doc.iter_bindings()
        .filter(|(_, binding)| !binding.is_bound() || binding.needs_assignment)
        .map(|(block, binding)| MissingSignature {
            block,
            ordinal: binding.ordinal,
            party: binding.party,
        })
        .collect()
}

/// Blank bindings owned by `party`
#[must_use]
pub fn outstanding_for(doc: &DocumentModel, party: PartyId) -> Vec<MissingSignature> {
    outstanding(doc)
        .into_iter()
        .filter(|missing| missing.party == party)
        .collect()
}

/// True iff every binding owned by `party` carries an image
#[must_use]
pub fn party_is_complete(doc: &DocumentModel, party: PartyId) -> bool {
    doc.iter_bindings()
        .filter(|(_, binding)| binding.party == party)
        .all(|(_, binding)| binding.is_bound() && !binding.needs_assignment)
}

/// True iff every party referenced by a binding is complete.
/// A document without signature markers is trivially complete.
#[must_use]
pub fn document_is_complete(doc: &DocumentModel) -> bool {
    doc.parties()
        .into_iter()
        .all(|party| party_is_complete(doc, party))
}

/// Gate for finalization
pub fn ensure_complete(doc: &DocumentModel) -> Result<()> {
    let missing = outstanding(doc);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(BlocksError::IncompleteSignatures { missing })
    }
}

/// Gate for a party handing the document on (e.g. sending it for signature)
pub fn ensure_party_complete(doc: &DocumentModel, party: PartyId) -> Result<()> {
    let missing = outstanding_for(doc, party);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(BlocksError::IncompleteSignatures { missing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::capture_signature;
    use crate::draft::{DraftBlock, DraftDocument};
    use crate::reconcile::Reconciler;
    use crate::types::EncodedImage;
    use pretty_assertions::assert_eq;

    fn image() -> EncodedImage {
        EncodedImage::parse("data:image/png;base64,iVBORw0KGgo=").unwrap()
    }

    fn two_party_doc() -> DocumentModel {
        let marker = "_".repeat(20);
        Reconciler::default()
            .from_draft(DraftDocument {
                blocks: vec![
                    DraftBlock::new(format!("Client: {marker}"), &[PartyId::Originator]),
                    DraftBlock::new(format!("Contractor: {marker}"), &[PartyId::Counterparty]),
                ],
                unknowns: vec![],
            })
            .unwrap()
    }

    #[test]
    fn completion_requires_both_parties() {
        let doc = two_party_doc();
        assert!(!document_is_complete(&doc));

        let one = capture_signature(&doc, 0, 0, PartyId::Originator, image()).unwrap();
        assert!(party_is_complete(&one, PartyId::Originator));
        assert!(!party_is_complete(&one, PartyId::Counterparty));
        assert!(!document_is_complete(&one));

        let both = capture_signature(&one, 1, 0, PartyId::Counterparty, image()).unwrap();
        assert!(document_is_complete(&both));
        assert!(ensure_complete(&both).is_ok());
    }

    #[test]
    fn incomplete_reports_offending_bindings() {
        let doc = capture_signature(&two_party_doc(), 0, 0, PartyId::Originator, image()).unwrap();
        match ensure_complete(&doc) {
            Err(BlocksError::IncompleteSignatures { missing }) => assert_eq!(
                missing,
                vec![MissingSignature {
                    block: 1,
                    ordinal: 0,
                    party: PartyId::Counterparty
                }]
            ),
            other => panic!("expected IncompleteSignatures, got {other:?}"),
        }
        assert!(ensure_party_complete(&doc, PartyId::Originator).is_ok());
        assert!(ensure_party_complete(&doc, PartyId::Counterparty).is_err());
    }

    #[test]
    fn document_without_markers_is_complete() {
        let doc = Reconciler::default()
            .from_draft(DraftDocument {
                blocks: vec![DraftBlock::new("No signatures here", &[])],
                unknowns: vec![],
            })
            .unwrap();
        assert!(document_is_complete(&doc));
        assert!(outstanding(&doc).is_empty());
    }

    #[test]
    fn pending_assignment_blocks_completion() {
        let marker = "_".repeat(20);
        let doc = two_party_doc();
        let edited = Reconciler::default()
            .edit_block(
                &doc,
                1,
                format!("Contractor: {marker}\nWitness: {marker}"),
                PartyId::Originator,
            )
            .unwrap();
        let flagged = &edited.block(1).unwrap().bindings()[1];
        assert!(flagged.needs_assignment);
        assert_eq!(outstanding_for(&edited, PartyId::Originator).len(), 2);
    }
}
