use crate::error::{BlocksError, Result};
use crate::types::{DocumentModel, EncodedImage, PartyId, SignatureBinding};

fn locate(doc: &DocumentModel, block: usize, ordinal: usize) -> Result<&SignatureBinding> {
    doc.block(block)
        .ok_or(BlocksError::block_out_of_range(block))?
        .binding(ordinal)
        .ok_or(BlocksError::ordinal_out_of_range(block, ordinal))
}

/// Store `image` in the binding at (`block`, `ordinal`).
///
/// Only the owning party may write; re-signing overwrites the previous image.
/// The input document is never modified.
pub fn capture_signature(
    doc: &DocumentModel,
    block: usize,
    ordinal: usize,
    party: PartyId,
    image: EncodedImage,
) -> Result<DocumentModel> {
    let binding = locate(doc, block, ordinal)?;
    if binding.party != party {
        return Err(BlocksError::WrongParty {
            block,
            ordinal,
            expected: binding.party,
            actual: party,
        });
    }
    if binding.needs_assignment {
        log::debug!("Signing binding {block}/{ordinal} confirms its assignment to {party}");
    }

    let mut next = doc.clone();
    if let Some(slot) = next
        .block_mut(block)
        .and_then(|b| b.binding_mut(ordinal))
    {
        slot.image = Some(image);
        slot.needs_assignment = false;
    }
    Ok(next)
}

/// Resolve the owner of a binding; changing the owner drops its image
pub fn assign_party(
    doc: &DocumentModel,
    block: usize,
    ordinal: usize,
    party: PartyId,
) -> Result<DocumentModel> {
    let current = locate(doc, block, ordinal)?;
    let changed = current.party != party;

    let mut next = doc.clone();
    if let Some(slot) = next
        .block_mut(block)
        .and_then(|b| b.binding_mut(ordinal))
    {
        if changed {
            log::debug!("Binding {block}/{ordinal} reassigned {} -> {party}", slot.party);
            slot.image = None;
        }
        slot.party = party;
        slot.needs_assignment = false;
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::{DraftBlock, DraftDocument};
    use crate::reconcile::Reconciler;
    use pretty_assertions::assert_eq;

    fn image() -> EncodedImage {
        EncodedImage::parse("data:image/png;base64,iVBORw0KGgo=").unwrap()
    }

    fn doc() -> DocumentModel {
        let marker = "_".repeat(20);
        Reconciler::default()
            .from_draft(DraftDocument {
                blocks: vec![
                    DraftBlock::new("Preamble", &[]),
                    DraftBlock::new(
                        format!("A: {marker}\nB: {marker}"),
                        &[PartyId::Originator, PartyId::Counterparty],
                    ),
                ],
                unknowns: vec![],
            })
            .unwrap()
    }

    #[test]
    fn owner_can_sign() {
        let before = doc();
        let after = capture_signature(&before, 1, 1, PartyId::Counterparty, image()).unwrap();
        assert!(after.block(1).unwrap().bindings()[1].is_bound());
        assert!(!before.block(1).unwrap().bindings()[1].is_bound());
    }

    #[test]
    fn wrong_party_leaves_document_unchanged() {
        let before = doc();
        let snapshot = before.clone();
        let err = capture_signature(&before, 1, 0, PartyId::Counterparty, image()).unwrap_err();
        assert!(matches!(
            err,
            BlocksError::WrongParty {
                block: 1,
                ordinal: 0,
                expected: PartyId::Originator,
                actual: PartyId::Counterparty
            }
        ));
        assert_eq!(before, snapshot);
    }

    #[test]
    fn out_of_range_addresses_fail() {
        let doc = doc();
        assert!(matches!(
            capture_signature(&doc, 7, 0, PartyId::Originator, image()),
            Err(BlocksError::OutOfRange {
                block: 7,
                ordinal: None
            })
        ));
        assert!(matches!(
            capture_signature(&doc, 0, 0, PartyId::Originator, image()),
            Err(BlocksError::OutOfRange {
                block: 0,
                ordinal: Some(0)
            })
        ));
    }

    #[test]
    fn re_signing_overwrites() {
        let first = capture_signature(&doc(), 1, 0, PartyId::Originator, image()).unwrap();
        let second_image = EncodedImage::parse("data:image/png;base64,QkJCQg==").unwrap();
        let second =
            capture_signature(&first, 1, 0, PartyId::Originator, second_image.clone()).unwrap();
        assert_eq!(
            second.block(1).unwrap().bindings()[0].image,
            Some(second_image)
        );
    }

    #[test]
    fn reassignment_clears_image() {
        let signed = capture_signature(&doc(), 1, 0, PartyId::Originator, image()).unwrap();
        let same = assign_party(&signed, 1, 0, PartyId::Originator).unwrap();
        assert!(same.block(1).unwrap().bindings()[0].is_bound());

        let moved = assign_party(&signed, 1, 0, PartyId::Counterparty).unwrap();
        let binding = &moved.block(1).unwrap().bindings()[0];
        assert_eq!(binding.party, PartyId::Counterparty);
        assert!(!binding.is_bound());
    }
}
