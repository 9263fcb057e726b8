use crate::draft::{DraftBlock, DraftDocument, DraftSignature};
use crate::error::{BlocksError, Result};
use crate::scanner::Scanner;
use crate::types::{Block, DocumentModel, EncodedImage, PartyId, SignatureBinding};
use std::collections::BTreeSet;

/// Where the parties of a block's markers come from
#[derive(Debug, Clone, Copy)]
pub enum BindingSource<'a> {
    /// Drafter output naming a party for every marker
    Drafted(&'a [DraftSignature]),
    /// Manual edit by one party; new markers default to the editor
    Edited { editor: PartyId },
}

/// Keeps binding tables aligned with block text across every mutation.
///
/// Bindings are matched purely by ordinal: the i-th marker before and after a
/// change share binding history. All operations are pure transforms that
/// return a new value and leave their input untouched on error.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    scanner: Scanner,
}

impl Reconciler {
    #[must_use]
    pub const fn new(scanner: Scanner) -> Self {
        Self { scanner }
    }

    #[must_use]
    pub const fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    /// Re-derive the binding table of one block for `new_text`
    pub fn reconcile_block(
        &self,
        block_index: usize,
        old: Option<&Block>,
        new_text: String,
        source: BindingSource<'_>,
    ) -> Result<Block> {
        let markers = self.scanner.signature_count(&new_text);
        let proposed = match source {
            BindingSource::Drafted(signatures) => {
                Some(ordered_parties(block_index, signatures, markers)?)
            }
            BindingSource::Edited { .. } => None,
        };

        let shared_block = match (source, old) {
            (BindingSource::Edited { editor }, Some(block)) => {
                block.bindings().iter().any(|b| b.party != editor)
            }
            _ => false,
        };

        let mut bindings = Vec::with_capacity(markers);
        for ordinal in 0..markers {
            let prior = old.and_then(|block| block.binding(ordinal));
            let binding = match (source, prior) {
                (BindingSource::Drafted(_), Some(prev)) => {
                    let party = proposed
                        .as_ref()
                        .and_then(|parties| parties.get(ordinal).copied())
                        .unwrap_or(prev.party);
                    carry_forward(block_index, prev, party)
                }
                (BindingSource::Drafted(_), None) => {
                    let party = proposed
                        .as_ref()
                        .and_then(|parties| parties.get(ordinal).copied())
                        .ok_or_else(|| {
                            BlocksError::contract_violation(
                                block_index,
                                format!("no party proposed for marker {ordinal}"),
                            )
                        })?;
                    SignatureBinding::unbound(party, ordinal)
                }
                (BindingSource::Edited { .. }, Some(prev)) => SignatureBinding {
                    ordinal,
                    ..prev.clone()
                },
                (BindingSource::Edited { editor }, None) => SignatureBinding {
                    needs_assignment: shared_block,
                    ..SignatureBinding::unbound(editor, ordinal)
                },
            };
            bindings.push(binding);
        }

        if let Some(old) = old {
            for dropped in old.bindings().iter().skip(markers) {
                if dropped.is_bound() {
                    log::warn!(
                        "Block {block_index}: marker {} removed, discarding signature of {}",
                        dropped.ordinal,
                        dropped.party
                    );
                }
            }
        }

        let block = Block::from_parts(new_text, bindings);
        self.ensure_aligned(block_index, &block)?;
        Ok(block)
    }

    /// Check the block invariant: one binding per marker, ordinals dense
    pub fn ensure_aligned(&self, block_index: usize, block: &Block) -> Result<()> {
        let markers = self.scanner.signature_count(block.text());
        let mismatch = block.bindings().len() != markers
            || block
                .bindings()
                .iter()
                .enumerate()
                .any(|(i, binding)| binding.ordinal != i);
        if mismatch {
            return Err(BlocksError::BindingMismatch {
                block: block_index,
                markers,
                bindings: block.bindings().len(),
            });
        }
        Ok(())
    }

    /// Build a document from freshly drafted output (no history)
    pub fn from_draft(&self, draft: DraftDocument) -> Result<DocumentModel> {
        self.reconcile_document(None, draft)
    }

    /// Whole-document regeneration.
    ///
    /// Blocks are paired positionally only when the block count is unchanged;
    /// otherwise every block starts without history.
    pub fn reconcile_document(
        &self,
        old: Option<&DocumentModel>,
        draft: DraftDocument,
    ) -> Result<DocumentModel> {
        let history = old.filter(|doc| doc.blocks().len() == draft.blocks.len());
        if let (Some(old), None) = (old, history) {
            log::info!(
                "Block count changed ({} -> {}), regenerating without signature history",
                old.blocks().len(),
                draft.blocks.len()
            );
        }

        let mut blocks = Vec::with_capacity(draft.blocks.len());
        for (index, DraftBlock { text, signatures }) in draft.blocks.into_iter().enumerate() {
            let prior = history.and_then(|doc| doc.block(index));
            blocks.push(self.reconcile_block(
                index,
                prior,
                text,
                BindingSource::Drafted(&signatures),
            )?);
        }

        Ok(DocumentModel::from_blocks(
            blocks,
            draft.unknowns.into_iter().collect(),
        ))
    }

    /// Apply a drafter answer to a single-block regeneration request.
    ///
    /// Only block `index` changes; the drafter may return the whole document
    /// (same block count) or just the regenerated block.
    pub fn reconcile_regenerated_block(
        &self,
        old: &DocumentModel,
        index: usize,
        draft: DraftDocument,
    ) -> Result<DocumentModel> {
        let prior = old
            .block(index)
            .ok_or(BlocksError::block_out_of_range(index))?;

        let DraftDocument {
            mut blocks,
            unknowns,
        } = draft;
        let regenerated = if blocks.len() == old.blocks().len() {
            blocks.swap_remove(index)
        } else if blocks.len() == 1 {
            blocks.remove(0)
        } else {
            return Err(BlocksError::contract_violation(
                index,
                format!(
                    "regenerated document has {} blocks, expected {}",
                    blocks.len(),
                    old.blocks().len()
                ),
            ));
        };

        let block = self.reconcile_block(
            index,
            Some(prior),
            regenerated.text,
            BindingSource::Drafted(&regenerated.signatures),
        )?;

        let mut doc = old.clone();
        doc.replace_block(index, block)?;
        let unknowns: BTreeSet<String> = unknowns.into_iter().collect();
        for added in unknowns.difference(&doc.unknowns) {
            log::debug!("Regeneration surfaced new unknown: {added}");
        }
        doc.unknowns = unknowns;
        Ok(doc)
    }

    /// Replace the text of a block by hand
    pub fn edit_block(
        &self,
        doc: &DocumentModel,
        index: usize,
        new_text: String,
        editor: PartyId,
    ) -> Result<DocumentModel> {
        let prior = doc
            .block(index)
            .ok_or(BlocksError::block_out_of_range(index))?;
        let block =
            self.reconcile_block(index, Some(prior), new_text, BindingSource::Edited { editor })?;
        let mut next = doc.clone();
        next.replace_block(index, block)?;
        Ok(next)
    }

    /// Replace the `fill_index`-th fill-in field of a block with `value`
    pub fn fill_in(
        &self,
        doc: &DocumentModel,
        index: usize,
        fill_index: usize,
        value: &str,
        editor: PartyId,
    ) -> Result<DocumentModel> {
        let prior = doc
            .block(index)
            .ok_or(BlocksError::block_out_of_range(index))?;
        let value = value.trim();
        if value.is_empty() {
            return Err(BlocksError::invalid_edit(index, "fill-in value is empty"));
        }
        if value.contains(self.scanner.config().glyph) {
            return Err(BlocksError::invalid_edit(
                index,
                format!(
                    "fill-in value may not contain the reserved glyph {:?}",
                    self.scanner.config().glyph
                ),
            ));
        }

        let fields = self.scanner.fill_ins(prior.text());
        let Some(field) = fields.get(fill_index) else {
            return Err(BlocksError::invalid_edit(
                index,
                format!("no fill-in field {fill_index} ({} present)", fields.len()),
            ));
        };

        let mut text = prior.text().to_string();
        text.replace_range(field.range(), value);

        let block =
            self.reconcile_block(index, Some(prior), text, BindingSource::Edited { editor })?;
        if block.bindings() != prior.bindings() {
            return Err(BlocksError::BindingMismatch {
                block: index,
                markers: block.bindings().len(),
                bindings: prior.bindings().len(),
            });
        }

        let mut next = doc.clone();
        next.replace_block(index, block)?;
        Ok(next)
    }

    /// Rebuild a document from its storage blob, trusting stored images
    pub fn restore(&self, stored: DraftDocument) -> Result<DocumentModel> {
        let mut blocks = Vec::with_capacity(stored.blocks.len());
        for (index, DraftBlock { text, signatures }) in stored.blocks.into_iter().enumerate() {
            let markers = self.scanner.signature_count(&text);
            let mut signatures = signatures;
            signatures.sort_by_key(|s| s.index);
            let dense = signatures.iter().enumerate().all(|(i, s)| s.index == i);
            if signatures.len() != markers || !dense {
                return Err(BlocksError::BindingMismatch {
                    block: index,
                    markers,
                    bindings: signatures.len(),
                });
            }

            let bindings = signatures
                .into_iter()
                .map(|s| SignatureBinding {
                    party: s.party,
                    image: EncodedImage::from_stored(s.img_url),
                    ordinal: s.index,
                    needs_assignment: s.needs_assignment,
                })
                .collect();
            blocks.push(Block::from_parts(text, bindings));
        }

        Ok(DocumentModel::from_blocks(
            blocks,
            stored.unknowns.into_iter().collect(),
        ))
    }
}

/// Validate drafted signature entries and return parties in ordinal order
fn ordered_parties(
    block_index: usize,
    signatures: &[DraftSignature],
    markers: usize,
) -> Result<Vec<PartyId>> {
    if signatures.len() != markers {
        return Err(BlocksError::contract_violation(
            block_index,
            format!(
                "{markers} signature markers but {} signature entries",
                signatures.len()
            ),
        ));
    }

    let mut slots: Vec<Option<PartyId>> = vec![None; markers];
    for signature in signatures {
        let Some(slot) = slots.get_mut(signature.index) else {
            return Err(BlocksError::contract_violation(
                block_index,
                format!(
                    "signature index {} out of range for {markers} markers",
                    signature.index
                ),
            ));
        };
        if slot.is_some() {
            return Err(BlocksError::contract_violation(
                block_index,
                format!("duplicate signature index {}", signature.index),
            ));
        }
        *slot = Some(signature.party);
    }

    Ok(slots.into_iter().flatten().collect())
}

/// Carry a binding into the new text. A party change clears the image:
/// a signature belongs to whoever drew it.
fn carry_forward(block_index: usize, prev: &SignatureBinding, party: PartyId) -> SignatureBinding {
    if prev.party == party {
        return SignatureBinding {
            needs_assignment: false,
            ..prev.clone()
        };
    }

    log::debug!(
        "Block {block_index}: marker {} reassigned {} -> {party}",
        prev.ordinal,
        prev.party
    );
    if prev.is_bound() {
        log::warn!(
            "Block {block_index}: clearing signature at marker {} after party change",
            prev.ordinal
        );
    }
    SignatureBinding::unbound(party, prev.ordinal)
}
