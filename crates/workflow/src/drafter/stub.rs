use super::{Drafter, SUMMARY_LINES};
use crate::contract::CurrentUser;
use crate::error::{Result, WorkflowError};
use async_trait::async_trait;
use covenant_blocks::{DraftBlock, DraftDocument, DraftSignature, MarkerConfig, PartyId};

/// Deterministic offline drafter.
///
/// Produces a fixed four-block template and understands a few instruction
/// keywords ("counterparty", "originator", "add signature", "add clause"),
/// which is enough to drive every workflow path without a network.
#[derive(Debug, Clone, Default)]
pub struct StubDrafter {
    markers: MarkerConfig,
}

impl StubDrafter {
    pub const fn new(markers: MarkerConfig) -> Self {
        Self { markers }
    }

    fn requested_party(instructions: &str) -> Option<PartyId> {
        let lower = instructions.to_ascii_lowercase();
        if lower.contains("counterparty") || lower.contains("partyb") {
            Some(PartyId::Counterparty)
        } else if lower.contains("originator") || lower.contains("partya") {
            Some(PartyId::Originator)
        } else {
            None
        }
    }

    fn prune_unknowns(unknowns: &mut Vec<String>, instructions: &str) {
        let lower = instructions.to_ascii_lowercase();
        unknowns.retain(|unknown| !lower.contains(&unknown.to_ascii_lowercase()));
    }

    fn revise_block(&self, block: &mut DraftBlock, instructions: &str) {
        let party = Self::requested_party(instructions);
        if let Some(party) = party {
            for signature in &mut block.signatures {
                signature.party = party;
            }
        }
        if instructions.to_ascii_lowercase().contains("add signature") {
            let index = block.signatures.len();
            block.text.push_str(&format!("\nWitness: {}", self.markers.signature_marker()));
            block.signatures.push(DraftSignature::new(
                party.unwrap_or(PartyId::Originator),
                index,
            ));
        }
    }
}

#[async_trait]
impl Drafter for StubDrafter {
    fn id(&self) -> &'static str {
        "stub"
    }

    async fn generate_document(&self, prompt: &str, author: &CurrentUser) -> Result<DraftDocument> {
        let signature = self.markers.signature_marker();
        let fill_in = self.markers.fill_in_marker();
        let prompt = prompt.trim();
        Ok(DraftDocument {
            blocks: vec![
                DraftBlock::new(
                    format!(
                        "AGREEMENT\n\nThis agreement is made between {} (\"Client\") and the \
                         Provider for the following purpose: {prompt}.",
                        author.display_name()
                    ),
                    &[],
                ),
                DraftBlock::new(
                    format!("Payment. The Client will pay {fill_in} within 30 days of invoice."),
                    &[],
                ),
                DraftBlock::new(format!("Signed: {signature}"), &[PartyId::Originator]),
                DraftBlock::new(format!("Accepted: {signature}"), &[PartyId::Counterparty]),
            ],
            unknowns: vec!["Payment amount".to_string(), "Effective date".to_string()],
        })
    }

    async fn regenerate_block(
        &self,
        current: &DraftDocument,
        index: usize,
        instructions: &str,
    ) -> Result<DraftDocument> {
        let mut next = current.clone();
        let block = next.blocks.get_mut(index).ok_or_else(|| {
            WorkflowError::MalformedDraft(format!("no block {index} to regenerate"))
        })?;
        self.revise_block(block, instructions);
        Self::prune_unknowns(&mut next.unknowns, instructions);
        Ok(next)
    }

    async fn regenerate_document(
        &self,
        current: &DraftDocument,
        instructions: &str,
    ) -> Result<DraftDocument> {
        let mut next = current.clone();
        if instructions.to_ascii_lowercase().contains("add clause") {
            next.blocks.push(DraftBlock::new(
                format!("Additional terms. {}", instructions.trim()),
                &[],
            ));
        }
        Self::prune_unknowns(&mut next.unknowns, instructions);
        Ok(next)
    }

    async fn summarize(&self, current: &DraftDocument) -> Result<Vec<String>> {
        let fields: usize = current.blocks.iter().map(|b| b.signatures.len()).sum();
        let opening: String = current
            .blocks
            .first()
            .map(|b| b.text.split_whitespace().collect::<Vec<_>>().join(" "))
            .unwrap_or_default()
            .chars()
            .take(80)
            .collect();
        let outstanding = if current.unknowns.is_empty() {
            "No details are outstanding".to_string()
        } else {
            format!("Outstanding details: {}", current.unknowns.join(", "))
        };

        let lines = vec![
            format!("This contract has {} sections", current.blocks.len()),
            format!("It contains {fields} signature fields"),
            outstanding,
            format!("It opens with: {opening}"),
        ];
        debug_assert_eq!(lines.len(), SUMMARY_LINES);
        Ok(lines)
    }
}
