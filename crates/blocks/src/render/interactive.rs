use super::{segments, Segment};
use crate::error::Result;
use crate::scanner::Scanner;
use crate::types::{DocumentModel, PartyId};
use serde::Serialize;

/// A signature slot as seen by one viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureSpan {
    pub ordinal: usize,
    pub party: PartyId,
    pub bound: bool,
    /// Captured image, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Only the viewer's own unbound slots can be clicked
    pub actionable: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub needs_assignment: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Span {
    Text { text: String },
    FillIn { index: usize, width: usize },
    Signature(SignatureSpan),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockView {
    pub index: usize,
    pub spans: Vec<Span>,
}

/// Project the document into clickable spans for `viewer`
pub fn interactive_view(
    scanner: &Scanner,
    doc: &DocumentModel,
    viewer: PartyId,
) -> Result<Vec<BlockView>> {
    doc.blocks()
        .iter()
        .enumerate()
        .map(|(index, block)| {
            let spans = segments(scanner, index, block)?
                .into_iter()
                .map(|segment| match segment {
                    Segment::Text(text) => Span::Text {
                        text: text.to_string(),
                    },
                    Segment::FillIn { index, width } => Span::FillIn { index, width },
                    Segment::Signature(binding) => Span::Signature(SignatureSpan {
                        ordinal: binding.ordinal,
                        party: binding.party,
                        bound: binding.is_bound(),
                        image: binding.image.as_ref().map(|i| i.as_str().to_string()),
                        actionable: binding.party == viewer && !binding.is_bound(),
                        needs_assignment: binding.needs_assignment,
                    }),
                })
                .collect();
            Ok(BlockView { index, spans })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::capture_signature;
    use crate::draft::{DraftBlock, DraftDocument};
    use crate::reconcile::Reconciler;
    use crate::types::EncodedImage;
    use pretty_assertions::assert_eq;

    #[test]
    fn spans_interleave_text_and_slots() {
        let marker = "_".repeat(20);
        let reconciler = Reconciler::default();
        let doc = reconciler
            .from_draft(DraftDocument {
                blocks: vec![DraftBlock::new(
                    format!("Fee {}.\nA: {marker}\nB: {marker}", "_".repeat(10)),
                    &[PartyId::Originator, PartyId::Counterparty],
                )],
                unknowns: vec![],
            })
            .unwrap();
        let doc = capture_signature(
            &doc,
            0,
            0,
            PartyId::Originator,
            EncodedImage::parse("data:image/png;base64,iVBORw0KGgo=").unwrap(),
        )
        .unwrap();

        let views = interactive_view(reconciler.scanner(), &doc, PartyId::Counterparty).unwrap();
        let spans = &views[0].spans;

        assert_eq!(spans.len(), 6);
        assert_eq!(
            spans[0],
            Span::Text {
                text: "Fee ".to_string()
            }
        );
        assert_eq!(spans[1], Span::FillIn { index: 0, width: 10 });
        match (&spans[3], &spans[5]) {
            (Span::Signature(a), Span::Signature(b)) => {
                assert!(a.bound && !a.actionable);
                assert!(!b.bound && b.actionable);
                assert_eq!(b.ordinal, 1);
            }
            other => panic!("unexpected spans {other:?}"),
        }
    }

    #[test]
    fn other_partys_slots_are_not_actionable() {
        let doc = Reconciler::default()
            .from_draft(DraftDocument {
                blocks: vec![DraftBlock::new("_".repeat(20), &[PartyId::Originator])],
                unknowns: vec![],
            })
            .unwrap();
        let views = interactive_view(&Scanner::default(), &doc, PartyId::Counterparty).unwrap();
        assert!(matches!(
            &views[0].spans[0],
            Span::Signature(SignatureSpan {
                actionable: false,
                ..
            })
        ));
    }
}
