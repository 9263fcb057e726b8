use covenant_blocks::render::{block_offsets, plain_text};
use covenant_blocks::{
    capture_signature, BindingSource, DocumentModel, DraftBlock, DraftDocument, DraftSignature,
    EncodedImage, PartyId, Reconciler,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Piece {
    Word(String),
    Signature,
    FillIn,
    Stray(usize),
}

fn piece() -> impl Strategy<Value = Piece> {
    prop_oneof![
        4 => "[a-zA-Z.,:]{1,10}".prop_map(Piece::Word),
        2 => Just(Piece::Signature),
        1 => Just(Piece::FillIn),
        1 => prop_oneof![Just(3usize), Just(15), Just(21), Just(40)].prop_map(Piece::Stray),
    ]
}

fn render(pieces: &[Piece]) -> (String, usize) {
    let mut markers = 0;
    let text = pieces
        .iter()
        .map(|p| match p {
            Piece::Word(w) => w.clone(),
            Piece::Signature => {
                markers += 1;
                "_".repeat(20)
            }
            Piece::FillIn => "_".repeat(10),
            Piece::Stray(n) => "_".repeat(*n),
        })
        .collect::<Vec<_>>()
        .join(" ");
    (text, markers)
}

fn party(bit: bool) -> PartyId {
    if bit {
        PartyId::Originator
    } else {
        PartyId::Counterparty
    }
}

fn drafted(pieces: &[Piece], bits: &[bool]) -> DraftBlock {
    let (text, markers) = render(pieces);
    let parties: Vec<PartyId> = (0..markers)
        .map(|i| party(bits.get(i).copied().unwrap_or(true)))
        .collect();
    DraftBlock::new(text, &parties)
}

fn assert_aligned(reconciler: &Reconciler, doc: &DocumentModel) {
    for block in doc.blocks() {
        let markers = reconciler.scanner().signature_count(block.text());
        assert_eq!(block.bindings().len(), markers);
        for (i, binding) in block.bindings().iter().enumerate() {
            assert_eq!(binding.ordinal, i);
        }
    }
}

fn image() -> EncodedImage {
    EncodedImage::parse("data:image/png;base64,iVBORw0KGgo=").unwrap()
}

proptest! {
    #[test]
    fn drafted_documents_keep_one_binding_per_marker(
        blocks in prop::collection::vec(prop::collection::vec(piece(), 0..12), 1..6),
        bits in prop::collection::vec(any::<bool>(), 0..16),
    ) {
        let reconciler = Reconciler::default();
        let draft = DraftDocument {
            blocks: blocks.iter().map(|pieces| drafted(pieces, &bits)).collect(),
            unknowns: vec![],
        };
        let expected: Vec<usize> = blocks.iter().map(|p| render(p).1).collect();

        let doc = reconciler.from_draft(draft).unwrap();
        assert_aligned(&reconciler, &doc);
        let counts: Vec<usize> = doc.blocks().iter().map(|b| b.bindings().len()).collect();
        prop_assert_eq!(counts, expected);
    }

    #[test]
    fn plain_text_rescans_to_the_same_markers(
        blocks in prop::collection::vec(prop::collection::vec(piece(), 0..12), 1..6),
    ) {
        let reconciler = Reconciler::default();
        let doc = reconciler
            .from_draft(DraftDocument {
                blocks: blocks.iter().map(|pieces| drafted(pieces, &[])).collect(),
                unknowns: vec![],
            })
            .unwrap();

        let text = plain_text(&doc);
        let rescanned = reconciler.scanner().signatures(&text);
        let offsets = block_offsets(&doc);
        let expected: Vec<usize> = doc
            .blocks()
            .iter()
            .zip(&offsets)
            .flat_map(|(block, base)| {
                reconciler
                    .scanner()
                    .signatures(block.text())
                    .into_iter()
                    .map(move |span| span.start + base)
            })
            .collect();

        prop_assert_eq!(rescanned.len(), doc.binding_count());
        prop_assert_eq!(rescanned.iter().map(|s| s.start).collect::<Vec<_>>(), expected);
    }

    #[test]
    fn rewording_carries_signatures_by_ordinal(
        before in prop::collection::vec(piece(), 0..12),
        after in prop::collection::vec(piece(), 0..12),
        bits in prop::collection::vec(any::<bool>(), 0..16),
    ) {
        let reconciler = Reconciler::default();
        let doc = reconciler
            .from_draft(DraftDocument {
                blocks: vec![drafted(&before, &bits)],
                unknowns: vec![],
            })
            .unwrap();

        let mut signed = doc.clone();
        for binding in doc.block(0).unwrap().bindings() {
            signed = capture_signature(&signed, 0, binding.ordinal, binding.party, image()).unwrap();
        }

        let next = drafted(&after, &bits);
        let block = reconciler
            .reconcile_block(
                0,
                signed.block(0),
                next.text.clone(),
                BindingSource::Drafted(&next.signatures),
            )
            .unwrap();

        let old_count = signed.block(0).unwrap().bindings().len();
        prop_assert_eq!(block.bindings().len(), render(&after).1);
        for binding in block.bindings() {
            let carried = binding.ordinal < old_count;
            prop_assert_eq!(binding.is_bound(), carried);
        }
    }

    #[test]
    fn manual_edits_never_break_alignment(
        before in prop::collection::vec(piece(), 0..10),
        after in prop::collection::vec(piece(), 0..10),
        editor in any::<bool>(),
    ) {
        let reconciler = Reconciler::default();
        let doc = reconciler
            .from_draft(DraftDocument {
                blocks: vec![drafted(&before, &[])],
                unknowns: vec![],
            })
            .unwrap();
        let (text, _) = render(&after);
        let edited = reconciler.edit_block(&doc, 0, text, party(editor)).unwrap();
        assert_aligned(&reconciler, &edited);
    }
}

#[test]
fn mismatched_draft_counts_are_rejected_not_patched() {
    let marker = "_".repeat(20);
    let draft = DraftDocument {
        blocks: vec![DraftBlock {
            text: format!("{marker} and {marker}"),
            signatures: vec![DraftSignature::new(PartyId::Originator, 0)],
        }],
        unknowns: vec![],
    };
    let err = Reconciler::default().from_draft(draft).unwrap_err();
    assert!(err.is_integrity());
}
