//! Views over a [`DocumentModel`]: interactive spans, plain text and print HTML.
//!
//! All three walk the same segment sequence, so a marker can never be
//! rendered against the wrong binding.

mod interactive;
mod plain;
mod print;

pub use interactive::{interactive_view, BlockView, SignatureSpan, Span};
pub use plain::{block_offsets, plain_text, BLOCK_SEPARATOR};
pub use print::{escape_html, print_html, PrintOptions};

use crate::error::{BlocksError, Result};
use crate::scanner::{MarkerKind, Scanner};
use crate::types::{Block, SignatureBinding};

/// One piece of a block in reading order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    Text(&'a str),
    FillIn { index: usize, width: usize },
    Signature(&'a SignatureBinding),
}

pub(crate) fn segments<'a>(
    scanner: &Scanner,
    block_index: usize,
    block: &'a Block,
) -> Result<Vec<Segment<'a>>> {
    let text = block.text();
    let mut out = Vec::new();
    let mut cursor = 0;
    let mut signatures = 0;
    let mut fill_ins = 0;

    for span in scanner.scan(text) {
        if span.start > cursor {
            out.push(Segment::Text(&text[cursor..span.start]));
        }
        match span.kind {
            MarkerKind::Signature => {
                let binding =
                    block
                        .binding(signatures)
                        .ok_or(BlocksError::BindingMismatch {
                            block: block_index,
                            markers: signatures + 1,
                            bindings: block.bindings().len(),
                        })?;
                out.push(Segment::Signature(binding));
                signatures += 1;
            }
            MarkerKind::FillIn => {
                out.push(Segment::FillIn {
                    index: fill_ins,
                    width: scanner.config().fill_in_run,
                });
                fill_ins += 1;
            }
        }
        cursor = span.end();
    }
    if cursor < text.len() {
        out.push(Segment::Text(&text[cursor..]));
    }

    if signatures != block.bindings().len() {
        return Err(BlocksError::BindingMismatch {
            block: block_index,
            markers: signatures,
            bindings: block.bindings().len(),
        });
    }
    Ok(out)
}
