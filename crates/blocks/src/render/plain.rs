use crate::types::DocumentModel;

/// Joins block texts; contains no glyph so adjacent runs never merge
pub const BLOCK_SEPARATOR: &str = "\n\n";

/// Block texts with markers intact, as fed back to the drafter
#[must_use]
pub fn plain_text(doc: &DocumentModel) -> String {
    doc.blocks()
        .iter()
        .map(|block| block.text())
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}

/// Byte offset at which each block starts inside [`plain_text`]
#[must_use]
pub fn block_offsets(doc: &DocumentModel) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(doc.blocks().len());
    let mut cursor = 0;
    for block in doc.blocks() {
        offsets.push(cursor);
        cursor += block.text().len() + BLOCK_SEPARATOR.len();
    }
    offsets
}
