use chrono::NaiveDate;
use covenant_blocks::{DraftDocument, MarkerConfig};

/// Marker rules shared by every drafting prompt
fn marker_rules(markers: &MarkerConfig) -> String {
    let signature = markers.signature_marker();
    let fill_in = markers.fill_in_marker();
    format!(
        "SIGNATURE FIELDS:\n\
         - A signature field is exactly {sig_len} consecutive '{glyph}' characters: {signature}\n\
         - Never use runs of '{glyph}' for anything else, and never place two fields next to each other.\n\
         - A blank the signer must type in (amount, address, date) is exactly {fill_len} '{glyph}' characters: {fill_in}\n\
         - For every signature field in a block's text, add exactly one object to that block's \"signatures\" array.\n\
         - Each signature object is {{\"party\": \"PartyA\" | \"PartyB\", \"img_url\": \"\", \"index\": n}}.\n\
         - \"index\" counts signature fields in order of appearance within the block, starting at 0.\n\
         - PartyA is the person requesting signatures; PartyB is the person asked to sign.\n\
         - Never write \"PartyA\" or \"PartyB\" in the contract text; use names or roles (Client, Contractor, Landlord...).\n\
         - Before answering, count the fields in every block and make the signatures array match.",
        sig_len = markers.signature_run,
        fill_len = markers.fill_in_run,
        glyph = markers.glyph,
    )
}

const SCHEMA: &str = r#"{
  "blocks": [
    { "text": "clause text, may contain \n newlines", "signatures": [ { "party": "PartyA", "img_url": "", "index": 0 } ] }
  ],
  "unknowns": ["only information the contract truly cannot be written without"]
}"#;

pub(crate) fn generation_system(markers: &MarkerConfig, today: NaiveDate) -> String {
    format!(
        "Today is {today}.\n\n\
         You draft contracts. Answer with one JSON object matching this schema and nothing else:\n\n\
         {SCHEMA}\n\n\
         Write around ten blocks, each a major section (parties and scope, terms, payment, \
         termination, dispute resolution, governing law, signatures).\n\
         Use every concrete name, company and context the request gives you.\n\
         Keep \"unknowns\" as short as possible.\n\n\
         {rules}",
        today = today.format("%-m/%-d/%Y"),
        rules = marker_rules(markers),
    )
}

pub(crate) fn generation_user(prompt: &str, author: &str) -> String {
    format!(
        "Draft a contract for this request from {author}. Use the specific names and \
         details it mentions rather than generic placeholders:\n\n\"{prompt}\""
    )
}

pub(crate) fn regenerate_block_system(
    markers: &MarkerConfig,
    today: NaiveDate,
    current: &DraftDocument,
    index: usize,
) -> String {
    format!(
        "Today is {today}.\n\n\
         You revise contracts. This is the current contract:\n\n{current}\n\n\
         Rewrite ONLY block {index} following the instructions you are given. Return the \
         COMPLETE contract, every other block unchanged, as one JSON object with the same \
         schema and nothing else. You may drop entries from \"unknowns\" that the new text \
         resolves; add one only if the instructions raise a new requirement.\n\n\
         {rules}",
        today = today.format("%-m/%-d/%Y"),
        current = to_pretty_json(current),
        rules = marker_rules(markers),
    )
}

pub(crate) fn regenerate_document_system(
    markers: &MarkerConfig,
    today: NaiveDate,
    current: &DraftDocument,
) -> String {
    format!(
        "Today is {today}.\n\n\
         You revise contracts. This is the current contract:\n\n{current}\n\n\
         Rewrite it following the instructions you are given. Keep the same number of blocks \
         unless the instructions require otherwise. Return one JSON object with the same schema \
         and nothing else.\n\n\
         {rules}",
        today = today.format("%-m/%-d/%Y"),
        current = to_pretty_json(current),
        rules = marker_rules(markers),
    )
}

pub(crate) const SUMMARY_SYSTEM: &str = "You summarize contracts. Answer with a JSON array of \
exactly 4 plain strings, each one concise point of at most 50 words, with no Markdown and no \
other text. Example: [\"This agreement covers consulting services\", \"Work is delivered \
within 30 days\", \"A fee of $5000 is due on completion\", \"Either side may end it with 7 \
days notice\"]";

pub(crate) fn summary_user(current: &DraftDocument) -> String {
    format!(
        "Summarize this contract as a JSON array of exactly 4 strings:\n\n{}",
        to_pretty_json(current)
    )
}

fn to_pretty_json(doc: &DraftDocument) -> String {
    serde_json::to_string_pretty(doc).unwrap_or_default()
}
