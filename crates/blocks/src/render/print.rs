use super::{segments, Segment};
use crate::error::Result;
use crate::scanner::Scanner;
use crate::types::{DocumentModel, PartyId};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Header data and party labels for the print layout
#[derive(Debug, Clone)]
pub struct PrintOptions {
    pub title: String,
    pub contract_id: String,
    pub date: NaiveDate,
    pub labels: BTreeMap<PartyId, String>,
}

impl PrintOptions {
    pub fn new(contract_id: impl Into<String>) -> Self {
        Self {
            title: "Contract".to_string(),
            contract_id: contract_id.into(),
            date: chrono::Local::now().date_naive(),
            labels: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub const fn date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    #[must_use]
    pub fn label(mut self, party: PartyId, label: impl Into<String>) -> Self {
        self.labels.insert(party, label.into());
        self
    }

    fn label_for(&self, party: PartyId) -> &str {
        self.labels
            .get(&party)
            .map_or(party.default_label(), String::as_str)
    }
}

const STYLE: &str = r"
body { font-family: 'Times New Roman', serif; font-size: 12pt; line-height: 1.6; color: #000; background: white; }
.contract-header { text-align: center; margin-bottom: 30px; border-bottom: 2px solid #000; padding-bottom: 20px; }
.contract-title { font-size: 18pt; font-weight: bold; margin-bottom: 10px; }
.contract-meta { font-size: 12pt; color: #666; }
.contract-block { margin-bottom: 20px; text-align: justify; }
.contract-block p { margin: 0 0 10px 0; }
.signature-line { display: inline-block; width: 200px; border-bottom: 1px solid #000; margin: 0 10px; }
.signature-image { height: 40px; border-bottom: 1px solid #000; display: inline-block; margin: 0 10px; }
.fill-in { display: inline-block; width: 100px; border-bottom: 1px solid #000; }
@media print { body { print-color-adjust: exact; } }
";

/// Fully resolved HTML handed to the PDF renderer.
///
/// Bound slots become the captured image, unbound slots a blank rule
/// followed by the owner's label.
pub fn print_html(scanner: &Scanner, doc: &DocumentModel, options: &PrintOptions) -> Result<String> {
    let mut body = String::new();
    for (index, block) in doc.blocks().iter().enumerate() {
        let mut html = String::new();
        for segment in segments(scanner, index, block)? {
            match segment {
                Segment::Text(text) => html.push_str(&escape_html(text).replace('\n', "<br>")),
                Segment::FillIn { .. } => html.push_str(r#"<span class="fill-in"></span>"#),
                Segment::Signature(binding) => {
                    let label = escape_html(options.label_for(binding.party));
                    match &binding.image {
                        Some(image) => {
                            let _ = write!(
                                html,
                                r#"<img class="signature-image" src="{}" alt="Signature of {label}">"#,
                                escape_html(image.as_str())
                            );
                        }
                        None => {
                            let _ = write!(
                                html,
                                r#"<span class="signature-line"></span> ({label})"#
                            );
                        }
                    }
                }
            }
        }
        let _ = write!(
            body,
            "<div class=\"contract-block\"><p>{html}</p></div>\n"
        );
    }

    let title = escape_html(&options.title);
    let id = escape_html(&options.contract_id);
    let date = options.date.format("%B %-d, %Y");

    Ok(format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title} {id}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
<div class=\"contract-header\">\n<div class=\"contract-title\">{title}</div>\n\
<div class=\"contract-meta\">Date: {date}</div>\n<div class=\"contract-meta\">Contract ID: {id}</div>\n</div>\n\
<div class=\"contract-content\">\n{body}</div>\n</body>\n</html>\n"
    ))
}

/// Escape text for HTML element content and quoted attributes
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::capture_signature;
    use crate::draft::{DraftBlock, DraftDocument};
    use crate::reconcile::Reconciler;
    use crate::types::EncodedImage;

    fn doc() -> DocumentModel {
        let marker = "_".repeat(20);
        Reconciler::default()
            .from_draft(DraftDocument {
                blocks: vec![
                    DraftBlock::new("Fees <net 30> & taxes\nsecond line", &[]),
                    DraftBlock::new(
                        format!("Client: {marker}\nContractor: {marker}"),
                        &[PartyId::Originator, PartyId::Counterparty],
                    ),
                ],
                unknowns: vec![],
            })
            .unwrap()
    }

    fn options() -> PrintOptions {
        PrintOptions::new("abc123")
            .title("Service Agreement")
            .date(NaiveDate::from_ymd_opt(2026, 3, 5).unwrap())
            .label(PartyId::Counterparty, "Acme Roofing")
    }

    #[test]
    fn unbound_slots_render_labelled_rules() {
        let html = print_html(&Scanner::default(), &doc(), &options()).unwrap();
        assert!(html.contains("Date: March 5, 2026"));
        assert!(html.contains("Contract ID: abc123"));
        assert!(html.contains(r#"<span class="signature-line"></span> (Party A)"#));
        assert!(html.contains(r#"<span class="signature-line"></span> (Acme Roofing)"#));
        assert!(!html.contains("____"));
    }

    #[test]
    fn bound_slots_render_images() {
        let image = EncodedImage::parse("data:image/png;base64,iVBORw0KGgo=").unwrap();
        let signed = capture_signature(&doc(), 1, 0, PartyId::Originator, image).unwrap();
        let html = print_html(&Scanner::default(), &signed, &options()).unwrap();
        assert!(html.contains(r#"src="data:image/png;base64,iVBORw0KGgo=""#));
        assert_eq!(html.matches("signature-line\"></span>").count(), 1);
    }

    #[test]
    fn text_is_escaped_and_newlines_break() {
        let html = print_html(&Scanner::default(), &doc(), &options()).unwrap();
        assert!(html.contains("Fees &lt;net 30&gt; &amp; taxes<br>second line"));
    }

    #[test]
    fn escape_covers_attribute_quotes() {
        assert_eq!(
            escape_html(r#"O'Neil & "Sons" <b>"#),
            "O&#39;Neil &amp; &quot;Sons&quot; &lt;b&gt;"
        );
    }
}
