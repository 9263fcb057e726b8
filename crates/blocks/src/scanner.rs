use crate::config::MarkerConfig;
use crate::error::{BlocksError, Result};
use serde::Serialize;
use std::ops::Range;

/// What a glyph run stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    /// Signature slot, owns a binding
    Signature,
    /// Editable fill-in field, no binding
    FillIn,
}

/// A glyph run found in block text (byte offsets)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MarkerSpan {
    pub start: usize,
    pub len: usize,
    pub kind: MarkerKind,
}

impl MarkerSpan {
    #[must_use]
    pub const fn end(&self) -> usize {
        self.start + self.len
    }

    #[must_use]
    pub const fn range(&self) -> Range<usize> {
        self.start..self.start + self.len
    }

    #[must_use]
    pub fn is_signature(&self) -> bool {
        self.kind == MarkerKind::Signature
    }
}

/// Finds placeholder runs in block text.
///
/// Only maximal runs whose glyph count is exactly the signature or fill-in
/// length are reported; runs of any other length are ordinary text.
#[derive(Debug, Clone)]
pub struct Scanner {
    config: MarkerConfig,
}

impl Default for Scanner {
    fn default() -> Self {
        Self {
            config: MarkerConfig::default(),
        }
    }
}

impl Scanner {
    pub fn new(config: MarkerConfig) -> Result<Self> {
        config.validate().map_err(BlocksError::InvalidConfig)?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &MarkerConfig {
        &self.config
    }

    /// All placeholder runs, left to right
    #[must_use]
    pub fn scan(&self, text: &str) -> Vec<MarkerSpan> {
        let glyph = self.config.glyph;
        let glyph_len = glyph.len_utf8();
        let mut spans = Vec::new();
        let mut run_start: Option<usize> = None;
        let mut run_count = 0usize;

        for (offset, ch) in text.char_indices() {
            if ch == glyph {
                if run_start.is_none() {
                    run_start = Some(offset);
                    run_count = 0;
                }
                run_count += 1;
                continue;
            }
            if let Some(start) = run_start.take() {
                self.push_run(&mut spans, start, run_count, glyph_len);
            }
        }
        if let Some(start) = run_start {
            self.push_run(&mut spans, start, run_count, glyph_len);
        }

        spans
    }

    fn push_run(&self, spans: &mut Vec<MarkerSpan>, start: usize, count: usize, glyph_len: usize) {
        let kind = if count == self.config.signature_run {
            MarkerKind::Signature
        } else if count == self.config.fill_in_run {
            MarkerKind::FillIn
        } else {
            return;
        };
        spans.push(MarkerSpan {
            start,
            len: count * glyph_len,
            kind,
        });
    }

    /// Signature markers only
    #[must_use]
    pub fn signatures(&self, text: &str) -> Vec<MarkerSpan> {
        self.scan(text)
            .into_iter()
            .filter(MarkerSpan::is_signature)
            .collect()
    }

    /// Fill-in fields only
    #[must_use]
    pub fn fill_ins(&self, text: &str) -> Vec<MarkerSpan> {
        self.scan(text)
            .into_iter()
            .filter(|span| span.kind == MarkerKind::FillIn)
            .collect()
    }

    #[must_use]
    pub fn signature_count(&self, text: &str) -> usize {
        self.signatures(text).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sig() -> String {
        "_".repeat(20)
    }

    #[test]
    fn finds_signature_and_fill_in_runs_in_order() {
        let text = format!("Name: {} Sign: {} Again: {}", "_".repeat(10), sig(), sig());
        let spans = Scanner::default().scan(&text);

        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].kind, MarkerKind::FillIn);
        assert_eq!(spans[0].start, 6);
        assert_eq!(spans[0].len, 10);
        assert_eq!(spans[1].kind, MarkerKind::Signature);
        assert_eq!(&text[spans[1].range()], sig());
        assert!(spans.windows(2).all(|w| w[0].end() <= w[1].start));
    }

    #[test]
    fn other_run_lengths_are_plain_text() {
        let text = format!("{} {} {}", "_".repeat(5), "_".repeat(21), "_".repeat(40));
        assert!(Scanner::default().scan(&text).is_empty());
    }

    #[test]
    fn run_at_end_of_text_is_found() {
        let text = format!("Signed:{}", sig());
        let spans = Scanner::default().signatures(&text);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].end(), text.len());
    }

    #[test]
    fn multibyte_glyph_offsets_are_bytes() {
        let config = MarkerConfig {
            glyph: '▁',
            signature_run: 3,
            fill_in_run: 2,
        };
        let scanner = Scanner::new(config).unwrap();
        let text = "é ▁▁▁ x ▁▁";
        let spans = scanner.scan(text);
        assert_eq!(spans.len(), 2);
        assert_eq!(&text[spans[0].range()], "▁▁▁");
        assert_eq!(&text[spans[1].range()], "▁▁");
        assert_eq!(spans[1].kind, MarkerKind::FillIn);
    }

    #[test]
    fn scanning_is_deterministic() {
        let text = format!("a {} b {} c", sig(), "_".repeat(10));
        let scanner = Scanner::default();
        assert_eq!(scanner.scan(&text), scanner.scan(&text));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = MarkerConfig {
            fill_in_run: 20,
            ..MarkerConfig::default()
        };
        assert!(matches!(
            Scanner::new(config),
            Err(BlocksError::InvalidConfig(_))
        ));
    }
}
