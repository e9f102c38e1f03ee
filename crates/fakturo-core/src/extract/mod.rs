//! Locale-aware field extraction from recognized tokens.

pub mod amounts;
pub mod dates;
pub mod invoice_number;
pub mod nip;
pub mod patterns;
pub mod regon;
pub mod vat;

pub use amounts::parse_amount;

use crate::confidence::Confidence;
use crate::engine::{RecognitionAttempt, Token};
use crate::fields::CandidateField;

/// Token text joined for pattern matching, with byte spans mapping
/// matches back to their covering tokens.
pub struct JoinedText {
    text: String,
    // (start byte, end byte, token confidence)
    spans: Vec<(usize, usize, Confidence)>,
}

impl JoinedText {
    /// Join tokens with newlines, in the order the engine emitted
    /// them (engines report reading order).
    pub fn from_tokens(tokens: &[Token]) -> Self {
        let mut text = String::new();
        let mut spans = Vec::with_capacity(tokens.len());

        for token in tokens {
            if !text.is_empty() {
                text.push('\n');
            }
            let start = text.len();
            text.push_str(&token.text);
            spans.push((start, text.len(), token.confidence));
        }

        Self { text, spans }
    }

    /// The joined text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Mean OCR confidence of the tokens overlapping a byte range.
    pub fn token_confidence(&self, start: usize, end: usize) -> Confidence {
        let overlapping: Vec<Confidence> = self
            .spans
            .iter()
            .filter(|(s, e, _)| *s < end && *e > start)
            .map(|(_, _, c)| *c)
            .collect();
        Confidence::mean(&overlapping)
    }

    /// The text line containing a byte position.
    pub fn line_at(&self, pos: usize) -> &str {
        let pos = pos.min(self.text.len());
        let start = self.text[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let end = self.text[pos..]
            .find('\n')
            .map(|i| pos + i)
            .unwrap_or(self.text.len());
        &self.text[start..end]
    }

    /// Up to `max` bytes of context before a position, clipped to
    /// char boundaries.
    pub fn context_before(&self, pos: usize, max: usize) -> &str {
        let pos = pos.min(self.text.len());
        let mut start = pos.saturating_sub(max);
        while start < pos && !self.text.is_char_boundary(start) {
            start += 1;
        }
        &self.text[start..pos]
    }
}

/// Applies every field recognizer to one recognition attempt.
///
/// Multiple candidates per field are preserved, never merged; the
/// aggregator reconciles them later.
pub struct FieldExtractor;

impl FieldExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract candidate fields from one attempt's tokens.
    ///
    /// `attempt_index` is the attempt's position in the document's
    /// attempt list; every candidate records it as its provenance.
    pub fn extract(&self, attempt_index: usize, attempt: &RecognitionAttempt) -> Vec<CandidateField> {
        let text = JoinedText::from_tokens(&attempt.tokens);
        let mut candidates = Vec::new();

        candidates.extend(nip::extract(&text, attempt_index));
        candidates.extend(regon::extract(&text, attempt_index));
        candidates.extend(invoice_number::extract(&text, attempt_index));
        candidates.extend(dates::extract(&text, attempt_index));
        candidates.extend(vat::extract(&text, attempt_index));
        candidates.extend(amounts::extract(&text, attempt_index));

        candidates
    }
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str, conf: f32) -> Token {
        Token::new(text, [0.0, 0.0, 100.0, 20.0], Confidence::new(conf))
    }

    #[test]
    fn test_joined_text_spans() {
        let joined = JoinedText::from_tokens(&[token("NIP: 5260001246", 0.9), token("23%", 0.5)]);
        assert_eq!(joined.text(), "NIP: 5260001246\n23%");

        // First line maps to the first token only.
        assert_eq!(joined.token_confidence(0, 15), Confidence::new(0.9));
        // Second line maps to the second token.
        assert_eq!(joined.token_confidence(16, 19), Confidence::new(0.5));
    }

    #[test]
    fn test_line_at() {
        let joined = JoinedText::from_tokens(&[token("first", 0.9), token("second", 0.9)]);
        assert_eq!(joined.line_at(2), "first");
        assert_eq!(joined.line_at(8), "second");
    }

    #[test]
    fn test_context_before_respects_char_boundaries() {
        let joined = JoinedText::from_tokens(&[token("płatność: 100,00", 0.9)]);
        let pos = joined.text().find("100").unwrap();
        // Must not panic on multi-byte Polish characters.
        let _ = joined.context_before(pos, 7);
    }
}
