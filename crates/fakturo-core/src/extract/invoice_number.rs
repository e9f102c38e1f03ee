//! Invoice number extraction.

use crate::fields::{CandidateField, FieldKind, FieldValue};

use super::patterns::{INVOICE_LABELED, INVOICE_STANDALONE};
use super::JoinedText;

const LABELED_WEIGHT: f32 = 0.95;
const STANDALONE_WEIGHT: f32 = 0.85;

pub fn extract(text: &JoinedText, attempt: usize) -> Vec<CandidateField> {
    let mut candidates = Vec::new();
    let mut labeled_spans: Vec<(usize, usize)> = Vec::new();

    for caps in INVOICE_LABELED.captures_iter(text.text()) {
        let Some(m) = caps.get(1) else { continue };
        let raw = m.as_str().trim_end_matches('.');
        // Labels also precede ordinary words; an identifier must carry
        // at least one digit.
        if raw.is_empty() || !raw.chars().any(|c| c.is_ascii_digit()) {
            continue;
        }
        if let Some(whole) = caps.get(0) {
            labeled_spans.push((whole.start(), whole.end()));
        }
        let confidence = text
            .token_confidence(m.start(), m.end())
            .scale(LABELED_WEIGHT);
        candidates.push(CandidateField::new(
            FieldKind::InvoiceNumber,
            raw,
            FieldValue::Text(raw.to_string()),
            confidence,
            attempt,
        ));
    }

    for m in INVOICE_STANDALONE.find_iter(text.text()) {
        if labeled_spans
            .iter()
            .any(|(s, e)| m.start() < *e && m.end() > *s)
        {
            continue;
        }
        let confidence = text
            .token_confidence(m.start(), m.end())
            .scale(STANDALONE_WEIGHT);
        candidates.push(CandidateField::new(
            FieldKind::InvoiceNumber,
            m.as_str(),
            FieldValue::Text(m.as_str().to_string()),
            confidence,
            attempt,
        ));
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::Confidence;
    use crate::engine::Token;
    use pretty_assertions::assert_eq;

    fn joined(line: &str) -> JoinedText {
        JoinedText::from_tokens(&[Token::new(
            line,
            [0.0, 0.0, 300.0, 20.0],
            Confidence::new(1.0),
        )])
    }

    #[test]
    fn test_labeled_number() {
        let candidates = extract(&joined("Faktura VAT nr FV/01/2024"), 0);
        assert_eq!(candidates.len(), 1);
        assert_eq!(
            candidates[0].value.as_ref().unwrap().as_text(),
            Some("FV/01/2024")
        );
        assert_eq!(candidates[0].confidence, Confidence::new(LABELED_WEIGHT));
    }

    #[test]
    fn test_nr_faktury_order() {
        let candidates = extract(&joined("nr faktury: 12/2024"), 0);
        assert_eq!(candidates.len(), 1);
        assert_eq!(
            candidates[0].value.as_ref().unwrap().as_text(),
            Some("12/2024")
        );
    }

    #[test]
    fn test_label_followed_by_prose_rejected() {
        // "nr" followed by a digit-free word is not an identifier.
        assert!(extract(&joined("numer konta"), 0).is_empty());
    }

    #[test]
    fn test_standalone_prefixed_number() {
        let candidates = extract(&joined("dotyczy FV/01/2024"), 0);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].confidence, Confidence::new(STANDALONE_WEIGHT));
    }
}
