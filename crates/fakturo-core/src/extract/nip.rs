//! NIP (tax identification number) extraction.

use crate::confidence::Confidence;
use crate::fields::{CandidateField, FieldKind, FieldValue};

use super::patterns::{digits_only, NIP_LABELED, NIP_STANDALONE};
use super::JoinedText;

// Pattern specificity: an explicit label nearly always means a NIP,
// a bare 10-digit run may be a phone number or bank account fragment.
const LABELED_WEIGHT: f32 = 0.95;
const STANDALONE_WEIGHT: f32 = 0.75;

pub fn extract(text: &JoinedText, attempt: usize) -> Vec<CandidateField> {
    let mut candidates = Vec::new();
    let mut labeled_spans: Vec<(usize, usize)> = Vec::new();

    for caps in NIP_LABELED.captures_iter(text.text()) {
        let whole = caps.get(0).map(|m| (m.start(), m.end()));
        let Some(m) = caps.get(1) else { continue };
        let digits = digits_only(m.as_str());
        if digits.len() != 10 {
            continue;
        }
        if let Some(span) = whole {
            labeled_spans.push(span);
        }
        let confidence = text
            .token_confidence(m.start(), m.end())
            .scale(LABELED_WEIGHT);
        candidates.push(CandidateField::new(
            FieldKind::Nip,
            m.as_str(),
            FieldValue::Text(digits),
            confidence,
            attempt,
        ));
    }

    for m in NIP_STANDALONE.find_iter(text.text()) {
        if labeled_spans
            .iter()
            .any(|(s, e)| m.start() < *e && m.end() > *s)
        {
            continue;
        }
        let digits = digits_only(m.as_str());
        let confidence = text
            .token_confidence(m.start(), m.end())
            .scale(STANDALONE_WEIGHT);
        candidates.push(CandidateField::new(
            FieldKind::Nip,
            m.as_str(),
            FieldValue::Text(digits),
            confidence,
            attempt,
        ));
    }

    candidates
}
