//! REGON (statistical registry number) extraction.
//!
//! Only labeled occurrences are extracted: a bare 9-digit run is far
//! too common on invoices (postal codes with house numbers, bank
//! account fragments) to be worth a candidate.

use crate::fields::{CandidateField, FieldKind, FieldValue};

use super::patterns::REGON_LABELED;
use super::JoinedText;

const LABELED_WEIGHT: f32 = 0.9;

pub fn extract(text: &JoinedText, attempt: usize) -> Vec<CandidateField> {
    REGON_LABELED
        .captures_iter(text.text())
        .filter_map(|caps| caps.get(1))
        .map(|m| {
            let confidence = text
                .token_confidence(m.start(), m.end())
                .scale(LABELED_WEIGHT);
            CandidateField::new(
                FieldKind::Regon,
                m.as_str(),
                FieldValue::Text(m.as_str().to_string()),
                confidence,
                attempt,
            )
        })
        .collect()
}
