//! VAT rate extraction.

use crate::fields::{CandidateField, FieldKind, FieldValue, VatRate};

use super::patterns::{VAT_MARKER, VAT_PERCENT};
use super::JoinedText;

const PERCENT_WEIGHT: f32 = 0.9;
// A percentage outside the legal rate set is more likely a misread.
const UNKNOWN_PERCENT_WEIGHT: f32 = 0.5;
// "zw"/"np" markers collide with ordinary Polish abbreviations.
const MARKER_WEIGHT: f32 = 0.6;

pub fn extract(text: &JoinedText, attempt: usize) -> Vec<CandidateField> {
    let mut candidates = Vec::new();

    for caps in VAT_PERCENT.captures_iter(text.text()) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(rate) = VatRate::parse(&caps[1]) else {
            continue;
        };
        let weight = if rate.is_legal_rate() {
            PERCENT_WEIGHT
        } else {
            UNKNOWN_PERCENT_WEIGHT
        };
        let confidence = text
            .token_confidence(whole.start(), whole.end())
            .scale(weight);
        candidates.push(CandidateField::new(
            FieldKind::VatRate,
            whole.as_str(),
            FieldValue::Rate(rate),
            confidence,
            attempt,
        ));
    }

    for caps in VAT_MARKER.captures_iter(text.text()) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(rate) = VatRate::parse(&caps[1]) else {
            continue;
        };
        let confidence = text
            .token_confidence(whole.start(), whole.end())
            .scale(MARKER_WEIGHT);
        candidates.push(CandidateField::new(
            FieldKind::VatRate,
            whole.as_str(),
            FieldValue::Rate(rate),
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
            [0.0, 0.0, 100.0, 20.0],
            Confidence::new(1.0),
        )])
    }

    #[test]
    fn test_standard_rate() {
        let candidates = extract(&joined("VAT 23%"), 0);
        assert_eq!(candidates.len(), 1);
        assert_eq!(
            candidates[0].value.as_ref().unwrap().as_rate(),
            Some(VatRate::Standard23)
        );
        assert_eq!(candidates[0].confidence, Confidence::new(PERCENT_WEIGHT));
    }

    #[test]
    fn test_unknown_rate_is_low_confidence() {
        let candidates = extract(&joined("VAT 19%"), 0);
        assert_eq!(candidates.len(), 1);
        assert_eq!(
            candidates[0].value.as_ref().unwrap().as_rate(),
            Some(VatRate::Other(19))
        );
        assert_eq!(
            candidates[0].confidence,
            Confidence::new(UNKNOWN_PERCENT_WEIGHT)
        );
    }

    #[test]
    fn test_exemption_marker() {
        let candidates = extract(&joined("stawka zw."), 0);
        assert_eq!(candidates.len(), 1);
        assert_eq!(
            candidates[0].value.as_ref().unwrap().as_rate(),
            Some(VatRate::Exempt)
        );
    }

    #[test]
    fn test_bare_number_not_a_rate() {
        assert!(extract(&joined("pozycja 23"), 0).is_empty());
    }
}
