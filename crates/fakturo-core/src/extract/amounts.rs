//! Monetary amount extraction and Polish-locale amount parsing.

use rust_decimal::Decimal;

use crate::confidence::Confidence;
use crate::fields::{CandidateField, FieldKind, FieldValue};

use super::patterns::{AMOUNT, GROSS_LABEL, NET_LABEL, VAT_AMOUNT_LABEL};
use super::JoinedText;

const LABELED_WEIGHT: f32 = 0.95;
// Assigned by the largest/second-largest heuristic instead of a label.
const HEURISTIC_WEIGHT: f32 = 0.85;

/// Parse a Polish-locale monetary amount.
///
/// Comma and period are both accepted as the decimal marker; space,
/// non-breaking space and period group thousands. A string where a
/// separator cannot be resolved to exactly one decimal marker
/// ("1.234.56") is rejected rather than guessed at.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    let cleaned = cleaned.trim_end_matches(['.', ',']);
    if cleaned.is_empty() {
        return None;
    }

    let commas = cleaned.matches(',').count();
    let dots = cleaned.matches('.').count();

    let normalized = match (commas, dots) {
        (0, 0) => cleaned.to_string(),
        // Comma is always decimal; periods in the integer part must
        // form a thousands grouping, but a plain digit run of any
        // length needs none ("1234,56" is as legal as "1 234,56").
        (1, _) => {
            let (int_part, frac) = cleaned.split_once(',')?;
            if !frac.chars().all(|c| c.is_ascii_digit()) || frac.is_empty() {
                return None;
            }
            if int_part.contains('.') {
                if !grouped_thousands(int_part) {
                    return None;
                }
            } else if int_part.is_empty() || !int_part.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            format!("{}.{}", int_part.replace('.', ""), frac)
        }
        // A lone period with a three-digit tail is a thousands group,
        // otherwise it is the decimal marker.
        (0, 1) => {
            let (int_part, frac) = cleaned.split_once('.')?;
            if frac.len() == 3 && !int_part.is_empty() {
                format!("{}{}", int_part, frac)
            } else {
                cleaned.to_string()
            }
        }
        // Several periods are only legal as uniform thousands grouping.
        (0, _) => {
            if !grouped_thousands(cleaned) {
                return None;
            }
            cleaned.replace('.', "")
        }
        // Two commas means two decimal markers.
        _ => return None,
    };

    normalized.parse().ok()
}

/// Digits grouped by periods: a 1-3 digit head, then 3-digit groups.
fn grouped_thousands(int_part: &str) -> bool {
    let mut groups = int_part.split('.');
    let Some(head) = groups.next() else {
        return false;
    };
    if head.is_empty() || head.len() > 3 || !head.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    groups.all(|g| g.len() == 3 && g.chars().all(|c| c.is_ascii_digit()))
}

struct FoundAmount {
    raw: String,
    value: Decimal,
    confidence: Confidence,
    label: Option<FieldKind>,
}

/// Which amount field a line's labels point at, if exactly one does.
fn label_for(line: &str) -> Option<FieldKind> {
    let net = NET_LABEL.is_match(line);
    let gross = GROSS_LABEL.is_match(line);
    let vat = VAT_AMOUNT_LABEL.is_match(line);
    match (net, gross, vat) {
        (true, false, false) => Some(FieldKind::NetAmount),
        (false, true, false) => Some(FieldKind::GrossAmount),
        (false, false, true) => Some(FieldKind::VatAmount),
        // Table headers list several labels on one line; punt to the
        // magnitude heuristic.
        _ => None,
    }
}

pub fn extract(text: &JoinedText, attempt: usize) -> Vec<CandidateField> {
    let mut labeled = Vec::new();
    let mut unlabeled = Vec::new();

    for m in AMOUNT.find_iter(text.text()) {
        let Some(value) = parse_amount(m.as_str()) else {
            continue;
        };
        let found = FoundAmount {
            raw: m.as_str().to_string(),
            value,
            confidence: text.token_confidence(m.start(), m.end()),
            label: label_for(text.line_at(m.start())),
        };
        if found.label.is_some() {
            labeled.push(found);
        } else {
            unlabeled.push(found);
        }
    }

    let mut candidates = Vec::new();
    let have = |kind: FieldKind, list: &[CandidateField]| list.iter().any(|c| c.field == kind);

    for found in labeled {
        let field = found.label.unwrap_or(FieldKind::GrossAmount);
        candidates.push(CandidateField::new(
            field,
            found.raw,
            FieldValue::Amount(found.value),
            found.confidence.scale(LABELED_WEIGHT),
            attempt,
        ));
    }

    // Unlabeled amounts: the largest is the gross total, the next is
    // the net total. Smaller ones are line items and stay unassigned.
    unlabeled.sort_by(|a, b| b.value.cmp(&a.value));
    let mut unlabeled = unlabeled.into_iter();
    if !have(FieldKind::GrossAmount, &candidates) {
        if let Some(found) = unlabeled.next() {
            candidates.push(CandidateField::new(
                FieldKind::GrossAmount,
                found.raw,
                FieldValue::Amount(found.value),
                found.confidence.scale(HEURISTIC_WEIGHT),
                attempt,
            ));
        }
    }
    if !have(FieldKind::NetAmount, &candidates) {
        if let Some(found) = unlabeled.next() {
            candidates.push(CandidateField::new(
                FieldKind::NetAmount,
                found.raw,
                FieldValue::Amount(found.value),
                found.confidence.scale(HEURISTIC_WEIGHT),
                attempt,
            ));
        }
    }

    if !have(FieldKind::VatAmount, &candidates) {
        if let Some(derived) = derive_vat(&candidates, attempt) {
            candidates.push(derived);
        }
    }

    candidates
}

/// VAT amount derived as gross minus net when both totals are present
/// but no VAT amount was printed. Confidence is capped by the weaker
/// parent.
fn derive_vat(candidates: &[CandidateField], attempt: usize) -> Option<CandidateField> {
    let best = |kind: FieldKind| {
        candidates
            .iter()
            .filter(|c| c.field == kind)
            .max_by_key(|c| c.confidence)
    };
    let gross = best(FieldKind::GrossAmount)?;
    let net = best(FieldKind::NetAmount)?;
    let diff = gross.value.as_ref()?.as_amount()? - net.value.as_ref()?.as_amount()?;
    if diff <= Decimal::ZERO {
        return None;
    }
    let confidence = gross.confidence.min(net.confidence);
    Some(CandidateField::new(
        FieldKind::VatAmount,
        format!("{:.2}", diff),
        FieldValue::Amount(diff),
        confidence,
        attempt,
    ))
}
