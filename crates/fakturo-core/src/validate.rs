//! Domain validation of extracted candidates.
//!
//! Validation annotates candidates and lowers their confidence; it
//! never raises confidence and never discards a candidate. Validating
//! twice is a no-op: annotated candidates are left untouched.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::LocaleConfig;
use crate::fields::{
    CandidateField, FieldKind, FieldValidationResult, FieldValue, ValidationStatus,
};

// Confidence multipliers per validation status.
const INVALID_PENALTY: f32 = 0.3;
const UNVERIFIABLE_PENALTY: f32 = 0.6;

// Allowed rounding slack for the net + VAT = gross cross-check.
const AMOUNT_TOLERANCE_CENTS: i64 = 1;

const REGON9_WEIGHTS: [u32; 8] = [8, 9, 2, 3, 4, 5, 6, 7];
const REGON14_WEIGHTS: [u32; 13] = [2, 4, 8, 5, 0, 9, 7, 3, 6, 1, 2, 4, 8];

/// Validates candidates against Polish invoice rules.
pub struct Validator {
    locale: LocaleConfig,
    today: NaiveDate,
}

impl Validator {
    pub fn new(locale: LocaleConfig) -> Self {
        Self {
            locale,
            today: Utc::now().date_naive(),
        }
    }

    /// Pin "today" for date plausibility checks. Used in tests.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Validate every candidate in place, then cross-check the amount
    /// triple.
    pub fn validate_all(&self, candidates: &mut [CandidateField]) {
        for candidate in candidates.iter_mut() {
            self.validate_one(candidate);
        }
        self.cross_check_amounts(candidates);
    }

    fn validate_one(&self, candidate: &mut CandidateField) {
        if candidate.validation.is_some() {
            return;
        }

        let result = match candidate.field {
            FieldKind::Nip => self.check_nip(candidate),
            FieldKind::Regon => check_regon(candidate),
            FieldKind::InvoiceNumber => check_invoice_number(candidate),
            FieldKind::IssueDate => self.check_issue_date(candidate),
            FieldKind::VatRate => check_vat_rate(candidate),
            FieldKind::NetAmount | FieldKind::VatAmount | FieldKind::GrossAmount => {
                check_amount(candidate)
            }
        };

        apply(candidate, result);
    }

    fn check_nip(&self, candidate: &CandidateField) -> FieldValidationResult {
        let Some(digits) = candidate.value.as_ref().and_then(|v| v.as_text()) else {
            return FieldValidationResult::unverifiable("nip did not normalize");
        };
        let digits: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();
        if digits.len() != 10 {
            return FieldValidationResult::invalid("nip must have 10 digits");
        }
        if digits.iter().all(|d| *d == digits[0]) {
            return FieldValidationResult::invalid("nip digits all identical");
        }

        let sum: u32 = self
            .locale
            .nip_weights
            .iter()
            .zip(&digits)
            .map(|(w, d)| w * d)
            .sum();
        let control = sum % 11;
        if control == 10 || control != digits[9] {
            return FieldValidationResult::invalid("nip checksum mismatch");
        }
        FieldValidationResult::valid("nip checksum ok")
    }

    fn check_issue_date(&self, candidate: &CandidateField) -> FieldValidationResult {
        let Some(date) = candidate.value.as_ref().and_then(|v| v.as_date()) else {
            return FieldValidationResult::unverifiable("ambiguous or malformed date");
        };
        let earliest = NaiveDate::from_ymd_opt(self.locale.earliest_year, 1, 1)
            .unwrap_or(NaiveDate::MIN);
        let latest = self.today + chrono::Duration::days(self.locale.date_grace_days);

        if date < earliest {
            return FieldValidationResult::invalid("date before plausible range");
        }
        if date > latest {
            return FieldValidationResult::invalid("date in the future");
        }
        FieldValidationResult::valid("date plausible")
    }

    /// Check net + VAT = gross (within one grosz) over the strongest
    /// candidate of each amount kind. A mismatch marks all three
    /// invalid with a shared reason.
    fn cross_check_amounts(&self, candidates: &mut [CandidateField]) {
        let best = |candidates: &[CandidateField], kind: FieldKind| {
            candidates
                .iter()
                .enumerate()
                .filter(|(_, c)| {
                    c.field == kind
                        && c.value.as_ref().and_then(|v| v.as_amount()).is_some()
                        && c.status() != ValidationStatus::Invalid
                })
                .max_by_key(|(_, c)| c.confidence)
                .map(|(i, _)| i)
        };

        let (Some(net_i), Some(vat_i), Some(gross_i)) = (
            best(candidates, FieldKind::NetAmount),
            best(candidates, FieldKind::VatAmount),
            best(candidates, FieldKind::GrossAmount),
        ) else {
            return;
        };

        let amount = |i: usize| -> Decimal {
            candidates[i]
                .value
                .as_ref()
                .and_then(|v| v.as_amount())
                .unwrap_or(Decimal::ZERO)
        };
        let diff = (amount(net_i) + amount(vat_i) - amount(gross_i)).abs();
        if diff <= Decimal::new(AMOUNT_TOLERANCE_CENTS, 2) {
            return;
        }

        debug!(%diff, "amount cross-check failed");
        let reason = format!("net + vat differs from gross by {:.2}", diff);
        for i in [net_i, vat_i, gross_i] {
            let candidate = &mut candidates[i];
            candidate.confidence = candidate.confidence.scale(INVALID_PENALTY);
            candidate.validation = Some(FieldValidationResult::invalid(reason.clone()));
        }
    }
}

fn check_regon(candidate: &CandidateField) -> FieldValidationResult {
    let Some(digits) = candidate.value.as_ref().and_then(|v| v.as_text()) else {
        return FieldValidationResult::unverifiable("regon did not normalize");
    };
    let digits: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();

    let ok = match digits.len() {
        9 => regon_control(&digits, &REGON9_WEIGHTS) == digits[8],
        14 => regon_control(&digits, &REGON14_WEIGHTS) == digits[13],
        _ => return FieldValidationResult::invalid("regon must have 9 or 14 digits"),
    };
    if ok {
        FieldValidationResult::valid("regon checksum ok")
    } else {
        FieldValidationResult::invalid("regon checksum mismatch")
    }
}

fn regon_control(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = weights.iter().zip(digits).map(|(w, d)| w * d).sum();
    match sum % 11 {
        10 => 0,
        c => c,
    }
}

fn check_invoice_number(candidate: &CandidateField) -> FieldValidationResult {
    let Some(text) = candidate.value.as_ref().and_then(|v| v.as_text()) else {
        return FieldValidationResult::unverifiable("invoice number did not normalize");
    };
    if text.is_empty() || text.len() > 64 {
        return FieldValidationResult::invalid("implausible identifier length");
    }
    if !text.chars().any(|c| c.is_ascii_digit()) {
        return FieldValidationResult::invalid("identifier carries no digits");
    }
    FieldValidationResult::valid("plausible identifier")
}

fn check_vat_rate(candidate: &CandidateField) -> FieldValidationResult {
    let Some(rate) = candidate.value.as_ref().and_then(|v| v.as_rate()) else {
        return FieldValidationResult::unverifiable("vat rate did not normalize");
    };
    if rate.is_legal_rate() {
        FieldValidationResult::valid("rate in legal set")
    } else {
        FieldValidationResult::unverifiable("rate outside legal set")
    }
}

fn check_amount(candidate: &CandidateField) -> FieldValidationResult {
    let Some(amount) = candidate.value.as_ref().and_then(|v| v.as_amount()) else {
        return FieldValidationResult::unverifiable("amount did not parse");
    };
    if amount < Decimal::ZERO {
        return FieldValidationResult::invalid("negative amount");
    }
    FieldValidationResult::valid("amount plausible")
}

/// Annotate and apply the confidence penalty for the status.
fn apply(candidate: &mut CandidateField, result: FieldValidationResult) {
    match result.status {
        ValidationStatus::Valid => {}
        ValidationStatus::Invalid => {
            candidate.confidence = candidate.confidence.scale(INVALID_PENALTY);
        }
        ValidationStatus::Unverifiable => {
            candidate.confidence = candidate.confidence.scale(UNVERIFIABLE_PENALTY);
        }
    }
    candidate.validation = Some(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::Confidence;
    use pretty_assertions::assert_eq;

    fn validator() -> Validator {
        Validator::new(LocaleConfig::default())
            .with_today(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
    }

    fn text_candidate(field: FieldKind, value: &str) -> CandidateField {
        CandidateField::new(
            field,
            value,
            FieldValue::Text(value.to_string()),
            Confidence::new(0.9),
            0,
        )
    }

    fn amount_candidate(field: FieldKind, cents: i64) -> CandidateField {
        CandidateField::new(
            field,
            format!("{:.2}", Decimal::new(cents, 2)),
            FieldValue::Amount(Decimal::new(cents, 2)),
            Confidence::new(0.9),
            0,
        )
    }

    #[test]
    fn test_nip_checksum_accepts_known_good() {
        let mut c = text_candidate(FieldKind::Nip, "5260001246");
        validator().validate_all(std::slice::from_mut(&mut c));
        assert_eq!(c.status(), ValidationStatus::Valid);
        assert_eq!(c.confidence, Confidence::new(0.9));
    }

    #[test]
    fn test_nip_checksum_rejects_bad_digit() {
        let mut c = text_candidate(FieldKind::Nip, "5260001247");
        validator().validate_all(std::slice::from_mut(&mut c));
        assert_eq!(c.status(), ValidationStatus::Invalid);
        assert!(c.confidence < Confidence::new(0.3));
    }

    #[test]
    fn test_nip_all_identical_rejected() {
        // 1111111111 happens to satisfy the weighted checksum.
        let mut c = text_candidate(FieldKind::Nip, "1111111111");
        validator().validate_all(std::slice::from_mut(&mut c));
        assert_eq!(c.status(), ValidationStatus::Invalid);
    }

    #[test]
    fn test_regon_checksum() {
        let mut good = text_candidate(FieldKind::Regon, "123456785");
        validator().validate_all(std::slice::from_mut(&mut good));
        assert_eq!(good.status(), ValidationStatus::Valid);

        let mut bad = text_candidate(FieldKind::Regon, "123456786");
        validator().validate_all(std::slice::from_mut(&mut bad));
        assert_eq!(bad.status(), ValidationStatus::Invalid);
    }

    #[test]
    fn test_future_date_invalid_within_grace() {
        let date = |y, m, d| {
            CandidateField::new(
                FieldKind::IssueDate,
                "x",
                FieldValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap()),
                Confidence::new(0.9),
                0,
            )
        };

        let mut soon = date(2024, 6, 10);
        validator().validate_all(std::slice::from_mut(&mut soon));
        assert_eq!(soon.status(), ValidationStatus::Valid);

        let mut far = date(2025, 1, 1);
        validator().validate_all(std::slice::from_mut(&mut far));
        assert_eq!(far.status(), ValidationStatus::Invalid);

        let mut ancient = date(1999, 1, 1);
        validator().validate_all(std::slice::from_mut(&mut ancient));
        assert_eq!(ancient.status(), ValidationStatus::Invalid);
    }

    #[test]
    fn test_unparsed_date_unverifiable() {
        let mut c =
            CandidateField::unparsed(FieldKind::IssueDate, "15.03.24", Confidence::new(0.4), 0);
        validator().validate_all(std::slice::from_mut(&mut c));
        assert_eq!(c.status(), ValidationStatus::Unverifiable);
    }

    #[test]
    fn test_amount_cross_check_mismatch_marks_all_three() {
        let mut candidates = vec![
            amount_candidate(FieldKind::NetAmount, 10000),
            amount_candidate(FieldKind::VatAmount, 2300),
            amount_candidate(FieldKind::GrossAmount, 15000),
        ];
        validator().validate_all(&mut candidates);
        for c in &candidates {
            assert_eq!(c.status(), ValidationStatus::Invalid, "{}", c.field);
            assert!(c.confidence < Confidence::new(0.3));
        }
    }

    #[test]
    fn test_amount_cross_check_within_tolerance() {
        let mut candidates = vec![
            amount_candidate(FieldKind::NetAmount, 10000),
            amount_candidate(FieldKind::VatAmount, 2300),
            amount_candidate(FieldKind::GrossAmount, 12301),
        ];
        validator().validate_all(&mut candidates);
        for c in &candidates {
            assert_eq!(c.status(), ValidationStatus::Valid);
        }
    }

    #[test]
    fn test_amount_cross_check_is_idempotent() {
        let mut candidates = vec![
            amount_candidate(FieldKind::NetAmount, 10000),
            amount_candidate(FieldKind::VatAmount, 2300),
            amount_candidate(FieldKind::GrossAmount, 15000),
        ];
        let v = validator();
        v.validate_all(&mut candidates);
        let once: Vec<_> = candidates
            .iter()
            .map(|c| (c.status(), c.validation.clone(), c.confidence))
            .collect();

        v.validate_all(&mut candidates);
        let twice: Vec<_> = candidates
            .iter()
            .map(|c| (c.status(), c.validation.clone(), c.confidence))
            .collect();
        assert_eq!(twice, once);
    }

    #[test]
    fn test_validation_is_idempotent() {
        let mut c = text_candidate(FieldKind::Nip, "5260001247");
        let v = validator();
        v.validate_all(std::slice::from_mut(&mut c));
        let once = c.confidence;
        v.validate_all(std::slice::from_mut(&mut c));
        assert_eq!(c.confidence, once);
    }
}
