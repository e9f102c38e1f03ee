//! Field-level data model: candidates, typed values, validation results.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::confidence::Confidence;

/// The fields the pipeline knows how to extract from a Polish invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Seller tax identification number (NIP).
    Nip,
    /// Statistical registry number (REGON).
    Regon,
    /// Invoice number/identifier.
    InvoiceNumber,
    /// Issue date (data wystawienia).
    IssueDate,
    /// Applicable VAT rate.
    VatRate,
    /// Total net amount.
    NetAmount,
    /// Total VAT amount.
    VatAmount,
    /// Total gross amount.
    GrossAmount,
}

impl FieldKind {
    /// Stable field name used in results and review lists.
    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Nip => "nip",
            FieldKind::Regon => "regon",
            FieldKind::InvoiceNumber => "invoice_number",
            FieldKind::IssueDate => "issue_date",
            FieldKind::VatRate => "vat_rate",
            FieldKind::NetAmount => "net_amount",
            FieldKind::VatAmount => "vat_amount",
            FieldKind::GrossAmount => "gross_amount",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Polish VAT rates.
///
/// The closed legal set plus an `Other` escape hatch: a percentage
/// outside the set is kept as a low-confidence candidate rather than
/// discarded, since new rates may appear in law.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VatRate {
    /// Standard rate: 23%
    #[serde(rename = "23")]
    Standard23,

    /// Reduced rate: 8%
    #[serde(rename = "8")]
    Reduced8,

    /// Reduced rate: 5%
    #[serde(rename = "5")]
    Reduced5,

    /// Zero rate: 0%
    #[serde(rename = "0")]
    Zero,

    /// Exempt (zwolniony).
    #[serde(rename = "zw")]
    Exempt,

    /// Not subject to VAT (nie podlega).
    #[serde(rename = "np")]
    NotApplicable,

    /// A percentage outside the legal set.
    #[serde(untagged)]
    Other(u8),
}

impl VatRate {
    /// Parse a VAT rate from invoice text ("23%", "zw.", "np").
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        let s = s.trim_end_matches('%');

        match s {
            "23" => Some(VatRate::Standard23),
            "8" => Some(VatRate::Reduced8),
            "5" => Some(VatRate::Reduced5),
            "0" => Some(VatRate::Zero),
            "zw" | "zw." | "zwolniony" | "zwolnione" => Some(VatRate::Exempt),
            "np" | "np." | "nie podlega" => Some(VatRate::NotApplicable),
            _ => s.parse::<u8>().ok().map(VatRate::Other),
        }
    }

    /// Whether this rate belongs to the closed legal set.
    pub fn is_legal_rate(self) -> bool {
        !matches!(self, VatRate::Other(_))
    }

    /// The rate as a decimal multiplier (0.23 for 23%).
    pub fn as_decimal(self) -> Decimal {
        match self {
            VatRate::Standard23 => Decimal::new(23, 2),
            VatRate::Reduced8 => Decimal::new(8, 2),
            VatRate::Reduced5 => Decimal::new(5, 2),
            VatRate::Zero | VatRate::Exempt | VatRate::NotApplicable => Decimal::ZERO,
            VatRate::Other(rate) => Decimal::new(rate as i64, 2),
        }
    }

    /// Format for display ("23%", "zw.").
    pub fn display(self) -> String {
        match self {
            VatRate::Standard23 => "23%".to_string(),
            VatRate::Reduced8 => "8%".to_string(),
            VatRate::Reduced5 => "5%".to_string(),
            VatRate::Zero => "0%".to_string(),
            VatRate::Exempt => "zw.".to_string(),
            VatRate::NotApplicable => "np.".to_string(),
            VatRate::Other(rate) => format!("{}%", rate),
        }
    }
}

/// A normalized, typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    /// Free-form identifier (invoice number, NIP digits, REGON digits).
    Text(String),
    /// Calendar date.
    Date(NaiveDate),
    /// Monetary amount.
    Amount(Decimal),
    /// VAT rate.
    Rate(VatRate),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_amount(&self) -> Option<Decimal> {
        match self {
            FieldValue::Amount(a) => Some(*a),
            _ => None,
        }
    }

    pub fn as_rate(&self) -> Option<VatRate> {
        match self {
            FieldValue::Rate(r) => Some(*r),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Date(d) => write!(f, "{}", d),
            FieldValue::Amount(a) => write!(f, "{:.2}", a),
            FieldValue::Rate(r) => f.write_str(&r.display()),
        }
    }
}

/// Validation outcome for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// The value passed its domain checks.
    Valid,
    /// The value failed a domain check.
    Invalid,
    /// The value could not be checked (e.g. unknown VAT rate,
    /// ambiguous two-digit year).
    Unverifiable,
}

/// Outcome of validating one [`CandidateField`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValidationResult {
    /// Validation status.
    pub status: ValidationStatus,
    /// Human-readable reason, stable enough for operators to group on.
    pub reason: String,
}

impl FieldValidationResult {
    pub fn valid(reason: impl Into<String>) -> Self {
        Self {
            status: ValidationStatus::Valid,
            reason: reason.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            status: ValidationStatus::Invalid,
            reason: reason.into(),
        }
    }

    pub fn unverifiable(reason: impl Into<String>) -> Self {
        Self {
            status: ValidationStatus::Unverifiable,
            reason: reason.into(),
        }
    }
}

/// A candidate value for one named field.
///
/// Created by the extractor, confidence-adjusted and annotated by the
/// validator. Multiple candidates may exist per field; the aggregator
/// picks one canonical candidate per field name. Every candidate
/// traces back to exactly one recognition attempt via `attempt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateField {
    /// Which field this is a candidate for.
    pub field: FieldKind,

    /// Raw extracted string, never mutated after extraction.
    pub raw: String,

    /// Normalized typed value, when the raw text parsed.
    pub value: Option<FieldValue>,

    /// Extraction-stage confidence, lowered (never raised) by
    /// validation.
    pub confidence: Confidence,

    /// Index of the source attempt in the document's attempt list.
    pub attempt: usize,

    /// Validation outcome, attached after the validator runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<FieldValidationResult>,
}

impl CandidateField {
    /// Create a candidate with a parsed value.
    pub fn new(
        field: FieldKind,
        raw: impl Into<String>,
        value: FieldValue,
        confidence: Confidence,
        attempt: usize,
    ) -> Self {
        Self {
            field,
            raw: raw.into(),
            value: Some(value),
            confidence,
            attempt,
            validation: None,
        }
    }

    /// Create a candidate whose raw text matched a field shape but did
    /// not normalize (e.g. a two-digit-year date).
    pub fn unparsed(
        field: FieldKind,
        raw: impl Into<String>,
        confidence: Confidence,
        attempt: usize,
    ) -> Self {
        Self {
            field,
            raw: raw.into(),
            value: None,
            confidence,
            attempt,
            validation: None,
        }
    }

    /// Validation status, treating an unvalidated candidate as
    /// unverifiable.
    pub fn status(&self) -> ValidationStatus {
        self.validation
            .as_ref()
            .map(|v| v.status)
            .unwrap_or(ValidationStatus::Unverifiable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vat_rate_parsing() {
        assert_eq!(VatRate::parse("23%"), Some(VatRate::Standard23));
        assert_eq!(VatRate::parse("23"), Some(VatRate::Standard23));
        assert_eq!(VatRate::parse("8%"), Some(VatRate::Reduced8));
        assert_eq!(VatRate::parse("zw"), Some(VatRate::Exempt));
        assert_eq!(VatRate::parse("ZW."), Some(VatRate::Exempt));
        assert_eq!(VatRate::parse("np"), Some(VatRate::NotApplicable));
        assert_eq!(VatRate::parse("19%"), Some(VatRate::Other(19)));
        assert_eq!(VatRate::parse("abc"), None);
    }

    #[test]
    fn test_vat_rate_legal_set() {
        assert!(VatRate::Standard23.is_legal_rate());
        assert!(VatRate::Exempt.is_legal_rate());
        assert!(!VatRate::Other(19).is_legal_rate());
    }

    #[test]
    fn test_vat_rate_decimal() {
        assert_eq!(VatRate::Standard23.as_decimal(), Decimal::new(23, 2));
        assert_eq!(VatRate::Exempt.as_decimal(), Decimal::ZERO);
    }

    #[test]
    fn test_candidate_default_status() {
        let c = CandidateField::unparsed(
            FieldKind::IssueDate,
            "15.03.24",
            Confidence::new(0.4),
            0,
        );
        assert_eq!(c.status(), ValidationStatus::Unverifiable);
    }
}
