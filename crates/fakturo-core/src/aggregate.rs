//! Canonical field selection and document-level confidence.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::confidence::Confidence;
use crate::config::PipelineConfig;
use crate::engine::EngineId;
use crate::fields::{CandidateField, FieldKind, FieldValue, ValidationStatus};

/// One canonical field in the final result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedField {
    /// Field kind.
    pub field: FieldKind,

    /// Raw text the value came from. Empty for a missing required
    /// field.
    pub raw: String,

    /// Normalized value, when the candidate parsed.
    pub value: Option<FieldValue>,

    /// Validation-adjusted confidence.
    pub confidence: Confidence,

    /// Validation status of the winning candidate.
    pub status: ValidationStatus,

    /// Validation reason, when one was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Engine whose attempt produced the winning candidate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineId>,

    /// Whether this field is flagged for manual review.
    pub needs_review: bool,
}

/// Final extraction result for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResult {
    /// Document id.
    pub document_id: String,

    /// Canonical fields, one per kind the pipeline targets or found.
    pub fields: Vec<ExtractedField>,

    /// Minimum validation-adjusted confidence over the required
    /// fields.
    pub overall_confidence: Confidence,

    /// Fields flagged for manual review, in stable field order.
    pub review_fields: Vec<FieldKind>,

    /// Whether any field needs manual review.
    pub needs_review: bool,

    /// Whether the result came from a fallback engine or a truncated
    /// run.
    pub degraded: bool,
}

impl OcrResult {
    /// Canonical field of a kind, when present.
    pub fn field(&self, kind: FieldKind) -> Option<&ExtractedField> {
        self.fields.iter().find(|f| f.field == kind)
    }
}

/// Reconciles validated candidates into one result per document.
pub struct ConfidenceAggregator<'a> {
    config: &'a PipelineConfig,
}

impl<'a> ConfidenceAggregator<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Pick one canonical candidate per field and compute the
    /// document-level confidence and review list.
    ///
    /// `attempt_engines` maps attempt indices (as recorded on the
    /// candidates) to the engine that ran them.
    pub fn aggregate(
        &self,
        document_id: &str,
        candidates: &[CandidateField],
        attempt_engines: &[EngineId],
        degraded: bool,
    ) -> OcrResult {
        let threshold = self.config.extraction.review_threshold;
        let mut fields = Vec::new();

        for spec in &self.config.extraction.fields {
            match canonical(candidates, spec.kind) {
                Some(winner) => {
                    let status = winner.status();
                    let needs_review = status == ValidationStatus::Invalid
                        || !winner.confidence.at_least(threshold);
                    fields.push(ExtractedField {
                        field: spec.kind,
                        raw: winner.raw.clone(),
                        value: winner.value.clone(),
                        confidence: winner.confidence,
                        status,
                        reason: winner.validation.as_ref().map(|v| v.reason.clone()),
                        engine: attempt_engines.get(winner.attempt).copied(),
                        needs_review,
                    });
                }
                None if spec.required => {
                    debug!(field = %spec.kind, "required field missing");
                    fields.push(ExtractedField {
                        field: spec.kind,
                        raw: String::new(),
                        value: None,
                        confidence: Confidence::NONE,
                        status: ValidationStatus::Unverifiable,
                        reason: Some("required field missing".to_string()),
                        engine: None,
                        needs_review: true,
                    });
                }
                None => {}
            }
        }

        let overall = fields
            .iter()
            .filter(|f| self.config.is_required(f.field))
            .map(|f| f.confidence)
            .fold(Confidence::CERTAIN, Confidence::min);

        let mut review_fields: Vec<FieldKind> = fields
            .iter()
            .filter(|f| f.needs_review)
            .map(|f| f.field)
            .collect();
        review_fields.sort();

        OcrResult {
            document_id: document_id.to_string(),
            fields,
            overall_confidence: overall,
            needs_review: !review_fields.is_empty(),
            review_fields,
            degraded,
        }
    }
}

/// Winning candidate for a field: highest validation-adjusted
/// confidence, ties broken toward the earlier attempt.
fn canonical(candidates: &[CandidateField], kind: FieldKind) -> Option<&CandidateField> {
    candidates
        .iter()
        .filter(|c| c.field == kind)
        .fold(None, |best: Option<&CandidateField>, c| match best {
            None => Some(c),
            Some(b) if c.confidence > b.confidence => Some(c),
            Some(b) if c.confidence == b.confidence && c.attempt < b.attempt => Some(c),
            Some(b) => Some(b),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldValidationResult;
    use pretty_assertions::assert_eq;

    fn candidate(kind: FieldKind, conf: f32, attempt: usize) -> CandidateField {
        let mut c = CandidateField::new(
            kind,
            "raw",
            FieldValue::Text("raw1".to_string()),
            Confidence::new(conf),
            attempt,
        );
        c.validation = Some(FieldValidationResult::valid("ok"));
        c
    }

    fn engines() -> Vec<EngineId> {
        vec![EngineId::Primary, EngineId::FallbackA]
    }

    #[test]
    fn test_canonical_prefers_confidence_then_earlier_attempt() {
        let candidates = vec![
            candidate(FieldKind::Nip, 0.7, 1),
            candidate(FieldKind::Nip, 0.9, 1),
            candidate(FieldKind::Nip, 0.9, 0),
        ];
        let winner = canonical(&candidates, FieldKind::Nip).unwrap();
        assert_eq!(winner.attempt, 0);
    }

    #[test]
    fn test_missing_required_field_flagged_at_zero() {
        let config = PipelineConfig::default();
        let aggregator = ConfidenceAggregator::new(&config);
        let result = aggregator.aggregate("doc", &[], &engines(), false);

        assert_eq!(result.overall_confidence, Confidence::NONE);
        assert!(result.needs_review);
        assert!(result.review_fields.contains(&FieldKind::Nip));
        assert!(result.review_fields.contains(&FieldKind::InvoiceNumber));
        assert!(result.review_fields.contains(&FieldKind::GrossAmount));
        // Optional fields that were not found do not appear at all.
        assert!(result.field(FieldKind::Regon).is_none());
    }

    #[test]
    fn test_overall_is_minimum_over_required() {
        let config = PipelineConfig::default();
        let aggregator = ConfidenceAggregator::new(&config);
        let candidates = vec![
            candidate(FieldKind::InvoiceNumber, 0.95, 0),
            candidate(FieldKind::Nip, 0.85, 0),
            candidate(FieldKind::GrossAmount, 0.9, 0),
            // Optional and weak; must not depress the overall score.
            candidate(FieldKind::Regon, 0.1, 0),
        ];
        let result = aggregator.aggregate("doc", &candidates, &engines(), false);
        assert_eq!(result.overall_confidence, Confidence::new(0.85));
    }

    #[test]
    fn test_invalid_field_always_reviewed() {
        let config = PipelineConfig::default();
        let aggregator = ConfidenceAggregator::new(&config);
        let mut invalid = candidate(FieldKind::Nip, 0.95, 0);
        invalid.validation = Some(FieldValidationResult::invalid("checksum"));
        let candidates = vec![
            invalid,
            candidate(FieldKind::InvoiceNumber, 0.95, 0),
            candidate(FieldKind::GrossAmount, 0.95, 0),
        ];
        let result = aggregator.aggregate("doc", &candidates, &engines(), false);
        assert!(result.review_fields.contains(&FieldKind::Nip));
    }

    #[test]
    fn test_winner_attributed_to_engine() {
        let config = PipelineConfig::default();
        let aggregator = ConfidenceAggregator::new(&config);
        let candidates = vec![candidate(FieldKind::Nip, 0.9, 1)];
        let result = aggregator.aggregate("doc", &candidates, &engines(), true);
        assert_eq!(
            result.field(FieldKind::Nip).unwrap().engine,
            Some(EngineId::FallbackA)
        );
        assert!(result.degraded);
    }
}
