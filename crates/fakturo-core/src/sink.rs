//! Boundary collaborators: audit and notification sinks.
//!
//! Persistence, alerting, and the task queue live outside this crate;
//! the pipeline talks to them through these traits. The tracing-backed
//! [`LogSink`] is the default wiring, [`NoopSink`] is for tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::confidence::Confidence;
use crate::engine::{AttemptOutcome, EngineId};

/// Per-document audit record of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingRecord {
    /// Document id.
    pub document_id: String,

    /// When processing started.
    pub started_at: DateTime<Utc>,

    /// Engine attempts, in the order they ran.
    pub attempts: Vec<AttemptSummary>,

    /// Overall document confidence of the produced result.
    pub overall_confidence: Confidence,

    /// Whether the result was produced via a fallback engine or
    /// deadline truncation.
    pub degraded: bool,

    /// Total wall-clock time in milliseconds.
    pub elapsed_ms: u64,
}

/// Compact per-attempt entry for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub engine: EngineId,
    pub outcome: AttemptOutcome,
    pub tokens: usize,
    pub elapsed_ms: u64,
}

/// Receives the audit record for every processed document.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &ProcessingRecord);
}

/// Receives operational signals worth alerting on.
pub trait NotificationSink: Send + Sync {
    /// An engine failed and processing fell back to a lower-priority
    /// one.
    fn degraded_service(&self, document_id: &str, failed_engine: EngineId);

    /// An engine keeps breaching its resource ceilings across
    /// documents.
    fn engine_health(&self, engine: EngineId, breaches: u32);

    /// A finished document fell below the operational confidence
    /// threshold.
    fn low_confidence(&self, document_id: &str, overall: Confidence);
}

/// Sink that drops everything. Used in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl AuditSink for NoopSink {
    fn record(&self, _record: &ProcessingRecord) {}
}

impl NotificationSink for NoopSink {
    fn degraded_service(&self, _document_id: &str, _failed_engine: EngineId) {}
    fn engine_health(&self, _engine: EngineId, _breaches: u32) {}
    fn low_confidence(&self, _document_id: &str, _overall: Confidence) {}
}

/// Sink that forwards everything to tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AuditSink for LogSink {
    fn record(&self, record: &ProcessingRecord) {
        info!(
            document = %record.document_id,
            attempts = record.attempts.len(),
            confidence = %record.overall_confidence,
            degraded = record.degraded,
            elapsed_ms = record.elapsed_ms,
            "document processed"
        );
    }
}

impl NotificationSink for LogSink {
    fn degraded_service(&self, document_id: &str, failed_engine: EngineId) {
        warn!(document = %document_id, engine = %failed_engine, "engine failed, falling back");
    }

    fn engine_health(&self, engine: EngineId, breaches: u32) {
        warn!(engine = %engine, breaches, "engine keeps breaching resource ceilings");
    }

    fn low_confidence(&self, document_id: &str, overall: Confidence) {
        warn!(document = %document_id, confidence = %overall, "low-confidence extraction");
    }
}
