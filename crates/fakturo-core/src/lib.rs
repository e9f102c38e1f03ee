//! Core OCR extraction pipeline for Polish invoices.
//!
//! The pipeline takes an uploaded document (scan or PDF), prepares an
//! image, runs it through a prioritized chain of recognition engines
//! with per-attempt resource ceilings, extracts Polish invoice fields
//! (NIP, amounts, dates, VAT rates) from the recognized tokens,
//! validates them against domain rules, and aggregates everything into
//! a single confidence-scored result with a manual-review list.

pub mod aggregate;
pub mod confidence;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fields;
pub mod pdf;
pub mod pipeline;
pub mod preprocess;
pub mod sink;
pub mod validate;

pub use aggregate::{ConfidenceAggregator, ExtractedField, OcrResult};
pub use confidence::Confidence;
pub use config::{
    EngineCommandConfig, ExtractionConfig, FieldSpec, LocaleConfig, OrchestratorConfig,
    PipelineConfig,
};
pub use document::{ContentKind, Document};
pub use engine::{
    AttemptBudget, AttemptOutcome, CancelToken, CommandEngine, EngineId, EngineOrchestrator,
    OrchestrationOutcome, OrchestratorState, RecognitionAttempt, RecognitionEngine,
    ScriptedBehavior, ScriptedEngine, Token,
};
pub use error::{EngineError, FakturoError, PreprocessError, Result};
pub use extract::{parse_amount, FieldExtractor};
pub use fields::{
    CandidateField, FieldKind, FieldValidationResult, FieldValue, ValidationStatus, VatRate,
};
pub use pipeline::PipelineCoordinator;
pub use preprocess::{ImagePreprocessor, PreparedImage};
pub use sink::{AttemptSummary, AuditSink, LogSink, NoopSink, NotificationSink, ProcessingRecord};
pub use validate::Validator;
