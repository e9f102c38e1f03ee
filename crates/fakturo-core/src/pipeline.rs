//! Document processing pipeline: preprocess, recognize, extract,
//! validate, aggregate.

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info};

use crate::aggregate::{ConfidenceAggregator, OcrResult};
use crate::config::PipelineConfig;
use crate::confidence::Confidence;
use crate::document::Document;
use crate::engine::{
    AttemptOutcome, CancelToken, CommandEngine, EngineId, EngineOrchestrator, RecognitionAttempt,
    RecognitionEngine, Token,
};
use crate::error::Result;
use crate::extract::FieldExtractor;
use crate::fields::CandidateField;
use crate::preprocess::{ImagePreprocessor, PreparedImage};
use crate::sink::{AttemptSummary, AuditSink, LogSink, NotificationSink, ProcessingRecord};
use crate::validate::Validator;

/// Runs the full extraction pipeline for one document at a time.
///
/// One coordinator serves one worker. It holds the engines and sinks;
/// documents flow through `submit`.
pub struct PipelineCoordinator {
    config: PipelineConfig,
    preprocessor: ImagePreprocessor,
    orchestrator: EngineOrchestrator,
    extractor: FieldExtractor,
    validator: Validator,
    audit: Box<dyn AuditSink>,
    notify: Box<dyn NotificationSink>,
}

impl PipelineCoordinator {
    /// Build a coordinator around explicit engine instances.
    pub fn new(config: PipelineConfig, engines: Vec<Box<dyn RecognitionEngine>>) -> Self {
        let orchestrator = EngineOrchestrator::new(engines, config.orchestrator.clone());
        let validator = Validator::new(config.locale.clone());
        Self {
            preprocessor: ImagePreprocessor::new(),
            orchestrator,
            extractor: FieldExtractor::new(),
            validator,
            audit: Box::new(LogSink),
            notify: Box::new(LogSink),
            config,
        }
    }

    /// Build a coordinator whose engines are the external commands
    /// named in the configuration.
    pub fn from_config(config: PipelineConfig) -> Self {
        let engines: Vec<Box<dyn RecognitionEngine>> = config
            .engines
            .iter()
            .map(|e| Box::new(CommandEngine::from_config(e)) as Box<dyn RecognitionEngine>)
            .collect();
        Self::new(config, engines)
    }

    /// Replace the audit sink.
    pub fn with_audit(mut self, audit: Box<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Replace the notification sink.
    pub fn with_notifications(mut self, notify: Box<dyn NotificationSink>) -> Self {
        self.notify = notify;
        self
    }

    /// Process one document end to end.
    ///
    /// Fails only when the content cannot be decoded at all; every
    /// recognition failure downstream degrades into a low-confidence
    /// result instead of an error.
    pub fn submit(&self, document: &Document, cancel: &CancelToken) -> Result<OcrResult> {
        let started = Instant::now();
        let started_at = Utc::now();
        let deadline = started + Duration::from_secs(self.config.deadline_secs);

        info!(document = %document.id, "processing document");
        let prepared = self.preprocessor.prepare(document)?;

        let (attempts, winner_degraded) = self.recognize(document, &prepared, deadline, cancel);

        let mut candidates = self.extract_candidates(&attempts);
        self.validator.validate_all(&mut candidates);

        let attempt_engines: Vec<EngineId> = attempts.iter().map(|a| a.engine).collect();
        let aggregator = ConfidenceAggregator::new(&self.config);
        let result = aggregator.aggregate(&document.id, &candidates, &attempt_engines, winner_degraded);

        if !result
            .overall_confidence
            .at_least(self.config.extraction.review_threshold)
        {
            self.notify
                .low_confidence(&document.id, result.overall_confidence);
        }

        self.audit.record(&ProcessingRecord {
            document_id: document.id.clone(),
            started_at,
            attempts: attempts
                .iter()
                .map(|a| AttemptSummary {
                    engine: a.engine,
                    outcome: a.outcome.clone(),
                    tokens: a.tokens.len(),
                    elapsed_ms: a.elapsed_ms,
                })
                .collect(),
            overall_confidence: result.overall_confidence,
            degraded: result.degraded,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });

        Ok(result)
    }

    /// Produce the attempt list: the embedded text layer when the
    /// source was a text PDF and the shortcut is enabled, otherwise
    /// the engine fallback chain.
    fn recognize(
        &self,
        document: &Document,
        prepared: &PreparedImage,
        deadline: Instant,
        cancel: &CancelToken,
    ) -> (Vec<RecognitionAttempt>, bool) {
        if self.config.prefer_embedded_text {
            if let Some(text) = &prepared.embedded_text {
                debug!(document = %document.id, "using embedded PDF text layer");
                return (vec![embedded_text_attempt(text)], false);
            }
        }

        let outcome = self
            .orchestrator
            .run(&prepared.image, &document.id, deadline, cancel, self.notify.as_ref());
        let degraded = outcome.degraded();
        (outcome.attempts, degraded)
    }

    fn extract_candidates(&self, attempts: &[RecognitionAttempt]) -> Vec<CandidateField> {
        let mut candidates = Vec::new();
        for (i, attempt) in attempts.iter().enumerate() {
            if attempt.tokens.is_empty() {
                continue;
            }
            candidates.extend(self.extractor.extract(i, attempt));
        }
        candidates
    }
}

/// Synthetic attempt carrying an embedded PDF text layer: one token
/// per line at full confidence, attributed to the embedded-text slot.
fn embedded_text_attempt(text: &str) -> RecognitionAttempt {
    let started_at = Utc::now();
    let tokens: Vec<Token> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, line)| {
            Token::new(
                line,
                [0.0, i as f32 * 16.0, line.len() as f32 * 8.0, 14.0],
                Confidence::CERTAIN,
            )
        })
        .collect();

    RecognitionAttempt {
        engine: EngineId::EmbeddedText,
        started_at,
        finished_at: started_at,
        outcome: AttemptOutcome::Success,
        tokens,
        elapsed_ms: 0,
        peak_memory_mb: None,
    }
}
