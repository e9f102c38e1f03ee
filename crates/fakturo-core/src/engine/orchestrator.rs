//! Engine selection, resource bounding, and ordered fallback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::DynamicImage;
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::sink::NotificationSink;

use super::{AttemptBudget, EngineId, RecognitionAttempt, RecognitionEngine};

/// Cancellation signal checked between engine attempts.
///
/// Engines are opaque, so cancellation never interrupts a running
/// attempt; it stops the orchestrator before the next one starts.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Orchestrator state, per document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// No document in flight.
    Idle,
    /// Trying the engine at this priority index.
    Trying(usize),
    /// An attempt produced usable tokens.
    Succeeded,
    /// Every configured engine was tried (or fallback was truncated);
    /// the last attempt's partial tokens carry forward.
    Exhausted,
}

/// What one orchestration run produced.
#[derive(Debug)]
pub struct OrchestrationOutcome {
    /// Every attempt made, in priority order.
    pub attempts: Vec<RecognitionAttempt>,

    /// Index into `attempts` of the winning attempt, when one
    /// succeeded.
    pub winner: Option<usize>,

    /// Terminal state (`Succeeded` or `Exhausted`).
    pub state: OrchestratorState,

    /// The pipeline deadline truncated fallback.
    pub deadline_hit: bool,

    /// Cancellation stopped fallback between attempts.
    pub cancelled: bool,
}

impl OrchestrationOutcome {
    /// Whether the result came from anything other than a clean win
    /// by the top-priority engine.
    pub fn degraded(&self) -> bool {
        match self.winner {
            Some(0) => self.deadline_hit,
            Some(_) => true,
            None => true,
        }
    }
}

/// Drives engine selection with strict priority order, per-attempt
/// resource ceilings, and ordered fallback.
///
/// One orchestrator serves one worker; it holds no per-document state
/// between runs except the per-engine breach counters used for health
/// signaling.
pub struct EngineOrchestrator {
    engines: Vec<Box<dyn RecognitionEngine>>,
    config: OrchestratorConfig,
    breach_counts: HashMap<EngineId, AtomicU32>,
}

impl EngineOrchestrator {
    /// Build an orchestrator from engines and a priority order.
    ///
    /// Engines are reordered to match `config.priority`; engines
    /// missing from the priority list are dropped with a warning.
    pub fn new(engines: Vec<Box<dyn RecognitionEngine>>, config: OrchestratorConfig) -> Self {
        let mut by_slot: HashMap<EngineId, Box<dyn RecognitionEngine>> = HashMap::new();
        for engine in engines {
            if !config.priority.contains(&engine.id()) {
                warn!(engine = %engine.id(), "engine not in priority list, dropping");
                continue;
            }
            by_slot.insert(engine.id(), engine);
        }

        let mut ordered = Vec::with_capacity(by_slot.len());
        for id in &config.priority {
            if let Some(engine) = by_slot.remove(id) {
                ordered.push(engine);
            }
        }

        let breach_counts = ordered
            .iter()
            .map(|e| (e.id(), AtomicU32::new(0)))
            .collect();

        Self {
            engines: ordered,
            config,
            breach_counts,
        }
    }

    /// Engines in effective priority order.
    pub fn engine_ids(&self) -> Vec<EngineId> {
        self.engines.iter().map(|e| e.id()).collect()
    }

    /// Run the fallback state machine for one document.
    pub fn run(
        &self,
        image: &DynamicImage,
        document_id: &str,
        deadline: Instant,
        cancel: &CancelToken,
        notify: &dyn NotificationSink,
    ) -> OrchestrationOutcome {
        let mut outcome = OrchestrationOutcome {
            attempts: Vec::new(),
            winner: None,
            state: OrchestratorState::Idle,
            deadline_hit: false,
            cancelled: false,
        };

        let mut state = if self.engines.is_empty() {
            OrchestratorState::Exhausted
        } else {
            OrchestratorState::Trying(0)
        };

        while let OrchestratorState::Trying(i) = state {
            if cancel.is_cancelled() {
                info!(document = %document_id, "cancelled between attempts");
                outcome.cancelled = true;
                state = OrchestratorState::Exhausted;
                break;
            }

            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                info!(document = %document_id, "pipeline deadline reached, truncating fallback");
                outcome.deadline_hit = true;
                state = OrchestratorState::Exhausted;
                break;
            };
            if remaining.is_zero() {
                outcome.deadline_hit = true;
                state = OrchestratorState::Exhausted;
                break;
            }

            let engine = &self.engines[i];
            let budget = AttemptBudget {
                wall: remaining.min(Duration::from_secs(self.config.attempt_timeout_secs)),
                memory_mb: Some(self.config.memory_ceiling_mb),
            };

            debug!(
                document = %document_id,
                engine = %engine.id(),
                budget_ms = budget.wall.as_millis() as u64,
                "trying engine"
            );

            let attempt = engine.recognize(image, &budget);
            self.note_breach(&attempt, notify);

            let usable = attempt.is_usable(self.config.min_token_confidence);
            let failed_engine = attempt.engine;
            outcome.attempts.push(attempt);

            if usable {
                outcome.winner = Some(outcome.attempts.len() - 1);
                state = OrchestratorState::Succeeded;
            } else if i + 1 < self.engines.len() {
                notify.degraded_service(document_id, failed_engine);
                state = OrchestratorState::Trying(i + 1);
            } else {
                state = OrchestratorState::Exhausted;
            }
        }

        outcome.state = state;
        debug!(
            document = %document_id,
            state = ?outcome.state,
            attempts = outcome.attempts.len(),
            "orchestration finished"
        );
        outcome
    }

    fn note_breach(&self, attempt: &RecognitionAttempt, notify: &dyn NotificationSink) {
        if !attempt.outcome.is_resource_breach() {
            return;
        }
        if let Some(counter) = self.breach_counts.get(&attempt.engine) {
            let count = counter.fetch_add(1, Ordering::Relaxed) + 1;
            let threshold = self.config.breach_alert_threshold.max(1);
            if count % threshold == 0 {
                notify.engine_health(attempt.engine, count);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AttemptOutcome, ScriptedBehavior, ScriptedEngine};
    use crate::sink::NoopSink;

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            priority: vec![EngineId::Primary, EngineId::FallbackA, EngineId::FallbackB],
            attempt_timeout_secs: 1,
            memory_ceiling_mb: 256,
            min_token_confidence: 0.2,
            breach_alert_threshold: 2,
        }
    }

    fn image() -> DynamicImage {
        DynamicImage::new_luma8(8, 8)
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    #[test]
    fn test_primary_win_skips_fallbacks() {
        let engines: Vec<Box<dyn RecognitionEngine>> = vec![
            Box::new(ScriptedEngine::from_lines(EngineId::Primary, &["FAKTURA"], 0.9)),
            Box::new(ScriptedEngine::from_lines(EngineId::FallbackA, &["x"], 0.9)),
        ];
        let orch = EngineOrchestrator::new(engines, config());

        let outcome = orch.run(&image(), "d1", deadline(), &CancelToken::new(), &NoopSink);
        assert_eq!(outcome.state, OrchestratorState::Succeeded);
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.winner, Some(0));
        assert!(!outcome.degraded());
    }

    #[test]
    fn test_fallback_ordering() {
        // A times out, B succeeds, C must never run.
        let engines: Vec<Box<dyn RecognitionEngine>> = vec![
            Box::new(ScriptedEngine::new(
                EngineId::Primary,
                ScriptedBehavior::TimeoutWith(vec![]),
            )),
            Box::new(ScriptedEngine::from_lines(EngineId::FallbackA, &["FAKTURA"], 0.9)),
            Box::new(ScriptedEngine::from_lines(EngineId::FallbackB, &["never"], 0.9)),
        ];
        let orch = EngineOrchestrator::new(engines, config());

        let outcome = orch.run(&image(), "d1", deadline(), &CancelToken::new(), &NoopSink);
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(outcome.attempts[0].engine, EngineId::Primary);
        assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::Timeout);
        assert_eq!(outcome.attempts[1].engine, EngineId::FallbackA);
        assert_eq!(outcome.attempts[1].outcome, AttemptOutcome::Success);
        assert_eq!(outcome.winner, Some(1));
        assert!(outcome.degraded());
    }

    #[test]
    fn test_exhausted_carries_partial_tokens() {
        let partial = vec![crate::engine::Token::new(
            "NIP: 5260001246",
            [0.0, 0.0, 100.0, 20.0],
            crate::confidence::Confidence::new(0.4),
        )];
        let engines: Vec<Box<dyn RecognitionEngine>> = vec![
            Box::new(ScriptedEngine::new(
                EngineId::Primary,
                ScriptedBehavior::Fail("crash".into()),
            )),
            Box::new(ScriptedEngine::new(
                EngineId::FallbackA,
                ScriptedBehavior::TimeoutWith(partial),
            )),
        ];
        let orch = EngineOrchestrator::new(engines, config());

        let outcome = orch.run(&image(), "d1", deadline(), &CancelToken::new(), &NoopSink);
        assert_eq!(outcome.state, OrchestratorState::Exhausted);
        assert!(outcome.winner.is_none());
        let last = outcome.attempts.last().unwrap();
        assert_eq!(last.engine, EngineId::FallbackA);
        assert_eq!(last.tokens.len(), 1);
    }

    #[test]
    fn test_zero_usable_tokens_triggers_fallback() {
        // Tokens exist but all sit below the confidence floor.
        let engines: Vec<Box<dyn RecognitionEngine>> = vec![
            Box::new(ScriptedEngine::from_lines(EngineId::Primary, &["???"], 0.05)),
            Box::new(ScriptedEngine::from_lines(EngineId::FallbackA, &["FAKTURA"], 0.9)),
        ];
        let orch = EngineOrchestrator::new(engines, config());

        let outcome = orch.run(&image(), "d1", deadline(), &CancelToken::new(), &NoopSink);
        assert_eq!(outcome.winner, Some(1));
    }

    #[test]
    fn test_cancellation_checked_between_attempts() {
        let engines: Vec<Box<dyn RecognitionEngine>> = vec![Box::new(
            ScriptedEngine::from_lines(EngineId::Primary, &["FAKTURA"], 0.9),
        )];
        let orch = EngineOrchestrator::new(engines, config());

        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = orch.run(&image(), "d1", deadline(), &cancel, &NoopSink);
        assert!(outcome.cancelled);
        assert!(outcome.attempts.is_empty());
    }

    #[test]
    fn test_expired_deadline_truncates_fallback() {
        let engines: Vec<Box<dyn RecognitionEngine>> = vec![Box::new(
            ScriptedEngine::from_lines(EngineId::Primary, &["FAKTURA"], 0.9),
        )];
        let orch = EngineOrchestrator::new(engines, config());

        let expired = Instant::now() - Duration::from_millis(10);
        let outcome = orch.run(&image(), "d1", expired, &CancelToken::new(), &NoopSink);
        assert!(outcome.deadline_hit);
        assert!(outcome.attempts.is_empty());
        assert_eq!(outcome.state, OrchestratorState::Exhausted);
    }

    #[test]
    fn test_engines_reordered_by_priority() {
        let engines: Vec<Box<dyn RecognitionEngine>> = vec![
            Box::new(ScriptedEngine::from_lines(EngineId::FallbackA, &["a"], 0.9)),
            Box::new(ScriptedEngine::from_lines(EngineId::Primary, &["p"], 0.9)),
        ];
        let orch = EngineOrchestrator::new(engines, config());
        assert_eq!(
            orch.engine_ids(),
            vec![EngineId::Primary, EngineId::FallbackA]
        );
    }
}
