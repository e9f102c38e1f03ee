//! Deterministic engine used by tests and dry runs.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use image::DynamicImage;

use super::{attempt_record, AttemptBudget, AttemptOutcome, EngineId, RecognitionAttempt, RecognitionEngine, Token};

/// What a [`ScriptedEngine`] does when invoked.
#[derive(Debug, Clone)]
pub enum ScriptedBehavior {
    /// Succeed with these tokens.
    Tokens(Vec<Token>),
    /// Time out, reporting these partial tokens.
    TimeoutWith(Vec<Token>),
    /// Breach the memory ceiling.
    ResourceExceeded,
    /// Fail with an internal error.
    Fail(String),
}

/// A recognition engine with a fixed script instead of a model.
///
/// Counts its invocations so orchestration tests can assert that an
/// engine was or was not tried.
pub struct ScriptedEngine {
    id: EngineId,
    behavior: ScriptedBehavior,
    invocations: AtomicU32,
}

impl ScriptedEngine {
    pub fn new(id: EngineId, behavior: ScriptedBehavior) -> Self {
        Self {
            id,
            behavior,
            invocations: AtomicU32::new(0),
        }
    }

    /// Succeeding engine producing one token per line of `text`, laid
    /// out top to bottom at the given confidence.
    pub fn from_lines(id: EngineId, lines: &[&str], confidence: f32) -> Self {
        let tokens = lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                Token::new(
                    *line,
                    [10.0, 10.0 + i as f32 * 24.0, 200.0, 20.0],
                    crate::confidence::Confidence::new(confidence),
                )
            })
            .collect();
        Self::new(id, ScriptedBehavior::Tokens(tokens))
    }

    /// How many times this engine has been invoked.
    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::Relaxed)
    }
}

impl RecognitionEngine for ScriptedEngine {
    fn id(&self) -> EngineId {
        self.id
    }

    fn recognize(&self, _image: &DynamicImage, _budget: &AttemptBudget) -> RecognitionAttempt {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        let started_at = Utc::now();

        let (outcome, tokens) = match &self.behavior {
            ScriptedBehavior::Tokens(tokens) => (AttemptOutcome::Success, tokens.clone()),
            ScriptedBehavior::TimeoutWith(tokens) => (AttemptOutcome::Timeout, tokens.clone()),
            ScriptedBehavior::ResourceExceeded => (AttemptOutcome::ResourceExceeded, Vec::new()),
            ScriptedBehavior::Fail(reason) => {
                (AttemptOutcome::Error(reason.clone()), Vec::new())
            }
        };

        attempt_record(self.id, started_at, outcome, tokens, None)
    }
}
