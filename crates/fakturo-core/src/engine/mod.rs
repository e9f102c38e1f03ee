//! Recognition engine capability contract and attempt records.

mod command;
mod orchestrator;
mod scripted;

pub use command::CommandEngine;
pub use orchestrator::{CancelToken, EngineOrchestrator, OrchestrationOutcome, OrchestratorState};
pub use scripted::{ScriptedBehavior, ScriptedEngine};

use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::confidence::Confidence;

/// The closed set of configured engine slots, in falling priority.
///
/// Adding an engine means adding one variant here plus one config
/// entry; selection order lives in the orchestrator's priority list,
/// not in per-call branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineId {
    /// Top-priority engine.
    Primary,
    /// First fallback.
    FallbackA,
    /// Second fallback.
    FallbackB,
    /// Synthetic source for text-layer PDFs (never configured as a
    /// real engine; used only to tag the embedded-text attempt).
    EmbeddedText,
}

impl std::fmt::Display for EngineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EngineId::Primary => "primary",
            EngineId::FallbackA => "fallback_a",
            EngineId::FallbackB => "fallback_b",
            EngineId::EmbeddedText => "embedded_text",
        };
        f.write_str(s)
    }
}

/// One recognized text token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// Recognized text content.
    pub text: String,

    /// Axis-aligned bounding box (x, y, width, height) in image pixels.
    pub bbox: [f32; 4],

    /// Per-token recognition confidence.
    pub confidence: Confidence,
}

impl Token {
    pub fn new(text: impl Into<String>, bbox: [f32; 4], confidence: Confidence) -> Self {
        Self {
            text: text.into(),
            bbox,
            confidence,
        }
    }

    /// Center point of the bounding box.
    pub fn center(&self) -> (f32, f32) {
        (
            self.bbox[0] + self.bbox[2] / 2.0,
            self.bbox[1] + self.bbox[3] / 2.0,
        )
    }
}

/// Resource budget for one engine attempt.
#[derive(Debug, Clone, Copy)]
pub struct AttemptBudget {
    /// Wall-clock ceiling for the attempt.
    pub wall: Duration,

    /// Peak resident memory ceiling in MB, when enforceable.
    pub memory_mb: Option<u64>,
}

impl AttemptBudget {
    pub fn new(wall: Duration) -> Self {
        Self {
            wall,
            memory_mb: None,
        }
    }

    pub fn with_memory_mb(mut self, mb: u64) -> Self {
        self.memory_mb = Some(mb);
        self
    }
}

/// Outcome of one engine invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The engine completed within budget.
    Success,
    /// The engine exceeded its wall-clock budget.
    Timeout,
    /// The engine exceeded its memory ceiling.
    ResourceExceeded,
    /// The engine failed to start or crashed.
    Error(String),
}

impl AttemptOutcome {
    /// Whether the attempt breached a resource ceiling (time or
    /// memory). Counted per engine for operational health signals.
    pub fn is_resource_breach(&self) -> bool {
        matches!(self, AttemptOutcome::Timeout | AttemptOutcome::ResourceExceeded)
    }
}

/// One invocation of one engine against one prepared image.
///
/// Write-once: created by the engine adapter, recorded by the
/// orchestrator, never mutated afterwards. Several attempts may exist
/// per document due to fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionAttempt {
    /// Which engine produced this attempt.
    pub engine: EngineId,

    /// Attempt start time.
    pub started_at: DateTime<Utc>,

    /// Attempt end time.
    pub finished_at: DateTime<Utc>,

    /// How the attempt ended.
    pub outcome: AttemptOutcome,

    /// Tokens produced, possibly partial on timeout.
    pub tokens: Vec<Token>,

    /// Wall-clock time consumed in milliseconds.
    pub elapsed_ms: u64,

    /// Peak resident memory observed in MB, when measured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_memory_mb: Option<u64>,
}

impl RecognitionAttempt {
    /// Tokens at or above the per-token confidence floor.
    pub fn usable_tokens(&self, floor: f32) -> usize {
        self.tokens
            .iter()
            .filter(|t| t.confidence.at_least(floor))
            .count()
    }

    /// Whether this attempt counts as a success for fallback purposes:
    /// a clean outcome with at least one usable token.
    pub fn is_usable(&self, floor: f32) -> bool {
        self.outcome == AttemptOutcome::Success && self.usable_tokens(floor) > 0
    }
}

/// Capability contract shared by all engine variants.
///
/// `recognize` must respect the supplied budget, must not be invoked
/// concurrently for the same document on the same instance, and
/// reports partial tokens on timeout instead of discarding them. It
/// never errors: failures are carried in the attempt outcome so the
/// orchestrator can treat them uniformly for fallback.
pub trait RecognitionEngine: Send + Sync {
    /// The slot this engine occupies.
    fn id(&self) -> EngineId;

    /// Run recognition against a prepared image within a budget.
    fn recognize(&self, image: &DynamicImage, budget: &AttemptBudget) -> RecognitionAttempt;
}

/// Build an attempt record around an engine invocation.
pub(crate) fn attempt_record(
    engine: EngineId,
    started_at: DateTime<Utc>,
    outcome: AttemptOutcome,
    tokens: Vec<Token>,
    peak_memory_mb: Option<u64>,
) -> RecognitionAttempt {
    let finished_at = Utc::now();
    let elapsed_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
    RecognitionAttempt {
        engine,
        started_at,
        finished_at,
        outcome,
        tokens,
        elapsed_ms,
        peak_memory_mb,
    }
}
