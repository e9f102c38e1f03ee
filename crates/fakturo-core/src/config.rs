//! Configuration structures for the OCR pipeline.

use serde::{Deserialize, Serialize};

use crate::engine::EngineId;
use crate::fields::FieldKind;

/// Main configuration for the fakturo pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Engine selection and resource ceilings.
    pub orchestrator: OrchestratorConfig,

    /// External engine command lines, one per configured slot.
    pub engines: Vec<EngineCommandConfig>,

    /// Extraction and review settings.
    pub extraction: ExtractionConfig,

    /// Locale-specific pattern parameters (Polish).
    pub locale: LocaleConfig,

    /// Pipeline-wide wall-clock deadline in seconds.
    pub deadline_secs: u64,

    /// Lift the embedded text layer of text-based PDFs into a
    /// synthetic full-confidence attempt instead of running OCR.
    pub prefer_embedded_text: bool,
}

/// Engine selection and per-attempt resource ceilings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Engines to try, in strict priority order.
    pub priority: Vec<EngineId>,

    /// Wall-clock budget per attempt, in seconds.
    pub attempt_timeout_secs: u64,

    /// Memory ceiling per attempt, in MB.
    pub memory_ceiling_mb: u64,

    /// Minimum per-token confidence for a token to count toward
    /// attempt success.
    pub min_token_confidence: f32,

    /// After this many resource-ceiling breaches for one engine, a
    /// health signal is emitted to the notification sink.
    pub breach_alert_threshold: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            priority: vec![EngineId::Primary, EngineId::FallbackA, EngineId::FallbackB],
            attempt_timeout_secs: 30,
            memory_ceiling_mb: 1024,
            min_token_confidence: 0.2,
            breach_alert_threshold: 5,
        }
    }
}

/// Command line for one external engine slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineCommandConfig {
    /// Which slot this command fills.
    pub id: EngineId,

    /// Executable to invoke. Receives the prepared image path as its
    /// final argument and prints TSV tokens on stdout.
    pub command: String,

    /// Extra arguments placed before the image path.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Extraction and manual-review settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Canonical fields below this confidence are flagged for manual
    /// review.
    pub review_threshold: f32,

    /// Target fields with optionality flags. Optional fields do not
    /// depress the overall document confidence.
    pub fields: Vec<FieldSpec>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            review_threshold: 0.8,
            fields: vec![
                FieldSpec::required(FieldKind::InvoiceNumber),
                FieldSpec::required(FieldKind::Nip),
                FieldSpec::required(FieldKind::GrossAmount),
                FieldSpec::optional(FieldKind::IssueDate),
                FieldSpec::optional(FieldKind::VatRate),
                FieldSpec::optional(FieldKind::NetAmount),
                FieldSpec::optional(FieldKind::VatAmount),
                FieldSpec::optional(FieldKind::Regon),
            ],
        }
    }
}

/// One target field with its optionality flag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field kind.
    pub kind: FieldKind,

    /// Whether the field counts toward overall document confidence.
    pub required: bool,
}

impl FieldSpec {
    pub fn required(kind: FieldKind) -> Self {
        Self {
            kind,
            required: true,
        }
    }

    pub fn optional(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
        }
    }
}

/// Locale-specific validation parameters. Currently Polish.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocaleConfig {
    /// NIP checksum weights over the first 9 digits.
    pub nip_weights: Vec<u32>,

    /// Earliest plausible issue year.
    pub earliest_year: i32,

    /// Dates up to this many days past "today" are still plausible.
    pub date_grace_days: i64,
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            nip_weights: vec![6, 5, 7, 2, 3, 4, 5, 6, 7],
            earliest_year: 2000,
            date_grace_days: 14,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)
    }

    /// Look up the command configured for an engine slot.
    pub fn engine_command(&self, id: EngineId) -> Option<&EngineCommandConfig> {
        self.engines.iter().find(|e| e.id == id)
    }

    /// The required/optional flag for a field; unknown fields are
    /// optional.
    pub fn is_required(&self, kind: FieldKind) -> bool {
        self.extraction
            .fields
            .iter()
            .find(|f| f.kind == kind)
            .map(|f| f.required)
            .unwrap_or(false)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            engines: Vec::new(),
            extraction: ExtractionConfig::default(),
            locale: LocaleConfig::default(),
            deadline_secs: 120,
            prefer_embedded_text: true,
        }
    }
}
