//! Error types for the fakturo-core library.

use thiserror::Error;

/// Main error type for the fakturo library.
///
/// Only [`FakturoError::UnsupportedFormat`] may terminate a document
/// without producing a result; every other condition is degraded into
/// an [`crate::OcrResult`] by the pipeline.
#[derive(Error, Debug)]
pub enum FakturoError {
    /// The document cannot be decoded as an image or PDF page.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Image preprocessing error.
    #[error("preprocessing error: {0}")]
    Preprocess(#[from] PreprocessError),

    /// Engine invocation error.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Image decoding/transform error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised while preparing a document image.
///
/// Enhancement failures are report-only (the decoded image passes
/// through unmodified); these variants surface only when even the raw
/// decode fails.
#[derive(Error, Debug)]
pub enum PreprocessError {
    /// The byte content does not decode as any supported image format.
    #[error("undecodable image content: {0}")]
    Decode(String),

    /// The PDF has no page that can be rastered or read.
    #[error("no usable PDF page: {0}")]
    Pdf(String),

    /// An enhancement stage failed; carries the stage name.
    #[error("enhancement stage failed: {0}")]
    Enhancement(String),
}

/// Errors local to a single engine invocation.
///
/// These never escape the orchestrator as errors - they are recorded
/// on the attempt and recovered via fallback.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine exceeded its wall-clock budget.
    #[error("engine timed out after {0} ms")]
    Timeout(u64),

    /// The engine exceeded its memory ceiling.
    #[error("engine exceeded memory ceiling ({0} MB)")]
    ResourceExceeded(u64),

    /// The engine process could not be started or crashed.
    #[error("engine failure: {0}")]
    Internal(String),

    /// The engine ran but produced no usable tokens.
    #[error("engine produced no usable tokens")]
    ZeroTokens,
}

/// Result type for the fakturo library.
pub type Result<T> = std::result::Result<T, FakturoError>;
