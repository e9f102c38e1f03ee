//! Uploaded document model and content sniffing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content kind detected from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Pdf,
    Png,
    Jpeg,
    Tiff,
    Bmp,
    Unknown,
}

/// One uploaded invoice document.
///
/// Owned by the ingestion boundary and read-only to the pipeline:
/// created once, never mutated. Retention/purging is external.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document id assigned at upload.
    pub id: String,

    /// Raw byte content.
    #[serde(skip)]
    pub bytes: Vec<u8>,

    /// MIME type declared at upload, if any. Sniffed content wins
    /// over a wrong declaration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_mime: Option<String>,

    /// Upload timestamp.
    pub uploaded_at: DateTime<Utc>,

    /// Owning user/company reference, opaque to the pipeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl Document {
    /// Create a document from in-memory bytes.
    pub fn from_bytes(id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            bytes,
            declared_mime: None,
            uploaded_at: Utc::now(),
            owner: None,
        }
    }

    /// Set the declared MIME type.
    pub fn with_declared_mime(mut self, mime: impl Into<String>) -> Self {
        self.declared_mime = Some(mime.into());
        self
    }

    /// Set the owner reference.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Detect the content kind from magic bytes.
    pub fn content_kind(&self) -> ContentKind {
        sniff(&self.bytes)
    }
}

fn sniff(bytes: &[u8]) -> ContentKind {
    if bytes.starts_with(b"%PDF-") {
        ContentKind::Pdf
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        ContentKind::Png
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        ContentKind::Jpeg
    } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        ContentKind::Tiff
    } else if bytes.starts_with(b"BM") {
        ContentKind::Bmp
    } else {
        ContentKind::Unknown
    }
}
