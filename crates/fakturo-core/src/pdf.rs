//! PDF inspection: text-layer probing and page image extraction.
//!
//! Invoices arrive either as text-based PDFs (a text layer the
//! pipeline can lift directly) or as scans wrapped in a PDF container
//! (one large page image that goes through OCR). This module tells
//! the two apart and pulls out whichever content is usable.

use image::{DynamicImage, ImageBuffer, Rgba};
use lopdf::{Document as PdfDocument, Object};
use tracing::{debug, trace};

use crate::error::PreprocessError;

/// Minimum text-layer length to treat a PDF as text-based.
const MIN_TEXT_LAYER_LEN: usize = 50;

/// What a PDF contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfKind {
    /// Usable text layer, no page images.
    Text,
    /// Page images only (scanned document).
    Scanned,
    /// Both a text layer and page images.
    Hybrid,
    /// Neither.
    Empty,
}

/// Usable content pulled from a PDF.
#[derive(Debug)]
pub struct PdfContent {
    /// Content classification.
    pub kind: PdfKind,

    /// Embedded text layer, empty when absent.
    pub text: String,

    /// First page image, when one exists.
    pub page_image: Option<DynamicImage>,
}

/// Inspect PDF bytes and extract whatever content is usable.
pub fn inspect(bytes: &[u8]) -> Result<PdfContent, PreprocessError> {
    let mut doc =
        PdfDocument::load_mem(bytes).map_err(|e| PreprocessError::Pdf(e.to_string()))?;

    let mut raw = bytes.to_vec();
    if doc.is_encrypted() {
        if doc.decrypt("").is_err() {
            return Err(PreprocessError::Pdf("encrypted PDF".to_string()));
        }
        debug!("decrypted PDF with empty password");
        let mut decrypted = Vec::new();
        doc.save_to(&mut decrypted)
            .map_err(|e| PreprocessError::Pdf(e.to_string()))?;
        raw = decrypted;
    }

    if doc.get_pages().is_empty() {
        return Err(PreprocessError::Pdf("PDF has no pages".to_string()));
    }

    let text = pdf_extract::extract_text_from_mem(&raw).unwrap_or_default();
    let page_image = first_page_image(&doc);

    let has_text = text.trim().len() > MIN_TEXT_LAYER_LEN;
    let kind = match (has_text, page_image.is_some()) {
        (true, false) => PdfKind::Text,
        (false, true) => PdfKind::Scanned,
        (true, true) => PdfKind::Hybrid,
        (false, false) => PdfKind::Empty,
    };

    debug!(
        "PDF analysis: {} chars text, page_image={} -> {:?}",
        text.len(),
        page_image.is_some(),
        kind
    );

    Ok(PdfContent {
        kind,
        text,
        page_image,
    })
}

/// Find the largest image object in the document.
///
/// Scans were observed to embed the page as a single large image
/// XObject; thumbnails and logos are weeded out by taking the largest.
fn first_page_image(doc: &PdfDocument) -> Option<DynamicImage> {
    let mut best: Option<DynamicImage> = None;

    for (_, object) in doc.objects.iter() {
        if let Some(img) = image_from_object(doc, object) {
            let replace = match &best {
                Some(current) => img.width() * img.height() > current.width() * current.height(),
                None => true,
            };
            if replace {
                best = Some(img);
            }
        }
    }

    best
}

fn image_from_object(doc: &PdfDocument, obj: &Object) -> Option<DynamicImage> {
    let Object::Stream(stream) = obj else {
        return None;
    };
    let dict = &stream.dict;

    let subtype = dict.get(b"Subtype").ok()?;
    if subtype.as_name().ok()? != b"Image" {
        return None;
    }

    let width = dict.get(b"Width").ok()?.as_i64().ok()? as u32;
    let height = dict.get(b"Height").ok()?.as_i64().ok()? as u32;
    trace!("image object: {}x{}", width, height);

    if let Ok(filter) = dict.get(b"Filter") {
        let filter_name = match filter {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            _ => None,
        };

        match filter_name {
            Some(b"DCTDecode") => {
                // JPEG stream, usable as-is.
                return image::load_from_memory_with_format(
                    &stream.content,
                    image::ImageFormat::Jpeg,
                )
                .ok();
            }
            Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
                trace!("unsupported image filter");
                return None;
            }
            _ => {}
        }
    }

    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    let color_space = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|o| match o {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            Object::Reference(r) => doc.get_object(*r).ok().and_then(|o| o.as_name().ok()),
            _ => None,
        })
        .unwrap_or(b"DeviceRGB");

    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);
    if bits != 8 {
        return None;
    }

    raw_to_image(&data, width, height, color_space)
}

fn raw_to_image(
    data: &[u8],
    width: u32,
    height: u32,
    color_space: &[u8],
) -> Option<DynamicImage> {
    let pixels = (width * height) as usize;

    match color_space {
        b"DeviceRGB" | b"RGB" if data.len() >= pixels * 3 => {
            let mut rgba = Vec::with_capacity(pixels * 4);
            for chunk in data[..pixels * 3].chunks_exact(3) {
                rgba.extend_from_slice(chunk);
                rgba.push(255);
            }
            ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, rgba)
                .map(DynamicImage::ImageRgba8)
        }
        b"DeviceGray" | b"G" if data.len() >= pixels => {
            let mut rgba = Vec::with_capacity(pixels * 4);
            for &gray in &data[..pixels] {
                rgba.extend_from_slice(&[gray, gray, gray, 255]);
            }
            ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, rgba)
                .map(DynamicImage::ImageRgba8)
        }
        _ => None,
    }
}
