//! Document image preparation: decode, deskew, denoise, contrast.

use image::{DynamicImage, GrayImage, Luma};
use tracing::{debug, warn};

use crate::document::{ContentKind, Document};
use crate::error::{FakturoError, PreprocessError, Result};
use crate::pdf::{self, PdfKind};

/// A document image ready for recognition.
#[derive(Debug)]
pub struct PreparedImage {
    /// The image handed to engines.
    pub image: DynamicImage,

    /// Whether enhancement ran, or the decoded original passed
    /// through after an enhancement failure.
    pub enhanced: bool,

    /// Embedded PDF text layer, when the source was a text-based PDF.
    pub embedded_text: Option<String>,
}

/// Image preprocessor for the OCR pipeline.
///
/// Decoding failures are fatal for the document; enhancement failures
/// are report-only and pass the decoded image through unmodified.
pub struct ImagePreprocessor {
    /// Largest skew angle (degrees) the deskew search considers.
    max_skew_deg: f32,
    /// Skip deskew/denoise and only normalize contrast.
    fast: bool,
}

impl ImagePreprocessor {
    pub fn new() -> Self {
        Self {
            max_skew_deg: 5.0,
            fast: false,
        }
    }

    /// Limit the deskew search range.
    pub fn with_max_skew_deg(mut self, deg: f32) -> Self {
        self.max_skew_deg = deg.abs();
        self
    }

    /// Contrast-only mode.
    pub fn fast(mut self) -> Self {
        self.fast = true;
        self
    }

    /// Prepare a document for recognition.
    ///
    /// Fails only with [`FakturoError::UnsupportedFormat`] when the
    /// content decodes as neither an image nor a usable PDF.
    pub fn prepare(&self, document: &Document) -> Result<PreparedImage> {
        let (decoded, embedded_text) = self.decode(document)?;

        match self.enhance(&decoded) {
            Ok(image) => Ok(PreparedImage {
                image,
                enhanced: true,
                embedded_text,
            }),
            Err(e) => {
                warn!(document = %document.id, "enhancement failed, passing decoded image through: {}", e);
                Ok(PreparedImage {
                    image: decoded,
                    enhanced: false,
                    embedded_text,
                })
            }
        }
    }

    fn decode(&self, document: &Document) -> Result<(DynamicImage, Option<String>)> {
        match document.content_kind() {
            ContentKind::Pdf => {
                let content = pdf::inspect(&document.bytes).map_err(|e| {
                    FakturoError::UnsupportedFormat(format!("PDF decode failed: {}", e))
                })?;

                let text = match content.kind {
                    PdfKind::Text | PdfKind::Hybrid => Some(content.text),
                    _ => None,
                };

                match (content.page_image, &text) {
                    (Some(image), _) => Ok((image, text)),
                    // Text-only PDF: no raster to OCR, but the text
                    // layer alone carries the document. A blank page
                    // keeps downstream stages uniform.
                    (None, Some(_)) => Ok((blank_page(), text)),
                    (None, None) => Err(FakturoError::UnsupportedFormat(
                        "PDF has neither text layer nor page images".to_string(),
                    )),
                }
            }
            ContentKind::Unknown => {
                // Unknown magic bytes: let the image crate take one
                // guess before giving up.
                image::load_from_memory(&document.bytes)
                    .map(|img| (img, None))
                    .map_err(|e| {
                        FakturoError::UnsupportedFormat(format!("undecodable content: {}", e))
                    })
            }
            _ => image::load_from_memory(&document.bytes)
                .map(|img| (img, None))
                .map_err(|e| FakturoError::UnsupportedFormat(format!("image decode failed: {}", e))),
        }
    }

    /// Run the enhancement chain: grayscale, denoise, deskew, adaptive
    /// contrast.
    fn enhance(&self, image: &DynamicImage) -> std::result::Result<DynamicImage, PreprocessError> {
        let gray = image.to_luma8();
        if gray.width() < 3 || gray.height() < 3 {
            return Err(PreprocessError::Enhancement(
                "image too small to enhance".to_string(),
            ));
        }

        let gray = if self.fast { gray } else { median3(&gray) };

        let gray = if self.fast {
            gray
        } else {
            let angle = estimate_skew(&gray, self.max_skew_deg);
            if angle.abs() >= 0.25 {
                debug!("deskewing by {:.2} degrees", -angle);
                rotate_about_center(&gray, -angle)
            } else {
                gray
            }
        };

        let binarized = adaptive_threshold(&gray, 15, 5);
        Ok(DynamicImage::ImageLuma8(binarized))
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

fn blank_page() -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_pixel(32, 32, Luma([255])))
}

/// 3x3 median filter, the classic salt-and-pepper cleanup for scans.
fn median3(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut result = image.clone();

    for y in 1..height.saturating_sub(1) {
        for x in 1..width.saturating_sub(1) {
            let mut window = [0u8; 9];
            let mut i = 0;
            for dy in 0..3 {
                for dx in 0..3 {
                    window[i] = image.get_pixel(x + dx - 1, y + dy - 1)[0];
                    i += 1;
                }
            }
            window.sort_unstable();
            result.put_pixel(x, y, Luma([window[4]]));
        }
    }

    result
}

/// Estimate text-line skew by maximizing the variance of sheared row
/// profiles of dark pixels. Search runs on a downsampled copy.
fn estimate_skew(image: &GrayImage, max_deg: f32) -> f32 {
    const SAMPLE_MAX_DIM: u32 = 600;
    const STEP_DEG: f32 = 0.5;
    const DARK_THRESHOLD: u8 = 128;

    let (width, height) = image.dimensions();
    let scale = (width.max(height) as f32 / SAMPLE_MAX_DIM as f32).max(1.0);
    let sw = ((width as f32 / scale) as u32).max(1);
    let sh = ((height as f32 / scale) as u32).max(1);
    let sample = image::imageops::resize(image, sw, sh, image::imageops::FilterType::Triangle);

    let dark: Vec<(u32, u32)> = sample
        .enumerate_pixels()
        .filter(|(_, _, p)| p[0] < DARK_THRESHOLD)
        .map(|(x, y, _)| (x, y))
        .collect();
    if dark.len() < 32 {
        return 0.0;
    }

    let mut best_angle = 0.0f32;
    let mut best_score = f64::MIN;
    let steps = (max_deg / STEP_DEG).round() as i32;

    for i in -steps..=steps {
        let angle = i as f32 * STEP_DEG;
        let shear = angle.to_radians().tan();

        let mut rows = vec![0u32; sh as usize + 1];
        for &(x, y) in &dark {
            let row = (y as f32 + x as f32 * shear).round();
            if row >= 0.0 && (row as usize) < rows.len() {
                rows[row as usize] += 1;
            }
        }

        let mean = dark.len() as f64 / rows.len() as f64;
        let score: f64 = rows
            .iter()
            .map(|&c| {
                let d = c as f64 - mean;
                d * d
            })
            .sum();

        if score > best_score {
            best_score = score;
            best_angle = angle;
        }
    }

    best_angle
}

/// Rotate around the image center with nearest-neighbor sampling,
/// keeping dimensions and filling uncovered corners white.
fn rotate_about_center(image: &GrayImage, angle_deg: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut result = GrayImage::from_pixel(width, height, Luma([255]));

    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;

    for y in 0..height {
        for x in 0..width {
            // Inverse mapping: sample the source at the un-rotated
            // position of this destination pixel.
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let sx = (dx * cos + dy * sin + cx).round();
            let sy = (-dx * sin + dy * cos + cy).round();

            if sx >= 0.0 && sy >= 0.0 && (sx as u32) < width && (sy as u32) < height {
                result.put_pixel(x, y, *image.get_pixel(sx as u32, sy as u32));
            }
        }
    }

    result
}

/// Adaptive mean thresholding over an integral image.
fn adaptive_threshold(image: &GrayImage, block_size: u32, c: i32) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut result = GrayImage::new(width, height);
    let half = (block_size / 2) as i64;

    // Integral image with a zero row/column of padding.
    let w = width as usize + 1;
    let h = height as usize + 1;
    let mut integral = vec![0u64; w * h];
    for y in 1..h {
        let mut row_sum = 0u64;
        for x in 1..w {
            row_sum += image.get_pixel((x - 1) as u32, (y - 1) as u32)[0] as u64;
            integral[y * w + x] = integral[(y - 1) * w + x] + row_sum;
        }
    }

    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let x0 = (x - half).max(0) as usize;
            let y0 = (y - half).max(0) as usize;
            let x1 = ((x + half + 1).min(width as i64)) as usize;
            let y1 = ((y + half + 1).min(height as i64)) as usize;

            let count = ((x1 - x0) * (y1 - y0)) as u64;
            let sum = integral[y1 * w + x1] + integral[y0 * w + x0]
                - integral[y0 * w + x1]
                - integral[y1 * w + x0];

            let mean = (sum / count) as i32;
            let pixel = image.get_pixel(x as u32, y as u32)[0] as i32;
            let output = if pixel > mean - c { 255 } else { 0 };
            result.put_pixel(x as u32, y as u32, Luma([output as u8]));
        }
    }

    result
}
