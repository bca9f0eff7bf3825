//! Client-side downscaling: bound the upload's pixel dimensions.
//!
//! ## Why spawn_blocking?
//!
//! Decoding a 10 MB JPEG and resampling it is CPU-heavy. The work runs on
//! tokio's blocking pool so the controller's task keeps answering toggles and
//! phase subscribers while the image is processed. The decoded bitmap only
//! exists inside that closure and is dropped before the result is returned,
//! whether the call succeeds or fails.
//!
//! ## Identity for small images
//!
//! Images already inside the bound are returned untouched: same bytes, same
//! declared type, no re-encode. Only the header is read to learn the size.

use crate::error::{ResizeError, RitualError};
use crate::pipeline::input::UploadCandidate;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;
use tracing::{debug, info};

/// Resize limits and encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeBounds {
    pub max_width: u32,
    pub max_height: u32,
    /// JPEG quality, 1–100.
    pub quality: u8,
}

impl Default for ResizeBounds {
    fn default() -> Self {
        Self {
            max_width: 800,
            max_height: 800,
            quality: 90,
        }
    }
}

/// The resizer's output: the candidate to upload plus what happened to it.
#[derive(Debug, Clone)]
pub struct Resized {
    pub candidate: UploadCandidate,
    pub original_dimensions: (u32, u32),
    pub dimensions: (u32, u32),
}

impl Resized {
    /// Whether the image was re-encoded at a smaller size.
    pub fn was_resized(&self) -> bool {
        self.original_dimensions != self.dimensions
    }
}

/// Downscale `candidate` to fit `bounds`, preserving aspect ratio.
///
/// This runs inside `spawn_blocking` since decode and resample are CPU-bound.
pub async fn resize(candidate: UploadCandidate, bounds: ResizeBounds) -> Result<Resized, RitualError> {
    let resized = tokio::task::spawn_blocking(move || resize_blocking(candidate, bounds))
        .await
        .map_err(|e| RitualError::Internal(format!("Resize task panicked: {}", e)))??;
    Ok(resized)
}

/// Blocking implementation of [`resize`].
pub fn resize_blocking(candidate: UploadCandidate, bounds: ResizeBounds) -> Result<Resized, ResizeError> {
    let (width, height) = ImageReader::new(Cursor::new(candidate.bytes()))
        .with_guessed_format()
        .map_err(|e| ResizeError::LoadFailed {
            detail: e.to_string(),
        })?
        .into_dimensions()
        .map_err(|e| ResizeError::LoadFailed {
            detail: e.to_string(),
        })?;

    let Some((new_width, new_height)) = fit_within(width, height, bounds.max_width, bounds.max_height)
    else {
        debug!("{}x{} within {}x{}, keeping original", width, height, bounds.max_width, bounds.max_height);
        return Ok(Resized {
            candidate,
            original_dimensions: (width, height),
            dimensions: (width, height),
        });
    };

    let decoded = image::load_from_memory(candidate.bytes()).map_err(|e| ResizeError::LoadFailed {
        detail: e.to_string(),
    })?;
    let scaled = decoded.resize_exact(new_width, new_height, FilterType::CatmullRom);
    drop(decoded);

    let (bytes, media_type) = encode_as(&scaled, candidate.media_type(), bounds.quality)?;
    info!(
        "Resized {} from {}x{} to {}x{} ({} → {} bytes)",
        candidate.name(),
        width,
        height,
        new_width,
        new_height,
        candidate.size(),
        bytes.len()
    );

    Ok(Resized {
        candidate: UploadCandidate::new(candidate.name(), media_type, bytes),
        original_dimensions: (width, height),
        dimensions: (new_width, new_height),
    })
}

/// Compute the target size for a `width × height` image inside the bound.
///
/// Returns `None` when no resize is needed. Otherwise a single scale factor
/// `min(max_w / w, max_h / h)` is applied: the limiting axis lands exactly on
/// the bound and the other axis is floored, never below 1 px. Integer
/// arithmetic keeps the limiting axis exact.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> Option<(u32, u32)> {
    if width <= max_width && height <= max_height {
        return None;
    }

    let (w, h) = (u64::from(width), u64::from(height));
    let (mw, mh) = (u64::from(max_width), u64::from(max_height));

    // mw / w <= mh / h  ⇔  mw * h <= mh * w
    let (new_w, new_h) = if mw * h <= mh * w {
        (mw, h * mw / w)
    } else {
        (w * mh / h, mh)
    };

    Some((new_w.max(1) as u32, new_h.max(1) as u32))
}

/// Re-encode `img` in the declared type. Types the crate cannot write fall
/// back to PNG, and the returned media type says so.
fn encode_as(img: &DynamicImage, media_type: &str, quality: u8) -> Result<(Vec<u8>, String), ResizeError> {
    let format = ImageFormat::from_mime_type(media_type)
        .filter(|f| f.writing_enabled())
        .unwrap_or(ImageFormat::Png);

    let mut buf = Vec::new();
    let written = if format == ImageFormat::Jpeg {
        // JPEG has no alpha channel.
        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
        rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
    } else {
        img.write_to(&mut Cursor::new(&mut buf), format)
    };
    written.map_err(|e| ResizeError::EncodeFailed {
        detail: e.to_string(),
    })?;

    let out_type = if format == ImageFormat::Png && !media_type.eq_ignore_ascii_case("image/png") {
        "image/png".to_string()
    } else {
        media_type.to_string()
    };
    Ok((buf, out_type))
}
