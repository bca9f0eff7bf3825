//! Ritual results: the image handles a front-end displays, plus timings.

use crate::error::RitualError;
use crate::ritual::RitualPhase;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// A displayable image buffer owned by the controller.
///
/// Handles are released when the controller drops its [`ProcessedResult`]
/// on reset or when the next ritual starts. Callers that clone a handle keep
/// the buffer alive for as long as they hold it.
#[derive(Debug, Clone)]
pub struct ImageHandle {
    media_type: String,
    bytes: Arc<[u8]>,
}

impl ImageHandle {
    pub fn new(media_type: impl Into<String>, bytes: Arc<[u8]>) -> Self {
        Self {
            media_type: media_type.into(),
            bytes,
        }
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The shared buffer behind this handle.
    pub fn buffer(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File extension matching the media type, for writing to disk.
    pub fn extension(&self) -> &'static str {
        match self.media_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/png" => "png",
            "image/webp" => "webp",
            "image/gif" => "gif",
            other => mime_guess::get_mime_extensions_str(other)
                .and_then(|exts| exts.first().copied())
                .unwrap_or("png"),
        }
    }
}

/// Timings and sizes for one ritual.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RitualStats {
    pub original_bytes: u64,
    pub processed_bytes: u64,
    pub original_dimensions: (u32, u32),
    pub dimensions: (u32, u32),
    pub resized: bool,
    pub resize_duration_ms: u64,
    pub sever_duration_ms: u64,
    pub spirit_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything produced by a completed ritual.
#[derive(Debug, Clone)]
pub struct ProcessedResult {
    /// The uploaded image after resizing.
    pub original: ImageHandle,
    /// The background-removed image.
    pub processed: Option<ImageHandle>,
    /// The spirit reading, or its placeholder.
    pub spirit_reading: Option<String>,
    pub stats: RitualStats,
}

impl ProcessedResult {
    /// A serialisable summary without the image payloads.
    pub fn report(&self, phase: RitualPhase) -> RitualReport {
        RitualReport {
            phase,
            original_media_type: self.original.media_type().to_string(),
            processed_media_type: self.processed.as_ref().map(|p| p.media_type().to_string()),
            spirit_reading: self.spirit_reading.clone(),
            output_path: None,
            stats: self.stats.clone(),
        }
    }
}

/// Default destination for a processed image: `<stem>.severed.<ext>` next
/// to the input.
pub fn default_output_path(input: &Path, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    input.with_file_name(format!("{stem}.severed.{extension}"))
}

/// Write `image` to `path`.
///
/// Uses atomic write (temp file + rename) so a crash never leaves half an
/// image behind.
pub async fn write_image(image: &ImageHandle, path: &Path) -> Result<u64, RitualError> {
    let write_err = |source: std::io::Error| RitualError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, image.bytes()).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    info!("Wrote {} bytes to {}", image.len(), path.display());
    Ok(image.len() as u64)
}

/// JSON-friendly summary of a ritual.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RitualReport {
    pub phase: RitualPhase,
    pub original_media_type: String,
    pub processed_media_type: Option<String>,
    pub spirit_reading: Option<String>,
    /// Where the processed image was written, if anywhere.
    pub output_path: Option<String>,
    pub stats: RitualStats,
}
