//! Upload candidates: the raw payload, its declared media type, and its size.
//!
//! The declared type is what the uploader claims, not what the bytes are.
//! When reading from disk we derive it from the file extension, the same way
//! a browser fills in `File.type`, so a text file named `.txt` is declared
//! `text/plain` and rejected by the validator without ever being decoded.

use crate::error::RitualError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Declared type when the extension is unknown.
const UNKNOWN_MEDIA_TYPE: &str = "application/octet-stream";

/// A file offered to the ritual. Read-only; cloning shares the payload.
#[derive(Debug, Clone)]
pub struct UploadCandidate {
    name: String,
    media_type: String,
    bytes: Arc<[u8]>,
}

impl UploadCandidate {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a local file, declaring its media type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, RitualError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| read_error(path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let media_type = declared_media_type(path);

        debug!("Read {} ({}, {} bytes)", path.display(), media_type, bytes.len());
        Ok(Self::new(name, media_type, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The shared payload handle.
    pub fn payload(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Guess the declared media type from a path's extension.
pub fn declared_media_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(UNKNOWN_MEDIA_TYPE)
        .to_string()
}

fn read_error(path: &Path, e: std::io::Error) -> RitualError {
    let path = PathBuf::from(path);
    match e.kind() {
        std::io::ErrorKind::NotFound => RitualError::FileNotFound { path },
        std::io::ErrorKind::PermissionDenied => RitualError::PermissionDenied { path },
        _ => RitualError::ReadFailed { path, source: e },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn declared_type_follows_extension() {
        assert_eq!(declared_media_type(Path::new("cat.png")), "image/png");
        assert_eq!(declared_media_type(Path::new("cat.JPG")), "image/jpeg");
        assert_eq!(declared_media_type(Path::new("notes.txt")), "text/plain");
        assert_eq!(declared_media_type(Path::new("mystery")), UNKNOWN_MEDIA_TYPE);
    }

    #[test]
    fn clone_shares_payload() {
        let c = UploadCandidate::new("a.png", "image/png", vec![1u8, 2, 3]);
        let d = c.clone();
        assert!(Arc::ptr_eq(c.payload(), d.payload()));
        assert_eq!(d.size(), 3);
    }

    #[tokio::test]
    async fn from_path_reads_file() {
        let mut tmp = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        tmp.write_all(b"not really a png").unwrap();

        let c = UploadCandidate::from_path(tmp.path()).await.unwrap();
        assert_eq!(c.media_type(), "image/png");
        assert_eq!(c.bytes(), b"not really a png");
        assert!(c.name().ends_with(".png"));
    }

    #[tokio::test]
    async fn from_path_missing_file() {
        let err = UploadCandidate::from_path("/definitely/not/here.png")
            .await
            .unwrap_err();
        assert!(matches!(err, RitualError::FileNotFound { .. }));
    }
}
