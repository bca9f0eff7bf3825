//! Error types for the phantom-crop library.
//!
//! Two distinct error families reflect two distinct failure modes:
//!
//! * [`RitualError`] is **fatal to the ritual**: the upload was rejected, the
//!   image could not be resized, or the background-removal backend failed.
//!   The controller moves to `Failed` and recovers to `Idle` on its own.
//!
//! * [`CaptionError`] is **cosmetic**: the spirit reading could not be
//!   produced. It is converted into placeholder text before the concurrent
//!   join and never reaches the state machine.

use crate::ritual::RitualPhase;
use std::path::PathBuf;
use thiserror::Error;

/// All errors that end a ritual or reject a request to the controller.
#[derive(Debug, Error)]
pub enum RitualError {
    // ── Upload errors ─────────────────────────────────────────────────────
    /// The candidate failed validation; the reason is shown to the user.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Reading the file failed for another reason.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// Decoding or re-encoding the image failed.
    #[error(transparent)]
    Resize(#[from] ResizeError),

    /// The backend answered with a non-success status.
    #[error("The spirits refused: {status} {reason}")]
    BackendRejected { status: u16, reason: String },

    /// No response was received from the backend.
    #[error("Connection to the other side failed ({url}): {reason}")]
    BackendUnreachable { url: String, reason: String },

    /// The configured endpoint is not a well-formed URL.
    #[error("Invalid backend endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    // ── Controller errors ─────────────────────────────────────────────────
    /// The requested event is not allowed in the current phase.
    #[error("Cannot {event} while the ritual is {from}")]
    InvalidTransition { from: RitualPhase, event: &'static str },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the processed image file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RitualError {
    /// Whether this error came from validating the upload (user-correctable).
    pub fn is_validation(&self) -> bool {
        matches!(self, RitualError::Validation(_))
    }
}

/// Why an upload candidate was rejected before any processing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The declared media type is not an image kind.
    #[error("File must be an image")]
    NotAnImage { media_type: String },

    /// The payload exceeds the upload ceiling.
    #[error("File too large (max {max_mb}MB)")]
    TooLarge { size: u64, max_mb: u64 },
}

/// Local failures of the resizer; both end the current ritual.
#[derive(Debug, Clone, Error)]
pub enum ResizeError {
    #[error("failed to load image: {detail}")]
    LoadFailed { detail: String },

    #[error("failed to produce output: {detail}")]
    EncodeFailed { detail: String },
}

/// Failure of the spirit reading. Swallowed into placeholder text.
#[derive(Debug, Clone, Error)]
pub enum CaptionError {
    /// The API key variable is unset or empty; no call was attempted.
    #[error("missing API key (set {var})")]
    MissingCredential { var: String },

    /// The provider could not be constructed.
    #[error("caption provider '{provider}' unavailable: {detail}")]
    ProviderUnavailable { provider: String, detail: String },

    /// The request itself failed (network, quota, malformed response).
    #[error("caption request failed: {0}")]
    RequestFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_large_display() {
        let e = ValidationError::TooLarge {
            size: 11 * 1024 * 1024,
            max_mb: 10,
        };
        assert_eq!(e.to_string(), "File too large (max 10MB)");
    }

    #[test]
    fn validation_is_transparent() {
        let e: RitualError = ValidationError::NotAnImage {
            media_type: "text/plain".into(),
        }
        .into();
        assert!(e.is_validation());
        assert_eq!(e.to_string(), "File must be an image");
    }

    #[test]
    fn backend_rejected_display() {
        let e = RitualError::BackendRejected {
            status: 500,
            reason: "Internal Server Error".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("500"), "got: {msg}");
        assert!(msg.contains("Internal Server Error"), "got: {msg}");
        assert!(!e.is_validation());
    }

    #[test]
    fn resize_errors_name_the_step() {
        let load = ResizeError::LoadFailed {
            detail: "bad header".into(),
        };
        let encode = ResizeError::EncodeFailed {
            detail: "unsupported".into(),
        };
        assert!(load.to_string().starts_with("failed to load image"));
        assert!(encode.to_string().starts_with("failed to produce output"));
    }

    #[test]
    fn invalid_transition_display() {
        let e = RitualError::InvalidTransition {
            from: RitualPhase::Severing,
            event: "reset",
        };
        assert_eq!(e.to_string(), "Cannot reset while the ritual is severing");
    }
}
