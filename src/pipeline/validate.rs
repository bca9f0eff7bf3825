//! Upload validation: reject non-images and oversized files up front.
//!
//! Rules are checked in order and the first failure wins, so a 50 MB text
//! file is reported as "not an image" rather than "too large".

use crate::error::ValidationError;
use crate::pipeline::input::UploadCandidate;

/// Check a candidate against the declared-type and size rules.
///
/// Pure predicate: looks only at the declared media type and byte size,
/// never at the payload itself.
pub fn validate(candidate: &UploadCandidate, max_bytes: u64) -> Result<(), ValidationError> {
    if !candidate.media_type().starts_with("image/") {
        return Err(ValidationError::NotAnImage {
            media_type: candidate.media_type().to_string(),
        });
    }

    if candidate.size() > max_bytes {
        return Err(ValidationError::TooLarge {
            size: candidate.size(),
            max_mb: max_bytes / (1024 * 1024),
        });
    }

    Ok(())
}
