//! Image encoding for the vision model: payload → base64 `ImageData`.
//!
//! The bytes are sent exactly as uploaded (after resizing), tagged with the
//! declared media type. No re-encode happens here; the resizer already
//! bounded the payload.

use crate::pipeline::input::UploadCandidate;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// Wrap a candidate as inline base64 image data for the VLM request body.
pub fn encode_for_vision(candidate: &UploadCandidate) -> ImageData {
    let b64 = STANDARD.encode(candidate.bytes());
    debug!("Encoded {} → {} bytes base64", candidate.name(), b64.len());

    ImageData::new(b64, candidate.media_type())
}
