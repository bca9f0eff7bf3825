//! Pipeline stages for one ritual.
//!
//! Each submodule implements one step; the controller in
//! [`crate::ritual`] strings them together and owns the state.
//!
//! ## Data Flow
//!
//! ```text
//!                                   ┌──▶ sever  ──▶ cut-out image
//! input ──▶ validate ──▶ resize ────┤    (HTTP / mock)
//! (bytes)   (type, size)  (≤800²)   └──▶ encode ──▶ spirit ──▶ reading
//!                                        (base64)   (VLM)
//! ```
//!
//! 1. [`input`]: the upload as bytes plus its declared media type
//! 2. [`validate`]: reject non-images and anything over the size ceiling
//! 3. [`resize`]: shrink to fit the bounds; runs in `spawn_blocking`
//!    because decoding and resampling are CPU-bound
//! 4. [`sever`]: background removal, the only stage whose failure ends
//!    the ritual
//! 5. [`encode`]: base64-wrap the resized image for the vision request
//! 6. [`spirit`]: the caption; every failure collapses to placeholder text

pub mod encode;
pub mod input;
pub mod resize;
pub mod sever;
pub mod spirit;
pub mod validate;
