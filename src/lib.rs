//! # phantom-crop
//!
//! Drop an image in, get it back with the background cut away and a short
//! "spirit reading" of what the picture contains.
//!
//! ## Why this crate?
//!
//! Background removal lives in a separate HTTP service (a `rembg` wrapper),
//! and captioning in a hosted vision model. Both are slow and either can be
//! missing. This crate owns everything around them: it checks the upload,
//! shrinks it before anything is sent over the wire, runs both calls at once
//! and keeps a small state machine honest while they run. A mock mode stands
//! in for the backend so the whole flow works on a laptop with nothing else
//! installed.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image
//!  │
//!  ├─ 1. Input     bytes + declared media type (file or memory)
//!  ├─ 2. Validate  image/* only, ≤ 10 MiB
//!  ├─ 3. Resize    fit within 800×800, aspect preserved (spawn_blocking)
//!  ├─ 4. Sever ┐   multipart POST to the backend, or mock echo after 3 s
//!  │  Spirit   ┘   vision caption, concurrently; failures become placeholders
//!  └─ 5. Output    ProcessedResult with both images, reading and timings
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use phantom_crop::{RitualConfig, RitualController, UploadCandidate};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reading needs GEMINI_API_KEY; without it a placeholder is shown.
//!     let config = RitualConfig::builder().use_mock(true).build()?;
//!     let mut ritual = RitualController::new(config)?;
//!
//!     let upload = UploadCandidate::from_path("portrait.jpg").await?;
//!     let result = ritual.submit(upload).await?;
//!     println!("{}", result.spirit_reading.as_deref().unwrap_or_default());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `phantom-crop` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod ritual;

#[cfg(test)]
mod testing;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{RitualConfig, RitualConfigBuilder, ServiceConfig};
pub use error::{CaptionError, ResizeError, RitualError, ValidationError};
pub use output::{default_output_path, write_image, ImageHandle, ProcessedResult, RitualReport, RitualStats};
pub use pipeline::input::UploadCandidate;
pub use pipeline::sever::{probe_backend, BackendHealth, Severer};
pub use pipeline::spirit::{Seer, SpiritReader};
pub use progress::{Cue, NoopObserver, ObserverHandle, RitualObserver};
pub use ritual::{RitualController, RitualPhase};
