//! Observer trait for ritual events: phase changes, cues, and alerts.
//!
//! Inject an [`Arc<dyn RitualObserver>`] via
//! [`crate::config::RitualConfigBuilder::observer`] to receive events as the
//! controller moves through its phases. A front-end uses this to swap views,
//! play its success/failure sounds, and raise a blocking alert when an upload
//! is rejected.
//!
//! The trait is `Send + Sync` because the Failed → Idle recovery fires from a
//! timer task, not from the caller's task.
//!
//! # Example
//!
//! ```rust
//! use phantom_crop::{Cue, RitualConfig, RitualObserver};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FailureCounter(AtomicUsize);
//!
//! impl RitualObserver for FailureCounter {
//!     fn on_cue(&self, cue: Cue) {
//!         if cue == Cue::Failure {
//!             self.0.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let config = RitualConfig::builder()
//!     .observer(Arc::new(FailureCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::ritual::RitualPhase;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Audible feedback requested by the controller.
///
/// Cues are suppressed while the controller is muted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cue {
    /// The ritual completed.
    Success,
    /// Validation or the pipeline failed.
    Failure,
}

/// Called by the controller as the ritual progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait RitualObserver: Send + Sync {
    /// Called after every phase transition, including the automatic
    /// Failed → Idle recovery.
    fn on_phase_change(&self, from: RitualPhase, to: RitualPhase) {
        let _ = (from, to);
    }

    /// Called when a cue should be played. Never called while muted.
    fn on_cue(&self, cue: Cue) {
        let _ = cue;
    }

    /// Called with a user-facing message when an upload is rejected.
    fn on_alert(&self, message: &str) {
        let _ = message;
    }
}

/// A no-op implementation for callers that don't need events.
pub struct NoopObserver;

impl RitualObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::RitualConfig`].
pub type ObserverHandle = Arc<dyn RitualObserver>;
