//! The ritual controller: one upload-to-result cycle as a state machine.
//!
//! ```text
//!            valid upload                 resize + sever ok
//!   Idle ───────────────────▶ Severing ─────────────────────▶ Complete
//!    ▲  ╲                        │                               │
//!    │   ╲ invalid upload        │ resize or sever failed        │ reset
//!    │    ▼                      ▼                               │
//!    │   Failed ◀────────────────┘                               │
//!    │     │  ▲                                                  │
//!    │     │  └─ (valid upload from Failed goes to Severing)     │
//!    └─────┴─ after cooldown (2 s invalid / 3 s pipeline) ◀──────┘
//! ```
//!
//! The controller owns the phase, the runtime [`ServiceConfig`], the mute
//! flag and the current [`ProcessedResult`]. Nothing else mutates them; the
//! only way in is through the transition methods below.
//!
//! ## Concurrency
//!
//! After the resizer finishes, background removal and the spirit reading
//! run concurrently on the caller's task via `tokio::join!`. The reading's
//! failure is mapped to placeholder text inside its own future, so the join
//! only ever fails through background removal.
//!
//! The Failed → Idle recovery is a spawned timer. Each ritual bumps an epoch
//! counter and a timer only fires if the epoch it was armed with is still
//! current, so a stale timer cannot pull a newer ritual back to Idle.
//!
//! Dropping a `submit` future mid-ritual (a timeout, a `select!` on ctrl-c)
//! counts as a pipeline failure: the ritual moves to `Failed` and recovers
//! after the pipeline cooldown, like any other failed ritual.

use crate::config::{RitualConfig, ServiceConfig};
use crate::error::RitualError;
use crate::output::{ImageHandle, ProcessedResult, RitualStats};
use crate::pipeline::input::UploadCandidate;
use crate::pipeline::resize::{resize, ResizeBounds};
use crate::pipeline::sever::severer_for;
use crate::pipeline::spirit::{reading_or_placeholder, Seer, SpiritReader};
use crate::pipeline::validate::validate;
use crate::progress::{Cue, NoopObserver, ObserverHandle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

/// Where the single ritual currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RitualPhase {
    /// Waiting for an upload.
    Idle,
    /// Resizing, removing the background and reading the spirit.
    Severing,
    /// A result is available until reset.
    Complete,
    /// The last upload was rejected or the pipeline failed; recovers on its own.
    Failed,
}

impl RitualPhase {
    /// Whether the transition `self → to` is allowed.
    pub fn can_enter(self, to: RitualPhase) -> bool {
        use RitualPhase::*;
        matches!(
            (self, to),
            (Idle, Severing)
                | (Failed, Severing)
                | (Idle, Failed)
                | (Failed, Failed)
                | (Severing, Complete)
                | (Severing, Failed)
                | (Complete, Idle)
                | (Failed, Idle)
        )
    }

    /// Whether a new upload is accepted in this phase.
    pub fn accepts_upload(self) -> bool {
        matches!(self, RitualPhase::Idle | RitualPhase::Failed)
    }
}

impl fmt::Display for RitualPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RitualPhase::Idle => "idle",
            RitualPhase::Severing => "severing",
            RitualPhase::Complete => "complete",
            RitualPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Owns the ritual's state and drives the pipeline.
pub struct RitualController {
    config: RitualConfig,
    service: ServiceConfig,
    muted: bool,
    phase: Arc<watch::Sender<RitualPhase>>,
    epoch: Arc<AtomicU64>,
    result: Option<ProcessedResult>,
    client: reqwest::Client,
    seer: Arc<dyn Seer>,
    observer: ObserverHandle,
}

impl fmt::Debug for RitualController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RitualController")
            .field("phase", &self.phase())
            .field("service", &self.service)
            .field("muted", &self.muted)
            .field("has_result", &self.result.is_some())
            .finish()
    }
}

impl RitualController {
    /// Create a controller that reads spirits with the configured vision model.
    pub fn new(config: RitualConfig) -> Result<Self, RitualError> {
        let seer = Arc::new(SpiritReader::from_config(&config));
        Self::with_seer(config, seer)
    }

    /// Create a controller with a custom spirit-reading source.
    pub fn with_seer(config: RitualConfig, seer: Arc<dyn Seer>) -> Result<Self, RitualError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RitualError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        let (phase, _) = watch::channel(RitualPhase::Idle);
        let observer = config
            .observer
            .clone()
            .unwrap_or_else(|| Arc::new(NoopObserver));

        Ok(Self {
            service: config.service.clone(),
            muted: config.muted,
            phase: Arc::new(phase),
            epoch: Arc::new(AtomicU64::new(0)),
            result: None,
            client,
            seer,
            observer,
            config,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn phase(&self) -> RitualPhase {
        *self.phase.borrow()
    }

    /// Receive every phase change, including automatic recoveries.
    pub fn subscribe(&self) -> watch::Receiver<RitualPhase> {
        self.phase.subscribe()
    }

    /// Phase changes as a `Stream`, starting with the current phase.
    pub fn phase_stream(&self) -> WatchStream<RitualPhase> {
        WatchStream::new(self.phase.subscribe())
    }

    /// The result of the completed ritual, if any.
    pub fn result(&self) -> Option<&ProcessedResult> {
        self.result.as_ref()
    }

    pub fn service(&self) -> &ServiceConfig {
        &self.service
    }

    pub fn config(&self) -> &RitualConfig {
        &self.config
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    // ── User toggles (never change the phase) ────────────────────────────

    /// Flip mock mode; returns the new value. Applies from the next upload.
    pub fn toggle_mock(&mut self) -> bool {
        self.service.use_mock = !self.service.use_mock;
        info!("Mock mode {}", if self.service.use_mock { "on" } else { "off" });
        self.service.use_mock
    }

    /// Flip the mute flag; returns the new value.
    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        debug!("Cues {}", if self.muted { "muted" } else { "unmuted" });
        self.muted
    }

    pub fn set_endpoint(&mut self, url: impl Into<String>) {
        self.service.endpoint_url = url.into();
        info!("Backend endpoint set to {}", self.service.endpoint_url);
    }

    pub fn set_service(&mut self, service: ServiceConfig) {
        self.service = service;
    }

    // ── Transitions ──────────────────────────────────────────────────────

    /// Run one ritual on `candidate`.
    ///
    /// Accepted only in `Idle` or `Failed`; otherwise the upload is ignored
    /// and `InvalidTransition` is returned without touching any state.
    /// On failure the controller is left in `Failed` and returns to `Idle`
    /// by itself after the configured cooldown.
    pub async fn submit(&mut self, candidate: UploadCandidate) -> Result<&ProcessedResult, RitualError> {
        let from = self.phase();
        if !from.accepts_upload() {
            debug!("Ignoring upload of {} while {}", candidate.name(), from);
            return Err(RitualError::InvalidTransition {
                from,
                event: "accept an upload",
            });
        }

        self.release_result();
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Ritual {} begins: {} ({}, {} bytes)",
            epoch,
            candidate.name(),
            candidate.media_type(),
            candidate.size()
        );

        if let Err(reason) = validate(&candidate, self.config.max_upload_bytes) {
            warn!("Rejected {}: {}", candidate.name(), reason);
            self.observer.on_alert(&reason.to_string());
            self.fail(epoch, Duration::from_millis(self.config.validation_cooldown_ms));
            return Err(reason.into());
        }

        self.transition(RitualPhase::Severing);
        let guard = SeveringGuard {
            phase: Arc::clone(&self.phase),
            epochs: Arc::clone(&self.epoch),
            observer: Arc::clone(&self.observer),
            epoch,
            cooldown: Duration::from_millis(self.config.failure_cooldown_ms),
            muted: self.muted,
            armed: true,
        };

        let outcome = self.perform(candidate).await;
        guard.disarm();

        match outcome {
            Ok(result) => {
                self.result = Some(result);
                self.transition(RitualPhase::Complete);
                self.cue(Cue::Success);
                self.result
                    .as_ref()
                    .ok_or_else(|| RitualError::Internal("result vanished after completion".into()))
            }
            Err(e) => {
                warn!("Ritual {} failed: {}", epoch, e);
                self.fail(epoch, Duration::from_millis(self.config.failure_cooldown_ms));
                Err(e)
            }
        }
    }

    /// Leave `Complete`, releasing the result's image buffers.
    pub fn reset(&mut self) -> Result<(), RitualError> {
        let from = self.phase();
        if from != RitualPhase::Complete {
            return Err(RitualError::InvalidTransition { from, event: "reset" });
        }
        self.release_result();
        self.transition(RitualPhase::Idle);
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────────────

    /// Resize, then sever and read the spirit concurrently.
    async fn perform(&self, candidate: UploadCandidate) -> Result<ProcessedResult, RitualError> {
        let total_start = Instant::now();
        let original_bytes = candidate.size();

        let bounds = ResizeBounds {
            max_width: self.config.max_width,
            max_height: self.config.max_height,
            quality: self.config.jpeg_quality,
        };
        let resize_start = Instant::now();
        let resized = resize(candidate, bounds).await?;
        let resize_duration_ms = resize_start.elapsed().as_millis() as u64;

        let severer = severer_for(
            &self.service,
            &self.client,
            Duration::from_millis(self.config.mock_delay_ms),
        );
        let image = &resized.candidate;
        debug!("Severing {} via {}", image.name(), severer.name());

        let sever = async {
            let start = Instant::now();
            let out = severer.sever(image).await;
            (out, start.elapsed())
        };
        let read = async {
            let start = Instant::now();
            let text = reading_or_placeholder(self.seer.divine(image).await);
            (text, start.elapsed())
        };
        let ((severed, sever_elapsed), (reading, spirit_elapsed)) = tokio::join!(sever, read);
        let severed = severed?;

        let stats = RitualStats {
            original_bytes,
            processed_bytes: severed.bytes.len() as u64,
            original_dimensions: resized.original_dimensions,
            dimensions: resized.dimensions,
            resized: resized.was_resized(),
            resize_duration_ms,
            sever_duration_ms: sever_elapsed.as_millis() as u64,
            spirit_duration_ms: spirit_elapsed.as_millis() as u64,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };
        info!(
            "Ritual complete: {} → {} bytes in {}ms",
            stats.original_bytes, stats.processed_bytes, stats.total_duration_ms
        );

        Ok(ProcessedResult {
            original: ImageHandle::new(image.media_type(), Arc::clone(image.payload())),
            processed: Some(ImageHandle::new(severed.media_type, severed.bytes)),
            spirit_reading: Some(reading),
            stats,
        })
    }

    fn transition(&self, to: RitualPhase) {
        let from = self.phase.send_replace(to);
        debug_assert!(from.can_enter(to), "illegal transition {from} → {to}");
        info!("Ritual phase: {} → {}", from, to);
        self.observer.on_phase_change(from, to);
    }

    /// Enter `Failed` and arm the recovery timer for this ritual's epoch.
    fn fail(&mut self, epoch: u64, cooldown: Duration) {
        self.release_result();
        self.transition(RitualPhase::Failed);
        self.cue(Cue::Failure);

        arm_recovery(
            Arc::clone(&self.phase),
            Arc::clone(&self.epoch),
            Arc::clone(&self.observer),
            epoch,
            cooldown,
        );
    }

    fn release_result(&mut self) {
        if let Some(old) = self.result.take() {
            debug!(
                "Releasing result buffers ({} + {} bytes)",
                old.original.len(),
                old.processed.as_ref().map_or(0, |p| p.len())
            );
        }
    }

    fn cue(&self, cue: Cue) {
        if !self.muted {
            self.observer.on_cue(cue);
        }
    }
}

/// Return to `Idle` after `cooldown`, unless a newer ritual has started or
/// the phase has already moved on.
fn arm_recovery(
    phase: Arc<watch::Sender<RitualPhase>>,
    epochs: Arc<AtomicU64>,
    observer: ObserverHandle,
    epoch: u64,
    cooldown: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(cooldown).await;
        let recovered = phase.send_if_modified(|p| {
            if *p == RitualPhase::Failed && epochs.load(Ordering::SeqCst) == epoch {
                *p = RitualPhase::Idle;
                true
            } else {
                false
            }
        });
        if recovered {
            info!("Ritual phase: {} → {}", RitualPhase::Failed, RitualPhase::Idle);
            observer.on_phase_change(RitualPhase::Failed, RitualPhase::Idle);
        }
    });
}

/// Fails a ritual whose `submit` future is dropped while severing.
///
/// Disarmed once the pipeline settles; otherwise its drop moves the phase to
/// `Failed` and arms the usual recovery timer for that ritual's epoch.
struct SeveringGuard {
    phase: Arc<watch::Sender<RitualPhase>>,
    epochs: Arc<AtomicU64>,
    observer: ObserverHandle,
    epoch: u64,
    cooldown: Duration,
    muted: bool,
    armed: bool,
}

impl SeveringGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SeveringGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let (epochs, epoch) = (&self.epochs, self.epoch);
        let abandoned = self.phase.send_if_modified(|p| {
            if *p == RitualPhase::Severing && epochs.load(Ordering::SeqCst) == epoch {
                *p = RitualPhase::Failed;
                true
            } else {
                false
            }
        });
        if !abandoned {
            return;
        }

        warn!("Ritual {} abandoned while severing", epoch);
        self.observer.on_phase_change(RitualPhase::Severing, RitualPhase::Failed);
        if !self.muted {
            self.observer.on_cue(Cue::Failure);
        }

        // Outside a runtime there is no timer; Failed still accepts uploads.
        if tokio::runtime::Handle::try_current().is_ok() {
            arm_recovery(
                Arc::clone(&self.phase),
                Arc::clone(&self.epochs),
                Arc::clone(&self.observer),
                epoch,
                self.cooldown,
            );
        }
    }
}
