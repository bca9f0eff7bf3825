//! Configuration types for the ritual pipeline.
//!
//! Every knob lives in [`RitualConfig`], built via its
//! [`RitualConfigBuilder`]. The only part a user flips at runtime is the
//! [`ServiceConfig`] (mock toggle and backend URL); the controller owns a copy
//! of it and reads it afresh on every ritual.

use crate::error::RitualError;
use crate::progress::ObserverHandle;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default background-removal endpoint (the Flask backend's `/sever` route).
pub const DEFAULT_ENDPOINT: &str = "http://localhost:5000/sever";

/// Upload ceiling: 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Which background-removal backend to call, and where.
///
/// The URL is not validated here; it is parsed only when a real call is made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Bypass the network and echo the input back after a delay.
    pub use_mock: bool,
    /// Multipart upload target for the real backend.
    pub endpoint_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            use_mock: false,
            endpoint_url: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

/// Configuration for the ritual controller and its pipeline stages.
///
/// # Example
/// ```rust
/// use phantom_crop::RitualConfig;
///
/// let config = RitualConfig::builder()
///     .use_mock(true)
///     .max_dimensions(1024, 1024)
///     .build()
///     .unwrap();
/// assert!(config.service.use_mock);
/// ```
#[derive(Clone)]
pub struct RitualConfig {
    /// Backend selection. Mutable at runtime through the controller.
    pub service: ServiceConfig,

    /// Largest accepted upload in bytes. Default: 10 MiB.
    pub max_upload_bytes: u64,

    /// Resize bound, width. Default: 800.
    pub max_width: u32,

    /// Resize bound, height. Default: 800.
    pub max_height: u32,

    /// JPEG quality for re-encoded images, 1–100. Default: 90.
    pub jpeg_quality: u8,

    /// Artificial latency of the mock backend. Default: 3000 ms.
    pub mock_delay_ms: u64,

    /// Time spent in `Failed` after a validation rejection. Default: 2000 ms.
    pub validation_cooldown_ms: u64,

    /// Time spent in `Failed` after a pipeline failure. Default: 3000 ms.
    pub failure_cooldown_ms: u64,

    /// Caption provider name understood by `ProviderFactory`. Default: "gemini".
    pub spirit_provider: String,

    /// Caption model. Default: "gemini-2.5-flash".
    pub spirit_model: String,

    /// Environment variable holding the caption API key, read at call time.
    /// If None, derived from `spirit_provider` (see
    /// [`crate::pipeline::spirit::default_key_var`]).
    pub api_key_var: Option<String>,

    /// Pre-constructed caption provider. Skips the credential check.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Custom caption prompt. If None, uses [`crate::prompts::SPIRIT_PROMPT`].
    pub spirit_prompt: Option<String>,

    /// Output token cap for the caption. Default: 256.
    pub spirit_max_tokens: usize,

    /// Sampling temperature for the caption. Default: 0.9.
    pub spirit_temperature: f32,

    /// Start with cues suppressed. Default: false.
    pub muted: bool,

    /// Receives phase changes, cues and alerts.
    pub observer: Option<ObserverHandle>,
}

impl Default for RitualConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_width: 800,
            max_height: 800,
            jpeg_quality: 90,
            mock_delay_ms: 3000,
            validation_cooldown_ms: 2000,
            failure_cooldown_ms: 3000,
            spirit_provider: "gemini".to_string(),
            spirit_model: "gemini-2.5-flash".to_string(),
            api_key_var: None,
            provider: None,
            spirit_prompt: None,
            spirit_max_tokens: 256,
            spirit_temperature: 0.9,
            muted: false,
            observer: None,
        }
    }
}

impl fmt::Debug for RitualConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RitualConfig")
            .field("service", &self.service)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("max_width", &self.max_width)
            .field("max_height", &self.max_height)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("mock_delay_ms", &self.mock_delay_ms)
            .field("validation_cooldown_ms", &self.validation_cooldown_ms)
            .field("failure_cooldown_ms", &self.failure_cooldown_ms)
            .field("spirit_provider", &self.spirit_provider)
            .field("spirit_model", &self.spirit_model)
            .field("api_key_var", &self.api_key_var)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("muted", &self.muted)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn RitualObserver>"))
            .finish()
    }
}

impl RitualConfig {
    /// Create a new builder for `RitualConfig`.
    pub fn builder() -> RitualConfigBuilder {
        RitualConfigBuilder {
            config: Self::default(),
        }
    }

    /// Upload ceiling expressed in whole megabytes, for messages.
    pub fn max_upload_mb(&self) -> u64 {
        self.max_upload_bytes / (1024 * 1024)
    }
}

/// Builder for [`RitualConfig`].
#[derive(Debug)]
pub struct RitualConfigBuilder {
    config: RitualConfig,
}

impl RitualConfigBuilder {
    pub fn service(mut self, service: ServiceConfig) -> Self {
        self.config.service = service;
        self
    }

    pub fn use_mock(mut self, v: bool) -> Self {
        self.config.service.use_mock = v;
        self
    }

    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.config.service.endpoint_url = url.into();
        self
    }

    pub fn max_upload_bytes(mut self, n: u64) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.config.max_width = width;
        self.config.max_height = height;
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q;
        self
    }

    pub fn mock_delay_ms(mut self, ms: u64) -> Self {
        self.config.mock_delay_ms = ms;
        self
    }

    pub fn validation_cooldown_ms(mut self, ms: u64) -> Self {
        self.config.validation_cooldown_ms = ms;
        self
    }

    pub fn failure_cooldown_ms(mut self, ms: u64) -> Self {
        self.config.failure_cooldown_ms = ms;
        self
    }

    pub fn spirit_provider(mut self, name: impl Into<String>) -> Self {
        self.config.spirit_provider = name.into();
        self
    }

    pub fn spirit_model(mut self, model: impl Into<String>) -> Self {
        self.config.spirit_model = model.into();
        self
    }

    /// Override the environment variable the caption key is read from.
    pub fn api_key_var(mut self, var: impl Into<String>) -> Self {
        self.config.api_key_var = Some(var.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn spirit_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.spirit_prompt = Some(prompt.into());
        self
    }

    pub fn spirit_max_tokens(mut self, n: usize) -> Self {
        self.config.spirit_max_tokens = n;
        self
    }

    pub fn spirit_temperature(mut self, t: f32) -> Self {
        self.config.spirit_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn muted(mut self, v: bool) -> Self {
        self.config.muted = v;
        self
    }

    pub fn observer(mut self, observer: ObserverHandle) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RitualConfig, RitualError> {
        let c = &self.config;
        if c.max_width == 0 || c.max_height == 0 {
            return Err(RitualError::InvalidConfig(format!(
                "Resize bound must be at least 1×1, got {}×{}",
                c.max_width, c.max_height
            )));
        }
        if !(1..=100).contains(&c.jpeg_quality) {
            return Err(RitualError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if c.max_upload_bytes == 0 {
            return Err(RitualError::InvalidConfig(
                "Upload ceiling must be ≥ 1 byte".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_ritual_constants() {
        let c = RitualConfig::default();
        assert!(!c.service.use_mock);
        assert_eq!(c.service.endpoint_url, DEFAULT_ENDPOINT);
        assert_eq!(c.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(c.max_upload_mb(), 10);
        assert_eq!((c.max_width, c.max_height), (800, 800));
        assert_eq!(c.jpeg_quality, 90);
        assert_eq!(c.mock_delay_ms, 3000);
        assert_eq!(c.validation_cooldown_ms, 2000);
        assert_eq!(c.failure_cooldown_ms, 3000);
        assert_eq!(c.spirit_model, "gemini-2.5-flash");
        assert_eq!(c.api_key_var, None);
    }

    #[test]
    fn builder_rejects_zero_bound() {
        let err = RitualConfig::builder()
            .max_dimensions(0, 800)
            .build()
            .unwrap_err();
        assert!(matches!(err, RitualError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_quality_out_of_range() {
        assert!(RitualConfig::builder().jpeg_quality(0).build().is_err());
        assert!(RitualConfig::builder().jpeg_quality(101).build().is_err());
        assert!(RitualConfig::builder().jpeg_quality(100).build().is_ok());
    }

    #[test]
    fn builder_does_not_validate_endpoint() {
        let c = RitualConfig::builder()
            .endpoint_url("not a url")
            .build()
            .expect("endpoint is only checked when used");
        assert_eq!(c.service.endpoint_url, "not a url");
    }

    #[test]
    fn service_config_roundtrips_json() {
        let s = ServiceConfig {
            use_mock: true,
            endpoint_url: "http://127.0.0.1:9/sever".into(),
        };
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"use_mock\":true"));
        let back: ServiceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn debug_hides_trait_objects() {
        let c = RitualConfig::builder()
            .observer(Arc::new(crate::progress::NoopObserver))
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("<dyn RitualObserver>"));
    }
}
