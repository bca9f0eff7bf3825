//! Background removal: hand the image to a backend and take back the cut-out.
//!
//! Two strategies sit behind the [`Severer`] trait:
//!
//! * [`MockSeverer`] waits a fixed delay and echoes the input, so the whole
//!   ritual can be demonstrated without the backend running.
//! * [`HttpSeverer`] POSTs one multipart `file` field to the configured URL.
//!
//! [`severer_for`] picks one from the current [`ServiceConfig`] every time a
//! ritual starts, so flipping the mock toggle takes effect on the next upload.
//!
//! There is exactly one attempt per ritual. No timeout is added on top of the
//! HTTP client's defaults and nothing is retried: a failed cut ends the
//! ritual and the user simply drops the image again.

use crate::config::ServiceConfig;
use crate::error::RitualError;
use crate::pipeline::input::UploadCandidate;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Media type assumed when the backend does not name an image type.
const DEFAULT_OUTPUT_TYPE: &str = "image/png";

/// Output of a background-removal call.
#[derive(Debug, Clone)]
pub struct SeveredImage {
    pub media_type: String,
    pub bytes: Arc<[u8]>,
}

/// A background-removal strategy.
pub trait Severer: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    /// Remove the background from `candidate`.
    fn sever<'a>(&'a self, candidate: &'a UploadCandidate) -> BoxFuture<'a, Result<SeveredImage, RitualError>>;
}

/// Pass-through stand-in for the backend.
#[derive(Debug, Clone)]
pub struct MockSeverer {
    delay: Duration,
}

impl MockSeverer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Severer for MockSeverer {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn sever<'a>(&'a self, candidate: &'a UploadCandidate) -> BoxFuture<'a, Result<SeveredImage, RitualError>> {
        async move {
            debug!("Mock severing {} after {:?}", candidate.name(), self.delay);
            tokio::time::sleep(self.delay).await;
            Ok(SeveredImage {
                media_type: candidate.media_type().to_string(),
                bytes: Arc::clone(candidate.payload()),
            })
        }
        .boxed()
    }
}

/// Multipart client for the real backend.
#[derive(Debug, Clone)]
pub struct HttpSeverer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSeverer {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    async fn post(&self, candidate: &UploadCandidate) -> Result<SeveredImage, RitualError> {
        let url = parse_endpoint(&self.endpoint)?;
        info!("Sending {} ({} bytes) to {}", candidate.name(), candidate.size(), url);

        let part = Part::bytes(candidate.bytes().to_vec())
            .file_name(candidate.name().to_string())
            .mime_str(candidate.media_type())
            .map_err(|e| RitualError::Internal(format!("Invalid part media type: {}", e)))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| unreachable_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Backend answered {} for {}", status, candidate.name());
            return Err(RitualError::BackendRejected {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let media_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or_default().trim().to_string())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or_else(|| DEFAULT_OUTPUT_TYPE.to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| unreachable_error(&url, e))?;
        debug!("Backend returned {} bytes of {}", bytes.len(), media_type);

        Ok(SeveredImage {
            media_type,
            bytes: Arc::from(bytes.as_ref()),
        })
    }
}

impl Severer for HttpSeverer {
    fn name(&self) -> &'static str {
        "http"
    }

    fn sever<'a>(&'a self, candidate: &'a UploadCandidate) -> BoxFuture<'a, Result<SeveredImage, RitualError>> {
        self.post(candidate).boxed()
    }
}

/// Select the strategy for the current service configuration.
pub fn severer_for(service: &ServiceConfig, client: &reqwest::Client, mock_delay: Duration) -> Box<dyn Severer> {
    if service.use_mock {
        Box::new(MockSeverer::new(mock_delay))
    } else {
        Box::new(HttpSeverer::new(client.clone(), service.endpoint_url.clone()))
    }
}

/// Body of the backend's `/health` route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendHealth {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

/// Ask the backend serving `endpoint` whether it is alive.
///
/// The health route lives at the root of the endpoint's origin, so
/// `http://host:5000/sever` is probed at `http://host:5000/health`.
pub async fn probe_backend(client: &reqwest::Client, endpoint: &str) -> Result<BackendHealth, RitualError> {
    let url = parse_endpoint(endpoint)?
        .join("/health")
        .map_err(|e| RitualError::InvalidEndpoint {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;
    debug!("Probing {}", url);

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| unreachable_error(&url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RitualError::BackendRejected {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
        });
    }

    response
        .json::<BackendHealth>()
        .await
        .map_err(|e| RitualError::BackendUnreachable {
            url: url.to_string(),
            reason: format!("unexpected health payload: {}", e),
        })
}

fn parse_endpoint(endpoint: &str) -> Result<Url, RitualError> {
    Url::parse(endpoint).map_err(|e| RitualError::InvalidEndpoint {
        url: endpoint.to_string(),
        reason: e.to_string(),
    })
}

fn unreachable_error(url: &Url, e: reqwest::Error) -> RitualError {
    RitualError::BackendUnreachable {
        url: url.to_string(),
        reason: e.to_string(),
    }
}
