//! Spirit reading: a short caption of the image from a vision model.
//!
//! The reading is cosmetic. Every failure path, including a missing API key,
//! ends in fixed placeholder text, so the controller can join this call with
//! the background removal without the join ever failing on its account.
//!
//! The API key is looked up when the call is made, not at startup: exporting
//! the key into a running session is enough to turn readings on. Which
//! variable holds it follows the provider unless overridden; local providers
//! such as `ollama` need none and are never short-circuited.

use crate::config::RitualConfig;
use crate::error::CaptionError;
use crate::pipeline::encode::encode_for_vision;
use crate::pipeline::input::UploadCandidate;
use crate::prompts::{MYSTERIOUS_PRESENCE, SILENT_SPIRITS, SPIRIT_PROMPT, WEAK_CONNECTION};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use tracing::{debug, warn};

/// A source of spirit readings.
///
/// Errors are returned, not swallowed, so alternative sources can be tested
/// on their own; [`reading_or_placeholder`] turns them into display text.
pub trait Seer: Send + Sync {
    fn divine<'a>(&'a self, image: &'a UploadCandidate) -> BoxFuture<'a, Result<String, CaptionError>>;
}

/// Vision-model reader backed by `edgequake-llm`.
#[derive(Clone)]
pub struct SpiritReader {
    provider: Option<Arc<dyn LLMProvider>>,
    provider_name: String,
    model: String,
    api_key_var: Option<String>,
    prompt: String,
    max_tokens: usize,
    temperature: f32,
}

impl SpiritReader {
    pub fn from_config(config: &RitualConfig) -> Self {
        Self {
            provider: config.provider.clone(),
            provider_name: config.spirit_provider.clone(),
            model: config.spirit_model.clone(),
            api_key_var: config.api_key_var.clone(),
            prompt: config
                .spirit_prompt
                .clone()
                .unwrap_or_else(|| SPIRIT_PROMPT.to_string()),
            max_tokens: config.spirit_max_tokens,
            temperature: config.spirit_temperature,
        }
    }

    /// Read the spirit of `image`. Never fails; see the module docs.
    pub async fn read_spirit(&self, image: &UploadCandidate) -> String {
        reading_or_placeholder(self.divine(image).await)
    }

    /// The variable the API key is read from, or None when the provider
    /// needs no key.
    pub fn credential_var(&self) -> Option<String> {
        self.api_key_var
            .clone()
            .or_else(|| default_key_var(&self.provider_name))
    }

    /// Use the injected provider, or build one if the API key is present.
    fn resolve_provider(&self) -> Result<Arc<dyn LLMProvider>, CaptionError> {
        if let Some(ref provider) = self.provider {
            return Ok(Arc::clone(provider));
        }

        if let Some(var) = self.credential_var() {
            let key = std::env::var(&var).unwrap_or_default();
            if key.trim().is_empty() {
                return Err(CaptionError::MissingCredential { var });
            }
        }

        ProviderFactory::create_llm_provider(&self.provider_name, &self.model).map_err(|e| {
            CaptionError::ProviderUnavailable {
                provider: self.provider_name.clone(),
                detail: format!("{e}"),
            }
        })
    }

    async fn ask(&self, image: &UploadCandidate) -> Result<String, CaptionError> {
        let provider = self.resolve_provider()?;

        let messages = vec![ChatMessage::user_with_images(
            self.prompt.as_str(),
            vec![encode_for_vision(image)],
        )];
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| CaptionError::RequestFailed(format!("{e}")))?;
        debug!(
            "Spirit reading: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );

        Ok(response.content)
    }
}

impl Seer for SpiritReader {
    fn divine<'a>(&'a self, image: &'a UploadCandidate) -> BoxFuture<'a, Result<String, CaptionError>> {
        self.ask(image).boxed()
    }
}

/// Conventional API-key variable for a provider name.
///
/// Local providers return None. Unknown providers fall back to
/// `<NAME>_API_KEY`.
pub fn default_key_var(provider: &str) -> Option<String> {
    let name = provider.trim().to_ascii_lowercase();
    let var = match name.as_str() {
        "ollama" | "lmstudio" | "mock" => return None,
        "gemini" | "google" => "GEMINI_API_KEY",
        "openai" => "OPENAI_API_KEY",
        "anthropic" => "ANTHROPIC_API_KEY",
        "azure" => "AZURE_OPENAI_API_KEY",
        "mistral" => "MISTRAL_API_KEY",
        "xai" => "XAI_API_KEY",
        "openrouter" => "OPENROUTER_API_KEY",
        other => return Some(format!("{}_API_KEY", other.to_ascii_uppercase().replace('-', "_"))),
    };
    Some(var.to_string())
}

/// Map a reading attempt onto the text shown to the user.
///
/// Success is returned verbatim; an empty answer, a missing key and any
/// other failure each have their own fixed line.
pub fn reading_or_placeholder(result: Result<String, CaptionError>) -> String {
    match result {
        Ok(text) if text.trim().is_empty() => MYSTERIOUS_PRESENCE.to_string(),
        Ok(text) => text,
        Err(CaptionError::MissingCredential { var }) => {
            debug!("No spirit reading: {} is not set", var);
            SILENT_SPIRITS.to_string()
        }
        Err(e) => {
            warn!("Spirit reading failed: {}", e);
            WEAK_CONNECTION.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> UploadCandidate {
        UploadCandidate::new("ghost.png", "image/png", vec![0u8; 8])
    }

    #[test]
    fn placeholder_mapping() {
        assert_eq!(reading_or_placeholder(Ok("A pale glow.".into())), "A pale glow.");
        assert_eq!(reading_or_placeholder(Ok("  ".into())), MYSTERIOUS_PRESENCE);
        assert_eq!(
            reading_or_placeholder(Err(CaptionError::MissingCredential { var: "K".into() })),
            SILENT_SPIRITS
        );
        assert_eq!(
            reading_or_placeholder(Err(CaptionError::RequestFailed("quota".into()))),
            WEAK_CONNECTION
        );
    }

    #[test]
    fn reading_is_verbatim() {
        let text = "  The aura flickers, green as absinthe.\n";
        assert_eq!(reading_or_placeholder(Ok(text.into())), text);
    }

    #[tokio::test]
    async fn missing_key_short_circuits() {
        let config = RitualConfig::builder()
            .api_key_var("PHANTOM_CROP_TEST_KEY_THAT_IS_NEVER_SET")
            .build()
            .unwrap();
        let reader = SpiritReader::from_config(&config);

        let err = reader.divine(&image()).await.unwrap_err();
        assert!(matches!(err, CaptionError::MissingCredential { .. }));
        assert_eq!(reader.read_spirit(&image()).await, SILENT_SPIRITS);
    }

    #[test]
    fn key_var_follows_provider() {
        assert_eq!(default_key_var("gemini").as_deref(), Some("GEMINI_API_KEY"));
        assert_eq!(default_key_var("OpenAI").as_deref(), Some("OPENAI_API_KEY"));
        assert_eq!(default_key_var("anthropic").as_deref(), Some("ANTHROPIC_API_KEY"));
        assert_eq!(default_key_var("deep-seek").as_deref(), Some("DEEP_SEEK_API_KEY"));
        assert_eq!(default_key_var("ollama"), None);
    }

    #[test]
    fn explicit_key_var_wins_over_provider() {
        let config = RitualConfig::builder()
            .spirit_provider("openai")
            .api_key_var("MY_VISION_KEY")
            .build()
            .unwrap();
        let reader = SpiritReader::from_config(&config);
        assert_eq!(reader.credential_var().as_deref(), Some("MY_VISION_KEY"));
    }

    #[tokio::test]
    async fn non_gemini_provider_checks_its_own_key() {
        let config = RitualConfig::builder().spirit_provider("openai").build().unwrap();
        let reader = SpiritReader::from_config(&config);
        assert_eq!(reader.credential_var().as_deref(), Some("OPENAI_API_KEY"));

        if std::env::var("OPENAI_API_KEY").is_err() {
            match reader.divine(&image()).await {
                Err(CaptionError::MissingCredential { var }) => assert_eq!(var, "OPENAI_API_KEY"),
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
    }

    #[test]
    fn keyless_provider_is_not_short_circuited() {
        let config = RitualConfig::builder()
            .spirit_provider("ollama")
            .spirit_model("llava")
            .build()
            .unwrap();
        let reader = SpiritReader::from_config(&config);
        assert_eq!(reader.credential_var(), None);
        assert!(!matches!(
            reader.resolve_provider(),
            Err(CaptionError::MissingCredential { .. })
        ));
    }

    #[test]
    fn custom_prompt_overrides_default() {
        let config = RitualConfig::builder()
            .spirit_prompt("Describe the ghost.")
            .build()
            .unwrap();
        let reader = SpiritReader::from_config(&config);
        assert_eq!(reader.prompt, "Describe the ghost.");
        assert_eq!(SpiritReader::from_config(&RitualConfig::default()).prompt, SPIRIT_PROMPT);
    }
}
