//! Translation service: the backend seam and the retry policy.
//!
//! The translator talks to a [`TranslationBackend`]. Production code uses
//! [`LlmBackend`], which wraps any `edgequake_llm` provider; tests plug in a
//! scripted backend.
//!
//! ## Retry Strategy
//!
//! Every call is bounded by `apiTimeoutSecs`. A failed or timed-out attempt
//! is retried after `retryBackoffMs * 2^attempt`, up to `maxRetries`
//! attempts in total. With the defaults (1000 ms, 3 attempts) the waits are
//! 2 s and 4 s.

use crate::config::Settings;
use crate::error::{PageError, StageError};
use crate::pipeline::postprocess::clean_translation;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// A failed call to the translation service.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

/// Something that can translate one page of text.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    /// Value recorded as `metadata.method`, e.g. `anthropic-api`.
    fn method(&self) -> String;

    /// Value recorded as `metadata.model`.
    fn model(&self) -> &str;

    /// Send `text` with the given system prompt; return the raw reply.
    async fn translate(&self, system_prompt: &str, text: &str) -> Result<String, BackendError>;
}

/// [`TranslationBackend`] over an `edgequake_llm` chat provider.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    provider_name: String,
    model: String,
    options: CompletionOptions,
}

impl LlmBackend {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        provider_name: impl Into<String>,
        model: impl Into<String>,
        settings: &Settings,
    ) -> Self {
        Self {
            provider,
            provider_name: provider_name.into(),
            model: model.into(),
            options: build_options(settings),
        }
    }

    /// Instantiate the provider named by `translationProvider` with
    /// `translationModel`. Credentials are read from the environment by the
    /// provider factory (e.g. `ANTHROPIC_API_KEY`).
    pub fn from_settings(settings: &Settings) -> Result<Self, StageError> {
        let name = settings.translation_provider.as_str();
        let model = settings.translation_model.as_str();
        let provider = ProviderFactory::create_llm_provider(name, model).map_err(|e| {
            StageError::ProviderNotConfigured {
                provider: name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, name, model, settings))
    }
}

#[async_trait]
impl TranslationBackend for LlmBackend {
    fn method(&self) -> String {
        format!("{}-api", self.provider_name)
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn translate(&self, system_prompt: &str, text: &str) -> Result<String, BackendError> {
        let messages = vec![ChatMessage::system(system_prompt), ChatMessage::user(text)];
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| BackendError(e.to_string()))?;
        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

fn build_options(settings: &Settings) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(settings.temperature),
        max_tokens: Some(settings.max_tokens),
        ..Default::default()
    }
}

/// A successful translation and the attempt that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub text: String,
    pub attempts: u32,
}

/// Delay before the attempt following `attempt` (1-based).
pub fn backoff_delay(retry_backoff_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(retry_backoff_ms.saturating_mul(1u64 << attempt.min(16)))
}

/// Translate one page, retrying per the settings.
///
/// An empty reply counts as a failed attempt. When every attempt fails the
/// last error is returned as [`PageError::TranslationFailed`].
pub async fn translate_with_retry(
    backend: &dyn TranslationBackend,
    page_num: u32,
    system_prompt: &str,
    text: &str,
    settings: &Settings,
) -> Result<Translation, PageError> {
    let start = Instant::now();
    let call_timeout = Duration::from_secs(settings.api_timeout_secs);
    let max_attempts = settings.max_retries.max(1);
    let mut last_err = String::new();

    for attempt in 1..=max_attempts {
        let outcome = match timeout(call_timeout, backend.translate(system_prompt, text)).await {
            Ok(Ok(raw)) => {
                let cleaned = clean_translation(&raw);
                if cleaned.is_empty() {
                    Err("empty response".to_string())
                } else {
                    Ok(cleaned)
                }
            }
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {}s", settings.api_timeout_secs)),
        };

        match outcome {
            Ok(text) => {
                debug!(
                    "Page {}: translated on attempt {} in {:?}",
                    page_num,
                    attempt,
                    start.elapsed()
                );
                return Ok(Translation {
                    text,
                    attempts: attempt,
                });
            }
            Err(e) => {
                warn!(
                    "Page {}: attempt {}/{} failed: {}",
                    page_num, attempt, max_attempts, e
                );
                last_err = e;
            }
        }

        if attempt < max_attempts {
            let delay = backoff_delay(settings.retry_backoff_ms, attempt);
            debug!("Page {}: waiting {:?} before retry", page_num, delay);
            sleep(delay).await;
        }
    }

    Err(PageError::TranslationFailed {
        page: page_num,
        attempts: max_attempts,
        detail: last_err,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls, then echoes the input.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        reply: Option<&'static str>,
    }

    #[async_trait]
    impl TranslationBackend for Flaky {
        fn method(&self) -> String {
            "fake-api".into()
        }
        fn model(&self) -> &str {
            "fake-model"
        }
        async fn translate(&self, _system: &str, text: &str) -> Result<String, BackendError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                return Err(BackendError(format!("503 on call {n}")));
            }
            Ok(self.reply.map(String::from).unwrap_or_else(|| format!("訳: {text}")))
        }
    }

    /// Never answers within the timeout.
    struct Hanging;

    #[async_trait]
    impl TranslationBackend for Hanging {
        fn method(&self) -> String {
            "fake-api".into()
        }
        fn model(&self) -> &str {
            "fake-model"
        }
        async fn translate(&self, _system: &str, _text: &str) -> Result<String, BackendError> {
            sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    fn fast_settings() -> Settings {
        Settings {
            retry_backoff_ms: 1,
            api_timeout_secs: 1,
            ..Settings::default()
        }
    }

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff_delay(1000, 1), Duration::from_millis(2000));
        assert_eq!(backoff_delay(1000, 2), Duration::from_millis(4000));
        assert_eq!(backoff_delay(0, 5), Duration::ZERO);
    }

    #[test]
    fn options_follow_settings() {
        let opts = build_options(&Settings::default());
        assert_eq!(opts.temperature, Some(0.2));
        assert_eq!(opts.max_tokens, Some(16000));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let backend = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
            reply: None,
        };
        let t = translate_with_retry(&backend, 4, "sys", "Hello", &fast_settings())
            .await
            .unwrap();
        assert_eq!(t.attempts, 3);
        assert_eq!(t.text, "訳: Hello");
    }

    #[tokio::test]
    async fn exhausts_attempts() {
        let backend = Flaky {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
            reply: None,
        };
        let err = translate_with_retry(&backend, 7, "sys", "Hello", &fast_settings())
            .await
            .unwrap_err();
        assert_eq!(err.page(), 7);
        assert!(matches!(err, PageError::TranslationFailed { attempts: 3, .. }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_reply_is_retried() {
        let backend = Flaky {
            failures: 0,
            calls: AtomicU32::new(0),
            reply: Some("```\n\n```"),
        };
        let err = translate_with_retry(&backend, 1, "sys", "Hello", &fast_settings())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty response"));
    }

    #[tokio::test]
    async fn timeout_counts_as_failure() {
        let settings = Settings {
            max_retries: 1,
            ..fast_settings()
        };
        let err = translate_with_retry(&Hanging, 2, "sys", "Hello", &settings)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
