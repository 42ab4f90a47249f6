pub mod gemini;
pub mod traits;

pub use gemini::GeminiProvider;
pub use traits::{GenerationParams, Provider, ReplyRequest, ReplyTone};

use crate::config::Config;
use crate::error::{ConfigError, GenerationError};
use crate::util::{truncate_chars, truncate_with_ellipsis};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest slice of the incoming message embedded into a prompt.
pub const MAX_PROMPT_INPUT_CHARS: usize = 300;

pub const BUSY_REPLY: &str = "Şu an biraz yoğunum, birazdan yazarım 🙏";
pub const MALFORMED_REPLY: &str = "Bir şeyler ters gitti 😅";
pub const EMPTY_REPLY: &str = "Ne diyeceğimi bilemedim 🤔";

const NEUTRAL_PREAMBLE: &str = "Sen, Türkçe konuşan samimi ve esprili bir asistansın. \
Mesajlara arkadaşça, doğal ve kısa cevap ver; en fazla 1-2 cümle yaz.";

const ROMANTIC_PREAMBLE: &str = "Sen, genç bir erkeğin çok aşık sevgilisiymiş gibi yazan, \
Türkçe konuşan bir asistansın. Mesajların samimi, bol aşk ve sevgi dolu, arada esprili; \
en fazla 1-2 cümle yaz.";

/// Compose the single prompt sent for one reply.
pub fn build_prompt(text: &str, tone: ReplyTone) -> String {
    let preamble = match tone {
        ReplyTone::Neutral => NEUTRAL_PREAMBLE,
        ReplyTone::Romantic => ROMANTIC_PREAMBLE,
    };
    let text = truncate_chars(text.trim(), MAX_PROMPT_INPUT_CHARS);
    format!("{preamble}\n\nMesaj: \"{text}\"\n\nSadece cevabı yaz, açıklama ekleme.")
}

/// User-visible text substituted for a failed generation.
pub fn fallback_for(err: &GenerationError) -> &'static str {
    match err {
        GenerationError::Timeout
        | GenerationError::Transport(_)
        | GenerationError::Status { .. } => BUSY_REPLY,
        GenerationError::Malformed(_) => MALFORMED_REPLY,
        GenerationError::Empty => EMPTY_REPLY,
    }
}

/// Wraps a [`Provider`] so that every request produces some reply text.
///
/// Exactly one provider call per request, bounded by `timeout`. Failures are
/// logged and mapped through [`fallback_for`].
#[derive(Clone)]
pub struct ReplyClient {
    provider: Arc<dyn Provider>,
    params: GenerationParams,
    timeout: Duration,
}

impl ReplyClient {
    pub fn new(provider: Arc<dyn Provider>, params: GenerationParams, timeout: Duration) -> Self {
        Self {
            provider,
            params,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let provider = create_provider(config)?;
        Ok(Self::new(
            provider,
            GenerationParams::from_config(&config.ai),
            Duration::from_millis(config.ai.timeout_ms),
        ))
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn warmup(&self) {
        if let Err(e) = self.provider.warmup().await {
            tracing::warn!(provider = self.provider.name(), "warmup failed: {e}");
        }
    }

    pub async fn generate(&self, request: &ReplyRequest) -> String {
        match self.try_generate(request).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(provider = self.provider.name(), "AI reply failed: {e}");
                fallback_for(&e).to_string()
            }
        }
    }

    async fn try_generate(&self, request: &ReplyRequest) -> Result<String, GenerationError> {
        let prompt = build_prompt(&request.text, request.tone);
        let started_at = Instant::now();

        let text = tokio::time::timeout(
            self.timeout,
            self.provider.generate(&prompt, &self.params),
        )
        .await
        .map_err(|_| GenerationError::Timeout)??;

        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationError::Empty);
        }

        tracing::debug!(
            elapsed_ms = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            reply = %truncate_with_ellipsis(text, 80),
            "AI reply generated"
        );
        Ok(text.to_string())
    }
}

/// Build the configured generation backend.
pub fn create_provider(config: &Config) -> Result<Arc<dyn Provider>, ConfigError> {
    let api_key = config.api_key()?;
    Ok(Arc::new(GeminiProvider::new(
        api_key,
        &config.ai.api_url,
        &config.ai.model,
        Duration::from_millis(config.ai.timeout_ms),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    enum Behavior {
        Reply(&'static str),
        Fail(fn() -> GenerationError),
        Hang,
    }

    struct MockProvider {
        behavior: Behavior,
        prompts: Mutex<Vec<String>>,
    }

    impl MockProvider {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn generate(
            &self,
            prompt: &str,
            _params: &GenerationParams,
        ) -> Result<String, GenerationError> {
            self.prompts.lock().push(prompt.to_string());
            match &self.behavior {
                Behavior::Reply(text) => Ok((*text).to_string()),
                Behavior::Fail(make) => Err(make()),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok("too late".into())
                }
            }
        }
    }

    fn client(provider: Arc<MockProvider>, timeout: Duration) -> ReplyClient {
        ReplyClient::new(provider, GenerationParams::default(), timeout)
    }

    #[test]
    fn prompt_embeds_text_and_tone() {
        let neutral = build_prompt("nasılsın", ReplyTone::Neutral);
        assert!(neutral.starts_with(NEUTRAL_PREAMBLE));
        assert!(neutral.contains("Mesaj: \"nasılsın\""));

        let romantic = build_prompt("nasılsın", ReplyTone::Romantic);
        assert!(romantic.starts_with(ROMANTIC_PREAMBLE));
        assert!(romantic.contains("1-2 cümle"));
    }

    #[test]
    fn prompt_truncates_long_input() {
        let long = "ş".repeat(1000);
        let prompt = build_prompt(&long, ReplyTone::Neutral);
        let embedded = "ş".repeat(MAX_PROMPT_INPUT_CHARS);
        assert!(prompt.contains(&format!("\"{embedded}\"")));
        assert!(!prompt.contains(&"ş".repeat(MAX_PROMPT_INPUT_CHARS + 1)));
    }

    #[test]
    fn fallback_mapping() {
        assert_eq!(fallback_for(&GenerationError::Timeout), BUSY_REPLY);
        assert_eq!(
            fallback_for(&GenerationError::Status {
                status: 500,
                body: String::new()
            }),
            BUSY_REPLY
        );
        assert_eq!(
            fallback_for(&GenerationError::Malformed("x".into())),
            MALFORMED_REPLY
        );
        assert_eq!(fallback_for(&GenerationError::Empty), EMPTY_REPLY);
    }

    #[tokio::test]
    async fn generate_returns_trimmed_text() {
        let provider = MockProvider::new(Behavior::Reply("  iyiyim, sen?  "));
        let reply = client(provider.clone(), Duration::from_secs(1))
            .generate(&ReplyRequest::new("nasılsın", ReplyTone::Romantic))
            .await;
        assert_eq!(reply, "iyiyim, sen?");
        let prompts = provider.prompts.lock();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with(ROMANTIC_PREAMBLE));
    }

    #[tokio::test]
    async fn whitespace_only_reply_uses_empty_fallback() {
        let provider = MockProvider::new(Behavior::Reply(" \n "));
        let reply = client(provider, Duration::from_secs(1))
            .generate(&ReplyRequest::new("selam", ReplyTone::Neutral))
            .await;
        assert_eq!(reply, EMPTY_REPLY);
    }

    #[tokio::test]
    async fn provider_errors_map_to_fallbacks() {
        let cases: [(fn() -> GenerationError, &str); 3] = [
            (
                || GenerationError::Status {
                    status: 503,
                    body: "overloaded".into(),
                },
                BUSY_REPLY,
            ),
            (|| GenerationError::Malformed("eof".into()), MALFORMED_REPLY),
            (|| GenerationError::Empty, EMPTY_REPLY),
        ];
        for (make, expected) in cases {
            let provider = MockProvider::new(Behavior::Fail(make));
            let reply = client(provider.clone(), Duration::from_secs(1))
                .generate(&ReplyRequest::new("selam", ReplyTone::Neutral))
                .await;
            assert_eq!(reply, expected);
            assert_eq!(provider.prompts.lock().len(), 1, "no retry expected");
        }
    }

    #[tokio::test]
    async fn timeout_returns_busy_within_bound() {
        let provider = MockProvider::new(Behavior::Hang);
        let started = Instant::now();
        let reply = client(provider.clone(), Duration::from_millis(50))
            .generate(&ReplyRequest::new("selam", ReplyTone::Neutral))
            .await;
        assert_eq!(reply, BUSY_REPLY);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(provider.prompts.lock().len(), 1);
    }

    #[test]
    fn create_provider_requires_api_key() {
        let config = Config::default();
        assert!(matches!(
            create_provider(&config),
            Err(ConfigError::MissingApiKey)
        ));

        let mut config = Config::default();
        config.ai.api_key = Some("k".into());
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "gemini");
    }
}
