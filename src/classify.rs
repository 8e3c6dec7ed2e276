//! Classification transport: provider abstraction + concrete chat-completion providers.
//!
//! A transport takes the finished prompt and returns the raw model text; turning
//! that text into a verdict is the response parser's job.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audit::ApiProvider;
use crate::config::Settings;
use crate::error::TransportError;
use crate::prompt::SYSTEM_PROMPT;

pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const GROK_ENDPOINT: &str = "https://api.x.ai/v1/chat/completions";

const MAX_TOKENS: u32 = 150;
const TEMPERATURE: f64 = 0.3;

/// One classification request as seen by a transport.
#[derive(Debug, Clone)]
pub struct ClassifyRequest<'a> {
    pub provider: ApiProvider,
    pub model: &'a str,
    pub api_key: &'a str,
    pub prompt: &'a str,
}

pub type ClassifyFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, TransportError>> + Send + 'a>>;

/// Sends a prompt to a model and returns its raw text.
pub trait Classifier: Send + Sync {
    fn classify<'a>(&'a self, req: ClassifyRequest<'a>) -> ClassifyFuture<'a>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynClassifier = Arc<dyn Classifier>;

/// Factory: `AI_TEST_MODE=mock` gives a deterministic mock; otherwise the HTTP transport.
pub fn build_classifier() -> DynClassifier {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(MockClassifier::fixed(
            r#"{"shouldShow": true, "score": 7, "reason": "Neutral (mock)"}"#,
        ));
    }
    Arc::new(HttpClassifier::new())
}

/// Chat Completions over HTTPS; OpenAI and Grok share the wire format.
pub struct HttpClassifier {
    http: reqwest::Client,
    openai_url: String,
    grok_url: String,
}

impl Default for HttpClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClassifier {
    pub fn new() -> Self {
        Self::with_endpoints(OPENAI_ENDPOINT, GROK_ENDPOINT)
    }

    /// Override endpoints (local proxies, tests).
    pub fn with_endpoints(openai_url: impl Into<String>, grok_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("positivity-gate/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            openai_url: openai_url.into(),
            grok_url: grok_url.into(),
        }
    }

    fn endpoint(&self, provider: ApiProvider) -> &str {
        match provider {
            ApiProvider::OpenAi => &self.openai_url,
            ApiProvider::Grok => &self.grok_url,
        }
    }
}

fn display_name(provider: ApiProvider) -> &'static str {
    match provider {
        ApiProvider::OpenAi => "OpenAI",
        ApiProvider::Grok => "Grok",
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatReq<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Deserialize)]
struct ChatResp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: String,
}

impl Classifier for HttpClassifier {
    fn classify<'a>(&'a self, req: ClassifyRequest<'a>) -> ClassifyFuture<'a> {
        Box::pin(async move {
            let provider = display_name(req.provider);
            let body = ChatReq {
                model: req.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: SYSTEM_PROMPT,
                    },
                    Msg {
                        role: "user",
                        content: req.prompt,
                    },
                ],
                max_tokens: MAX_TOKENS,
                temperature: TEMPERATURE,
            };

            let resp = self
                .http
                .post(self.endpoint(req.provider))
                .bearer_auth(req.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|source| TransportError::Http { provider, source })?;

            let status = resp.status();
            if !status.is_success() {
                return Err(TransportError::Status {
                    provider,
                    status: status.as_u16(),
                });
            }

            let parsed: ChatResp = resp
                .json()
                .await
                .map_err(|source| TransportError::Http { provider, source })?;
            parsed
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or(TransportError::EmptyResponse { provider })
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Test/local transport returning canned output and counting calls.
#[derive(Debug)]
pub struct MockClassifier {
    reply: Result<String, String>,
    delay: Option<Duration>,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockClassifier {
    pub fn fixed(reply: impl Into<String>) -> Self {
        Self {
            reply: Ok(reply.into()),
            delay: None,
            calls: Default::default(),
        }
    }

    pub fn failing(error: impl Into<String>) -> Self {
        Self {
            reply: Err(error.into()),
            delay: None,
            calls: Default::default(),
        }
    }

    /// Hold every call for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Classifier for MockClassifier {
    fn classify<'a>(&'a self, _req: ClassifyRequest<'a>) -> ClassifyFuture<'a> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Box::pin(async move {
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            self.reply.clone().map_err(TransportError::Other)
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Convenience for callers holding settings.
pub fn request_for<'a>(settings: &'a Settings, model: &'a str, prompt: &'a str) -> ClassifyRequest<'a> {
    ClassifyRequest {
        provider: settings.api_provider,
        model,
        api_key: &settings.api_key,
        prompt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req<'a>(prompt: &'a str) -> ClassifyRequest<'a> {
        ClassifyRequest {
            provider: ApiProvider::OpenAi,
            model: "gpt-4o-mini",
            api_key: "k",
            prompt,
        }
    }

    #[tokio::test]
    async fn mock_returns_reply_and_counts() {
        let m = MockClassifier::fixed("hello");
        assert_eq!(m.classify(req("p")).await.unwrap(), "hello");
        assert_eq!(m.classify(req("p")).await.unwrap(), "hello");
        assert_eq!(m.calls(), 2);
    }

    #[tokio::test]
    async fn failing_mock_is_a_transport_error() {
        let m = MockClassifier::failing("Grok API error: 503");
        let err = m.classify(req("p")).await.unwrap_err();
        assert_eq!(err.to_string(), "Grok API error: 503");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_http_error() {
        let c = HttpClassifier::with_endpoints("http://127.0.0.1:9/v1", "http://127.0.0.1:9/v1");
        let err = c.classify(req("p")).await.unwrap_err();
        assert!(matches!(err, TransportError::Http { provider: "OpenAI", .. }));
    }

    #[test]
    fn status_error_message_names_provider() {
        let e = TransportError::Status {
            provider: display_name(ApiProvider::OpenAi),
            status: 401,
        };
        assert_eq!(e.to_string(), "OpenAI API error: 401");
    }

    #[serial_test::serial]
    #[test]
    fn factory_honours_mock_mode() {
        std::env::set_var("AI_TEST_MODE", "mock");
        assert_eq!(build_classifier().name(), "mock");
        std::env::remove_var("AI_TEST_MODE");
        assert_eq!(build_classifier().name(), "http");
    }
}
