//! Marketing copy generation against an OpenRouter-compatible chat API.
//!
//! [`GenerationClient`] rotates through a fixed list of models, retries
//! rate limits, timeouts, transport errors and undecodable answers up to a
//! bound, and repairs model output before decoding it. A call that runs out
//! of attempts yields `None` so the batch can carry on with fallback copy.

mod repair;

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use enricher_shared::{EnricherError, GeneratedCopy, GenerationConfig, Result};

pub use repair::decode_copy;

/// User-Agent string for generation requests.
const USER_AGENT: &str = concat!("CatalogEnricher/", env!("CARGO_PKG_VERSION"));

/// Prompt used by [`GenerationClient::check_model`].
const PING_PROMPT: &str = "Say only: OK";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Why a single attempt failed. Each kind has its own wait before retrying.
#[derive(Debug)]
enum AttemptError {
    /// HTTP 429.
    RateLimited,
    /// The request exceeded the client timeout.
    Timeout(String),
    /// Connection failure or a non-429 error status.
    Transport(String),
    /// The response arrived but could not be turned into copy.
    Decode(String),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => f.write_str("rate limited"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Decode(msg) => write!(f, "undecodable response: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// GenerationClient
// ---------------------------------------------------------------------------

/// Chat-completions client with round-robin model rotation.
///
/// The rotation cursor lives on the instance and persists across calls, so
/// one client should be built per run and reused for every product.
pub struct GenerationClient {
    config: GenerationConfig,
    client: Client,
    api_key: String,
    /// Index of the next model to hand out.
    cursor: usize,
}

impl GenerationClient {
    /// Build a client. `config.models` must not be empty.
    pub fn new(config: GenerationConfig, api_key: impl Into<String>) -> Result<Self> {
        if config.models.is_empty() {
            return Err(EnricherError::config("model rotation list is empty"));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EnricherError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            api_key: api_key.into(),
            cursor: 0,
        })
    }

    /// Models in rotation order.
    pub fn models(&self) -> &[String] {
        &self.config.models
    }

    /// Index of the model the next attempt will use.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Take the model at the cursor and advance it, wrapping at the end.
    fn rotate(&mut self) -> String {
        let model = self.config.models[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.config.models.len();
        model
    }

    /// Generate marketing copy for `prompt`.
    ///
    /// Returns `None` once every attempt has failed; this never errors.
    #[instrument(skip_all)]
    pub async fn generate(&mut self, prompt: &str) -> Option<GeneratedCopy> {
        let max_attempts = self.config.max_attempts;
        let mut model = self.rotate();

        for attempt in 1..=max_attempts {
            info!(model = short_model_name(&model), attempt, "requesting copy");

            let failure = match self.complete(&model, prompt, self.config.max_tokens).await {
                Ok(content) => match decode_copy(&content) {
                    Ok(copy) => return Some(copy),
                    Err(e) => {
                        debug!(raw = %preview(&content), "model output did not decode");
                        AttemptError::Decode(e.to_string())
                    }
                },
                Err(e) => e,
            };

            let retrying = attempt < max_attempts;
            warn!(model = %model, attempt, max_attempts, error = %failure, retrying, "generation attempt failed");

            if !retrying {
                break;
            }

            match failure {
                AttemptError::RateLimited => {
                    let wait = rate_limit_wait(self.config.rate_limit_backoff, attempt);
                    info!(wait_secs = wait.as_secs(), "rate limited, backing off before switching model");
                    pause(wait).await;
                    model = self.rotate();
                }
                AttemptError::Timeout(_) => pause(self.config.timeout_delay).await,
                AttemptError::Transport(_) => pause(self.config.error_delay).await,
                AttemptError::Decode(_) => pause(self.config.decode_delay).await,
            }
        }

        warn!(max_attempts, "generation gave up");
        None
    }

    /// Send a one-line prompt to `model` and return its reply.
    ///
    /// Single attempt, no rotation; used to verify credentials and model ids.
    pub async fn check_model(&self, model: &str) -> Result<String> {
        self.complete(model, PING_PROMPT, 10).await.map_err(|e| match e {
            AttemptError::Decode(msg) => EnricherError::Generation(msg),
            other => EnricherError::Network(other.to_string()),
        })
    }

    /// One chat-completions request; returns the first choice's text.
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> std::result::Result<String, AttemptError> {
        let request = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
            max_tokens,
        };

        let response = self
            .client
            .post(self.config.endpoint.clone())
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.title)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Transport(format!("HTTP {status}: {}", preview(&body))));
        }

        let body = response.text().await.map_err(classify_transport)?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| AttemptError::Decode(format!("invalid response envelope: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AttemptError::Decode(format!("no choices in response: {}", preview(&body))))
    }
}

fn classify_transport(err: reqwest::Error) -> AttemptError {
    if err.is_timeout() {
        AttemptError::Timeout(err.to_string())
    } else {
        AttemptError::Transport(err.to_string())
    }
}

/// Backoff after the `attempt`-th (1-based) rate-limited request: `base × attempt`.
fn rate_limit_wait(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt)
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

/// Last path segment of a model id, capped at 30 characters, for log lines.
pub fn short_model_name(model: &str) -> &str {
    let name = model.rsplit('/').next().unwrap_or(model);
    match name.char_indices().nth(30) {
        Some((idx, _)) => &name[..idx],
        None => name,
    }
}

/// First 200 characters of a payload, for diagnostics.
fn preview(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const COPY_JSON: &str =
        r#"{"summary": "Short", "full_description": "Long", "advantages": "Durable"}"#;

    fn test_config(server: &MockServer, models: &[&str]) -> GenerationConfig {
        GenerationConfig {
            endpoint: url::Url::parse(&format!("{}/chat/completions", server.uri())).unwrap(),
            models: models.iter().map(|m| m.to_string()).collect(),
            referer: "https://example.com".into(),
            title: "Enricher Tests".into(),
            temperature: 0.7,
            max_tokens: 2000,
            request_timeout: Duration::from_secs(5),
            max_attempts: 3,
            rate_limit_backoff: Duration::ZERO,
            timeout_delay: Duration::ZERO,
            error_delay: Duration::ZERO,
            decode_delay: Duration::ZERO,
        }
    }

    fn completion(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "gen-1",
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        }))
    }

    async fn requested_models(server: &MockServer) -> Vec<String> {
        server
            .received_requests()
            .await
            .expect("request recording enabled")
            .iter()
            .map(|req| {
                let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
                body["model"].as_str().unwrap().to_string()
            })
            .collect()
    }

    #[test]
    fn short_model_name_trims_vendor_and_length() {
        assert_eq!(short_model_name("x-ai/grok-4.1-fast:free"), "grok-4.1-fast:free");
        assert_eq!(short_model_name("plain"), "plain");
        let long = format!("vendor/{}", "m".repeat(40));
        assert_eq!(short_model_name(&long).len(), 30);
    }

    #[test]
    fn rate_limit_wait_grows_linearly() {
        let base = Duration::from_secs(60);
        assert_eq!(rate_limit_wait(base, 1), Duration::from_secs(60));
        assert_eq!(rate_limit_wait(base, 2), Duration::from_secs(120));
        assert_eq!(rate_limit_wait(base, 3), Duration::from_secs(180));
        assert_eq!(rate_limit_wait(Duration::ZERO, 3), Duration::ZERO);
    }

    #[tokio::test]
    async fn rate_limit_backoff_is_waited_before_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let mut config = test_config(&server, &["m/a", "m/b", "m/c"]);
        config.rate_limit_backoff = Duration::from_millis(40);
        let mut client = GenerationClient::new(config, "k").unwrap();

        let started = std::time::Instant::now();
        assert!(client.generate("prompt").await.is_none());
        // 40ms after attempt 1, 80ms after attempt 2, nothing after the last.
        assert!(started.elapsed() >= Duration::from_millis(120));
    }

    #[test]
    fn empty_model_list_is_rejected() {
        let config = GenerationConfig {
            endpoint: url::Url::parse("http://localhost/chat/completions").unwrap(),
            models: vec![],
            referer: String::new(),
            title: String::new(),
            temperature: 0.7,
            max_tokens: 10,
            request_timeout: Duration::from_secs(1),
            max_attempts: 1,
            rate_limit_backoff: Duration::ZERO,
            timeout_delay: Duration::ZERO,
            error_delay: Duration::ZERO,
            decode_delay: Duration::ZERO,
        };
        assert!(GenerationClient::new(config, "key").is_err());
    }

    #[test]
    fn request_serializes_openrouter_shape() {
        let request = ChatRequest {
            model: "a/b",
            messages: [ChatMessage {
                role: "user",
                content: "hello",
            }],
            temperature: 0.5,
            max_tokens: 2000,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "a/b");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
        assert_eq!(json["max_tokens"], 2000);
    }

    #[tokio::test]
    async fn successful_call_sends_auth_and_attribution_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(header("x-title", "Enricher Tests"))
            .and(header("http-referer", "https://example.com"))
            .respond_with(completion(COPY_JSON))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = GenerationClient::new(test_config(&server, &["m/one"]), "test-key").unwrap();
        let copy = client.generate("prompt").await.expect("copy");
        assert_eq!(copy.summary, "Short");
        assert_eq!(copy.advantages, "Durable");
    }

    #[tokio::test]
    async fn successful_calls_rotate_round_robin() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion(COPY_JSON))
            .mount(&server)
            .await;

        let mut client =
            GenerationClient::new(test_config(&server, &["m/a", "m/b", "m/c"]), "k").unwrap();
        for _ in 0..5 {
            assert!(client.generate("prompt").await.is_some());
        }

        assert_eq!(requested_models(&server).await, vec!["m/a", "m/b", "m/c", "m/a", "m/b"]);
        assert_eq!(client.cursor(), 2);
    }

    #[tokio::test]
    async fn persistent_rate_limit_returns_none_after_bounded_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let mut client =
            GenerationClient::new(test_config(&server, &["m/a", "m/b", "m/c", "m/d"]), "k").unwrap();
        assert!(client.generate("prompt").await.is_none());

        // Each rate-limited retry moves to the next model.
        assert_eq!(requested_models(&server).await, vec!["m/a", "m/b", "m/c"]);
        assert_eq!(client.cursor(), 3);
    }

    #[tokio::test]
    async fn rate_limit_then_success_uses_next_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(completion(COPY_JSON))
            .mount(&server)
            .await;

        let mut client = GenerationClient::new(test_config(&server, &["m/a", "m/b"]), "k").unwrap();
        assert!(client.generate("prompt").await.is_some());
        assert_eq!(requested_models(&server).await, vec!["m/a", "m/b"]);

        // The following call starts from the wrapped cursor.
        assert!(client.generate("prompt").await.is_some());
        assert_eq!(requested_models(&server).await, vec!["m/a", "m/b", "m/a"]);
    }

    #[tokio::test]
    async fn server_error_retries_same_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(completion(COPY_JSON))
            .mount(&server)
            .await;

        let mut client = GenerationClient::new(test_config(&server, &["m/a", "m/b"]), "k").unwrap();
        assert!(client.generate("prompt").await.is_some());
        assert_eq!(requested_models(&server).await, vec!["m/a", "m/a"]);
        assert_eq!(client.cursor(), 1);
    }

    #[tokio::test]
    async fn undecodable_output_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion("Sorry, I can only answer in prose."))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(completion(COPY_JSON))
            .mount(&server)
            .await;

        let mut client = GenerationClient::new(test_config(&server, &["m/a"]), "k").unwrap();
        let copy = client.generate("prompt").await.expect("second attempt decodes");
        assert_eq!(copy.full_description, "Long");
        assert_eq!(requested_models(&server).await.len(), 2);
    }

    #[tokio::test]
    async fn empty_choices_consume_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
            .expect(3)
            .mount(&server)
            .await;

        let mut client = GenerationClient::new(test_config(&server, &["m/a"]), "k").unwrap();
        assert!(client.generate("prompt").await.is_none());
    }

    #[tokio::test]
    async fn fenced_output_with_raw_newlines_is_repaired() {
        let server = MockServer::start().await;
        let content = "```json\n{\"summary\": \"Short\", \"full_description\": \"Para one.\nPara two.\", \"advantages\": \"Durable\"}\n```";
        Mock::given(method("POST"))
            .respond_with(completion(content))
            .mount(&server)
            .await;

        let mut client = GenerationClient::new(test_config(&server, &["m/a"]), "k").unwrap();
        let copy = client.generate("prompt").await.expect("copy");
        assert_eq!(copy.full_description, "Para one.\nPara two.");
    }

    #[tokio::test]
    async fn timeouts_retry_same_model_then_give_up() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion(COPY_JSON).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let mut config = test_config(&server, &["m/a", "m/b"]);
        config.request_timeout = Duration::from_millis(50);
        config.max_attempts = 2;
        let mut client = GenerationClient::new(config, "k").unwrap();

        assert!(client.generate("prompt").await.is_none());
        assert_eq!(requested_models(&server).await, vec!["m/a", "m/a"]);
    }

    #[tokio::test]
    async fn check_model_returns_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion("OK"))
            .mount(&server)
            .await;

        let client = GenerationClient::new(test_config(&server, &["m/a"]), "k").unwrap();
        assert_eq!(client.check_model("m/a").await.unwrap(), "OK");
    }

    #[tokio::test]
    async fn check_model_reports_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let client = GenerationClient::new(test_config(&server, &["m/a"]), "k").unwrap();
        let err = client.check_model("m/a").await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
