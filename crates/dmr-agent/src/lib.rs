//! Chat agent for a locally hosted, OpenAI-compatible model endpoint.
//!
//! `dmr-agent` talks to [Docker Model Runner](https://docs.docker.com/ai/model-runner/)
//! (or any server exposing `/models` and `/chat/completions` the OpenAI way).
//! The interesting part is startup: the endpoint is often still coming up when
//! the agent starts, so the client handle is acquired through a bounded,
//! logged retry loop ([`bootstrap::acquire_client`]) before any chat happens.
//!
//! # Getting started
//!
//! ```ignore
//! use dmr_agent::prelude::*;
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> dmr_agent::error::Result<()> {
//!     let config = AgentConfig::from_env()?;
//!     let client = acquire_client(&config).await?;
//!     let session = ChatSession::open(client, &config.model_id, &config.instructions);
//!
//!     // Blocking.
//!     let response = session.run("Tell me a joke about a pirate.").await?;
//!     println!("{}", response.text);
//!
//!     // Streaming.
//!     let mut stream = std::pin::pin!(session.run_stream("Another one."));
//!     while let Some(fragment) = stream.next().await {
//!         print!("{}", fragment?.text);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | [`AgentConfig`](config::AgentConfig) resolved from the environment |
//! | [`bootstrap`] | Retry-guarded client acquisition |
//! | [`agent`] | [`ChatSession`](agent::ChatSession): blocking and streaming runs |
//! | [`api`] | Retry policy and SSE stream parsing |
//! | [`logging`] | Named file loggers exposed as a `tracing` layer |
//! | [`demo`] / [`lifecycle`] | The example program: sections, interrupt guard, shutdown |
//! | [`error`] | Error types |

pub mod agent;
pub mod api;
pub mod bootstrap;
pub mod config;
pub mod demo;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod prelude;

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::config::AgentConfig;
use crate::error::{ConnectError, RunError};

// ── Constants ──────────────────────────────────────────────────────

/// Base URL Docker Model Runner listens on once TCP access is enabled.
pub const DMR_DEFAULT_BASE_URL: &str = "http://localhost:12434/engines/v1";

/// Name of the logger the example program writes to.
pub const AGENT_LOGGER_NAME: &str = "JokeAgent";

/// Connect timeout for every request. Chat calls themselves have no timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body (OpenAI format). `stream` is omitted unless
/// set.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

/// Role of a message in the conversation.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
        }
    }
}

/// A message in the conversation.
#[derive(Serialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

/// Error object some servers return with a 200 status.
#[derive(Deserialize, Debug)]
pub(crate) struct ApiErrorResponse {
    pub(crate) message: String,
}

/// Clean return type from [`ModelRunnerClient::chat`].
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// One entry of `GET /models`.
#[derive(Deserialize, Debug, Clone)]
pub struct ModelInfo {
    pub id: String,
}

#[derive(Deserialize, Debug)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelInfo>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for an OpenAI-compatible endpoint.
///
/// This is the client handle the bootstrap hands out. It is not `Clone`:
/// whoever holds it owns the connection.
#[derive(Debug)]
pub struct ModelRunnerClient {
    pub(crate) client: reqwest::Client,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
}

impl ModelRunnerClient {
    /// Build a client for `base_url` without touching the network.
    ///
    /// Fails if the URL is not an absolute `http`/`https` URL or the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, ConnectError> {
        let base_url = validate_base_url(base_url)?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("dmr-agent/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(ConnectError::Client)?;
        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
        })
    }

    /// Build a client from configuration and, if probing is enabled, check
    /// that the endpoint answers `GET /models`.
    ///
    /// This is the single construction attempt the bootstrap retries.
    pub async fn connect(config: &AgentConfig) -> Result<Self, ConnectError> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or(ConnectError::MissingBaseUrl)?;
        let client = Self::new(base_url, config.api_key.clone())?;

        if config.probe {
            let models = client.list_models(Some(config.probe_timeout)).await?;
            debug!("Endpoint lists {} model(s)", models.len());
            if !models.is_empty() && !models.iter().any(|m| model_matches(&m.id, &config.model_id))
            {
                warn!(
                    "Model '{}' is not listed by the endpoint (available: {})",
                    config.model_id,
                    models
                        .iter()
                        .map(|m| m.id.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
        }

        Ok(client)
    }

    /// The normalized base URL (no trailing slash).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// List the models the endpoint serves. A zero `timeout` means none.
    pub async fn list_models(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Vec<ModelInfo>, ConnectError> {
        let mut req = self.client.get(self.endpoint("models")).bearer_auth(&self.api_key);
        if let Some(timeout) = timeout.filter(|t| !t.is_zero()) {
            req = req.timeout(timeout);
        }

        let resp = req.send().await.map_err(ConnectError::Unreachable)?;
        let status = resp.status();
        let text = resp.text().await.map_err(ConnectError::Unreachable)?;
        if !status.is_success() {
            return Err(ConnectError::Status { status, body: text });
        }

        // A server that answers but returns something unexpected is still up.
        match serde_json::from_str::<ModelList>(&text) {
            Ok(list) => Ok(list.data),
            Err(e) => {
                warn!("Could not parse model list: {e}");
                Ok(Vec::new())
            }
        }
    }

    /// Send a (non-streaming) chat completion request.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, RunError> {
        debug!(
            "LLM request: model={}, messages={}",
            body.model,
            body.messages.len(),
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(RunError::Request)?;

        let status = resp.status();
        let text = resp.text().await.map_err(RunError::Request)?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(RunError::Status { status, body: text });
        }

        let parsed: RawChatResponse = serde_json::from_str(&text).map_err(RunError::Parse)?;

        if let Some(err) = parsed.error {
            return Err(RunError::Api(err.message));
        }

        if let Some(ref usage) = parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }

        let choice = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .ok_or(RunError::EmptyResponse)?;

        Ok(ChatCompletion {
            content: choice.message.content,
            usage: parsed.usage,
            finish_reason: choice.finish_reason,
        })
    }
}

/// Check that `raw` is an absolute http(s) URL and strip trailing slashes.
fn validate_base_url(raw: &str) -> Result<String, ConnectError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = reqwest::Url::parse(trimmed)
        .map_err(|_| ConnectError::InvalidBaseUrl(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ConnectError::InvalidBaseUrl(raw.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Model runner ids may carry a tag (`ai/smollm2:latest`) on either side.
/// An untagged id matches any tag; two tags must agree.
fn model_matches(listed: &str, wanted: &str) -> bool {
    match (listed.split_once(':'), wanted.split_once(':')) {
        (Some((name, _)), None) => name == wanted,
        (None, Some((name, _))) => listed == name,
        _ => listed == wanted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content, "hello");

        let user = Message::user("world");
        assert_eq!(user.role, MessageRole::User);
        assert_eq!(MessageRole::System.to_string(), "system");
    }

    #[test]
    fn chat_request_skips_unset_fields() {
        let req = ChatRequest {
            model: "ai/smollm2".into(),
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "ai/smollm2");
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("stream").is_none());
    }

    #[test]
    fn chat_request_stream_flag_serialized_when_set() {
        let req = ChatRequest {
            model: "m".into(),
            stream: true,
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn base_url_validation() {
        assert_eq!(
            validate_base_url("http://localhost:12434/engines/v1/").unwrap(),
            "http://localhost:12434/engines/v1"
        );
        assert!(validate_base_url("https://example.com").is_ok());
        assert!(matches!(
            validate_base_url("localhost:12434"),
            Err(ConnectError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            validate_base_url("ftp://example.com"),
            Err(ConnectError::InvalidBaseUrl(_))
        ));
        assert!(validate_base_url("not a url").is_err());
    }

    #[test]
    fn endpoint_joins_paths() {
        let client = ModelRunnerClient::new(DMR_DEFAULT_BASE_URL, "k").unwrap();
        assert_eq!(
            client.endpoint("/chat/completions"),
            "http://localhost:12434/engines/v1/chat/completions"
        );
        assert_eq!(client.endpoint("models"), "http://localhost:12434/engines/v1/models");
    }

    #[test]
    fn model_matching_ignores_tag() {
        assert!(model_matches("ai/smollm2:latest", "ai/smollm2"));
        assert!(model_matches("ai/smollm2", "ai/smollm2"));
        assert!(model_matches("ai/smollm2", "ai/smollm2:latest"));
        assert!(!model_matches("ai/smollm2:latest", "ai/smollm2:360M"));
        assert!(!model_matches("ai/llama3.2", "ai/smollm2"));
    }

    #[tokio::test]
    async fn connect_without_base_url_is_permanent() {
        let config = AgentConfig::default();
        let err = ModelRunnerClient::connect(&config).await.unwrap_err();
        assert!(matches!(err, ConnectError::MissingBaseUrl));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn connect_without_probe_skips_network() {
        let mut config = AgentConfig::default().with_base_url("http://127.0.0.1:9/v1");
        config.probe = false;
        let client = ModelRunnerClient::connect(&config).await.unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:9/v1");
    }
}
