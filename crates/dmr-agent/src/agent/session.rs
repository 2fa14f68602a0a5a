//! Scoped chat sessions over a client handle.
//!
//! A [`ChatSession`] owns the [`ModelRunnerClient`] for its lifetime and
//! binds it to a model and fixed instructions. Every run is independent: the
//! request carries the instructions as a system message and the prompt as a
//! user message, and nothing is remembered between runs.
//!
//! The session is released when it is dropped, so it is cleaned up on every
//! exit path, including a `?` return or a cancelled future.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use futures::{Stream, StreamExt};
use tracing::{debug, info};

use crate::api::streaming::Fragment;
use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::{ChatRequest, Message, ModelRunnerClient, UsageInfo};

/// Complete result of a blocking run.
#[derive(Debug, Clone)]
pub struct RunResponse {
    pub text: String,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// A chat session: client handle plus model and instructions.
pub struct ChatSession {
    id: String,
    client: ModelRunnerClient,
    model: String,
    instructions: String,
}

/// Generate a unique id for a session, used to correlate log lines.
pub fn generate_session_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("ses-{ts:x}-{count:04x}")
}

impl ChatSession {
    /// Open a session. Takes ownership of the client.
    pub fn open(
        client: ModelRunnerClient,
        model: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        let session = Self {
            id: generate_session_id(),
            client,
            model: model.into(),
            instructions: instructions.into(),
        };
        info!("Chat session {} opened (model: {})", session.id, session.model);
        session
    }

    /// Open a session with the model and instructions from `config`.
    pub fn from_config(client: ModelRunnerClient, config: &AgentConfig) -> Self {
        Self::open(client, &config.model_id, &config.instructions)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// Release the session now. Equivalent to dropping it.
    pub fn close(self) {}

    fn request(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![Message::system(&self.instructions), Message::user(prompt)],
            ..Default::default()
        }
    }

    /// Run `prompt` to completion and return the whole response.
    pub async fn run(&self, prompt: &str) -> Result<RunResponse> {
        debug!("Session {}: blocking run ({} chars)", self.id, prompt.len());
        let completion = self.client.chat(&self.request(prompt)).await?;
        Ok(RunResponse {
            text: completion.content.unwrap_or_default(),
            usage: completion.usage,
            finish_reason: completion.finish_reason,
        })
    }

    /// Run `prompt` as a stream of fragments.
    ///
    /// The request is sent when the stream is first polled. The stream can
    /// be consumed once; an error ends it.
    pub fn run_stream(&self, prompt: &str) -> impl Stream<Item = Result<Fragment>> + '_ {
        debug!("Session {}: streaming run ({} chars)", self.id, prompt.len());
        self.client
            .chat_stream(self.request(prompt))
            .map(|item| item.map_err(Error::from))
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        info!("Chat session {} closed", self.id);
    }
}
