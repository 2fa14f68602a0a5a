//! Server-Sent Events (SSE) streaming for the chat completions API.
//!
//! [`ModelRunnerClient::chat_stream`] returns a lazy [`Stream`] of
//! [`Fragment`]s. Nothing is sent until the stream is first polled, each
//! fragment is produced as soon as its `data:` line arrives, and the stream
//! ends after `data: [DONE]` or when the body closes. A transport or API
//! error is yielded once as an `Err` item and ends the stream.

use async_stream::try_stream;
use futures::Stream;
use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::error::RunError;
use crate::{ApiErrorResponse, ChatRequest, ModelRunnerClient, UsageInfo};

/// One incremental unit of a streamed response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    /// Text delta. May be empty (e.g. the final chunk carrying usage).
    pub text: String,
    /// Set on the last content chunk of a choice.
    pub finish_reason: Option<String>,
    /// Token usage, usually only on the final chunk.
    pub usage: Option<UsageInfo>,
}

impl Fragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// What a single SSE line means for the stream.
#[derive(Debug, PartialEq, Eq)]
pub enum SseEvent {
    /// A chunk worth surfacing.
    Fragment(Fragment),
    /// `data: [DONE]`.
    Done,
    /// Blank line, comment, non-data field, or a chunk with nothing in it.
    Skip,
}

#[derive(Deserialize, Debug)]
struct StreamChunk {
    choices: Option<Vec<StreamChoice>>,
    usage: Option<UsageInfo>,
    error: Option<ApiErrorResponse>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    content: Option<String>,
}

/// Splits a byte stream into complete lines.
///
/// Works on bytes so a multi-byte character split across two network
/// chunks is decoded only once it is whole.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed bytes, returning every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).trim().to_string());
        }
        lines
    }

    /// The unterminated remainder, if any.
    pub fn finish(self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.buffer).trim().to_string();
        (!rest.is_empty()).then_some(rest)
    }
}

/// Interpret one (trimmed) SSE line.
///
/// Malformed JSON is logged and skipped; an `error` object is returned as
/// [`RunError::Api`].
pub fn parse_line(line: &str) -> Result<SseEvent, RunError> {
    if line.is_empty() || line.starts_with(':') {
        return Ok(SseEvent::Skip);
    }
    let Some(data) = line.strip_prefix("data:") else {
        trace!("Ignoring SSE field: {line}");
        return Ok(SseEvent::Skip);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }

    let chunk = match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!("Failed to parse SSE chunk: {e}, data: {data}");
            return Ok(SseEvent::Skip);
        }
    };

    if let Some(err) = chunk.error {
        return Err(RunError::Api(err.message));
    }

    let mut fragment = Fragment {
        usage: chunk.usage,
        ..Default::default()
    };
    for choice in chunk.choices.unwrap_or_default() {
        if let Some(content) = choice.delta.and_then(|d| d.content) {
            fragment.text.push_str(&content);
        }
        if choice.finish_reason.is_some() {
            trace!("Stream finish_reason: {:?}", choice.finish_reason);
            fragment.finish_reason = choice.finish_reason;
        }
    }

    if fragment == Fragment::default() {
        Ok(SseEvent::Skip)
    } else {
        Ok(SseEvent::Fragment(fragment))
    }
}

impl ModelRunnerClient {
    /// Send a chat completion request with `stream: true`.
    ///
    /// The returned stream is single-pass and yields fragments in the order
    /// the server generated them. Concatenating every `text` reconstructs
    /// the full response.
    pub fn chat_stream(
        &self,
        mut body: ChatRequest,
    ) -> impl Stream<Item = Result<Fragment, RunError>> + '_ {
        body.stream = true;
        try_stream! {
            let mut resp = self.open_stream(&body).await?;
            let mut decoder = SseDecoder::default();
            let mut produced = 0usize;
            let mut done = false;

            while !done {
                let Some(chunk) = resp.chunk().await.map_err(RunError::Request)? else {
                    break;
                };
                for line in decoder.push(&chunk) {
                    match parse_line(&line)? {
                        SseEvent::Fragment(fragment) => {
                            produced += 1;
                            yield fragment;
                        }
                        SseEvent::Done => {
                            done = true;
                            break;
                        }
                        SseEvent::Skip => {}
                    }
                }
            }

            // Servers that close without [DONE] may leave a final line unterminated.
            // Let chains are not accepted inside the macro body.
            if !done {
                if let Some(rest) = decoder.finish() {
                    if let SseEvent::Fragment(fragment) = parse_line(&rest)? {
                        produced += 1;
                        yield fragment;
                    }
                }
            }

            debug!("Stream completed with {produced} fragment(s)");
        }
    }

    async fn open_stream(&self, body: &ChatRequest) -> Result<reqwest::Response, RunError> {
        debug!(
            "Sending streaming chat request: model={}, messages={}",
            body.model,
            body.messages.len()
        );
        let resp = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(RunError::Request)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RunError::Status { status, body: text });
        }
        Ok(resp)
    }
}

/// Concatenate the text of a sequence of fragments.
pub fn collect_text<'a>(fragments: impl IntoIterator<Item = &'a Fragment>) -> String {
    fragments.into_iter().map(|f| f.text.as_str()).collect()
}

/// The last usage report in a sequence of fragments.
pub fn extract_usage(fragments: &[Fragment]) -> Option<UsageInfo> {
    fragments.iter().rev().find_map(|f| f.usage.clone())
}
