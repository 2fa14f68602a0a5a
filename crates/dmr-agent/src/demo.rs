//! The example program: connect, open a session, and run one prompt in
//! blocking mode and then in streaming mode.
//!
//! Each section recovers from its own failure: a failed blocking run is
//! logged and the streaming run still happens. Only a connection failure
//! aborts the demo.

use std::io::{self, Write};
use std::pin::pin;

use futures::StreamExt;
use tracing::{debug, error, info};

use crate::agent::ChatSession;
use crate::bootstrap::acquire_client;
use crate::config::AgentConfig;
use crate::error::{Result, error_chain};

/// Prompt used when none is given on the command line.
pub const DEFAULT_PROMPT: &str = "Tell me a joke about a pirate.";

/// Printed before anything else runs.
pub const OPERATOR_INSTRUCTIONS: &[&str] = &[
    "This program requires Docker Desktop and Docker Model Runner to be configured.",
    "Run these commands first:",
    "1. docker desktop enable model-runner --tcp 12434",
    "2. docker model pull ai/smollm2:latest",
];

pub const BLOCKING_HEADER: &str = "--- Non-Streaming Result ---";
pub const STREAMING_HEADER: &str = "--- Streaming Result ---";

/// Which invocation modes to demonstrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Mode {
    /// Blocking, then streaming.
    #[default]
    Both,
    Blocking,
    Streaming,
}

impl Mode {
    pub fn runs_blocking(self) -> bool {
        matches!(self, Mode::Both | Mode::Blocking)
    }

    pub fn runs_streaming(self) -> bool {
        matches!(self, Mode::Both | Mode::Streaming)
    }
}

/// What each section produced. `None` means the section was skipped or
/// failed.
#[derive(Debug, Default)]
pub struct DemoReport {
    pub blocking: Option<String>,
    pub streamed: Option<String>,
}

/// Write the operator instructions followed by a separator line.
pub fn print_instructions(out: &mut impl Write) -> io::Result<()> {
    for line in OPERATOR_INSTRUCTIONS {
        writeln!(out, "{line}")?;
    }
    writeln!(out, "{}", "-".repeat(50))?;
    out.flush()
}

/// Connect, open a session, and run the selected sections.
///
/// Returns an error only if the bootstrap fails; section failures are
/// logged and reflected in the report.
pub async fn run_demo<W: Write>(
    config: &AgentConfig,
    prompt: &str,
    mode: Mode,
    out: &mut W,
) -> Result<DemoReport> {
    info!("Starting Local AI Agent Example");
    debug!(
        "Model: {} | DMR URL: {}",
        config.model_id,
        config.base_url.as_deref().unwrap_or("(unset)")
    );

    let client = acquire_client(config).await?;
    let session = ChatSession::from_config(client, config);
    info!("Agent initialized successfully");

    let mut report = DemoReport::default();

    if mode.runs_blocking() {
        info!("Non-Streaming Invocation");
        match blocking_section(&session, prompt, out).await {
            Ok(text) => report.blocking = Some(text),
            Err(e) => error!("Error during non-streaming run: {}", error_chain(&e)),
        }
    }

    if mode.runs_streaming() {
        info!("Streaming Invocation");
        match streaming_section(&session, prompt, out).await {
            Ok(text) => report.streamed = Some(text),
            Err(e) => error!("Error during streaming run: {}", error_chain(&e)),
        }
    }

    session.close();
    Ok(report)
}

async fn blocking_section<W: Write>(
    session: &ChatSession,
    prompt: &str,
    out: &mut W,
) -> Result<String> {
    let response = session.run(prompt).await?;
    writeln!(out, "\n{BLOCKING_HEADER}")?;
    writeln!(out, "{}", response.text)?;
    out.flush()?;
    Ok(response.text)
}

async fn streaming_section<W: Write>(
    session: &ChatSession,
    prompt: &str,
    out: &mut W,
) -> Result<String> {
    writeln!(out, "\n{STREAMING_HEADER}")?;
    out.flush()?;

    let mut stream = pin!(session.run_stream(prompt));
    let mut text = String::new();
    while let Some(item) = stream.next().await {
        let fragment = match item {
            Ok(fragment) => fragment,
            Err(e) => {
                // Keep the terminal tidy before the error is reported.
                writeln!(out)?;
                return Err(e);
            }
        };
        if !fragment.text.is_empty() {
            write!(out, "{}", fragment.text)?;
            out.flush()?;
            text.push_str(&fragment.text);
        }
    }
    writeln!(out, "\n")?;
    out.flush()?;
    Ok(text)
}
