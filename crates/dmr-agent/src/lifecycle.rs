//! Process lifecycle: interrupt guard, outcome logging, exit code.
//!
//! [`supervise`] races the work against an interrupt. Whichever finishes
//! first decides the [`Outcome`]; the losing work future is dropped, which
//! releases anything it owned (an open chat session, for one). [`finish`]
//! then logs the outcome and the shutdown line, once, on every path.

use std::future::Future;
use std::process::ExitCode;

use tracing::{error, info, warn};

use crate::config::AgentConfig;
use crate::error::{Error, error_chain};

/// How a supervised run ended.
#[derive(Debug)]
pub enum Outcome {
    Completed,
    Interrupted,
    Failed(Error),
}

impl Outcome {
    /// Interrupts are a clean exit; only failures are not.
    pub fn is_clean(&self) -> bool {
        !matches!(self, Outcome::Failed(_))
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_clean() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

/// Run `work` until it finishes or `interrupt` resolves.
pub async fn supervise<T, W, I>(work: W, interrupt: I) -> Outcome
where
    W: Future<Output = Result<T, Error>>,
    I: Future<Output = ()>,
{
    tokio::select! {
        result = work => match result {
            Ok(_) => Outcome::Completed,
            Err(e) => Outcome::Failed(e),
        },
        () = interrupt => Outcome::Interrupted,
    }
}

/// Resolve on Ctrl-C.
///
/// If the signal handler cannot be installed this never resolves, so the
/// run is simply not interruptible.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

/// Log the outcome and the shutdown line, and pick the exit code.
pub fn finish(outcome: &Outcome, config: &AgentConfig) -> ExitCode {
    match outcome {
        Outcome::Completed => {}
        Outcome::Interrupted => info!("Interrupted by user. Exiting gracefully."),
        Outcome::Failed(e) => error!("Unexpected error: {}", error_chain(e)),
    }
    info!("Logs saved to {}", config.log_path().display());
    outcome.exit_code()
}
