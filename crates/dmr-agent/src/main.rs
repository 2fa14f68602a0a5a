//! Run one prompt against a local Docker Model Runner, blocking and streaming.
//!
//! Settings come from the environment (and a `.env` file, if present); see
//! [`AgentConfig`](dmr_agent::config::AgentConfig) for the variables. Log
//! lines go to `$LOG_DIR/$LOG_FILE` (default `logs/Agent.log`).
//!
//! # Examples
//!
//! ```sh
//! # Both modes with the default prompt
//! DMR_BASE_URL=http://localhost:12434/engines/v1 dmr-agent
//!
//! # Streaming only, custom prompt
//! dmr-agent --mode streaming --prompt "Tell me a joke about a parrot."
//!
//! # Settings from a specific file
//! dmr-agent --env-file staging.env
//! ```

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use dmr_agent::AGENT_LOGGER_NAME;
use dmr_agent::config::AgentConfig;
use dmr_agent::demo::{DEFAULT_PROMPT, Mode, print_instructions, run_demo};
use dmr_agent::lifecycle::{ctrl_c, finish, supervise};
use dmr_agent::logging::get_logger;

/// Run one prompt against a local Docker Model Runner, blocking and streaming.
#[derive(Parser)]
#[command(name = "dmr-agent")]
struct Cli {
    /// Prompt to send
    #[arg(long, default_value = DEFAULT_PROMPT)]
    prompt: String,

    /// Which invocation modes to run
    #[arg(long, value_enum, default_value_t = Mode::Both)]
    mode: Mode,

    /// Load settings from this file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut stdout = io::stdout();
    if let Err(e) = print_instructions(&mut stdout) {
        eprintln!("Error: failed to write to stdout: {e}");
        return ExitCode::FAILURE;
    }

    match &cli.env_file {
        Some(path) => {
            if let Err(e) = dotenvy::from_path(path) {
                eprintln!("Error: failed to load {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        }
        // A missing .env is normal.
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let config = match AgentConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match get_logger(AGENT_LOGGER_NAME, &config.log_path()) {
        Ok(logger) => {
            if !logger.install_global() {
                eprintln!(
                    "Warning: a tracing subscriber is already installed; nothing will be written to {}",
                    config.log_path().display()
                );
            }
        }
        Err(e) => {
            eprintln!(
                "Error: failed to open log file {}: {e}",
                config.log_path().display()
            );
            return ExitCode::FAILURE;
        }
    }

    let outcome = supervise(
        run_demo(&config, &cli.prompt, cli.mode, &mut stdout),
        ctrl_c(),
    )
    .await;

    finish(&outcome, &config)
}
