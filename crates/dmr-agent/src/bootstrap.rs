//! Retry-guarded acquisition of a client handle.
//!
//! A locally hosted model runner is often still starting when the agent
//! starts. [`acquire_client`] tries to construct a [`ModelRunnerClient`] up
//! to `max_retries` times, waiting `retry_delay` between attempts, and logs
//! every outcome. A handle is either fully usable or not returned at all.

use std::future::Future;

use tracing::{error, info, warn};

use crate::ModelRunnerClient;
use crate::api::retry::{RetryPolicy, describe_delay};
use crate::config::AgentConfig;
use crate::error::{ConnectError, Error, Result, error_chain};

/// Connect to the configured endpoint, retrying per the config's policy.
///
/// Fails with [`Error::Connection`] once the attempts are used up, or
/// immediately after an attempt whose failure cannot be fixed by waiting
/// (see [`ConnectError::is_transient`]).
pub async fn acquire_client(config: &AgentConfig) -> Result<ModelRunnerClient> {
    retry_connect(&config.retry_policy(), "Docker Model Runner", || {
        ModelRunnerClient::connect(config)
    })
    .await
}

/// Run `connect` until it succeeds, the policy is exhausted, or it reports a
/// permanent failure.
///
/// Each failed attempt logs a WARN. A retry logs its intent at INFO and then
/// sleeps without blocking the runtime; a zero delay skips the sleep. The
/// final failure logs an ERROR.
pub async fn retry_connect<T, F, Fut>(
    policy: &RetryPolicy,
    target: &str,
    mut connect: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, ConnectError>>,
{
    let max = policy.max_attempts();
    let mut attempt = 1;
    loop {
        match connect().await {
            Ok(handle) => {
                info!("Connected to {target}");
                return Ok(handle);
            }
            Err(e) => {
                warn!("Attempt {attempt}/{max} failed: {}", error_chain(&e));

                if policy.has_attempts_after(attempt) && e.is_transient() {
                    info!("Retrying in {}...", describe_delay(policy.delay()));
                    if !policy.delay().is_zero() {
                        tokio::time::sleep(policy.delay()).await;
                    }
                    attempt += 1;
                    continue;
                }

                if e.is_transient() {
                    error!("Failed to connect to {target} after {attempt} attempt(s)");
                } else {
                    error!("Failed to connect to {target}: permanent failure, not retrying");
                }
                return Err(Error::Connection {
                    attempts: attempt,
                    source: e,
                });
            }
        }
    }
}
