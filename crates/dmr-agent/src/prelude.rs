//! Convenience re-exports for common `dmr-agent` types.
//!
//! ```ignore
//! use dmr_agent::prelude::*;
//! ```

pub use crate::agent::{ChatSession, RunResponse};
pub use crate::api::{Fragment, RetryPolicy, collect_text};
pub use crate::bootstrap::{acquire_client, retry_connect};
pub use crate::config::AgentConfig;
pub use crate::error::{ConnectError, Error, RunError};
pub use crate::logging::{Logger, get_logger};
pub use crate::{ChatRequest, Message, ModelRunnerClient};
