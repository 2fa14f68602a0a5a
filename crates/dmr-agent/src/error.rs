//! Error types for connecting to and talking with the model endpoint.
//!
//! [`Error`] is the crate-wide error. Connection failures carry a
//! [`ConnectError`] explaining the last failed attempt; chat failures carry a
//! [`RunError`]. The entry point decides which of these are fatal.

use reqwest::StatusCode;

/// Result type alias for dmr-agent operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A setting was missing or malformed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The bootstrap gave up on the endpoint.
    #[error("failed to connect to model runner after {attempts} attempt(s)")]
    Connection {
        /// Attempts actually made before giving up.
        attempts: u32,
        /// Failure reported by the last attempt.
        #[source]
        source: ConnectError,
    },

    /// A single blocking or streaming chat call failed.
    #[error("chat run failed")]
    Run(#[from] RunError),

    /// I/O error (log file, stdout).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error with a message.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this is the bootstrap giving up.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Why a single attempt to construct a client handle failed.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConnectError {
    /// No base URL was configured.
    #[error("no endpoint base URL configured (set DMR_BASE_URL)")]
    MissingBaseUrl,

    /// The base URL is not an absolute http(s) URL.
    #[error("invalid endpoint base URL '{0}'")]
    InvalidBaseUrl(String),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    /// The probe request never got a response.
    #[error("endpoint unreachable")]
    Unreachable(#[source] reqwest::Error),

    /// The probe got an unsuccessful HTTP status.
    #[error("endpoint probe returned HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// Any other failure from a custom connector.
    #[error("{0}")]
    Other(String),
}

impl ConnectError {
    /// Whether retrying the same attempt could plausibly succeed.
    ///
    /// Configuration mistakes and client-side HTTP statuses fail the same
    /// way every time; network errors, 429 and 5xx do not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::MissingBaseUrl | Self::InvalidBaseUrl(_) | Self::Client(_) => false,
            Self::Unreachable(_) | Self::Other(_) => true,
            Self::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
        }
    }
}

/// Why a chat call failed.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RunError {
    /// The request could not be sent or its body could not be read.
    #[error("request failed")]
    Request(#[source] reqwest::Error),

    /// The endpoint answered with an unsuccessful HTTP status.
    #[error("chat completions HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The endpoint returned an error object.
    #[error("model runner API error: {0}")]
    Api(String),

    /// The response body was not the expected JSON.
    #[error("failed to parse response")]
    Parse(#[source] serde_json::Error),

    /// The response had no choices.
    #[error("empty response (no choices)")]
    EmptyResponse,
}

/// Render an error and its full `source()` chain on one line.
///
/// Used wherever an error is logged, so the log file carries the underlying
/// cause and not just the outermost message.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_connect_errors_not_transient() {
        assert!(!ConnectError::MissingBaseUrl.is_transient());
        assert!(!ConnectError::InvalidBaseUrl("nope".into()).is_transient());
        assert!(
            !ConnectError::Status {
                status: StatusCode::NOT_FOUND,
                body: String::new()
            }
            .is_transient()
        );
    }

    #[test]
    fn server_side_statuses_are_transient() {
        for status in [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            let err = ConnectError::Status {
                status,
                body: String::new(),
            };
            assert!(err.is_transient(), "{status} should be transient");
        }
        assert!(ConnectError::Other("boom".into()).is_transient());
    }

    #[test]
    fn chain_includes_sources() {
        let err = Error::Connection {
            attempts: 3,
            source: ConnectError::InvalidBaseUrl("ftp://x".into()),
        };
        let chain = error_chain(&err);
        assert_eq!(
            chain,
            "failed to connect to model runner after 3 attempt(s): invalid endpoint base URL 'ftp://x'"
        );
    }

    #[test]
    fn run_error_converts() {
        let err: Error = RunError::EmptyResponse.into();
        assert!(matches!(err, Error::Run(RunError::EmptyResponse)));
        assert!(!err.is_connection());
        assert_eq!(error_chain(&err), "chat run failed: empty response (no choices)");
    }
}
