//! API interaction layer: retry policy and streaming.
//!
//! - [`retry`]: bounded, fixed-delay [`RetryPolicy`] used by the connection
//!   bootstrap.
//! - [`streaming`]: SSE parser producing a lazy stream of
//!   [`Fragment`](streaming::Fragment)s.

pub mod retry;
pub mod streaming;

pub use retry::RetryPolicy;
pub use streaming::{Fragment, collect_text};
