//! Chat sessions over a connected client.
//!
//! - [`session::ChatSession`]: owns the client handle, runs prompts in
//!   blocking or streaming mode, and is released on drop.

pub mod session;

pub use session::{ChatSession, RunResponse};
