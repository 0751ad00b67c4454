// ABOUTME: In-process SSH client for remote command execution.
// ABOUTME: Agent or key authentication, known_hosts checks, and reverse TCP forwarding.

mod client;
mod error;
mod forward;

pub use client::{Session, SessionConfig};
pub use error::{Error, Result};
pub use forward::ReverseForward;
