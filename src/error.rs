//! Session-level error taxonomy.
//!
//! Mirrors the error policy in the design: allocation and PTY-read failures
//! are fatal for the session; PTY-write failures and malformed selections are
//! logged and dropped, not propagated (see `session.rs` and `input.rs`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to allocate session buffer: {0}")]
    Allocation(&'static str),

    #[error("failed to spawn PTY: {0}")]
    PtySpawn(#[source] anyhow::Error),

    #[error("PTY read failed: {0}")]
    PtyRead(#[source] std::io::Error),

    #[error("failed to initialize RFB listener: {0}")]
    RfbInit(#[source] anyhow::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;
