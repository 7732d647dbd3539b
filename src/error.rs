//! Library-internal error types.
//!
//! Binaries convert these to [`anyhow::Error`] at the boundary; inside
//! the library we keep them precise so tests can match on variants.

use thiserror::Error;

/// Failure modes of a single document-engine operation.
///
/// These map onto the wire result codes in [`crate::protocol::ResultCode`]
/// but carry enough detail for logging and tests.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum DocError {
    #[error("position {pos} is out of range (document length {len})")]
    PositionOutOfRange { pos: usize, len: usize },

    #[error("heading level {0} is not in 1..=3")]
    InvalidHeadingLevel(i64),

    #[error("range start {start} is after end {end}")]
    InvalidRange { start: usize, end: usize },

    #[error("position {pos} is not a NORMAL chunk, required for UNORDERED_LIST")]
    WrongChunkType { pos: usize },

    #[error("command could not be parsed: {0}")]
    Parse(String),
}

/// Failure modes of the client handshake and session lifecycle.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unknown user {0:?}")]
    UnknownUser(String),

    #[error("handshake stream closed before username was read")]
    HandshakeEof,

    #[error("io error during session handling: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure modes of loading `roles.txt`.
#[derive(Debug, Error)]
pub enum RoleFileError {
    #[error("io error reading role file: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: expected '<username> <role>', got {text:?}")]
    Malformed { line: usize, text: String },

    #[error("line {line}: role must be 'read' or 'write', got {role:?}")]
    InvalidRole { line: usize, role: String },

    #[error("line {line}: username {username:?} is not a plain token (letters, digits, '_', '-', '.')")]
    InvalidUsername { line: usize, username: String },
}
