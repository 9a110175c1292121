//! Custom error types for the writer.
//!
//! This module defines the primary error type, [`WriterError`], used across
//! the crate. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the failures that can occur around a log
//! session: configuration problems, file I/O, and lifecycle misuse.
//!
//! Buffer overflow is deliberately *not* an error variant: the producer is
//! told about a dropped message through the boolean result of
//! [`crate::writer::BlackboxWriter::write`], since dropping is an expected,
//! non-fatal event on a saturated host. Every `WriterError` degrades to
//! "this log session stops"; none of them is fatal to the process.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type Result<T> = std::result::Result<T, WriterError>;

/// Errors surfaced by the log writer's configuration and lifecycle.
#[derive(Error, Debug)]
pub enum WriterError {
    /// Semantic configuration error caught during validation.
    #[error("Configuration validation error: {0}")]
    Config(String),

    /// File or thread I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `start_log` was called while a log session is already active.
    #[error("A log is already active; stop it before starting a new one")]
    AlreadyLogging,

    /// An operation required the ring buffer, but `init` was never called.
    #[error("Writer not initialized; call init() first")]
    NotInitialized,

    /// An operation required the background thread, but it was not started.
    #[error("Writer thread not started")]
    ThreadNotStarted,
}
