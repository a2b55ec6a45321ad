//! Tagged error values (spec.md §7).
//!
//! Errors are surfaced as a small tagged struct rather than by
//! exception/panic type, and the async buffers never raise from their
//! non-blocking read/write paths: they latch the OS status into
//! `error_status` and let callers inspect it (see
//! [`crate::io::AsyncInputBuffer::error_status`]). `Error`
//! itself is for the layers above that — selector/scheduler setup, and
//! the parser/serializer result-sink contract external to the core.

use std::fmt;

/// What kind of failure an [`Error`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An OS-level failure: a syscall returned an unexpected error
    /// code. Carries the originating `io::Error` when available.
    System,
    /// Raised by parsers through the result-sink path (spec.md §6);
    /// never raised by the core's buffers themselves.
    Parse,
    /// Internal-only: drives the suspend-and-rearm loop. Never
    /// observed outside this crate.
    WouldBlock,
}

/// A tagged error value: a `kind` plus a free-form message, optionally
/// wrapping the underlying `std::io::Error`.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    source: Option<std::io::Error>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn system(message: impl Into<String>, source: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::System,
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Parse, message)
    }

    pub(crate) fn would_block() -> Self {
        Error::new(ErrorKind::WouldBlock, "would block")
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {} ({})", self.kind_label(), self.message, source),
            None => write!(f, "{}: {}", self.kind_label(), self.message),
        }
    }
}

impl Error {
    fn kind_label(&self) -> &'static str {
        match self.kind {
            ErrorKind::System => "system error",
            ErrorKind::Parse => "parse error",
            ErrorKind::WouldBlock => "would block",
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::system(source.to_string(), source)
    }
}
