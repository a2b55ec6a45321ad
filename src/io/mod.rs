//! Buffered suspendable I/O on top of the scheduler (spec.md §4.6/§4.7).

mod inbuf;
mod outbuf;
mod source;

pub use inbuf::AsyncInputBuffer;
pub use outbuf::AsyncOutputBuffer;
pub use source::{ReadOutcome, ResultSink, Sink, Source, WriteOutcome};

/// Default buffer capacity (~256 KiB), matching spec.md §4.6.
pub const DEFAULT_BUFSIZE: usize = 256 * 1024;
