//! The external collaborator traits consumed by the async buffers
//! (spec.md §6 "Source interface" / "Sink interface").
//!
//! `async_inbuf_t`/`async_outbuf_t` in the original source are built
//! against an abstract `async_input_adapter_t`/`async_output_adapter_t`
//! base class; `Source`/`Sink` are the Rust trait equivalent, so the
//! buffers stay generic over anything readiness-aware rather than
//! hardwired to TCP (see `crate::net::TcpConnection` for the only
//! implementation this crate ships).

use crate::callback::Callback;
use crate::scheduler::Scheduler;
use crate::ticket::Ticket;

/// The three-valued outcome of a non-blocking read, standing in for
/// the `(next_ptr, status)` pair from spec.md §4.6/§6 (Rust has no
/// null-pointer convention to reuse here).
#[derive(Debug)]
pub enum ReadOutcome {
    /// No data available yet; the caller should re-arm readability.
    WouldBlock,
    /// The source has reached end of stream.
    Eof,
    /// `n` bytes were copied into the destination buffer.
    Data(usize),
}

/// The three-valued outcome of a non-blocking write, mirroring
/// [`ReadOutcome`].
#[derive(Debug)]
pub enum WriteOutcome {
    /// No buffer space available yet; the caller should re-arm
    /// writability.
    WouldBlock,
    /// `n` bytes were accepted by the sink.
    Written(usize),
}

/// An external readable channel consumed by [`super::AsyncInputBuffer`].
pub trait Source {
    /// Arms a one-shot callback for when this source has data, has
    /// hit EOF, or has hit an error. Idempotent across re-arms: the
    /// caller owns at most one pending registration per source.
    fn call_when_readable(&self, scheduler: &mut Scheduler, cb: Callback) -> Ticket;

    /// Non-blocking read into `buf`. Returns [`ReadOutcome::WouldBlock`]
    /// if no data is available yet, `Eof` at end of stream, or
    /// `Data(n)` for `n > 0` bytes copied. `status` is the latched OS
    /// error code for the most recent failure, or `0`.
    fn read(&self, buf: &mut [u8]) -> (ReadOutcome, i32);
}

/// An external writable channel consumed by [`super::AsyncOutputBuffer`].
pub trait Sink {
    /// Arms a one-shot callback for when this sink has free buffer
    /// space. Idempotent across re-arms, symmetric to
    /// [`Source::call_when_readable`].
    fn call_when_writable(&self, scheduler: &mut Scheduler, cb: Callback) -> Ticket;

    /// Non-blocking write of `buf`. Returns [`WriteOutcome::WouldBlock`]
    /// if the sink has no room yet, or `Written(n)` for `n` bytes
    /// accepted (`n` may be less than `buf.len()`). `status` is the
    /// latched OS error code for the most recent failure, or `0`.
    fn write(&self, buf: &[u8]) -> (WriteOutcome, i32);

    /// Half-closes the writing side, signaling EOF to the peer while
    /// leaving the reading side open.
    fn close_write(&self) -> std::io::Result<()>;
}

/// The result-sink contract a parser/serializer built on the buffers
/// would report through (spec.md §6 "Parser/serializer interface").
/// No concrete parser ships with this crate (Non-goal); this trait
/// exists only so the buffer layer's tests/docs can demonstrate the
/// seam parsers plug into.
pub trait ResultSink<T> {
    fn succeed(self: Box<Self>, value: T);
    fn fail(self: Box<Self>, err: crate::error::Error);
}
