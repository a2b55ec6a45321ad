//! Buffered, suspendable reader over a [`Source`] (spec.md §4.6).
//!
//! Ported from `original_source/cuti/cuti/async_inbuf.hpp`/`.cpp`. The
//! original stores a raw `scheduler_t*` back-edge that is only valid
//! while a readable-callback is armed, clearing it once the callback
//! fires or is canceled; this keeps that shape (see DESIGN NOTES §9)
//! rather than threading a `Scheduler` reference through every method,
//! which would force a lifetime parameter onto `AsyncInputBuffer`
//! itself and infect every struct that owns one.

use crate::callback::{Callback, SendPtr};
use crate::error::Error;
use crate::io::source::{ReadOutcome, Source};
use crate::io::DEFAULT_BUFSIZE;
use crate::scheduler::Scheduler;
use crate::ticket::Ticket;

/// A fixed-size byte buffer that refills itself from a [`Source`] on
/// demand, suspending the caller via a one-shot readable-callback
/// rather than blocking.
pub struct AsyncInputBuffer<S> {
    source: S,
    buf: Box<[u8]>,
    read_ptr: usize,
    limit: usize,
    eof_seen: bool,
    error_status: i32,

    // Valid only while `readable_ticket` is non-empty.
    scheduler: Option<*mut Scheduler>,
    readable_ticket: Ticket,
    callback: Callback,
}

impl<S: Source> AsyncInputBuffer<S> {
    /// Wraps `source` in a buffer of the default capacity (~256 KiB).
    pub fn new(source: S) -> Result<Self, Error> {
        Self::with_capacity(source, DEFAULT_BUFSIZE)
    }

    /// Wraps `source` in a buffer of `capacity` bytes.
    ///
    /// Rejects `capacity == 0`: the original C++ `async_inbuf_t` only
    /// asserts this in debug builds, leaving release behavior
    /// undefined (spec.md §9 "Open questions"); this crate makes the
    /// rejection an ordinary `Result` error in every build.
    pub fn with_capacity(source: S, capacity: usize) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::new(
                crate::error::ErrorKind::System,
                "AsyncInputBuffer: capacity must be non-zero",
            ));
        }
        Ok(AsyncInputBuffer {
            source,
            buf: vec![0u8; capacity].into_boxed_slice(),
            read_ptr: 0,
            limit: 0,
            eof_seen: false,
            error_status: 0,
            scheduler: None,
            readable_ticket: Ticket::Empty,
            callback: Callback::null(),
        })
    }

    /// `true` iff data is available, or EOF has been observed, without
    /// suspension.
    pub fn readable(&self) -> bool {
        self.read_ptr != self.limit || self.eof_seen
    }

    /// The latched OS error status, or `0` if none has been observed.
    pub fn error_status(&self) -> i32 {
        self.error_status
    }

    /// One-byte look-ahead, or `-1` at EOF.
    ///
    /// # Panics
    ///
    /// Panics if `!self.readable()`.
    pub fn peek(&self) -> i32 {
        assert!(self.readable(), "AsyncInputBuffer::peek: not readable");
        if self.read_ptr != self.limit {
            self.buf[self.read_ptr] as i32
        } else {
            -1
        }
    }

    /// Advances past the current byte.
    ///
    /// # Panics
    ///
    /// Panics if `!self.readable()` or `self.peek() == -1`.
    pub fn skip(&mut self) {
        assert!(self.readable(), "AsyncInputBuffer::skip: not readable");
        assert!(self.peek() != -1, "AsyncInputBuffer::skip: at EOF");
        self.read_ptr += 1;
    }

    /// Copies up to `dst.len()` buffered bytes into `dst`, returning
    /// the number of bytes copied (`0` at EOF).
    ///
    /// # Panics
    ///
    /// Panics if `!self.readable()`.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        assert!(self.readable(), "AsyncInputBuffer::read: not readable");
        let count = dst.len().min(self.limit - self.read_ptr);
        dst[..count].copy_from_slice(&self.buf[self.read_ptr..self.read_ptr + count]);
        self.read_ptr += count;
        count
    }

    /// Arms `cb` to run once the buffer becomes readable, returning any
    /// previously armed callback so the caller can compose or drop it.
    ///
    /// If the buffer is already readable, `cb` is scheduled via a
    /// zero-delay alarm on `scheduler` rather than re-arming the
    /// source, preserving "callbacks fire from `wait()`" (spec.md
    /// §4.6).
    pub fn call_when_readable(&mut self, scheduler: &mut Scheduler, cb: Callback) -> Callback {
        let previous = self.cancel_when_readable(scheduler);

        // The arming callback always closes over `self`'s raw pointer
        // rather than the user callback directly, so cancellation can
        // swap the user callback out without touching the
        // registration: see `on_readable_now`/`on_source_readable`.
        let this = SendPtr(self as *mut Self);
        self.readable_ticket = if self.readable() {
            scheduler.call_alarm(
                crate::time::TimePoint::now(),
                Callback::new(move || unsafe { (*this.0).on_readable_now() }),
            )
        } else {
            self.source.call_when_readable(
                scheduler,
                Callback::new(move || unsafe { (*this.0).on_source_readable() }),
            )
        };

        self.scheduler = Some(scheduler as *mut Scheduler);
        self.callback = cb;

        previous
    }

    /// Cancels and returns any pending readable-callback; a no-op if
    /// none is armed.
    pub fn cancel_when_readable(&mut self, scheduler: &mut Scheduler) -> Callback {
        if self.readable_ticket.is_empty() {
            return Callback::null();
        }
        debug_assert!(self.scheduler.is_some());
        scheduler.cancel(self.readable_ticket);
        self.readable_ticket = Ticket::Empty;
        self.scheduler = None;
        Callback::take(&mut self.callback)
    }

    fn on_readable_now(&mut self) {
        self.readable_ticket = Ticket::Empty;
        self.scheduler = None;
        Callback::take(&mut self.callback).call();
    }

    fn on_source_readable(&mut self) {
        self.readable_ticket = Ticket::Empty;
        let scheduler = self.scheduler.take().expect("armed while readable");

        match self.source.read(&mut self.buf) {
            (ReadOutcome::WouldBlock, status) => {
                self.error_status = status;
                // Spurious wakeup: re-arm against the source.
                let this = SendPtr(self as *mut Self);
                self.readable_ticket = self.source.call_when_readable(
                    // SAFETY: `scheduler` was stashed by `call_when_readable` and
                    // is guaranteed live for as long as a ticket referencing it
                    // is outstanding (see struct docs and spec.md §5 "Descriptor
                    // ownership").
                    unsafe { &mut *scheduler },
                    Callback::new(move || unsafe { (*this.0).on_source_readable() }),
                );
                self.scheduler = Some(scheduler);
            }
            (ReadOutcome::Eof, status) => {
                self.read_ptr = 0;
                self.limit = 0;
                self.eof_seen = true;
                self.error_status = status;
                Callback::take(&mut self.callback).call();
            }
            (ReadOutcome::Data(n), status) => {
                self.read_ptr = 0;
                self.limit = n;
                self.eof_seen = false;
                self.error_status = status;
                Callback::take(&mut self.callback).call();
            }
        }
    }
}
