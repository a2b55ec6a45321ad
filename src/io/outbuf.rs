//! Buffered, suspendable writer over a [`Sink`] (spec.md §4.7).
//!
//! Mirror-image of [`super::AsyncInputBuffer`] (spec.md §4.6); no
//! `async_outbuf.*` survives in `original_source/`, so this is built
//! directly from spec.md §4.7's invariants rather than ported line for
//! line, following the same back-edge shape as `inbuf.rs`.

use crate::callback::{Callback, SendPtr};
use crate::error::Error;
use crate::io::source::{Sink, WriteOutcome};
use crate::io::DEFAULT_BUFSIZE;
use crate::scheduler::Scheduler;
use crate::ticket::Ticket;

/// A fixed-size byte buffer that accumulates bytes for a [`Sink`],
/// flushing to it on demand and suspending the caller via a one-shot
/// writable-callback rather than blocking.
pub struct AsyncOutputBuffer<S> {
    sink: S,
    buf: Box<[u8]>,
    write_ptr: usize,
    error_status: i32,

    // Valid only while `writable_ticket` is non-empty.
    scheduler: Option<*mut Scheduler>,
    writable_ticket: Ticket,
    callback: Callback,
}

impl<S: Sink> AsyncOutputBuffer<S> {
    /// Wraps `sink` in a buffer of the default capacity (~256 KiB).
    pub fn new(sink: S) -> Result<Self, Error> {
        Self::with_capacity(sink, DEFAULT_BUFSIZE)
    }

    /// Wraps `sink` in a buffer of `capacity` bytes. Rejects
    /// `capacity == 0`, symmetric to [`super::AsyncInputBuffer::with_capacity`].
    pub fn with_capacity(sink: S, capacity: usize) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::new(
                crate::error::ErrorKind::System,
                "AsyncOutputBuffer: capacity must be non-zero",
            ));
        }
        Ok(AsyncOutputBuffer {
            sink,
            buf: vec![0u8; capacity].into_boxed_slice(),
            write_ptr: 0,
            error_status: 0,
            scheduler: None,
            writable_ticket: Ticket::Empty,
            callback: Callback::null(),
        })
    }

    /// `true` while free space remains or a latched error makes
    /// further buffering moot (a broken sink is "writable forever":
    /// the caller discovers the error via `error_status` instead of
    /// suspending forever on a sink that can never drain).
    pub fn writable(&self) -> bool {
        self.write_ptr < self.buf.len() || self.error_status != 0
    }

    pub fn error_status(&self) -> i32 {
        self.error_status
    }

    /// Buffers one byte.
    ///
    /// # Panics
    ///
    /// Panics if `!self.writable()`.
    pub fn put(&mut self, byte: u8) {
        assert!(self.writable(), "AsyncOutputBuffer::put: not writable");
        if self.write_ptr < self.buf.len() {
            self.buf[self.write_ptr] = byte;
            self.write_ptr += 1;
        }
        // A latched error with a full buffer silently drops further
        // bytes: `error_status()` is how the caller learns the stream
        // is broken, not the return value of `put`.
    }

    /// Buffers as many bytes of `src` as fit, returning the count
    /// buffered.
    ///
    /// # Panics
    ///
    /// Panics if `!self.writable()`.
    pub fn write(&mut self, src: &[u8]) -> usize {
        assert!(self.writable(), "AsyncOutputBuffer::write: not writable");
        let count = src.len().min(self.buf.len() - self.write_ptr);
        self.buf[self.write_ptr..self.write_ptr + count].copy_from_slice(&src[..count]);
        self.write_ptr += count;
        count
    }

    /// Arms `cb` to run once the buffer becomes writable, returning
    /// any previously armed callback.
    ///
    /// If already writable, `cb` fires via a zero-delay alarm; if
    /// full, the full contents are flushed to the sink (non-blocking)
    /// and `cb` fires once the flush frees enough space, re-arming the
    /// sink on a partial drain.
    pub fn call_when_writable(&mut self, scheduler: &mut Scheduler, cb: Callback) -> Callback {
        let previous = self.cancel_when_writable(scheduler);

        let this = SendPtr(self as *mut Self);
        self.writable_ticket = if self.writable() {
            scheduler.call_alarm(
                crate::time::TimePoint::now(),
                Callback::new(move || unsafe { (*this.0).on_writable_now() }),
            )
        } else {
            self.sink.call_when_writable(
                scheduler,
                Callback::new(move || unsafe { (*this.0).on_sink_writable() }),
            )
        };

        self.scheduler = Some(scheduler as *mut Scheduler);
        self.callback = cb;

        previous
    }

    /// Cancels and returns any pending writable-callback; a no-op if
    /// none is armed.
    pub fn cancel_when_writable(&mut self, scheduler: &mut Scheduler) -> Callback {
        if self.writable_ticket.is_empty() {
            return Callback::null();
        }
        debug_assert!(self.scheduler.is_some());
        scheduler.cancel(self.writable_ticket);
        self.writable_ticket = Ticket::Empty;
        self.scheduler = None;
        Callback::take(&mut self.callback)
    }

    /// Half-closes the sink, signaling EOF to the peer.
    pub fn close_write(&self) -> std::io::Result<()> {
        self.sink.close_write()
    }

    fn on_writable_now(&mut self) {
        self.writable_ticket = Ticket::Empty;
        self.scheduler = None;
        Callback::take(&mut self.callback).call();
    }

    fn on_sink_writable(&mut self) {
        self.writable_ticket = Ticket::Empty;
        let scheduler = self.scheduler.take().expect("armed while not writable");

        match self.sink.write(&self.buf[..self.write_ptr]) {
            (WriteOutcome::WouldBlock, status) => {
                self.error_status = status;
                if status != 0 {
                    // Broken sink: latch and treat as writable forever
                    // rather than re-arming a flush that can never
                    // succeed (spec.md §3 "Flush attempts on a broken
                    // sink").
                    Callback::take(&mut self.callback).call();
                    return;
                }
                let this = SendPtr(self as *mut Self);
                self.writable_ticket = self.sink.call_when_writable(
                    unsafe { &mut *scheduler },
                    Callback::new(move || unsafe { (*this.0).on_sink_writable() }),
                );
                self.scheduler = Some(scheduler);
            }
            (WriteOutcome::Written(n), status) => {
                self.error_status = status;
                let remaining = self.write_ptr - n;
                self.buf.copy_within(n..self.write_ptr, 0);
                self.write_ptr = remaining;

                if remaining > 0 && status == 0 {
                    // Partial flush: retain the tail and re-arm.
                    let this = SendPtr(self as *mut Self);
                    self.writable_ticket = self.sink.call_when_writable(
                        unsafe { &mut *scheduler },
                        Callback::new(move || unsafe { (*this.0).on_sink_writable() }),
                    );
                    self.scheduler = Some(scheduler);
                } else {
                    Callback::take(&mut self.callback).call();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::TcpConnection;

    #[test]
    fn rejects_zero_capacity() {
        let (a, _b) = TcpConnection::connected_pair().unwrap();
        assert!(AsyncOutputBuffer::with_capacity(a, 0).is_err());
    }

    #[test]
    fn put_then_flush_delivers_bytes() {
        use std::io::Read as _;

        let mut scheduler = Scheduler::new().unwrap();
        let (a, mut b) = TcpConnection::connected_pair().unwrap();
        let mut outbuf = AsyncOutputBuffer::new(a).unwrap();

        for byte in b"hello" {
            outbuf.put(*byte);
        }

        let (tx, rx) = std::sync::mpsc::channel();
        outbuf.call_when_writable(&mut scheduler, Callback::new(move || tx.send(()).unwrap()));
        // Already writable (buffer not full): fires via zero-delay alarm.
        let cb = scheduler.wait().unwrap().expect("should fire immediately");
        cb.call();
        rx.recv().unwrap();

        // Flush happens only when the buffer becomes full or on an
        // explicit arm after it's full; exercise that path directly by
        // filling the buffer.
        let cap = {
            let (a2, mut b2) = TcpConnection::connected_pair().unwrap();
            let mut ob = AsyncOutputBuffer::new(a2).unwrap();
            let cap = ob.buf.len();
            for _ in 0..cap {
                ob.put(0);
            }
            assert!(!ob.writable());
            let (tx2, rx2) = std::sync::mpsc::channel();
            ob.call_when_writable(&mut scheduler, Callback::new(move || tx2.send(()).unwrap()));

            let mut drained = vec![0u8; cap];
            let reader = std::thread::spawn(move || {
                use std::io::Read as _;
                b2.read_exact(&mut drained).unwrap();
            });
            loop {
                match scheduler.wait().unwrap() {
                    Some(cb) => cb.call(),
                    None => break,
                }
                if rx2.try_recv().is_ok() {
                    break;
                }
            }
            reader.join().unwrap();
            cap
        };
        assert!(cap > 0);

        let mut got = [0u8; 5];
        b.read_exact(&mut got).unwrap();
        assert_eq!(&got, b"hello");
    }

    #[test]
    fn cancel_returns_the_armed_callback() {
        let mut scheduler = Scheduler::new().unwrap();
        let (a, _b) = TcpConnection::connected_pair().unwrap();
        let mut outbuf = AsyncOutputBuffer::new(a).unwrap();

        let fired = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fired2 = fired.clone();
        outbuf.call_when_writable(
            &mut scheduler,
            Callback::new(move || fired2.store(true, std::sync::atomic::Ordering::SeqCst)),
        );
        let prev = outbuf.cancel_when_writable(&mut scheduler);
        assert!(prev.is_some());
        prev.call();
        assert!(fired.load(std::sync::atomic::Ordering::SeqCst));
    }
}
