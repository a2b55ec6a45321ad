//! Cancellation tickets (spec.md §3 "Cancellation ticket").
//!
//! A ticket names a pending registration within the scheduler: which
//! kind of queue it lives on (alarm heap, or one of the selector's two
//! event kinds) and its slot id within that queue. The empty ticket
//! denotes "no pending registration" and is the value returned before
//! anything has been armed.
//!
//! A ticket is valid from the moment the registering call returns
//! until either its callback fires (after which the id may have been
//! recycled for something else) or the ticket is passed to
//! [`crate::scheduler::Scheduler::cancel`]. Using a fired ticket is a
//! contract violation, exactly as in the original `cuti` source —
//! nothing here makes that misuse a compile error, since the ticket is
//! a plain value with no borrow tying it to the registration's
//! lifetime (matching `cancellation_ticket_t` in
//! `original_source/cuti/scheduler.hpp`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ticket {
    /// No pending registration.
    Empty,
    Alarm(i32),
    Writable(i32),
    Readable(i32),
}

impl Ticket {
    pub fn is_empty(self) -> bool {
        matches!(self, Ticket::Empty)
    }
}

impl Default for Ticket {
    fn default() -> Self {
        Ticket::Empty
    }
}
