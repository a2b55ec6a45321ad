//! The portable Unix fallback backend: one `pollfd` per registration.
//!
//! Ported from `original_source/cuti/poll_selector.cpp`. Used on Unix
//! targets with neither `epoll` nor `kqueue`, or unconditionally when
//! `cuti_force_poll_selector` is set (handy for exercising this path
//! on Linux in tests).

use crate::callback::Callback;
use crate::list_arena::ListArena;
use crate::time::Duration;
use std::io;
use std::os::fd::RawFd;

const INACTIVE: libc::pollfd = libc::pollfd {
    fd: -1,
    events: 0,
    revents: 0,
};

struct Registration {
    callback: Callback,
}

pub struct PollSelector {
    callbacks: ListArena<Registration>,
    watched_list: i32,
    pending_list: i32,
    /// Indexed by the ids handed out by `callbacks`.
    pollfds: Vec<libc::pollfd>,
}

impl PollSelector {
    pub fn new() -> io::Result<Self> {
        let mut callbacks = ListArena::new();
        let watched_list = callbacks.add_list();
        let pending_list = callbacks.add_list();
        Ok(PollSelector {
            callbacks,
            watched_list,
            pending_list,
            pollfds: Vec::new(),
        })
    }

    pub fn name(&self) -> &'static str {
        "poll"
    }

    pub fn call_when_writable(&mut self, fd: RawFd, callback: Callback) -> i32 {
        self.make_ticket(fd, libc::POLLOUT, callback)
    }

    pub fn cancel_when_writable(&mut self, ticket: i32) -> Callback {
        self.cancel_ticket(ticket)
    }

    pub fn call_when_readable(&mut self, fd: RawFd, callback: Callback) -> i32 {
        self.make_ticket(fd, libc::POLLIN, callback)
    }

    pub fn cancel_when_readable(&mut self, ticket: i32) -> Callback {
        self.cancel_ticket(ticket)
    }

    pub fn has_work(&self) -> bool {
        !self.callbacks.list_empty(self.watched_list) || !self.callbacks.list_empty(self.pending_list)
    }

    pub fn select(&mut self, timeout: Duration) -> io::Result<Option<Callback>> {
        assert!(self.has_work(), "Selector::select called with no work");

        if self.callbacks.list_empty(self.pending_list) {
            let mut count = match syscall!(poll(
                self.pollfds.as_mut_ptr(),
                self.pollfds.len() as libc::nfds_t,
                timeout.as_millis_clamped(),
            )) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => 0,
                Err(e) => return Err(e),
            };

            let mut ticket = self.callbacks.first(self.watched_list);
            while count > 0 && ticket != self.callbacks.last(self.watched_list) {
                let next = self.callbacks.next(ticket);
                let slot = &mut self.pollfds[ticket as usize];
                if slot.revents != 0 {
                    *slot = INACTIVE;
                    self.callbacks
                        .move_element_before(self.callbacks.last(self.pending_list), ticket);
                    count -= 1;
                }
                ticket = next;
            }
        }

        if self.callbacks.list_empty(self.pending_list) {
            return Ok(None);
        }
        let ticket = self.callbacks.first(self.pending_list);
        let callback = Callback::take(&mut self.callbacks.value_mut(ticket).callback);
        self.callbacks.remove_element(ticket);
        Ok(Some(callback))
    }

    fn make_ticket(&mut self, fd: RawFd, events: i16, callback: Callback) -> i32 {
        let ticket = self
            .callbacks
            .add_element_before(self.callbacks.last(self.watched_list), Registration { callback });

        let min_size = ticket as usize + 1;
        while self.pollfds.len() < min_size {
            self.pollfds.push(INACTIVE);
        }
        self.pollfds[ticket as usize] = libc::pollfd {
            fd,
            events,
            revents: 0,
        };

        ticket
    }

    fn cancel_ticket(&mut self, ticket: i32) -> Callback {
        self.pollfds[ticket as usize] = INACTIVE;
        let callback = Callback::take(&mut self.callbacks.value_mut(ticket).callback);
        self.callbacks.remove_element(ticket);
        callback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsRawFd as _;
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn readable_fires_when_peer_writes() {
        let (a, mut b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let mut selector = PollSelector::new().unwrap();

        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        selector.call_when_readable(a.as_raw_fd(), Callback::new(move || fired2.store(true, Ordering::SeqCst)));

        use std::io::Write;
        b.write_all(b"x").unwrap();

        let callback = selector.select(Duration::from_millis(1000)).unwrap().unwrap();
        callback.call();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_prevents_later_fire() {
        let (a, _b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let mut selector = PollSelector::new().unwrap();
        let ticket = selector.call_when_writable(a.as_raw_fd(), Callback::new(|| panic!("should not fire")));
        let cb = selector.cancel_when_writable(ticket);
        assert!(cb.is_some());
        assert!(!selector.has_work());
    }
}
