//! The Linux/Android/illumos/Redox backend: two one-shot `epoll`
//! instances (one per event kind) multiplexed through an outer
//! `poll()`.
//!
//! Ported from `original_source/cuti/cuti/epoll_selector.cpp`. A
//! single epoll instance could watch both `EPOLLIN` and `EPOLLOUT` on
//! the same fd, but cuti keeps the readable and writable watch sets in
//! separate instances so that canceling one direction never disturbs
//! the other's registration — this crate keeps that split.

use super::Event;
use crate::callback::Callback;
use crate::list_arena::ListArena;
use crate::time::Duration;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

struct Registration {
    fd: RawFd,
    callback: Callback,
}

struct EpollInstance {
    fd: OwnedFd,
}

impl EpollInstance {
    fn new() -> io::Result<Self> {
        // SAFETY: epoll_create1 returns a valid fd or -1.
        let fd = unsafe { OwnedFd::from_raw_fd(syscall!(epoll_create1(libc::EPOLL_CLOEXEC))?) };
        Ok(EpollInstance { fd })
    }

    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

pub struct EpollSelector {
    registrations: ListArena<Registration>,
    watched_list: i32,
    pending_list: i32,
    writable_instance: EpollInstance,
    readable_instance: EpollInstance,
}

impl EpollSelector {
    pub fn new() -> io::Result<Self> {
        let mut registrations = ListArena::new();
        let watched_list = registrations.add_list();
        let pending_list = registrations.add_list();
        Ok(EpollSelector {
            registrations,
            watched_list,
            pending_list,
            writable_instance: EpollInstance::new()?,
            readable_instance: EpollInstance::new()?,
        })
    }

    pub fn name(&self) -> &'static str {
        "epoll"
    }

    pub fn call_when_writable(&mut self, fd: RawFd, callback: Callback) -> i32 {
        self.make_ticket(fd, Event::Writable, callback)
            .expect("epoll_ctl(ADD) failed")
    }

    pub fn cancel_when_writable(&mut self, ticket: i32) -> Callback {
        let epoll_fd = self.writable_instance.as_raw_fd();
        self.cancel_ticket(ticket, epoll_fd)
    }

    pub fn call_when_readable(&mut self, fd: RawFd, callback: Callback) -> i32 {
        self.make_ticket(fd, Event::Readable, callback)
            .expect("epoll_ctl(ADD) failed")
    }

    pub fn cancel_when_readable(&mut self, ticket: i32) -> Callback {
        let epoll_fd = self.readable_instance.as_raw_fd();
        self.cancel_ticket(ticket, epoll_fd)
    }

    pub fn has_work(&self) -> bool {
        !self.registrations.list_empty(self.watched_list)
            || !self.registrations.list_empty(self.pending_list)
    }

    pub fn select(&mut self, timeout: Duration) -> io::Result<Option<Callback>> {
        assert!(self.has_work(), "Selector::select called with no work");

        if self.registrations.list_empty(self.pending_list) {
            let mut pollfds = [
                libc::pollfd {
                    fd: self.writable_instance.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: self.readable_instance.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                },
            ];

            let mut count = match syscall!(poll(
                pollfds.as_mut_ptr(),
                pollfds.len() as libc::nfds_t,
                timeout.as_millis_clamped(),
            )) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => 0,
                Err(e) => return Err(e),
            };

            for pollfd in pollfds.iter() {
                if count <= 0 {
                    break;
                }
                if pollfd.revents != 0 {
                    self.drain_epoll_instance(pollfd.fd)?;
                    count -= 1;
                }
            }
        }

        if self.registrations.list_empty(self.pending_list) {
            return Ok(None);
        }
        let ticket = self.registrations.first(self.pending_list);
        let callback = Callback::take(&mut self.registrations.value_mut(ticket).callback);
        self.registrations.remove_element(ticket);
        Ok(Some(callback))
    }

    fn make_ticket(&mut self, fd: RawFd, event: Event, callback: Callback) -> io::Result<i32> {
        let ticket = self
            .registrations
            .add_element_before(self.registrations.last(self.watched_list), Registration { fd, callback });

        let epoll_fd = match event {
            Event::Writable => self.writable_instance.as_raw_fd(),
            Event::Readable => self.readable_instance.as_raw_fd(),
        };

        let mut epoll_event = libc::epoll_event {
            events: match event {
                Event::Writable => libc::EPOLLOUT as u32,
                Event::Readable => libc::EPOLLIN as u32,
            },
            u64: ticket as u64,
        };

        if let Err(e) = syscall!(epoll_ctl(epoll_fd, libc::EPOLL_CTL_ADD, fd, &mut epoll_event)) {
            self.registrations.remove_element(ticket);
            return Err(e);
        }

        Ok(ticket)
    }

    fn drain_epoll_instance(&mut self, epoll_fd: RawFd) -> io::Result<()> {
        let mut events: [libc::epoll_event; 16] = unsafe { std::mem::zeroed() };
        let count = match syscall!(epoll_wait(epoll_fd, events.as_mut_ptr(), events.len() as i32, 0)) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => 0,
            Err(e) => return Err(e),
        };

        for epoll_event in events.iter().take(count as usize) {
            let ticket: i32 = epoll_event.u64.try_into().map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    "epoll_event.u64 does not fit in a ticket id",
                )
            })?;
            // fd was already removed from this epoll instance by the
            // EPOLL_ONESHOT-equivalent EPOLL_CTL_DEL below; no separate
            // arming step is needed before moving it to the pending list.
            let fd = self.registrations.value(ticket).fd;
            let _ = syscall!(epoll_ctl(epoll_fd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut()));
            self.registrations
                .move_element_before(self.registrations.last(self.pending_list), ticket);
        }
        Ok(())
    }

    fn cancel_ticket(&mut self, ticket: i32, epoll_fd: RawFd) -> Callback {
        let fd = self.registrations.value(ticket).fd;
        let _ = syscall!(epoll_ctl(epoll_fd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut()));
        let callback = Callback::take(&mut self.registrations.value_mut(ticket).callback);
        self.registrations.remove_element(ticket);
        callback
    }
}
