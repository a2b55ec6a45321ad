//! The `select`-based backend: used on Windows (where `select` — with
//! the `fd_set` chaining trick below — is cuti's only portable
//! multiplexer) and, on any POSIX target, behind
//! `cuti_force_select_selector`.
//!
//! Ported from `original_source/cuti/select_selector.cpp`.

use super::Event;
use crate::callback::Callback;
use crate::list_arena::ListArena;
use crate::time::Duration;
use std::io;

struct Registration {
    fd: RawFdLike,
    event: Event,
    callback: Callback,
}

pub struct SelectSelector {
    registrations: ListArena<Registration>,
    watched_list: i32,
    pending_list: i32,
}

impl SelectSelector {
    pub fn new() -> io::Result<Self> {
        let mut registrations = ListArena::new();
        let watched_list = registrations.add_list();
        let pending_list = registrations.add_list();
        Ok(SelectSelector {
            registrations,
            watched_list,
            pending_list,
        })
    }

    pub fn name(&self) -> &'static str {
        "select"
    }

    pub fn call_when_writable(&mut self, fd: RawFdLike, callback: Callback) -> i32 {
        self.make_ticket(fd, Event::Writable, callback)
    }

    pub fn cancel_when_writable(&mut self, ticket: i32) -> Callback {
        self.cancel_ticket(ticket)
    }

    pub fn call_when_readable(&mut self, fd: RawFdLike, callback: Callback) -> i32 {
        self.make_ticket(fd, Event::Readable, callback)
    }

    pub fn cancel_when_readable(&mut self, ticket: i32) -> Callback {
        self.cancel_ticket(ticket)
    }

    pub fn has_work(&self) -> bool {
        !self.registrations.list_empty(self.watched_list) || !self.registrations.list_empty(self.pending_list)
    }

    pub fn select(&mut self, timeout: Duration) -> io::Result<Option<Callback>> {
        assert!(self.has_work(), "Selector::select called with no work");

        if self.registrations.list_empty(self.pending_list) {
            let mut infds = FdSet::empty();
            let mut outfds = FdSet::empty();
            let mut max_fd: RawFdLike = 0;

            let mut ticket = self.registrations.first(self.watched_list);
            while ticket != self.registrations.last(self.watched_list) {
                let registration = self.registrations.value(ticket);
                match registration.event {
                    Event::Readable => infds.set(registration.fd)?,
                    Event::Writable => outfds.set(registration.fd)?,
                }
                max_fd = max_fd.max(registration.fd);
                ticket = self.registrations.next(ticket);
            }

            let mut count = raw_select(max_fd, &mut infds, &mut outfds, timeout)?;

            let mut ticket = self.registrations.first(self.watched_list);
            while count > 0 && ticket != self.registrations.last(self.watched_list) {
                let next = self.registrations.next(ticket);
                let registration = self.registrations.value(ticket);
                let is_set = match registration.event {
                    Event::Readable => infds.is_set(registration.fd),
                    Event::Writable => outfds.is_set(registration.fd),
                };
                if is_set {
                    self.registrations
                        .move_element_before(self.registrations.last(self.pending_list), ticket);
                    count -= 1;
                }
                ticket = next;
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

    fn make_ticket(&mut self, fd: RawFdLike, event: Event, callback: Callback) -> i32 {
        self.registrations.add_element_before(
            self.registrations.last(self.watched_list),
            Registration { fd, event, callback },
        )
    }

    fn cancel_ticket(&mut self, ticket: i32) -> Callback {
        let callback = Callback::take(&mut self.registrations.value_mut(ticket).callback);
        self.registrations.remove_element(ticket);
        callback
    }
}

#[cfg(unix)]
pub type RawFdLike = std::os::fd::RawFd;
#[cfg(windows)]
pub type RawFdLike = windows_sys::Win32::Networking::WinSock::SOCKET;

/// On POSIX, a plain `libc::fd_set` (bitmask, bounded by `FD_SETSIZE`).
#[cfg(unix)]
struct FdSet(libc::fd_set);

#[cfg(unix)]
impl FdSet {
    fn empty() -> Self {
        let mut raw: libc::fd_set = unsafe { std::mem::zeroed() };
        unsafe { libc::FD_ZERO(&mut raw) };
        FdSet(raw)
    }

    fn set(&mut self, fd: RawFdLike) -> io::Result<()> {
        if fd >= libc::FD_SETSIZE as RawFdLike {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "fd exceeds FD_SETSIZE for the select() backend",
            ));
        }
        unsafe { libc::FD_SET(fd, &mut self.0) };
        Ok(())
    }

    fn is_set(&self, fd: RawFdLike) -> bool {
        unsafe { libc::FD_ISSET(fd, &self.0) }
    }

    fn as_mut_ptr(&mut self) -> *mut libc::fd_set {
        &mut self.0
    }
}

#[cfg(unix)]
fn raw_select(max_fd: RawFdLike, infds: &mut FdSet, outfds: &mut FdSet, timeout: Duration) -> io::Result<i32> {
    let mut errfds = FdSet::empty();
    let millis = timeout.as_millis_clamped();
    let mut tv = libc::timeval {
        tv_sec: (millis / 1000) as libc::time_t,
        tv_usec: (millis % 1000) * 1000,
    };
    let tv_ptr = if millis < 0 { std::ptr::null_mut() } else { &mut tv as *mut _ };

    let count = unsafe {
        libc::select(
            (max_fd + 1) as libc::c_int,
            infds.as_mut_ptr(),
            outfds.as_mut_ptr(),
            errfds.as_mut_ptr(),
            tv_ptr,
        )
    };
    if count < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(0);
        }
        return Err(err);
    }
    Ok(count)
}

/// On Windows, `fd_set` is `{ count: u32, sockets: [SOCKET; FD_SETSIZE] }`
/// — a length-prefixed array, not a bitmask. A buffer shaped like a
/// longer `fd_set` (more trailing `SOCKET` slots than `FD_SETSIZE`) is
/// therefore a valid `fd_set*` for any `count` up to the buffer's
/// actual capacity; this is the "fd_set impersonation" trick from
/// `original_source/cuti/select_selector.cpp`, used here to lift the
/// 64-socket limit `FD_SETSIZE` would otherwise impose.
#[cfg(windows)]
const FD_SET_HEADER_BYTES: usize = 8; // u32 fd_count + 4 bytes padding to SOCKET alignment

/// Backs a Windows `fd_set` with a buffer laid out the same way —
/// `{ fd_count: u32, fd_array: [SOCKET; N] }` — but with room for more
/// than the header's nominal `FD_SETSIZE` (64) sockets. `select()`
/// only ever reads `fd_count` entries of `fd_array`, so a longer
/// backing buffer reinterpreted as `*mut FD_SET` is accepted by
/// WinSock without modification; this is the documented
/// `fd_set`-impersonation trick.
#[cfg(windows)]
struct FdSet {
    sockets: Vec<windows_sys::Win32::Networking::WinSock::SOCKET>,
    buffer: Vec<u8>,
}

#[cfg(windows)]
impl FdSet {
    fn empty() -> Self {
        FdSet {
            sockets: Vec::new(),
            buffer: Vec::new(),
        }
    }

    fn set(&mut self, fd: RawFdLike) -> io::Result<()> {
        if !self.sockets.contains(&fd) {
            self.sockets.push(fd);
        }
        Ok(())
    }

    fn is_set(&self, fd: RawFdLike) -> bool {
        self.sockets.contains(&fd)
    }

    /// Serializes `sockets` into the `{ fd_count, fd_array[] }` layout
    /// and returns a pointer to it, valid until the next call.
    fn as_fd_set_ptr(&mut self) -> *mut windows_sys::Win32::Networking::WinSock::FD_SET {
        use std::mem::size_of;
        type Socket = windows_sys::Win32::Networking::WinSock::SOCKET;

        let needed = FD_SET_HEADER_BYTES + self.sockets.len() * size_of::<Socket>();
        self.buffer.clear();
        self.buffer.resize(needed, 0);

        self.buffer[0..4].copy_from_slice(&(self.sockets.len() as u32).to_ne_bytes());
        let array_start = FD_SET_HEADER_BYTES;
        for (i, socket) in self.sockets.iter().enumerate() {
            let offset = array_start + i * size_of::<Socket>();
            self.buffer[offset..offset + size_of::<Socket>()]
                .copy_from_slice(&socket.to_ne_bytes());
        }

        // SAFETY: `buffer` is laid out exactly like a Windows `fd_set`
        // with `sockets.len()` entries (<= the buffer's real
        // capacity), which is all WinSock's `select` reads or writes.
        self.buffer.as_mut_ptr() as *mut windows_sys::Win32::Networking::WinSock::FD_SET
    }

    /// After `select()` has written through the pointer from
    /// [`FdSet::as_fd_set_ptr`], re-reads `fd_count` and the leading
    /// sockets out of `buffer` so `is_set` reflects which of the
    /// originally-submitted sockets are actually ready.
    fn sync_from_buffer(&mut self) {
        use std::mem::size_of;
        type Socket = windows_sys::Win32::Networking::WinSock::SOCKET;

        let count = u32::from_ne_bytes(self.buffer[0..4].try_into().unwrap()) as usize;
        self.sockets.clear();
        for i in 0..count {
            let offset = FD_SET_HEADER_BYTES + i * size_of::<Socket>();
            let socket = Socket::from_ne_bytes(
                self.buffer[offset..offset + size_of::<Socket>()].try_into().unwrap(),
            );
            self.sockets.push(socket);
        }
    }
}

#[cfg(windows)]
fn raw_select(_max_fd: RawFdLike, infds: &mut FdSet, outfds: &mut FdSet, timeout: Duration) -> io::Result<i32> {
    use windows_sys::Win32::Networking::WinSock;

    let mut errfds = FdSet::empty();
    let millis = timeout.as_millis_clamped();
    let mut tv = WinSock::TIMEVAL {
        tv_sec: millis / 1000,
        tv_usec: millis % 1000 * 1000,
    };
    let tv_ptr = if millis < 0 { std::ptr::null() } else { &tv as *const _ };

    let count = unsafe {
        WinSock::select(
            0,
            infds.as_fd_set_ptr(),
            outfds.as_fd_set_ptr(),
            errfds.as_fd_set_ptr(),
            tv_ptr,
        )
    };
    if count == WinSock::SOCKET_ERROR {
        return Err(io::Error::last_os_error());
    }
    infds.sync_from_buffer();
    outfds.sync_from_buffer();
    Ok(count)
}

#[cfg(all(test, unix))]
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
        let mut selector = SelectSelector::new().unwrap();

        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        selector.call_when_readable(a.as_raw_fd(), Callback::new(move || fired2.store(true, Ordering::SeqCst)));

        use std::io::Write;
        b.write_all(b"x").unwrap();

        let callback = selector.select(Duration::from_millis(1000)).unwrap().unwrap();
        callback.call();
        assert!(fired.load(Ordering::SeqCst));
    }
}
