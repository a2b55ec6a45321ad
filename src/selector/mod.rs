//! Platform readiness backends (spec.md §4.4).
//!
//! A selector multiplexes an arbitrary number of `{fd, Writable |
//! Readable}` registrations behind one blocking wait call. Exactly one
//! backend is compiled in per target, selected the same way `mio`
//! chooses its `sys::unix::selector` module (see
//! `examples/tokio-rs-mio/src/sys/unix/selector/mod.rs`): the chosen
//! backend's type is re-exported as `Selector` under a single name, so
//! every call site above this module is backend-agnostic without a
//! runtime enum or `dyn` indirection.
//!
//! - Linux/Android/illumos/Redox: `epoll` — two epoll instances plus an
//!   outer `poll`, grounded on
//!   `original_source/cuti/cuti/epoll_selector.cpp`.
//! - BSD family (macOS/FreeBSD/NetBSD/OpenBSD/Dragonfly/iOS): `kqueue`,
//!   grounded on `original_source/cuti/kqueue_selector.cpp`.
//! - Any other Unix, or opt-in via the `cuti_force_poll_selector` cfg
//!   (mirroring mio's `mio_unsupported_force_poll_poll`): `poll`,
//!   grounded on `original_source/cuti/poll_selector.cpp`.
//! - Windows, or opt-in via `cuti_force_select_selector`: `select`,
//!   grounded on `original_source/cuti/select_selector.cpp`.

macro_rules! syscall {
    ($fn:ident ( $($arg:expr),* $(,)* ) ) => {{
        let res = unsafe { libc::$fn($($arg, )*) };
        if res == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

/// The event kind a registration is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    Writable,
    Readable,
}

/// An opaque OS handle for a pollable channel (spec.md §3
/// "Descriptor"): a `RawFd` on Unix, a `SOCKET` on Windows.
#[cfg(unix)]
pub type Descriptor = std::os::fd::RawFd;

/// An opaque OS handle for a pollable channel (spec.md §3
/// "Descriptor"): a `RawFd` on Unix, a `SOCKET` on Windows.
#[cfg(windows)]
pub type Descriptor = windows_sys::Win32::Networking::WinSock::SOCKET;

#[cfg(all(
    not(cuti_force_poll_selector),
    not(cuti_force_select_selector),
    any(
        target_os = "android",
        target_os = "illumos",
        target_os = "linux",
        target_os = "redox",
    )
))]
mod epoll;

#[cfg(all(
    not(cuti_force_poll_selector),
    not(cuti_force_select_selector),
    any(
        target_os = "android",
        target_os = "illumos",
        target_os = "linux",
        target_os = "redox",
    )
))]
pub use self::epoll::EpollSelector as Selector;

#[cfg(all(
    not(cuti_force_poll_selector),
    not(cuti_force_select_selector),
    any(
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "ios",
        target_os = "macos",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "tvos",
        target_os = "watchos",
    )
))]
mod kqueue;

#[cfg(all(
    not(cuti_force_poll_selector),
    not(cuti_force_select_selector),
    any(
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "ios",
        target_os = "macos",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "tvos",
        target_os = "watchos",
    )
))]
pub use self::kqueue::KqueueSelector as Selector;

#[cfg(all(
    unix,
    not(cuti_force_select_selector),
    any(
        cuti_force_poll_selector,
        not(any(
            target_os = "android",
            target_os = "illumos",
            target_os = "linux",
            target_os = "redox",
            target_os = "dragonfly",
            target_os = "freebsd",
            target_os = "ios",
            target_os = "macos",
            target_os = "netbsd",
            target_os = "openbsd",
            target_os = "tvos",
            target_os = "watchos",
        ))
    )
))]
mod poll;

#[cfg(all(
    unix,
    not(cuti_force_select_selector),
    any(
        cuti_force_poll_selector,
        not(any(
            target_os = "android",
            target_os = "illumos",
            target_os = "linux",
            target_os = "redox",
            target_os = "dragonfly",
            target_os = "freebsd",
            target_os = "ios",
            target_os = "macos",
            target_os = "netbsd",
            target_os = "openbsd",
            target_os = "tvos",
            target_os = "watchos",
        ))
    )
))]
pub use self::poll::PollSelector as Selector;

#[cfg(any(windows, cuti_force_select_selector))]
mod select;

#[cfg(any(windows, cuti_force_select_selector))]
pub use self::select::SelectSelector as Selector;

// Every backend implements the same inherent surface (spec.md §4.4):
//
//   fn new() -> io::Result<Self>
//   fn name(&self) -> &'static str
//   fn call_when_writable(&mut self, fd: RawFd, callback: Callback) -> i32
//   fn cancel_when_writable(&mut self, ticket: i32) -> Callback
//   fn call_when_readable(&mut self, fd: RawFd, callback: Callback) -> i32
//   fn cancel_when_readable(&mut self, ticket: i32) -> Callback
//   fn has_work(&self) -> bool
//   fn select(&mut self, timeout: Duration) -> io::Result<Option<Callback>>
//
// kept as a plain comment rather than a `trait Selector`: each target
// compiles in exactly one backend, so there is never a call site
// generic over more than one.
