//! Self-pipe bridge from OS signals to the dispatcher's control byte.
//!
//! Grounded on `original_source/cuti/signal_handler.hpp`/`.cpp`, with
//! one deliberate narrowing: the C++ original invokes an arbitrary
//! user callback directly from signal context. That's not
//! async-signal-safe for anything beyond the handful of syscalls POSIX
//! allows inside a handler, so this port keeps the handler itself to
//! a single `write(2)` of the signal number — the self-pipe trick
//! `signal_hook` is itself built on — and lets ordinary, non-signal
//! code (the dispatcher, via [`Source::read`]) react to it.
//!
//! Installing a signal handler is *signal installation*, which
//! spec.md's Non-goals explicitly exclude as a feature. But
//! [`crate::dispatcher::run`] needs something to drive its control
//! byte in a real binary, so [`install_shutdown_signal`] is offered as
//! a minimal, opt-in convenience. Nothing requires it: a caller can
//! always write the control byte itself, or skip this module entirely
//! by not enabling the `signal` feature.
//!
//! Unix only, matching `libc/extra_traits` (the feature this module is
//! gated on). The original notes that only `SIGINT` is supported under
//! Windows via `SetConsoleCtrlHandler`, a mechanism with no
//! `Source`-shaped equivalent; porting that is left for another day.

use crate::callback::Callback;
use crate::io::{ReadOutcome, Source};
use crate::scheduler::Scheduler;
use crate::selector::Descriptor;
use crate::ticket::Ticket;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicI32, Ordering};

/// One past the highest signal number this module will bridge,
/// matching `n_sigs` in `original_source/cuti/signal_handler.cpp`.
const MAX_SIGNALS: usize = 32;

const NO_FD: AtomicI32 = AtomicI32::new(-1);
static WRITE_FDS: [AtomicI32; MAX_SIGNALS] = [NO_FD; MAX_SIGNALS];

extern "C" fn handler(sig: libc::c_int) {
    if (0..MAX_SIGNALS as libc::c_int).contains(&sig) {
        let fd = WRITE_FDS[sig as usize].load(Ordering::SeqCst);
        if fd >= 0 {
            let byte = sig as u8;
            // SAFETY: `write` is on the short list of functions POSIX
            // guarantees are safe to call from a signal handler. A
            // short write can't happen for a single byte, and we
            // deliberately ignore the error: there is nothing a
            // signal handler can usefully do about one.
            unsafe {
                libc::write(fd, &byte as *const u8 as *const libc::c_void, 1);
            }
        }
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let r = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if r < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// A pipe whose read end is woken by one or more OS signals, and whose
/// write end a `sigaction` handler writes the signal number to.
///
/// At most one `SignalListener` may be alive per signal number at a
/// time (mirroring the original's `curr_impls` restriction); installing
/// a second one for an already-bridged signal replaces the first
/// silently at the OS level, which is why `install` takes exclusive
/// ownership of the signal numbers it's given.
pub struct SignalListener {
    sigs: Vec<(libc::c_int, libc::sigaction)>,
    read_fd: OwnedFd,
}

impl SignalListener {
    /// Bridges every signal in `sigs` to the listener's read end.
    pub fn install(sigs: &[libc::c_int]) -> io::Result<Self> {
        for &sig in sigs {
            if !(0..MAX_SIGNALS as libc::c_int).contains(&sig) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("SignalListener: unsupported signal {sig}"),
                ));
            }
        }

        let mut fds = [0 as RawFd; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let read_fd = unsafe { OwnedFd::from_raw_fd(fds[0]) };
        let write_fd = fds[1];
        set_nonblocking(read_fd.as_raw_fd())?;
        set_nonblocking(write_fd)?;

        let mut installed = Vec::with_capacity(sigs.len());
        for &sig in sigs {
            WRITE_FDS[sig as usize].store(write_fd, Ordering::SeqCst);

            let mut new_action: libc::sigaction = unsafe { std::mem::zeroed() };
            new_action.sa_sigaction = handler as usize;
            unsafe { libc::sigemptyset(&mut new_action.sa_mask) };
            new_action.sa_flags = libc::SA_RESTART;

            let mut prev_action: libc::sigaction = unsafe { std::mem::zeroed() };
            if unsafe { libc::sigaction(sig, &new_action, &mut prev_action) } != 0 {
                let err = io::Error::last_os_error();
                for (sig, prev) in installed {
                    unsafe { libc::sigaction(sig, &prev, std::ptr::null_mut()) };
                    WRITE_FDS[sig as usize].store(-1, Ordering::SeqCst);
                }
                unsafe { libc::close(write_fd) };
                return Err(err);
            }
            installed.push((sig, prev_action));
        }

        Ok(SignalListener {
            sigs: installed,
            read_fd,
        })
    }

    fn descriptor(&self) -> Descriptor {
        self.read_fd.as_raw_fd()
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        let write_fd = self
            .sigs
            .first()
            .map(|_| WRITE_FDS[self.sigs[0].0 as usize].load(Ordering::SeqCst))
            .unwrap_or(-1);
        for (sig, prev) in &self.sigs {
            unsafe { libc::sigaction(*sig, prev, std::ptr::null_mut()) };
            WRITE_FDS[*sig as usize].store(-1, Ordering::SeqCst);
        }
        if write_fd >= 0 {
            unsafe { libc::close(write_fd) };
        }
    }
}

impl Source for SignalListener {
    fn call_when_readable(&self, scheduler: &mut Scheduler, cb: Callback) -> Ticket {
        scheduler.call_when_readable(self.descriptor(), cb)
    }

    fn read(&self, buf: &mut [u8]) -> (ReadOutcome, i32) {
        let fd = self.descriptor();
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n > 0 {
            (ReadOutcome::Data(n as usize), 0)
        } else if n == 0 {
            (ReadOutcome::Eof, 0)
        } else {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                (ReadOutcome::WouldBlock, 0)
            } else {
                (ReadOutcome::Eof, err.raw_os_error().unwrap_or(-1))
            }
        }
    }
}

/// Installs `SIGINT` and `SIGTERM` as shutdown triggers for
/// [`crate::dispatcher::run`]: either signal writes a non-zero byte to
/// the returned listener, which `run` reads as its control connection.
///
/// ```no_run
/// # fn main() -> std::io::Result<()> {
/// let mut scheduler = cuti::Scheduler::new()?;
/// let control = cuti::signal::install_shutdown_signal()?;
/// cuti::dispatcher::run(&mut scheduler, control)?;
/// # Ok(())
/// # }
/// ```
pub fn install_shutdown_signal() -> io::Result<SignalListener> {
    SignalListener::install(&[libc::SIGINT, libc::SIGTERM])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use crate::time::TimePoint;

    #[test]
    fn raising_a_bridged_signal_makes_the_listener_readable() {
        let listener = SignalListener::install(&[libc::SIGUSR1]).unwrap();
        unsafe { libc::raise(libc::SIGUSR1) };

        let mut scheduler = Scheduler::new().unwrap();
        let fired = std::rc::Rc::new(std::cell::Cell::new(false));
        let fired2 = fired.clone();
        listener.call_when_readable(
            &mut scheduler,
            Callback::new(move || fired2.set(true)),
        );

        // Give the signal a moment to land if delivery is deferred.
        let deadline = TimePoint::now() + crate::time::Duration::from_millis(1000);
        while !fired.get() && TimePoint::now() < deadline {
            scheduler.wait().unwrap().map(|cb| cb.call());
        }

        assert!(fired.get());
        let mut buf = [0u8; 1];
        assert!(matches!(listener.read(&mut buf), (ReadOutcome::Data(1), 0)));
        assert_eq!(buf[0], libc::SIGUSR1 as u8);
    }

    #[test]
    fn rejects_out_of_range_signal_numbers() {
        assert!(SignalListener::install(&[MAX_SIGNALS as libc::c_int]).is_err());
    }
}
