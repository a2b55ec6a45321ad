//! The drain-one-callback service loop (spec.md §4.9).
//!
//! ```text
//! while signal == 0:
//!     cb := scheduler.wait()
//!     if cb == null: break
//!     cb()
//! ```
//! A control connection is armed once at start; when a non-zero byte
//! arrives on it, the dispatcher treats that byte as the shutdown
//! signal and returns once the scheduler callback that read it has
//! run. The byte is written by an external collaborator — typically
//! [`crate::signal::install_shutdown_signal`] — which the core itself
//! has no hard dependency on (daemonization and signal installation
//! are Non-goals, spec.md §1): nothing stops a caller from writing the
//! control byte itself.

use crate::callback::{Callback, SendPtr};
use crate::io::{ReadOutcome, Source};
use crate::scheduler::Scheduler;
use std::io;

/// Runs `scheduler` to completion, draining one callback at a time,
/// until it has no more work. No control connection is involved;
/// callers that manage their own shutdown (e.g. by canceling every
/// outstanding ticket directly) use this instead of [`run`].
pub fn run_until_idle(scheduler: &mut Scheduler) -> io::Result<()> {
    while let Some(cb) = scheduler.wait()? {
        cb.call();
    }
    Ok(())
}

struct ControlState<S> {
    control: S,
    shutdown: bool,
}

/// Runs `scheduler`, draining callbacks, watching `control` for a
/// single non-zero shutdown byte.
///
/// EOF on the control connection is treated the same as a shutdown
/// signal: there is no one left to signal a clean shutdown, so there
/// is nothing left to wait for. A zero byte is a no-op heartbeat that
/// just re-arms the watch.
pub fn run<S: Source + 'static>(scheduler: &mut Scheduler, control: S) -> io::Result<()> {
    let mut state = ControlState {
        control,
        shutdown: false,
    };
    arm_control(scheduler, &mut state);

    while !state.shutdown {
        match scheduler.wait()? {
            Some(cb) => cb.call(),
            None => break,
        }
    }
    Ok(())
}

fn arm_control<S: Source + 'static>(scheduler: &mut Scheduler, state: &mut ControlState<S>) {
    let state_ptr = SendPtr(state as *mut ControlState<S>);
    let scheduler_ptr = SendPtr(scheduler as *mut Scheduler);

    state.control.call_when_readable(
        scheduler,
        Callback::new(move || {
            // SAFETY: `state` and `scheduler` both outlive every
            // callback `run` dispatches — `run` holds `state` on its
            // own stack frame and doesn't return until the scheduler
            // reports no more work, and this closure only ever runs
            // from inside that loop.
            let state = unsafe { &mut *state_ptr.0 };
            let mut byte = [0u8; 1];
            match state.control.read(&mut byte) {
                (ReadOutcome::Data(1), _) if byte[0] != 0 => state.shutdown = true,
                (ReadOutcome::Eof, _) => state.shutdown = true,
                _ => {
                    let scheduler = unsafe { &mut *scheduler_ptr.0 };
                    arm_control(scheduler, state);
                }
            }
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Sink;
    use crate::net::TcpConnection;

    #[test]
    fn run_until_idle_drains_and_returns() {
        let mut scheduler = Scheduler::new().unwrap();
        let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let o1 = order.clone();
        scheduler.call_alarm(
            crate::time::TimePoint::now(),
            Callback::new(move || o1.lock().unwrap().push(1)),
        );
        run_until_idle(&mut scheduler).unwrap();
        assert_eq!(*order.lock().unwrap(), vec![1]);
    }

    #[test]
    fn shutdown_byte_on_control_stops_the_loop() {
        let mut scheduler = Scheduler::new().unwrap();
        let (client, server) = TcpConnection::connected_pair().unwrap();

        let (outcome, status) = client.write(&[7]);
        assert_eq!(status, 0);
        assert!(matches!(outcome, crate::io::WriteOutcome::Written(1)));

        run(&mut scheduler, server).unwrap();
        drop(client);
    }

    #[test]
    fn eof_on_control_stops_the_loop() {
        let mut scheduler = Scheduler::new().unwrap();
        let (client, server) = TcpConnection::connected_pair().unwrap();
        client.close_write().unwrap();
        drop(client);

        run(&mut scheduler, server).unwrap();
    }

    #[test]
    fn zero_byte_heartbeat_does_not_stop_the_loop() {
        let mut scheduler = Scheduler::new().unwrap();
        let (client, server) = TcpConnection::connected_pair().unwrap();

        client.write(&[0]);
        let fired = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fired2 = fired.clone();
        scheduler.call_alarm(
            crate::time::TimePoint::now(),
            Callback::new(move || fired2.store(true, std::sync::atomic::Ordering::SeqCst)),
        );
        client.close_write().unwrap();
        drop(client);

        run(&mut scheduler, server).unwrap();
        assert!(fired.load(std::sync::atomic::Ordering::SeqCst));
    }
}
