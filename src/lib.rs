//! A small, single-threaded event-driven I/O core.
//!
//! `cuti` unifies alarm deadlines and socket readiness behind one
//! blocking [`Scheduler::wait`] call, and layers two suspendable
//! buffers ([`AsyncInputBuffer`], [`AsyncOutputBuffer`]) and a
//! service-loop [`dispatcher`] on top. It owes its shape to `mio`: a
//! minimal readiness layer with exactly one backend compiled in per
//! target (`epoll`/`kqueue`/`poll`/`select`), no bundled async
//! runtime, and a `Callback`/`Ticket` vocabulary in place of mio's
//! `Token`/`Interest`/`Events` — here, a caller hands over a one-shot
//! closure instead of re-polling an event batch.
//!
//! # Feature flags
//!
//! - `os-poll` *(default)*: the [`Scheduler`] and [`selector`] types.
//!   Without it, only the callback/slab/list-arena/heap primitives are
//!   available, for targets with no readiness backend.
//! - `net` *(default, implies `os-poll`)*: the [`net`] module —
//!   [`net::TcpConnection`] and [`net::TcpAcceptor`].
//! - `signal`: the [`signal`] module, a self-pipe bridge from OS
//!   signals to a dispatcher control byte. Entirely optional; the
//!   dispatcher has no hard dependency on it.

mod callback;
mod error;
mod heap;
mod list_arena;
mod slab;
mod ticket;
mod time;

#[cfg(feature = "os-poll")]
mod scheduler;
#[cfg(feature = "os-poll")]
pub mod selector;

#[cfg(feature = "os-poll")]
pub mod io;

#[cfg(feature = "net")]
pub mod net;

#[cfg(feature = "os-poll")]
pub mod dispatcher;

#[cfg(all(feature = "signal", unix))]
pub mod signal;

pub use callback::Callback;
pub use error::{Error, ErrorKind};
pub use heap::IndexedHeap;
pub use list_arena::ListArena;
pub use ticket::Ticket;
pub use time::{Duration, TimePoint};

#[cfg(feature = "os-poll")]
pub use scheduler::Scheduler;
