//! TCP adapter binding socket readiness to the async buffers (spec.md
//! §4.8), plus a listener-readiness adapter for the dispatcher (spec.md
//! §4.9 "the dispatcher needs something to accept connections on").
//!
//! Ported from `original_source/cuti/cuti/tcp_connection.hpp`/`.cpp`
//! and `original_source/cuti/cuti/tcp_acceptor.*`. TCP socket
//! primitives below the selector abstraction are out of scope for the
//! distilled spec (§1 Non-goals); this module is the thin seam where
//! `std::net::TcpStream`/`TcpListener` meet [`Source`](crate::io::Source)
//! and [`Sink`](crate::io::Sink).

mod tcp;

pub use tcp::{TcpAcceptor, TcpConnection};
