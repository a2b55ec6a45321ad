// Not all functions are used by every integration test.
#![allow(dead_code)]

use std::sync::Once;

use cuti::net::TcpConnection;
use cuti::Scheduler;

pub fn init() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        env_logger::try_init().expect("unable to initialise logger");
    })
}

pub fn init_with_scheduler() -> Scheduler {
    init();
    Scheduler::new().expect("unable to create Scheduler instance")
}

/// A connected loopback pair, handed to tests so they don't each
/// reimplement `TcpAcceptor::bind` + `TcpConnection::connect`.
pub fn connected_pair() -> (TcpConnection, TcpConnection) {
    TcpConnection::connected_pair().expect("unable to create connected pair")
}

/// A pseudo-random byte string of length `len`, deterministic across
/// runs (xorshift, not a real CSPRNG — just enough variety to exercise
/// a transfer path byte-for-byte without the weight of a `rand` dep).
pub fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed | 1;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.push((state & 0xff) as u8);
    }
    out
}
