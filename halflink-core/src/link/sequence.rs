//! Frame sequence counters
//!
//! `incoming` is the id expected on the next frame from the peer, `outgoing`
//! the id stamped on the next frame this side sends. Both wrap modulo 256.

use portable_atomic::{AtomicU8, Ordering};

#[derive(Debug, Default)]
pub struct SequenceCounters {
    incoming: AtomicU8,
    outgoing: AtomicU8,
}

impl SequenceCounters {
    pub const fn new() -> Self {
        Self {
            incoming: AtomicU8::new(0),
            outgoing: AtomicU8::new(0),
        }
    }

    /// Next id expected from the peer
    pub fn incoming(&self) -> u8 {
        self.incoming.load(Ordering::Acquire)
    }

    /// Id for the next outbound frame
    pub fn outgoing(&self) -> u8 {
        self.outgoing.load(Ordering::Acquire)
    }

    /// `(outgoing, incoming)` read as one consistent pair
    pub fn snapshot(&self) -> (u8, u8) {
        critical_section::with(|_| (self.outgoing(), self.incoming()))
    }

    /// Count one fully processed inbound frame
    pub fn advance_incoming(&self) -> u8 {
        self.incoming.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    /// Take the id for an outbound frame and advance past it
    pub fn stamp_outgoing(&self) -> u8 {
        self.outgoing.fetch_add(1, Ordering::AcqRel)
    }

    /// Replace both counters at once
    pub fn adopt(&self, incoming: u8, outgoing: u8) {
        critical_section::with(|_| {
            self.incoming.store(incoming, Ordering::Release);
            self.outgoing.store(outgoing, Ordering::Release);
        });
    }

    pub fn reset(&self) {
        self.adopt(0, 0);
    }
}
