//! Link state shared between interrupt handlers and mainline code
//!
//! Defines the status register and the sequence counters. Every compound
//! read-modify-write on either runs inside a critical section.

pub mod sequence;
pub mod status;

pub use sequence::SequenceCounters;
pub use status::{LinkFlags, LinkStatus};
