//! Interrupt-shared state for the Halflink transport
//!
//! This crate contains the pieces of the link that both interrupt handlers
//! and mainline code touch, independent of framing:
//!
//! - Fixed-capacity byte ring buffer
//! - Link status register (atomic bitset with critical-section updates)
//! - Incoming/outgoing sequence counters
//! - Link configuration
//! - Error and alert types

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod link;
pub mod queue;

pub use config::{FrameDispatch, LinkConfig, DEFAULT_FORCE_SPIN_LIMIT};
pub use error::{Error, LinkAlert};
pub use link::{LinkFlags, LinkStatus, SequenceCounters};
pub use queue::{RingBuffer, QUEUE_SIZE};
