//! Halflink Hardware Abstraction Layer
//!
//! This crate defines the serial peripheral interface the Halflink transport
//! is built on. A chip-specific HAL implements these traits over its UART
//! registers; the transport never touches registers directly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  halflink-protocol (transport, engine)  │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  halflink-hal (this crate - traits)     │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │  chip UART    │       │  mock::Mock-  │
//! │  driver       │       │  Serial (host)│
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`serial::SerialTx`] - byte transmit and data-register-empty status
//! - [`serial::SerialRx`] - byte receive and data-ready status
//! - [`serial::TxEmptyInterrupt`] - arm/disarm the data-register-empty interrupt
//!
//! Baud-rate divisors, parity, stop bits and frame size are configured by
//! the chip HAL before the transport takes over the peripheral.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod serial;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export key traits at crate root for convenience
pub use serial::{Serial, SerialRx, SerialTx, TxEmptyInterrupt};
