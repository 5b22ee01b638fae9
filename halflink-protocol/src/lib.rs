//! Halflink Command Protocol
//!
//! Framed, half-duplex command/response traffic over one byte-oriented serial
//! port, driven entirely from the port's interrupts. Either end can tell the
//! other to pause when its receive queue fills, and both ends number their
//! frames so a lost or duplicated frame is noticed and repaired.
//!
//! # Wire Format
//!
//! ```text
//! ┌────────┬──────────┬──────────────┬─────┐
//! │ OPCODE │ SEQUENCE │ PAYLOAD      │ END │
//! │ 1B     │ 0-1B     │ 0-4B         │ 1B  │
//! └────────┴──────────┴──────────────┴─────┘
//! ```
//!
//! The sequence byte is present only when numbering is enabled. Payload length
//! is implicit and nothing is escaped.
//!
//! # Control Frames
//!
//! | Opcode | Name   | Payload            |
//! |--------|--------|--------------------|
//! | 0x01   | WAIT   | none               |
//! | 0x06   | ACK    | none               |
//! | 0x11   | RESUME | outgoing, incoming |
//! | 0x16   | RESYNC | outgoing, incoming |
//!
//! Control frames are consumed by the [`Engine`]; everything else goes to the
//! application's [`MessageHandler`].

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod command;
pub mod control;
pub mod cursor;
pub mod engine;
pub mod handler;
pub mod transport;

pub use command::{
    Command, COMMAND_DATA_LENGTH, FRAME_END, MAX_FRAME_LEN, OP_ACK, OP_ESCAPE, OP_RESUME,
    OP_RESYNC, OP_WAIT,
};
pub use control::{ControlCommand, Counters};
pub use cursor::FrameCursor;
pub use engine::Engine;
pub use handler::MessageHandler;
pub use transport::{Received, Transport, TransportStatus};
