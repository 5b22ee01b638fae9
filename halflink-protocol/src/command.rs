//! Command frames
//!
//! Wire format:
//! - OPCODE (1 byte)
//! - SEQUENCE (1 byte, only when numbering is enabled)
//! - PAYLOAD (0-4 bytes)
//! - END (1 byte): 0x02 terminator
//!
//! Payload length is implicit. Payload bytes are not escaped, so an
//! application payload byte equal to [`FRAME_END`] ends the frame early on
//! the receiving side.

use halflink_core::Error;
use halflink_hal::Serial;
use heapless::Vec;

use crate::control::is_control;
use crate::transport::Transport;

/// Peer must pause its outbound stream
pub const OP_WAIT: u8 = 0x01;
/// Frame terminator
pub const FRAME_END: u8 = 0x02;
/// Reserved for escape sequencing; never emitted or interpreted
pub const OP_ESCAPE: u8 = 0x03;
/// Acknowledges a control frame
pub const OP_ACK: u8 = 0x06;
/// Peer may restart its outbound stream
pub const OP_RESUME: u8 = 0x11;
/// Carries the sender's counters to realign sequence numbers
pub const OP_RESYNC: u8 = 0x16;

/// Maximum payload bytes per command
pub const COMMAND_DATA_LENGTH: usize = 4;

/// Maximum encoded frame size (OPCODE + SEQUENCE + PAYLOAD + END)
pub const MAX_FRAME_LEN: usize = 1 + 1 + COMMAND_DATA_LENGTH + 1;

/// One command: an opcode plus a short payload
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Command {
    /// Command code
    pub opcode: u8,
    /// Payload data
    pub payload: Vec<u8, COMMAND_DATA_LENGTH>,
}

impl Command {
    /// Create a command with the given opcode and payload
    pub fn new(opcode: u8, payload: &[u8]) -> Result<Self, Error> {
        let mut command = Self::empty(opcode);
        command
            .payload
            .extend_from_slice(payload)
            .map_err(|_| Error::PayloadTooLarge)?;
        Ok(command)
    }

    /// Create a command with no payload
    pub const fn empty(opcode: u8) -> Self {
        Self {
            opcode,
            payload: Vec::new(),
        }
    }

    /// Reset to opcode 0 with no payload
    pub fn clear(&mut self) {
        self.opcode = 0;
        self.payload.clear();
    }

    /// Number of payload bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Append a payload byte
    ///
    /// Returns the remaining capacity after the append, or 0 when the payload
    /// was already full and the byte was rejected.
    pub fn append(&mut self, byte: u8) -> usize {
        match self.payload.push(byte) {
            Ok(()) => COMMAND_DATA_LENGTH - self.payload.len(),
            Err(_) => 0,
        }
    }

    /// Encode into wire bytes, stamping `sequence` after the opcode if given
    pub fn encode(&self, sequence: Option<u8>) -> Vec<u8, MAX_FRAME_LEN> {
        if self.payload.contains(&FRAME_END) {
            warn!(
                "Payload of opcode {:#x} contains the terminator byte",
                self.opcode
            );
        }

        let mut frame = Vec::new();
        // Capacity covers the largest frame, none of these can fail
        let _ = frame.push(self.opcode);
        if let Some(sequence) = sequence {
            let _ = frame.push(sequence);
        }
        let _ = frame.extend_from_slice(&self.payload);
        let _ = frame.push(FRAME_END);
        frame
    }

    /// Append the encoded frame to the transmit queue
    ///
    /// Bytes that do not fit are dropped; the return value is the number of
    /// bytes actually queued. The transmitter is not started, so a paused
    /// link stays paused.
    pub fn encode_and_enqueue<P: Serial, const N: usize>(
        &self,
        transport: &Transport<P, N>,
        sequence: Option<u8>,
    ) -> usize {
        let frame = self.encode(sequence);
        let written = transport.build_bulk(&frame);
        if written < frame.len() {
            warn!(
                "Transmit queue full, frame truncated to {} of {} bytes",
                written,
                frame.len()
            );
        }
        written
    }

    /// Queue the encoded frame, retrying until it is accepted
    ///
    /// Used for frames that must not be dropped. A control frame that fits
    /// the transmit queue goes in whole as a priority frame, ahead of
    /// ordinary traffic and through a pause. Any other frame is queued at
    /// the tail, whole when it fits and otherwise forced in byte by byte; a
    /// frame queued from an interrupt meanwhile can then interleave with it.
    /// Gives up with [`Error::TransmitTimeout`] after `spin_limit` retries.
    /// The transmitter is not started.
    pub fn encode_and_force<P: Serial, const N: usize>(
        &self,
        transport: &Transport<P, N>,
        sequence: Option<u8>,
        spin_limit: u32,
    ) -> Result<(), Error> {
        let frame = self.encode(sequence);
        if is_control(self.opcode) && frame.len() <= N {
            return transport.transmit_frame_forced(&frame, spin_limit);
        }
        if transport.build_frame(&frame) {
            return Ok(());
        }
        for &byte in frame.iter() {
            transport.transmit_forced(byte, spin_limit)?;
        }
        Ok(())
    }

    /// Append payload bytes from the receive queue up to the terminator
    ///
    /// Bytes already in the payload are kept. The payload grows to at most
    /// `max_len` bytes; anything after that and before the terminator is read
    /// and discarded. Returns `true` if the terminator was consumed, `false`
    /// if the queue ran dry first.
    pub fn fill_from_receive<P: Serial, const N: usize>(
        &mut self,
        transport: &Transport<P, N>,
        max_len: usize,
    ) -> bool {
        let limit = max_len.min(COMMAND_DATA_LENGTH);
        while let Some(byte) = transport.receive() {
            if byte == FRAME_END {
                return true;
            }
            if self.payload.len() < limit {
                let _ = self.payload.push(byte);
            }
        }
        false
    }

    /// Decode an unnumbered frame from the receive queue
    ///
    /// Returns `None` if the queue is empty or holds only a bare terminator.
    pub fn decode_from_receive<P: Serial, const N: usize>(
        transport: &Transport<P, N>,
        max_len: usize,
    ) -> Option<Self> {
        let opcode = transport.receive()?;
        if opcode == FRAME_END {
            return None;
        }
        let mut command = Self::empty(opcode);
        command.fill_from_receive(transport, max_len);
        Some(command)
    }
}
