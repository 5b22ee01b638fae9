//! Protocol-internal control commands
//!
//! Control frames are handled by the engine and never reach the message
//! handler (except an unsolicited ACK, which is passed through as data).

use crate::command::{Command, OP_ACK, OP_RESUME, OP_RESYNC, OP_WAIT};

/// Counter pair carried by RESUME and RESYNC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Counters {
    /// Sender's outgoing number
    pub outgoing: u8,
    /// Sender's incoming number
    pub incoming: u8,
}

/// Control commands exchanged between the two link ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlCommand {
    /// Pause outbound traffic at the next frame boundary
    Wait,
    /// Acknowledge a control frame
    Ack,
    /// Restart outbound traffic; carries counters when numbering is on
    Resume(Option<Counters>),
    /// Adopt the sender's counters
    Resync(Counters),
}

/// Whether `opcode` is handled by the engine itself
pub const fn is_control(opcode: u8) -> bool {
    matches!(opcode, OP_WAIT | OP_ACK | OP_RESUME | OP_RESYNC)
}

/// Payload bytes that are read by position, regardless of their value
///
/// Counter bytes may equal the terminator, so they are never scanned for it.
pub const fn fixed_payload_len(opcode: u8, numbered: bool) -> usize {
    match opcode {
        OP_RESUME | OP_RESYNC if numbered => 2,
        _ => 0,
    }
}

impl ControlCommand {
    /// Opcode on the wire
    pub const fn opcode(&self) -> u8 {
        match self {
            ControlCommand::Wait => OP_WAIT,
            ControlCommand::Ack => OP_ACK,
            ControlCommand::Resume(_) => OP_RESUME,
            ControlCommand::Resync(_) => OP_RESYNC,
        }
    }

    /// Build the command frame for this control command
    pub fn to_command(&self) -> Command {
        let mut command = Command::empty(self.opcode());
        match self {
            ControlCommand::Resume(Some(counters)) | ControlCommand::Resync(counters) => {
                command.append(counters.outgoing);
                command.append(counters.incoming);
            }
            _ => {}
        }
        command
    }

    /// Parse a decoded command
    ///
    /// Returns `None` for application opcodes and for control frames whose
    /// fixed payload is incomplete.
    pub fn from_command(command: &Command, numbered: bool) -> Option<Self> {
        let counters = || {
            let payload = &command.payload;
            (payload.len() >= 2).then(|| Counters {
                outgoing: payload[0],
                incoming: payload[1],
            })
        };

        match command.opcode {
            OP_WAIT => Some(ControlCommand::Wait),
            OP_ACK => Some(ControlCommand::Ack),
            OP_RESUME if numbered => counters().map(|c| ControlCommand::Resume(Some(c))),
            OP_RESUME => Some(ControlCommand::Resume(None)),
            OP_RESYNC => counters().map(ControlCommand::Resync),
            _ => None,
        }
    }
}
