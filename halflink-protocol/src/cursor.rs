//! Frame boundary tracking
//!
//! A byte equal to [`FRAME_END`] only ends a frame where a terminator may
//! appear: at the very start (an empty frame) or once the opcode, sequence
//! byte and any fixed control payload have gone by.

use crate::command::FRAME_END;
use crate::control::fixed_payload_len;

/// Position within the frame currently passing a point on the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameCursor {
    numbered: bool,
    position: usize,
    opcode: u8,
}

impl FrameCursor {
    pub const fn new(numbered: bool) -> Self {
        Self {
            numbered,
            position: 0,
            opcode: 0,
        }
    }

    /// Bytes a frame with this cursor's opcode carries before its terminator
    const fn min_len(&self) -> usize {
        1 + self.numbered as usize + fixed_payload_len(self.opcode, self.numbered)
    }

    /// Whether `byte`, arriving next, would end the current frame
    pub const fn is_terminator(&self, byte: u8) -> bool {
        byte == FRAME_END && (self.position == 0 || self.position >= self.min_len())
    }

    /// Account for `byte`; returns `true` if it ended the frame
    pub fn advance(&mut self, byte: u8) -> bool {
        if self.is_terminator(byte) {
            *self = Self::new(self.numbered);
            return true;
        }
        if self.position == 0 {
            self.opcode = byte;
        }
        self.position = self.position.saturating_add(1);
        false
    }

    /// Whether no frame is partially through
    pub const fn at_boundary(&self) -> bool {
        self.position == 0
    }

    /// Forget any partial frame
    pub fn reset(&mut self) {
        *self = Self::new(self.numbered);
    }
}
