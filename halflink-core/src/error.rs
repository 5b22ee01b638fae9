//! Error and alert types

/// Errors that can occur on the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Payload exceeds the command data length
    PayloadTooLarge,
    /// A forced transmit ran out of retries before the queue drained
    TransmitTimeout,
    /// The receive queue ran dry before the frame header was complete
    Truncated,
}

/// Conditions the link cannot recover from by itself
///
/// Delivered to the application alongside decoded commands so it can log,
/// reset the peripheral or escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkAlert {
    /// A control frame that must not be dropped could not be queued
    ForcedTransmitTimeout {
        /// Opcode of the control frame
        opcode: u8,
    },
}
