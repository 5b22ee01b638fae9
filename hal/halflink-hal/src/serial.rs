//! Serial peripheral abstractions
//!
//! Byte-at-a-time primitives for a UART that raises three interrupts:
//! receive-complete, transmit-complete and transmit-data-register-empty.
//!
//! All methods take `&self`: the peripheral is shared between interrupt
//! handlers and mainline code, so implementations use register access or
//! interior mutability rather than exclusive borrows.

/// UART transmitter
pub trait SerialTx {
    /// Hand one byte to the transmit data register.
    ///
    /// Callers check [`SerialTx::is_transmit_ready`] first (or call from the
    /// data-register-empty interrupt, where readiness is implied).
    fn transmit_byte(&self, byte: u8);

    /// Whether the transmit data register can accept a byte
    fn is_transmit_ready(&self) -> bool;
}

/// UART receiver
pub trait SerialRx {
    /// Read the receive data register.
    ///
    /// Reading clears the hardware's data-ready condition even when the
    /// caller ends up discarding the byte.
    fn receive_byte(&self) -> u8;

    /// Whether a received byte is waiting in the data register
    fn is_receive_ready(&self) -> bool;
}

/// Control over the transmit-data-register-empty interrupt
///
/// The transport pumps one byte per empty event and disarms the interrupt
/// afterwards; the transmit-complete handler re-arms it when more bytes
/// should follow.
pub trait TxEmptyInterrupt {
    /// Arm the data-register-empty interrupt
    fn enable_tx_empty_interrupt(&self);

    /// Disarm the data-register-empty interrupt
    fn disable_tx_empty_interrupt(&self);
}

/// Combined serial peripheral
///
/// For UARTs that provide transmit, receive and the empty interrupt on a
/// single peripheral.
pub trait Serial: SerialTx + SerialRx + TxEmptyInterrupt {}

// Blanket implementation
impl<T: SerialTx + SerialRx + TxEmptyInterrupt> Serial for T {}

impl<T: SerialTx + ?Sized> SerialTx for &T {
    fn transmit_byte(&self, byte: u8) {
        (**self).transmit_byte(byte);
    }

    fn is_transmit_ready(&self) -> bool {
        (**self).is_transmit_ready()
    }
}

impl<T: SerialRx + ?Sized> SerialRx for &T {
    fn receive_byte(&self) -> u8 {
        (**self).receive_byte()
    }

    fn is_receive_ready(&self) -> bool {
        (**self).is_receive_ready()
    }
}

impl<T: TxEmptyInterrupt + ?Sized> TxEmptyInterrupt for &T {
    fn enable_tx_empty_interrupt(&self) {
        (**self).enable_tx_empty_interrupt();
    }

    fn disable_tx_empty_interrupt(&self) {
        (**self).disable_tx_empty_interrupt();
    }
}
