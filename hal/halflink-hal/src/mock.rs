//! Host-side serial peripheral double
//!
//! Models the parts of a UART the transport can observe: a transmit data
//! register that stays occupied until the test completes the byte, a receive
//! data register fed from injected bytes, and the data-register-empty
//! interrupt enable bit. Everything handed to the transmitter is recorded on
//! a wire log.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::{Deque, Vec};

use crate::serial::{SerialRx, SerialTx, TxEmptyInterrupt};

/// Bytes kept on the wire log
pub const WIRE_CAPACITY: usize = 256;

/// Bytes that can wait in the simulated receive line
pub const RX_LINE_CAPACITY: usize = 64;

#[derive(Debug)]
struct MockState {
    wire: Vec<u8, WIRE_CAPACITY>,
    rx_line: Deque<u8, RX_LINE_CAPACITY>,
    tx_busy: bool,
    auto_complete: bool,
    tx_empty_irq: bool,
    overruns: usize,
}

/// Simulated UART
pub struct MockSerial {
    state: Mutex<RefCell<MockState>>,
}

impl Default for MockSerial {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSerial {
    /// Create an idle mock with an empty wire
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(MockState {
                wire: Vec::new(),
                rx_line: Deque::new(),
                tx_busy: false,
                auto_complete: false,
                tx_empty_irq: false,
                overruns: 0,
            })),
        }
    }

    /// Create a mock whose transmitter finishes every byte instantly
    pub fn with_auto_complete() -> Self {
        let mock = Self::new();
        mock.set_auto_complete(true);
        mock
    }

    /// Toggle instant completion of transmitted bytes
    pub fn set_auto_complete(&self, enabled: bool) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.auto_complete = enabled;
            if enabled {
                state.tx_busy = false;
            }
        });
    }

    /// Queue bytes on the receive line
    ///
    /// Returns the number of bytes accepted by the line.
    pub fn inject(&self, bytes: &[u8]) -> usize {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let mut accepted = 0;
            for &byte in bytes {
                if state.rx_line.push_back(byte).is_err() {
                    break;
                }
                accepted += 1;
            }
            accepted
        })
    }

    /// Finish shifting out the byte in the transmit register
    ///
    /// Returns `true` if a byte was in flight.
    pub fn complete_byte(&self) -> bool {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            core::mem::replace(&mut state.tx_busy, false)
        })
    }

    /// Whether a byte is currently occupying the transmitter
    pub fn is_transmitting(&self) -> bool {
        critical_section::with(|cs| self.state.borrow_ref(cs).tx_busy)
    }

    /// Whether the data-register-empty interrupt is armed
    pub fn tx_empty_interrupt_enabled(&self) -> bool {
        critical_section::with(|cs| self.state.borrow_ref(cs).tx_empty_irq)
    }

    /// Copy of everything transmitted so far
    pub fn wire(&self) -> Vec<u8, WIRE_CAPACITY> {
        critical_section::with(|cs| self.state.borrow_ref(cs).wire.clone())
    }

    /// Take everything transmitted so far, clearing the wire log
    pub fn take_wire(&self) -> Vec<u8, WIRE_CAPACITY> {
        critical_section::with(|cs| core::mem::take(&mut self.state.borrow_ref_mut(cs).wire))
    }

    /// Bytes written while the transmitter was still busy
    pub fn overruns(&self) -> usize {
        critical_section::with(|cs| self.state.borrow_ref(cs).overruns)
    }
}

impl SerialTx for MockSerial {
    fn transmit_byte(&self, byte: u8) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            if state.tx_busy {
                state.overruns += 1;
            }
            // A full wire log only loses history, never transmitter state
            let _ = state.wire.push(byte);
            state.tx_busy = !state.auto_complete;
        });
    }

    fn is_transmit_ready(&self) -> bool {
        critical_section::with(|cs| !self.state.borrow_ref(cs).tx_busy)
    }
}

impl SerialRx for MockSerial {
    fn receive_byte(&self) -> u8 {
        // An empty data register reads back as zero
        critical_section::with(|cs| {
            self.state
                .borrow_ref_mut(cs)
                .rx_line
                .pop_front()
                .unwrap_or(0)
        })
    }

    fn is_receive_ready(&self) -> bool {
        critical_section::with(|cs| !self.state.borrow_ref(cs).rx_line.is_empty())
    }
}

impl TxEmptyInterrupt for MockSerial {
    fn enable_tx_empty_interrupt(&self) {
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).tx_empty_irq = true);
    }

    fn disable_tx_empty_interrupt(&self) {
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).tx_empty_irq = false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transmit_records_wire_and_blocks() {
        let mock = MockSerial::new();
        assert!(mock.is_transmit_ready());

        mock.transmit_byte(0x42);
        assert!(!mock.is_transmit_ready());
        assert_eq!(mock.wire().as_slice(), &[0x42]);

        assert!(mock.complete_byte());
        assert!(mock.is_transmit_ready());
        assert!(!mock.complete_byte());
    }

    #[test]
    fn test_overrun_is_counted() {
        let mock = MockSerial::new();
        mock.transmit_byte(0x01);
        mock.transmit_byte(0x02);
        assert_eq!(mock.overruns(), 1);
    }

    #[test]
    fn test_auto_complete_never_busy() {
        let mock = MockSerial::with_auto_complete();
        mock.transmit_byte(0x01);
        mock.transmit_byte(0x02);
        assert!(mock.is_transmit_ready());
        assert_eq!(mock.overruns(), 0);
        assert_eq!(mock.take_wire().as_slice(), &[0x01, 0x02]);
        assert!(mock.wire().is_empty());
    }

    #[test]
    fn test_receive_line() {
        let mock = MockSerial::new();
        assert!(!mock.is_receive_ready());
        assert_eq!(mock.inject(&[0x10, 0x20]), 2);
        assert!(mock.is_receive_ready());
        assert_eq!(mock.receive_byte(), 0x10);
        assert_eq!(mock.receive_byte(), 0x20);
        assert!(!mock.is_receive_ready());
        assert_eq!(mock.receive_byte(), 0);
    }

    #[test]
    fn test_tx_empty_interrupt_flag() {
        let mock = MockSerial::new();
        assert!(!mock.tx_empty_interrupt_enabled());
        mock.enable_tx_empty_interrupt();
        assert!(mock.tx_empty_interrupt_enabled());
        mock.disable_tx_empty_interrupt();
        assert!(!mock.tx_empty_interrupt_enabled());
    }
}
