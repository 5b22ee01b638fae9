//! Queue-backed serial transport
//!
//! Turns the peripheral's one-byte transmit and receive registers into a
//! buffered, non-blocking channel. Received bytes are pushed into the receive
//! queue from the receive interrupt; outbound bytes wait in the transmit
//! queue and are pulled out one per data-register-empty event.
//!
//! Every queue access is a single short critical section. The transport
//! knows nothing about flow control: pausing is decided by the engine.

use core::cell::{Cell, RefCell};
use core::ops::{BitOr, BitOrAssign};

use critical_section::{CriticalSection, Mutex};
use halflink_core::{Error, LinkFlags, LinkStatus, RingBuffer};
use halflink_hal::Serial;

use crate::cursor::FrameCursor;

/// Aggregated hardware and queue status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransportStatus(u8);

impl TransportStatus {
    /// The hardware transmitter cannot accept a byte now
    pub const TX_BUSY: Self = Self(0x01);
    /// The hardware receiver has nothing to provide
    pub const RX_BUSY: Self = Self(0x02);
    /// The transmit queue is full
    pub const TX_QUEUE_FULL: Self = Self(0x04);
    /// The transmit queue is empty
    pub const TX_QUEUE_EMPTY: Self = Self(0x08);
    /// The receive queue is empty
    pub const RX_QUEUE_EMPTY: Self = Self(0x10);
    /// The receive queue is full
    pub const RX_QUEUE_FULL: Self = Self(0x20);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TransportStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TransportStatus {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Outcome of servicing the receive interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Received {
    /// Byte stored in the receive queue
    Stored(u8),
    /// Receive queue was full; the byte was read off the hardware and dropped
    Dropped(u8),
}

impl Received {
    pub const fn byte(self) -> u8 {
        match self {
            Received::Stored(byte) | Received::Dropped(byte) => byte,
        }
    }
}

/// Frame tracking for bytes handed to the transmitter
#[derive(Debug, Clone, Copy)]
struct TxState {
    cursor: FrameCursor,
    /// Priority frames not yet fully sent. They sit directly behind the
    /// frame in flight, or are the frame in flight.
    priority: u8,
    /// The frame in flight is a priority frame
    in_priority: bool,
}

impl TxState {
    const fn new(numbered: bool) -> Self {
        Self {
            cursor: FrameCursor::new(numbered),
            priority: 0,
            in_priority: false,
        }
    }

    const fn priority_ready(&self) -> bool {
        self.in_priority || (self.cursor.at_boundary() && self.priority > 0)
    }
}

/// Serial transport with receive and transmit queues of capacity `N`
pub struct Transport<P, const N: usize> {
    serial: P,
    rx: Mutex<RefCell<RingBuffer<N>>>,
    tx: Mutex<RefCell<RingBuffer<N>>>,
    tx_state: Mutex<Cell<TxState>>,
    link: LinkStatus,
}

impl<P, const N: usize> Transport<P, N> {
    /// Create a transport over an already configured peripheral
    ///
    /// `numbered` tells the transmit-side frame tracker whether frames carry
    /// a sequence byte.
    pub const fn new(serial: P, numbered: bool) -> Self {
        Self {
            serial,
            rx: Mutex::new(RefCell::new(RingBuffer::new())),
            tx: Mutex::new(RefCell::new(RingBuffer::new())),
            tx_state: Mutex::new(Cell::new(TxState::new(numbered))),
            link: LinkStatus::new(),
        }
    }

    /// The underlying peripheral
    pub const fn serial(&self) -> &P {
        &self.serial
    }

    /// Link status register shared with the engine
    pub const fn link(&self) -> &LinkStatus {
        &self.link
    }
}

impl<P: Serial, const N: usize> Transport<P, N> {
    /// Hardware and queue status
    pub fn status(&self) -> TransportStatus {
        let mut status = TransportStatus::default();
        if !self.serial.is_transmit_ready() {
            status |= TransportStatus::TX_BUSY;
        }
        if !self.serial.is_receive_ready() {
            status |= TransportStatus::RX_BUSY;
        }

        critical_section::with(|cs| {
            let tx = self.tx.borrow_ref(cs);
            if tx.is_empty() {
                status |= TransportStatus::TX_QUEUE_EMPTY;
            } else if tx.is_full() {
                status |= TransportStatus::TX_QUEUE_FULL;
            }

            let rx = self.rx.borrow_ref(cs);
            if rx.is_empty() {
                status |= TransportStatus::RX_QUEUE_EMPTY;
            } else if rx.is_full() {
                status |= TransportStatus::RX_QUEUE_FULL;
            }
        });

        status
    }

    /// Queue one byte and start the transmitter if it is idle
    ///
    /// Returns the number of bytes accepted: 0 when the queue is full.
    pub fn transmit(&self, byte: u8) -> usize {
        if !self.build(byte) {
            return 0;
        }
        self.begin_transmit();
        1
    }

    /// Queue as many of `bytes` as fit and start the transmitter if idle
    ///
    /// Returns the number of bytes queued. Bytes past the free space are
    /// silently dropped; callers must check the count.
    pub fn bulk_transmit(&self, bytes: &[u8]) -> usize {
        let written = self.build_bulk(bytes);
        if written > 0 {
            self.begin_transmit();
        }
        written
    }

    /// Queue one byte without starting the transmitter
    pub fn build(&self, byte: u8) -> bool {
        critical_section::with(|cs| self.tx.borrow_ref_mut(cs).push(byte))
    }

    /// Queue as many of `bytes` as fit, in one critical section, without
    /// starting the transmitter
    pub fn build_bulk(&self, bytes: &[u8]) -> usize {
        critical_section::with(|cs| {
            let mut tx = self.tx.borrow_ref_mut(cs);
            let count = bytes.len().min(tx.free());
            for &byte in &bytes[..count] {
                tx.push(byte);
            }
            count
        })
    }

    /// Queue all of `bytes` or none of them, without starting the transmitter
    pub fn build_frame(&self, bytes: &[u8]) -> bool {
        critical_section::with(|cs| {
            let mut tx = self.tx.borrow_ref_mut(cs);
            if tx.free() < bytes.len() {
                return false;
            }
            for &byte in bytes {
                tx.push(byte);
            }
            true
        })
    }

    /// Queue a whole frame ahead of ordinary traffic, without starting the
    /// transmitter
    ///
    /// The frame goes directly behind the frame in flight and any priority
    /// frames already queued, so it never splits a frame. Priority frames
    /// are allowed through a pause (see [`Transport::tx_priority_ready`]).
    /// All of `frame` is queued or none of it.
    pub fn build_priority_frame(&self, frame: &[u8]) -> bool {
        critical_section::with(|cs| {
            let mut tx = self.tx.borrow_ref_mut(cs);
            if tx.free() < frame.len() {
                return false;
            }

            let cell = self.tx_state.borrow(cs);
            let mut state = cell.get();
            let mut scan = state.cursor;
            let mut index = 0;
            // Rest of the frame in flight
            if !scan.at_boundary() {
                while let Some(byte) = tx.get(index) {
                    index += 1;
                    if scan.advance(byte) {
                        break;
                    }
                }
            }
            let mut skip = state.priority - u8::from(state.in_priority);
            while skip > 0 {
                let Some(byte) = tx.get(index) else {
                    break;
                };
                index += 1;
                if scan.advance(byte) {
                    skip -= 1;
                }
            }

            for (offset, &byte) in frame.iter().enumerate() {
                tx.insert(index + offset, byte);
            }
            state.priority += 1;
            cell.set(state);
            true
        })
    }

    /// Queue one byte, retrying until the queue accepts it
    ///
    /// While the queue stays full and the data register is free, one queued
    /// byte is handed to the hardware per retry, so the loop progresses even
    /// when called from an interrupt the transmit interrupt cannot preempt.
    /// While the link is paused only priority frames are pumped.
    ///
    /// This busy-waits; inside an interrupt handler it delays every other
    /// interrupt of equal or lower priority for up to `spin_limit` retries.
    pub fn transmit_forced(&self, byte: u8, spin_limit: u32) -> Result<(), Error> {
        let mut spins = 0;
        loop {
            if self.build(byte) {
                return Ok(());
            }
            self.pump_for_room();
            spins += 1;
            if spins >= spin_limit {
                return Err(Error::TransmitTimeout);
            }
            core::hint::spin_loop();
        }
    }

    /// Queue a whole priority frame, retrying until it fits
    ///
    /// Pumps and spins like [`Transport::transmit_forced`]. `frame` must fit
    /// in an empty queue or this can only time out.
    pub fn transmit_frame_forced(&self, frame: &[u8], spin_limit: u32) -> Result<(), Error> {
        let mut spins = 0;
        loop {
            if self.build_priority_frame(frame) {
                return Ok(());
            }
            self.pump_for_room();
            spins += 1;
            if spins >= spin_limit {
                return Err(Error::TransmitTimeout);
            }
            core::hint::spin_loop();
        }
    }

    /// Start the transmitter if it is idle and bytes are waiting
    ///
    /// Returns `true` if a byte was handed to the hardware. Used to resume a
    /// stalled pump.
    pub fn begin_transmit(&self) -> bool {
        critical_section::with(|cs| {
            if self.link.contains(LinkFlags::TRANSMITTING) || !self.serial.is_transmit_ready() {
                return false;
            }
            let next = self.tx.borrow_ref_mut(cs).pop();
            match next {
                Some(byte) => {
                    self.hand_off(cs, byte);
                    true
                }
                None => false,
            }
        })
    }

    /// Pull one byte from the transmit queue into the data register
    ///
    /// Called from the data-register-empty interrupt. Returns the byte sent.
    pub fn drive_transmit_interrupt(&self) -> Option<u8> {
        critical_section::with(|cs| {
            let next = self.tx.borrow_ref_mut(cs).pop();
            if let Some(byte) = next {
                self.hand_off(cs, byte);
            }
            next
        })
    }

    /// Read the data register into the receive queue
    ///
    /// Called from the receive-complete interrupt. The byte is always read so
    /// the hardware's data-ready condition clears, even when the queue is full
    /// and the byte has to be dropped.
    pub fn drive_receive_interrupt(&self) -> Received {
        let byte = self.serial.receive_byte();
        let stored = critical_section::with(|cs| self.rx.borrow_ref_mut(cs).push(byte));
        if stored {
            Received::Stored(byte)
        } else {
            Received::Dropped(byte)
        }
    }

    /// Take one byte from the receive queue
    pub fn receive(&self) -> Option<u8> {
        critical_section::with(|cs| self.rx.borrow_ref_mut(cs).pop())
    }

    /// Next byte the transmitter will send
    pub fn peek_tx_head(&self) -> Option<u8> {
        critical_section::with(|cs| self.tx.borrow_ref(cs).peek_head())
    }

    /// Whether the next queued byte terminates the frame in flight
    pub fn tx_head_is_terminator(&self) -> bool {
        critical_section::with(|cs| {
            let head = self.tx.borrow_ref(cs).peek_head();
            head.is_some_and(|byte| self.tx_state.borrow(cs).get().cursor.is_terminator(byte))
        })
    }

    /// Whether the last byte handed to the hardware completed a frame
    pub fn tx_at_boundary(&self) -> bool {
        critical_section::with(|cs| self.tx_state.borrow(cs).get().cursor.at_boundary())
    }

    /// Whether the next byte to send belongs to a priority frame
    pub fn tx_priority_ready(&self) -> bool {
        critical_section::with(|cs| self.tx_state.borrow(cs).get().priority_ready())
    }

    /// Bytes waiting in the transmit queue
    pub fn tx_len(&self) -> usize {
        critical_section::with(|cs| self.tx.borrow_ref(cs).len())
    }

    /// Bytes waiting in the receive queue
    pub fn rx_len(&self) -> usize {
        critical_section::with(|cs| self.rx.borrow_ref(cs).len())
    }

    /// Drop everything queued in both directions
    pub fn clear(&self) {
        critical_section::with(|cs| {
            self.rx.borrow_ref_mut(cs).clear();
            self.tx.borrow_ref_mut(cs).clear();
            let cell = self.tx_state.borrow(cs);
            let mut state = cell.get();
            state.cursor.reset();
            state.priority = 0;
            state.in_priority = false;
            cell.set(state);
        });
    }

    /// Hand one queued byte over while a forced frame waits for room
    fn pump_for_room(&self) {
        let paused = self.link.contains(LinkFlags::SELF_WAITING);
        if (!paused || self.tx_priority_ready()) && self.serial.is_transmit_ready() {
            self.drive_transmit_interrupt();
        }
    }

    fn hand_off(&self, cs: CriticalSection<'_>, byte: u8) {
        let cell = self.tx_state.borrow(cs);
        let mut state = cell.get();
        if state.cursor.at_boundary() && state.priority > 0 {
            state.in_priority = true;
        }
        if state.cursor.advance(byte) {
            trace!("Terminator handed to transmitter");
            if state.in_priority {
                state.priority -= 1;
                state.in_priority = false;
            }
        }
        cell.set(state);
        self.link.insert(LinkFlags::TRANSMITTING);
        self.serial.transmit_byte(byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::FRAME_END;
    use halflink_hal::mock::MockSerial;
    use halflink_hal::SerialRx;

    fn transport<const N: usize>() -> Transport<MockSerial, N> {
        Transport::new(MockSerial::new(), false)
    }

    #[test]
    fn test_idle_status() {
        let transport = transport::<4>();
        let status = transport.status();
        assert!(status.contains(TransportStatus::TX_QUEUE_EMPTY));
        assert!(status.contains(TransportStatus::RX_QUEUE_EMPTY));
        assert!(status.contains(TransportStatus::RX_BUSY));
        assert!(!status.contains(TransportStatus::TX_BUSY));
    }

    #[test]
    fn test_transmit_starts_idle_hardware() {
        let transport = transport::<4>();
        assert_eq!(transport.transmit(0x41), 1);
        // Went straight to the data register
        assert_eq!(transport.serial().wire().as_slice(), &[0x41]);
        assert_eq!(transport.tx_len(), 0);
        assert!(transport.link().contains(LinkFlags::TRANSMITTING));
        assert!(transport.status().contains(TransportStatus::TX_BUSY));

        // Pump active: the next byte waits in the queue
        assert_eq!(transport.transmit(0x42), 1);
        assert_eq!(transport.tx_len(), 1);
    }

    #[test]
    fn test_transmit_rejects_when_full() {
        let transport = transport::<2>();
        assert_eq!(transport.transmit(1), 1); // in flight
        assert_eq!(transport.transmit(2), 1);
        assert_eq!(transport.transmit(3), 1);
        assert!(transport.status().contains(TransportStatus::TX_QUEUE_FULL));
        assert_eq!(transport.transmit(4), 0);
        assert_eq!(transport.tx_len(), 2);
    }

    #[test]
    fn test_bulk_transmit_partial() {
        let transport = transport::<3>();
        let data = [10, 11, 12, 13, 14, 15];
        let written = transport.bulk_transmit(&data[1..6]);
        assert_eq!(written, 3);
        // First queued byte already moved to the hardware
        assert_eq!(transport.serial().wire().as_slice(), &[11]);
        assert_eq!(transport.tx_len(), 2);
    }

    #[test]
    fn test_build_does_not_start_transmitter() {
        let transport = transport::<4>();
        assert!(transport.build(0x55));
        assert_eq!(transport.build_bulk(&[1, 2, 3, 4]), 3);
        assert!(transport.serial().wire().is_empty());
        assert!(!transport.link().contains(LinkFlags::TRANSMITTING));

        assert!(transport.begin_transmit());
        assert_eq!(transport.serial().wire().as_slice(), &[0x55]);
        // Already transmitting: no second start
        assert!(!transport.begin_transmit());
    }

    #[test]
    fn test_begin_transmit_on_empty_queue() {
        let transport = transport::<4>();
        assert!(!transport.begin_transmit());
        assert!(transport.serial().wire().is_empty());
    }

    #[test]
    fn test_drive_transmit_pulls_one_byte() {
        let transport = transport::<4>();
        transport.build_bulk(&[1, 2]);
        assert_eq!(transport.drive_transmit_interrupt(), Some(1));
        transport.serial().complete_byte();
        assert_eq!(transport.drive_transmit_interrupt(), Some(2));
        transport.serial().complete_byte();
        assert_eq!(transport.drive_transmit_interrupt(), None);
        assert_eq!(transport.serial().wire().as_slice(), &[1, 2]);
        assert_eq!(transport.serial().overruns(), 0);
    }

    #[test]
    fn test_receive_queue_overflow_still_reads_hardware() {
        let transport = transport::<2>();
        transport.serial().inject(&[7, 8, 9]);
        assert_eq!(transport.drive_receive_interrupt(), Received::Stored(7));
        assert_eq!(transport.drive_receive_interrupt(), Received::Stored(8));
        assert!(transport.status().contains(TransportStatus::RX_QUEUE_FULL));

        let dropped = transport.drive_receive_interrupt();
        assert_eq!(dropped, Received::Dropped(9));
        assert_eq!(dropped.byte(), 9);
        assert!(!transport.serial().is_receive_ready());

        assert_eq!(transport.receive(), Some(7));
        assert_eq!(transport.receive(), Some(8));
        assert_eq!(transport.receive(), None);
    }

    #[test]
    fn test_forced_transmit_pumps_full_queue() {
        let transport = transport::<2>();
        transport.serial().set_auto_complete(true);
        assert!(transport.build(1));
        assert!(transport.build(2));

        // Queue full, transmitter free: the retry sends the head to make room
        transport.transmit_forced(3, 4).unwrap();
        assert_eq!(transport.serial().wire().as_slice(), &[1]);
        assert_eq!(transport.tx_len(), 2);
    }

    #[test]
    fn test_forced_transmit_respects_pause() {
        let transport = transport::<1>();
        transport.serial().set_auto_complete(true);
        assert!(transport.build(1));
        transport.link().insert(LinkFlags::SELF_WAITING);
        assert_eq!(transport.transmit_forced(2, 4), Err(Error::TransmitTimeout));
        assert!(transport.serial().wire().is_empty());
    }

    #[test]
    fn test_build_frame_all_or_nothing() {
        let transport = transport::<4>();
        assert!(transport.build_frame(&[1, 2, 3]));
        assert!(!transport.build_frame(&[4, 5]));
        assert_eq!(transport.tx_len(), 3);
        assert!(transport.build_frame(&[4]));
        assert!(transport.status().contains(TransportStatus::TX_QUEUE_FULL));
    }

    #[test]
    fn test_priority_frame_all_or_nothing() {
        let transport = transport::<4>();
        assert!(transport.build_priority_frame(&[1, 2, FRAME_END]));
        assert!(!transport.build_priority_frame(&[4, FRAME_END]));
        assert_eq!(transport.tx_len(), 3);
        assert!(transport.build_priority_frame(&[FRAME_END]));
        assert!(transport.status().contains(TransportStatus::TX_QUEUE_FULL));
    }

    /// Pull every queued byte the way the transmit interrupt would
    fn pump_all<const N: usize>(transport: &Transport<MockSerial, N>) {
        while transport.drive_transmit_interrupt().is_some() {
            transport.serial().complete_byte();
        }
    }

    #[test]
    fn test_priority_frame_queued_after_frame_in_flight() {
        let transport = transport::<12>();
        transport.build_bulk(&[0x20, 0x41, FRAME_END, 0x21, 0x42, FRAME_END]);
        transport.drive_transmit_interrupt();
        transport.serial().complete_byte();

        assert!(transport.build_priority_frame(&[0x01, FRAME_END]));
        assert!(transport.build_priority_frame(&[0x11, FRAME_END]));
        pump_all(&transport);
        assert_eq!(
            transport.serial().wire().as_slice(),
            &[0x20, 0x41, FRAME_END, 0x01, FRAME_END, 0x11, FRAME_END, 0x21, 0x42, FRAME_END]
        );
    }

    #[test]
    fn test_priority_frame_at_head_when_idle() {
        let transport = transport::<8>();
        transport.build_bulk(&[0x20, FRAME_END]);
        assert!(!transport.tx_priority_ready());

        assert!(transport.build_priority_frame(&[0x01, FRAME_END]));
        assert!(transport.tx_priority_ready());
        assert_eq!(transport.peek_tx_head(), Some(0x01));

        transport.drive_transmit_interrupt();
        // Still ready in the middle of the priority frame
        assert!(transport.tx_priority_ready());
        transport.drive_transmit_interrupt();
        assert!(!transport.tx_priority_ready());
        assert_eq!(transport.peek_tx_head(), Some(0x20));
    }

    #[test]
    fn test_forced_frame_passes_pause() {
        let transport = transport::<3>();
        transport.serial().set_auto_complete(true);
        assert!(transport.build_priority_frame(&[0x01, FRAME_END]));
        assert!(transport.build(0x20));
        transport.link().insert(LinkFlags::SELF_WAITING);

        // Only the queued priority frame may be pumped to make room
        transport.transmit_frame_forced(&[0x11, FRAME_END], 8).unwrap();
        assert_eq!(transport.serial().wire().as_slice(), &[0x01, FRAME_END]);
        assert_eq!(transport.peek_tx_head(), Some(0x11));
    }

    #[test]
    fn test_forced_frame_blocked_by_paused_traffic() {
        let transport = transport::<2>();
        transport.serial().set_auto_complete(true);
        transport.build_bulk(&[0x20, FRAME_END]);
        transport.link().insert(LinkFlags::SELF_WAITING);
        assert_eq!(
            transport.transmit_frame_forced(&[0x11, FRAME_END], 4),
            Err(Error::TransmitTimeout)
        );
        assert!(transport.serial().wire().is_empty());
    }

    #[test]
    fn test_forced_transmit_times_out() {
        let transport = transport::<1>();
        assert_eq!(transport.transmit(1), 1); // in flight, never completes
        assert!(transport.build(2));
        assert_eq!(transport.transmit_forced(3, 8), Err(Error::TransmitTimeout));
    }

    #[test]
    fn test_tx_boundary_tracking() {
        let transport = transport::<8>();
        transport.build_bulk(&[0x20, 0x01, FRAME_END]);
        assert!(transport.tx_at_boundary());
        assert!(!transport.tx_head_is_terminator());

        transport.drive_transmit_interrupt();
        assert!(!transport.tx_at_boundary());
        transport.drive_transmit_interrupt();
        assert!(transport.tx_head_is_terminator());
        transport.drive_transmit_interrupt();
        assert!(transport.tx_at_boundary());
        assert_eq!(transport.peek_tx_head(), None);
    }

    #[test]
    fn test_clear() {
        let transport = transport::<4>();
        transport.build_bulk(&[1, 2]);
        transport.serial().inject(&[3]);
        transport.drive_receive_interrupt();
        transport.clear();
        assert_eq!(transport.tx_len(), 0);
        assert_eq!(transport.rx_len(), 0);
    }
}
