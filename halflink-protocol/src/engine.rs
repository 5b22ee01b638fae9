//! Protocol engine
//!
//! Owns the transport, the sequence counters and the message handler, and
//! runs the link's control logic from the three serial interrupts:
//!
//! - `on_receive_complete`: store the byte, track frame boundaries, signal
//!   receive-queue overflow with WAIT, dispatch or count finished frames
//! - `on_transmit_complete`: decide whether the pump continues, pausing at
//!   the next frame boundary when a pause was requested
//! - `on_transmit_register_empty`: hand exactly one queued byte to the
//!   hardware and disarm itself
//!
//! Link state lives in the transport's [`LinkStatus`] bits rather than a
//! single state enum, because pausing our own stream, pausing the partner's
//! and waiting for an acknowledgement are independent of each other.

use core::cell::Cell;

use critical_section::Mutex;
use halflink_core::{
    Error, FrameDispatch, LinkAlert, LinkConfig, LinkFlags, LinkStatus, SequenceCounters,
    QUEUE_SIZE,
};
use halflink_hal::Serial;
use portable_atomic::{AtomicU8, Ordering};

use crate::command::{Command, COMMAND_DATA_LENGTH, FRAME_END, OP_RESYNC};
use crate::control::{fixed_payload_len, is_control, ControlCommand, Counters};
use crate::cursor::FrameCursor;
use crate::handler::MessageHandler;
use crate::transport::{Received, Transport};

/// A frame read back out of the receive queue
struct InboundFrame {
    command: Command,
    sequence: Option<u8>,
}

/// Half-duplex link endpoint
pub struct Engine<P, H, const N: usize = QUEUE_SIZE> {
    transport: Transport<P, N>,
    handler: H,
    config: LinkConfig,
    sequence: SequenceCounters,
    /// Tracks frame boundaries of bytes arriving from the hardware
    rx_cursor: Mutex<Cell<FrameCursor>>,
    /// Frames terminated in the receive interrupt but not yet dispatched
    pending_frames: AtomicU8,
}

impl<P, H, const N: usize> Engine<P, H, N> {
    pub const fn new(serial: P, handler: H, config: LinkConfig) -> Self {
        Self {
            transport: Transport::new(serial, config.numbering),
            handler,
            config,
            sequence: SequenceCounters::new(),
            rx_cursor: Mutex::new(Cell::new(FrameCursor::new(config.numbering))),
            pending_frames: AtomicU8::new(0),
        }
    }

    pub const fn transport(&self) -> &Transport<P, N> {
        &self.transport
    }

    pub const fn link(&self) -> &LinkStatus {
        self.transport.link()
    }

    pub const fn sequence(&self) -> &SequenceCounters {
        &self.sequence
    }

    pub const fn handler(&self) -> &H {
        &self.handler
    }

    pub const fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Frames waiting for [`Engine::poll`]
    pub fn pending_frames(&self) -> u8 {
        self.pending_frames.load(Ordering::Acquire)
    }
}

impl<P: Serial, H: MessageHandler, const N: usize> Engine<P, H, N> {
    /// Send an application command through the normal queue
    ///
    /// Returns the number of bytes queued. A short count means the frame was
    /// truncated on a full queue and the peer will see a damaged frame. The
    /// outgoing counter only advances when at least one byte was queued.
    pub fn send(&self, command: &Command) -> usize {
        let written = self.enqueue(|_| command.clone());
        self.kick();
        written
    }

    /// Send a command that must not be dropped, spinning on a full queue
    ///
    /// On timeout the handler receives [`LinkAlert::ForcedTransmitTimeout`].
    pub fn send_forced(&self, command: &Command) -> Result<(), Error> {
        self.force(|_| command.clone())
    }

    /// Pause our outbound stream at the next frame boundary
    pub fn hold_transmit(&self) {
        let transport = &self.transport;
        transport.link().update(|flags| {
            if flags.contains(LinkFlags::SELF_WAITING) {
                return;
            }
            if !flags.contains(LinkFlags::TRANSMITTING) && transport.tx_at_boundary() {
                flags.insert(LinkFlags::SELF_WAITING);
            } else {
                flags.insert(LinkFlags::REQUEST_SELF_WAIT);
            }
        });
    }

    /// Lift a pause and restart the transmit pump
    pub fn resume_transmit(&self) {
        self.link()
            .remove(LinkFlags::SELF_WAITING | LinkFlags::REQUEST_SELF_WAIT);
        self.transport.begin_transmit();
    }

    /// Send our counters so the peer realigns to them
    pub fn request_resync(&self) -> usize {
        let written = self.enqueue(|counters| ControlCommand::Resync(counters).to_command());
        self.kick();
        written
    }

    /// Dispatch frames counted by the receive interrupt
    ///
    /// Only does work with [`FrameDispatch::Poll`]. Returns the number of
    /// frames taken off the receive queue.
    pub fn poll(&self) -> usize {
        let mut processed = 0;
        while self
            .pending_frames
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
        {
            self.process_frame();
            processed += 1;
        }
        processed
    }

    /// Drop all queued bytes and return every flag and counter to its
    /// initial value
    pub fn reset(&self) {
        critical_section::with(|cs| {
            self.transport.clear();
            self.transport.link().reset();
            self.sequence.reset();
            self.rx_cursor
                .borrow(cs)
                .set(FrameCursor::new(self.config.numbering));
            self.pending_frames.store(0, Ordering::Release);
        });
        self.transport.serial().disable_tx_empty_interrupt();
    }

    /// Receive-complete interrupt
    pub fn on_receive_complete(&self) {
        let received = self.transport.drive_receive_interrupt();
        let frame_end = critical_section::with(|cs| {
            let cursor = self.rx_cursor.borrow(cs);
            let mut next = cursor.get();
            let end = next.advance(received.byte());
            cursor.set(next);
            end
        });

        if let Received::Dropped(byte) = received {
            trace!("Receive queue full, dropped {:#x}", byte);
            self.signal_overflow();
        }

        if frame_end {
            match self.config.dispatch {
                FrameDispatch::Interrupt => self.process_frame(),
                FrameDispatch::Poll => {
                    let _ = self.pending_frames.fetch_update(
                        Ordering::AcqRel,
                        Ordering::Acquire,
                        |n| Some(n.saturating_add(1)),
                    );
                }
            }
        }
    }

    /// Transmit-complete interrupt
    pub fn on_transmit_complete(&self) {
        let transport = &self.transport;
        let arm = transport.link().update(|flags| {
            if flags.contains(LinkFlags::REQUEST_SELF_WAIT) {
                let at_boundary = transport.tx_at_boundary();
                if at_boundary || transport.tx_head_is_terminator() || transport.tx_len() == 0 {
                    flags.remove(LinkFlags::REQUEST_SELF_WAIT);
                    flags.insert(LinkFlags::SELF_WAITING);
                }
                if !at_boundary {
                    // Flush the rest of the frame first
                    return true;
                }
            }

            if flags.contains(LinkFlags::SELF_WAITING) {
                // Forced control frames pass the pause
                if transport.tx_priority_ready() {
                    return true;
                }
                flags.remove(LinkFlags::TRANSMITTING);
                return false;
            }
            if transport.tx_len() == 0 {
                flags.remove(LinkFlags::TRANSMITTING);
                return false;
            }
            true
        });

        if arm {
            transport.serial().enable_tx_empty_interrupt();
        }
    }

    /// Data-register-empty interrupt
    pub fn on_transmit_register_empty(&self) {
        if self.transport.drive_transmit_interrupt().is_none() {
            self.link().remove(LinkFlags::TRANSMITTING);
        }
        self.transport.serial().disable_tx_empty_interrupt();
    }

    fn counters(&self) -> Counters {
        let (outgoing, incoming) = self.sequence.snapshot();
        Counters { outgoing, incoming }
    }

    /// Start the pump unless our stream is paused with no forced frame
    /// waiting
    fn kick(&self) {
        if !self.link().contains(LinkFlags::SELF_WAITING) || self.transport.tx_priority_ready() {
            self.transport.begin_transmit();
        }
    }

    fn enqueue(&self, compose: impl FnOnce(Counters) -> Command) -> usize {
        critical_section::with(|_| {
            let command = compose(self.counters());
            let sequence = self.config.numbering.then(|| self.sequence.outgoing());
            let written = command.encode_and_enqueue(&self.transport, sequence);
            if written > 0 && self.config.numbering {
                self.sequence.stamp_outgoing();
            }
            written
        })
    }

    fn force(&self, compose: impl FnOnce(Counters) -> Command) -> Result<(), Error> {
        let (command, sequence) = critical_section::with(|_| {
            let command = compose(self.counters());
            let sequence = self
                .config
                .numbering
                .then(|| self.sequence.stamp_outgoing());
            (command, sequence)
        });

        let result =
            command.encode_and_force(&self.transport, sequence, self.config.force_spin_limit);
        self.kick();

        if let Err(err) = result {
            error!(
                "Forced transmit of opcode {:#x} timed out",
                command.opcode
            );
            self.handler.alert(LinkAlert::ForcedTransmitTimeout {
                opcode: command.opcode,
            });
            return Err(err);
        }
        Ok(())
    }

    /// Ask the partner to stop sending; only the first dropped byte does
    fn signal_overflow(&self) {
        let previous = self.link().insert(LinkFlags::PARTNER_WAITING);
        if previous.contains(LinkFlags::PARTNER_WAITING) {
            return;
        }

        warn!("Receive queue overflow, sending WAIT");
        self.link().insert(LinkFlags::WAITING_ACK);
        // Failure has already been reported through the handler's alert
        let _ = self.force(|_| ControlCommand::Wait.to_command());
    }

    fn read_frame(&self) -> Result<Option<InboundFrame>, Error> {
        let transport = &self.transport;
        let Some(opcode) = transport.receive() else {
            return Ok(None);
        };
        if opcode == FRAME_END {
            return Ok(None);
        }

        let numbered = self.config.numbering;
        let sequence = if numbered {
            Some(transport.receive().ok_or(Error::Truncated)?)
        } else {
            None
        };

        let mut command = Command::empty(opcode);
        // Counter bytes are positional and may equal the terminator
        for _ in 0..fixed_payload_len(opcode, numbered) {
            command.append(transport.receive().ok_or(Error::Truncated)?);
        }
        // A missing terminator means it was dropped on overflow
        command.fill_from_receive(transport, COMMAND_DATA_LENGTH);

        Ok(Some(InboundFrame { command, sequence }))
    }

    fn process_frame(&self) {
        let frame = match self.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(err) => {
                warn!("Discarding frame: {}", err);
                return;
            }
        };

        if let Some(sequence) = frame.sequence {
            let expected = self.sequence.incoming();
            if sequence != expected && frame.command.opcode != OP_RESYNC {
                warn!(
                    "Sequence mismatch: got {}, expected {}",
                    sequence,
                    expected
                );
                self.request_resync();
                return;
            }
        }

        if self.dispatch(&frame.command) {
            self.complete_frame();
        }
    }

    /// Returns `false` if the frame was discarded
    fn dispatch(&self, command: &Command) -> bool {
        match ControlCommand::from_command(command, self.config.numbering) {
            Some(ControlCommand::Wait) => {
                debug!("Partner asked us to wait");
                self.send(&ControlCommand::Ack.to_command());
                self.hold_transmit();
            }
            Some(ControlCommand::Resume(_)) => {
                debug!("Partner resumed us");
                self.resume_transmit();
            }
            Some(ControlCommand::Ack) => {
                let previous = self.link().remove(LinkFlags::WAITING_ACK);
                if !previous.contains(LinkFlags::WAITING_ACK) {
                    // Unsolicited, passed through as data
                    self.handler.handle(command);
                }
            }
            Some(ControlCommand::Resync(counters)) => {
                debug!(
                    "Resync to incoming {}, outgoing {}",
                    counters.outgoing,
                    counters.incoming
                );
                self.sequence.adopt(counters.outgoing, counters.incoming);
            }
            None if is_control(command.opcode) => {
                warn!(
                    "Control frame {:#x} with short payload",
                    command.opcode
                );
                return false;
            }
            None => self.handler.handle(command),
        }
        true
    }

    fn complete_frame(&self) {
        self.sequence.advance_incoming();

        // Taken before the RESUME goes out, so an overflow during the forced
        // send raises a fresh WAIT
        let previous = self.link().remove(LinkFlags::PARTNER_WAITING);
        if previous.contains(LinkFlags::PARTNER_WAITING) {
            let numbered = self.config.numbering;
            debug!("Receive queue drained, sending RESUME");
            // Forced frames start the transmitter even while we are paused
            let _ = self.force(|counters| {
                ControlCommand::Resume(numbered.then_some(counters)).to_command()
            });
        }
    }
}
