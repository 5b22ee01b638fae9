//! Link status register
//!
//! Independent flag bits, mutated from the receive interrupt, the transmit
//! interrupts and mainline code.

use core::ops::{BitAnd, BitOr, BitOrAssign, Not};

use portable_atomic::{AtomicU8, Ordering};

/// Set of link status bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkFlags(u8);

impl LinkFlags {
    /// No flag set
    pub const NORMAL: Self = Self(0x00);
    /// The partner has been told to wait: our receive queue overflowed and a
    /// WAIT went out. A RESUME is owed once a frame has been drained.
    pub const PARTNER_WAITING: Self = Self(0x01);
    /// This side has paused its own outbound stream
    pub const SELF_WAITING: Self = Self(0x02);
    /// Pause outbound traffic once the terminator in flight has left
    pub const REQUEST_SELF_WAIT: Self = Self(0x04);
    /// An acknowledgement is outstanding for a sent control frame
    pub const WAITING_ACK: Self = Self(0x08);
    /// The transmit pump is active; a transmit-complete interrupt is due
    pub const TRANSMITTING: Self = Self(0x10);

    /// Raw register value
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any bit of `other` is set
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for LinkFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for LinkFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for LinkFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl Not for LinkFlags {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self(!self.0)
    }
}

/// Process-wide link status register
///
/// Single-bit changes are one atomic RMW. Anything that tests one bit and
/// then changes another goes through [`LinkStatus::update`], which holds a
/// critical section for the whole sequence.
#[derive(Debug, Default)]
pub struct LinkStatus {
    bits: AtomicU8,
}

impl LinkStatus {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU8::new(LinkFlags::NORMAL.bits()),
        }
    }

    /// Snapshot of the register
    pub fn load(&self) -> LinkFlags {
        LinkFlags(self.bits.load(Ordering::Acquire))
    }

    /// Whether every bit of `flags` is currently set
    pub fn contains(&self, flags: LinkFlags) -> bool {
        self.load().contains(flags)
    }

    /// Set `flags`, returning the previous register value
    pub fn insert(&self, flags: LinkFlags) -> LinkFlags {
        LinkFlags(self.bits.fetch_or(flags.bits(), Ordering::AcqRel))
    }

    /// Clear `flags`, returning the previous register value
    pub fn remove(&self, flags: LinkFlags) -> LinkFlags {
        LinkFlags(self.bits.fetch_and(!flags.bits(), Ordering::AcqRel))
    }

    /// Run a compound read-modify-write with interrupts masked
    ///
    /// The closure sees the current flags and may change them; the result is
    /// stored before the critical section ends.
    pub fn update<R>(&self, f: impl FnOnce(&mut LinkFlags) -> R) -> R {
        critical_section::with(|_| {
            let mut flags = self.load();
            let result = f(&mut flags);
            self.bits.store(flags.bits(), Ordering::Release);
            result
        })
    }

    /// Return to [`LinkFlags::NORMAL`]
    pub fn reset(&self) {
        self.bits.store(LinkFlags::NORMAL.bits(), Ordering::Release);
    }
}
