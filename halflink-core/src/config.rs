//! Link configuration
//!
//! Fixed when the engine is constructed. With the `serde` feature the
//! configuration can be persisted as postcard binary data.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default number of retries for a forced transmit
pub const DEFAULT_FORCE_SPIN_LIMIT: u32 = 100_000;

/// Where received frames are decoded and dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FrameDispatch {
    /// Inside the receive interrupt, as soon as the terminator arrives
    #[default]
    Interrupt,
    /// From mainline code via `Engine::poll`
    Poll,
}

/// Link configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinkConfig {
    /// Stamp and check a sequence byte after every opcode
    pub numbering: bool,
    /// Frame dispatch context
    pub dispatch: FrameDispatch,
    /// Retries a forced transmit makes before giving up
    pub force_spin_limit: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkConfig {
    /// Numbered frames, interrupt dispatch
    pub const fn new() -> Self {
        Self {
            numbering: true,
            dispatch: FrameDispatch::Interrupt,
            force_spin_limit: DEFAULT_FORCE_SPIN_LIMIT,
        }
    }

    pub const fn with_numbering(mut self, numbering: bool) -> Self {
        self.numbering = numbering;
        self
    }

    pub const fn with_dispatch(mut self, dispatch: FrameDispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Clamped to at least one attempt
    pub const fn with_force_spin_limit(mut self, limit: u32) -> Self {
        self.force_spin_limit = if limit == 0 { 1 } else { limit };
        self
    }
}

#[cfg(feature = "serde")]
impl LinkConfig {
    /// Serialize into `buf`, returning the used prefix
    pub fn to_slice<'a>(&self, buf: &'a mut [u8]) -> Result<&'a mut [u8], postcard::Error> {
        postcard::to_slice(self, buf)
    }

    /// Deserialize a stored configuration
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}
