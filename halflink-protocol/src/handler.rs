//! Application-facing callbacks

use halflink_core::LinkAlert;

use crate::command::Command;

/// Receives decoded application commands from the engine
///
/// Called from whichever context dispatches frames: the receive interrupt
/// with [`FrameDispatch::Interrupt`](halflink_core::FrameDispatch), or the
/// caller of `Engine::poll` otherwise. Implementations should return quickly.
pub trait MessageHandler {
    /// Handle one application command
    fn handle(&self, command: &Command);

    /// The link hit a condition it cannot recover from by itself
    fn alert(&self, alert: LinkAlert) {
        let _ = alert;
    }
}

impl<F> MessageHandler for F
where
    F: Fn(&Command),
{
    fn handle(&self, command: &Command) {
        self(command)
    }
}
