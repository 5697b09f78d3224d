//! Error types for the SkyRelay environment abstraction.

use thiserror::Error;

/// Failures a radio reports when handed a packet.
///
/// Range and unknown targets are not errors: the packet is accepted and
/// silently lost, as it would be in the air.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    /// Outgoing queue cannot take another packet right now
    #[error("Radio queue full")]
    QueueFull,

    /// The radio has been shut down
    #[error("Radio channel closed")]
    ChannelClosed,
}
