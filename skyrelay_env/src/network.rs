//! Radio transport abstraction for SkyRelay agents.

use crate::error::EnvError;
use crate::types::{NodeId, PacketEnvelope};

/// Abstraction for the range-limited radio between agents.
///
/// # Implementations
///
/// - **Simulation**: channel-based router that drops packets between nodes
///   farther apart than the transmission range
///
/// # Packet Flow
///
/// ```text
/// Agent A                    Radio                      Agent B
///   |                           |                          |
///   |-- send(B, packet) ------->|                          |
///   |                           |-- [in range?] ---------->|
///   |                           |                          |-- try_recv() -> packet
/// ```
pub trait RadioTransport {
    /// Sends a packet to a single target node.
    ///
    /// # Returns
    /// * `Ok(())` - Packet handed to the radio
    /// * `Err(EnvError::QueueFull)` - Radio busy, packet not taken
    /// * `Err(EnvError::ChannelClosed)` - Radio shut down
    ///
    /// # Note
    /// Success does not guarantee delivery - the target may be out of range.
    fn send(&self, target: NodeId, packet: PacketEnvelope) -> Result<(), EnvError>;

    /// Broadcasts a packet to every node in range.
    ///
    /// Returns `Err` only when the radio itself is unavailable.
    fn broadcast(&self, packet: PacketEnvelope) -> Result<(), EnvError>;

    /// Pops the next packet addressed to this node, if any.
    fn try_recv(&self) -> Option<(NodeId, PacketEnvelope)>;

    /// Returns this node's ID.
    fn local_id(&self) -> NodeId;
}
