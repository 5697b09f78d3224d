//! Common types for the SkyRelay environment abstraction.

use serde::{Deserialize, Serialize};

/// Identifier of a node (quadcopter) in a mission.
///
/// The coordinator is always node `0`; visiting agents are numbered from `1`.
/// Formation offsets depend on the numeric value, so ids are small integers
/// rather than opaque UUIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The exploration coordinator's fixed id.
    pub const COORDINATOR: NodeId = NodeId(0);

    /// Returns the raw numeric id.
    pub fn get(self) -> u32 {
        self.0
    }

    /// True for the coordinator id.
    pub fn is_coordinator(self) -> bool {
        self == Self::COORDINATOR
    }
}

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Envelope for packets transmitted between nodes.
///
/// This is a transport-layer wrapper - the payload is an opaque serialized
/// protocol message decoded by the receiving agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketEnvelope {
    /// The raw serialized message
    pub payload: Vec<u8>,

    /// Sender's clock when the packet was created (milliseconds)
    pub timestamp_ms: u64,
}

impl PacketEnvelope {
    /// Creates a new envelope from payload bytes.
    pub fn new(payload: Vec<u8>, timestamp_ms: u64) -> Self {
        Self {
            payload,
            timestamp_ms,
        }
    }

    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId(3).to_string(), "#3");
        assert!(NodeId::COORDINATOR.is_coordinator());
        assert!(!NodeId(1).is_coordinator());
    }

    #[test]
    fn test_node_id_ordering() {
        let mut ids = vec![NodeId(4), NodeId(1), NodeId(2)];
        ids.sort();
        assert_eq!(ids, vec![NodeId(1), NodeId(2), NodeId(4)]);
    }
}
