//! Wire format of the HELLO / ASSIGN / DELIVER protocol.
//!
//! Messages travel as JSON objects tagged by `type`:
//!
//! ```text
//! VQC                                   EQC
//!  |-- HELLO {v_id, huecos, position} -->|
//!  |<-- HELLO_ACK {v_id, coordinator} ---|
//!  |-- DELIVER {v_id, pids:[{id,label}]}>|
//!  |<-- DELIVER_ACK {v_id, pids:[id]} ---|
//!  |<-- ASSIGN {v_id, pois:[...]} -------|
//! ```
//!
//! Every message carries the visiting agent's id as `v_id`, whichever side
//! sends it.

use crate::catalog::{Poi, Urgency};
use crate::error::ProtocolError;
use skyrelay_env::{NodeId, PacketEnvelope};
use serde::{Deserialize, Serialize};

/// A protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Capacity announcement from a visiting agent
    Hello {
        v_id: NodeId,
        #[serde(rename = "huecos")]
        free_slots: usize,
        position: [f64; 3],
    },

    /// Coordinator's reply to a HELLO
    HelloAck {
        v_id: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        coordinator: Option<CoordinatorFix>,
    },

    /// PoIs the coordinator wants visited
    Assign { v_id: NodeId, pois: Vec<AssignedPoi> },

    /// PoIs a visiting agent found
    Deliver { v_id: NodeId, pids: Vec<DeliverEntry> },

    /// Ids the coordinator has recorded
    DeliverAck { v_id: NodeId, pids: Vec<String> },
}

/// Coordinator position at a point in time, used to re-anchor rendezvous
/// predictions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorFix {
    pub position: [f64; 3],
    pub time: f64,
}

/// One PoI inside an ASSIGN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedPoi {
    pub label: String,
    pub coord: [f64; 2],
    pub urgency: Urgency,
    /// Time the coordinator first detected the PoI
    pub ts: f64,
}

impl AssignedPoi {
    pub fn from_poi(poi: &Poi, detected_at: f64) -> Self {
        Self {
            label: poi.label.clone(),
            coord: poi.coord,
            urgency: poi.urgency,
            ts: detected_at,
        }
    }
}

/// One delivered PoI inside a DELIVER.
///
/// Both fields are optional on the wire so that a single bad entry does not
/// make the whole batch undecodable; [`DeliverEntry::validate`] is applied on
/// receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl DeliverEntry {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            label: Some(label.into()),
        }
    }

    /// Returns `(id, label)` or the first missing field.
    pub fn validate(&self) -> Result<(&str, &str), ProtocolError> {
        let id = self
            .id
            .as_deref()
            .ok_or(ProtocolError::MalformedEntry { missing: "id" })?;
        let label = self
            .label
            .as_deref()
            .ok_or(ProtocolError::MalformedEntry { missing: "label" })?;
        Ok((id, label))
    }
}

impl Message {
    /// Wire name of the message kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Hello { .. } => "HELLO",
            Message::HelloAck { .. } => "HELLO_ACK",
            Message::Assign { .. } => "ASSIGN",
            Message::Deliver { .. } => "DELIVER",
            Message::DeliverAck { .. } => "DELIVER_ACK",
        }
    }

    /// The visiting agent this message concerns.
    pub fn v_id(&self) -> NodeId {
        match self {
            Message::Hello { v_id, .. }
            | Message::HelloAck { v_id, .. }
            | Message::Assign { v_id, .. }
            | Message::Deliver { v_id, .. }
            | Message::DeliverAck { v_id, .. } => *v_id,
        }
    }

    /// Serializes into a transport envelope stamped with the sender's clock.
    pub fn encode(&self, now_secs: f64) -> Result<PacketEnvelope, ProtocolError> {
        let payload = serde_json::to_vec(self).map_err(ProtocolError::Encode)?;
        Ok(PacketEnvelope::new(payload, (now_secs * 1000.0) as u64))
    }

    /// Parses a transport envelope.
    pub fn decode(packet: &PacketEnvelope) -> Result<Self, ProtocolError> {
        serde_json::from_slice(&packet.payload).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hello_wire_names() {
        let msg = Message::Hello {
            v_id: NodeId(3),
            free_slots: 2,
            position: [1.0, 2.0, 4.0],
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "HELLO");
        assert_eq!(value["v_id"], 3);
        assert_eq!(value["huecos"], 2);
    }

    #[test]
    fn test_ack_kinds_use_screaming_snake_case() {
        let ack = Message::DeliverAck {
            v_id: NodeId(1),
            pids: vec!["007-001".into()],
        };
        assert_eq!(serde_json::to_value(&ack).unwrap()["type"], "DELIVER_ACK");

        let hello_ack = Message::HelloAck {
            v_id: NodeId(1),
            coordinator: None,
        };
        let value = serde_json::to_value(&hello_ack).unwrap();
        assert_eq!(value["type"], "HELLO_ACK");
        assert!(value.get("coordinator").is_none());
    }

    #[test]
    fn test_decode_deliver_with_missing_fields() {
        let raw = json!({
            "type": "DELIVER",
            "v_id": 2,
            "pids": [{"id": "007-000", "label": "POI-1"}, {"label": "POI-2"}, {}]
        });
        let packet = PacketEnvelope::new(serde_json::to_vec(&raw).unwrap(), 0);
        let Message::Deliver { pids, .. } = Message::decode(&packet).unwrap() else {
            panic!("expected DELIVER");
        };

        assert_eq!(pids[0].validate().unwrap(), ("007-000", "POI-1"));
        assert!(matches!(
            pids[1].validate(),
            Err(ProtocolError::MalformedEntry { missing: "id" })
        ));
        assert!(pids[2].validate().is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let packet = PacketEnvelope::new(br#"{"type":"PING","v_id":1}"#.to_vec(), 0);
        assert!(matches!(Message::decode(&packet), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_encode_stamps_milliseconds() {
        let msg = Message::Assign {
            v_id: NodeId(1),
            pois: vec![AssignedPoi {
                label: "POI-4".into(),
                coord: [3.0, 4.0],
                urgency: Urgency::Low,
                ts: 1.5,
            }],
        };
        let packet = msg.encode(2.25).unwrap();
        assert_eq!(packet.timestamp_ms, 2250);
        assert_eq!(Message::decode(&packet).unwrap(), msg);
    }
}
