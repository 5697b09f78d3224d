//! Simulated range-limited radio.
//!
//! Every node's `SimRadio` pushes frames into one router channel; the world
//! drains it with [`RadioRouter::route`], dropping frames whose endpoints are
//! out of range at routing time, and pushes the survivors into per-node
//! inbox channels.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use skyrelay_env::{EnvError, NodeId, PacketEnvelope, RadioTransport};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

const ROUTER_CAPACITY: usize = 10_000;
const INBOX_CAPACITY: usize = 1_000;

/// Internal message to the radio router.
#[derive(Debug)]
pub struct RadioFrame {
    pub from: NodeId,
    /// `None` for broadcast
    pub to: Option<NodeId>,
    pub packet: PacketEnvelope,
}

/// Simulated radio interface for an agent.
pub struct SimRadio {
    /// This node's ID
    local_id: NodeId,

    /// Sender to central router
    tx: mpsc::Sender<RadioFrame>,

    /// Receiver for incoming packets
    rx: Mutex<mpsc::Receiver<(NodeId, PacketEnvelope)>>,
}

impl SimRadio {
    fn push(&self, to: Option<NodeId>, packet: PacketEnvelope) -> Result<(), EnvError> {
        let frame = RadioFrame {
            from: self.local_id,
            to,
            packet,
        };
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnvError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => EnvError::ChannelClosed,
        })
    }
}

impl RadioTransport for SimRadio {
    fn send(&self, target: NodeId, packet: PacketEnvelope) -> Result<(), EnvError> {
        self.push(Some(target), packet)
    }

    fn broadcast(&self, packet: PacketEnvelope) -> Result<(), EnvError> {
        self.push(None, packet)
    }

    fn try_recv(&self) -> Option<(NodeId, PacketEnvelope)> {
        self.rx.lock().unwrap().try_recv().ok()
    }

    fn local_id(&self) -> NodeId {
        self.local_id
    }
}

/// Counters kept by the router.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioStats {
    /// Frames accepted from senders
    pub frames: u64,
    /// Payload bytes of those frames
    pub bytes: u64,
    /// Packets put into an inbox
    pub delivered: u64,
    /// Unicast packets dropped because the endpoints were too far apart
    pub out_of_range: u64,
    /// Unicast packets to a node that does not exist
    pub unknown_target: u64,
}

/// Central router delivering frames subject to range.
pub struct RadioRouter {
    range: f64,

    router_tx: mpsc::Sender<RadioFrame>,
    router_rx: mpsc::Receiver<RadioFrame>,

    inboxes: BTreeMap<NodeId, mpsc::Sender<(NodeId, PacketEnvelope)>>,

    stats: RadioStats,
}

impl RadioRouter {
    pub fn new(range: f64) -> Self {
        let (router_tx, router_rx) = mpsc::channel(ROUTER_CAPACITY);
        Self {
            range,
            router_tx,
            router_rx,
            inboxes: BTreeMap::new(),
            stats: RadioStats::default(),
        }
    }

    /// Creates the radio of a new node.
    pub fn attach(&mut self, node: NodeId) -> SimRadio {
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        self.inboxes.insert(node, inbox_tx);
        SimRadio {
            local_id: node,
            tx: self.router_tx.clone(),
            rx: Mutex::new(inbox_rx),
        }
    }

    fn in_range(&self, a: Option<&Vector3<f64>>, b: Option<&Vector3<f64>>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => (a - b).norm() <= self.range,
            _ => false,
        }
    }

    fn deliver(&mut self, to: NodeId, from: NodeId, packet: PacketEnvelope) {
        if let Some(inbox) = self.inboxes.get(&to) {
            if inbox.try_send((from, packet)).is_ok() {
                self.stats.delivered += 1;
            }
        }
    }

    /// Delivers every queued frame using the given node positions.
    ///
    /// Returns the number of frames processed.
    pub fn route(&mut self, positions: &BTreeMap<NodeId, Vector3<f64>>) -> usize {
        let mut processed = 0;

        while let Ok(frame) = self.router_rx.try_recv() {
            processed += 1;
            self.stats.frames += 1;
            self.stats.bytes += frame.packet.size() as u64;
            let origin = positions.get(&frame.from);

            match frame.to {
                Some(to) => {
                    if !self.inboxes.contains_key(&to) {
                        self.stats.unknown_target += 1;
                    } else if self.in_range(origin, positions.get(&to)) {
                        self.deliver(to, frame.from, frame.packet);
                    } else {
                        self.stats.out_of_range += 1;
                    }
                }
                None => {
                    let targets: Vec<NodeId> = self
                        .inboxes
                        .keys()
                        .copied()
                        .filter(|&node| node != frame.from)
                        .filter(|node| self.in_range(origin, positions.get(node)))
                        .collect();
                    for node in targets {
                        self.deliver(node, frame.from, frame.packet.clone());
                    }
                }
            }
        }

        processed
    }

    pub fn stats(&self) -> RadioStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions(points: &[(u32, f64, f64)]) -> BTreeMap<NodeId, Vector3<f64>> {
        points
            .iter()
            .map(|&(id, x, y)| (NodeId(id), Vector3::new(x, y, 0.0)))
            .collect()
    }

    #[test]
    fn test_unicast_respects_range() {
        let mut router = RadioRouter::new(7.0);
        let a = router.attach(NodeId(0));
        let b = router.attach(NodeId(1));

        a.send(NodeId(1), PacketEnvelope::new(vec![1], 0)).unwrap();
        router.route(&positions(&[(0, 0.0, 0.0), (1, 5.0, 0.0)]));
        assert_eq!(b.try_recv().map(|(from, _)| from), Some(NodeId(0)));

        a.send(NodeId(1), PacketEnvelope::new(vec![2, 3], 0)).unwrap();
        router.route(&positions(&[(0, 0.0, 0.0), (1, 8.0, 0.0)]));
        assert!(b.try_recv().is_none());
        assert_eq!(router.stats().out_of_range, 1);
        assert_eq!(router.stats().frames, 2);
        assert_eq!(router.stats().bytes, 3);
    }

    #[test]
    fn test_broadcast_reaches_neighbours_only() {
        let mut router = RadioRouter::new(7.0);
        let a = router.attach(NodeId(1));
        let near = router.attach(NodeId(0));
        let far = router.attach(NodeId(2));

        a.broadcast(PacketEnvelope::new(vec![9], 0)).unwrap();
        router.route(&positions(&[(0, 3.0, 0.0), (1, 0.0, 0.0), (2, 20.0, 0.0)]));

        assert!(near.try_recv().is_some());
        assert!(far.try_recv().is_none());
        // The sender does not hear itself
        assert!(a.try_recv().is_none());
    }

    #[test]
    fn test_unknown_target_counted() {
        let mut router = RadioRouter::new(7.0);
        let a = router.attach(NodeId(0));
        a.send(NodeId(9), PacketEnvelope::new(vec![], 0)).unwrap();

        assert_eq!(router.route(&positions(&[(0, 0.0, 0.0)])), 1);
        assert_eq!(router.stats().unknown_target, 1);
    }

    #[test]
    fn test_send_reports_full_router_queue() {
        let mut router = RadioRouter::new(7.0);
        let a = router.attach(NodeId(0));
        for _ in 0..ROUTER_CAPACITY {
            a.send(NodeId(1), PacketEnvelope::new(vec![], 0)).unwrap();
        }

        assert_eq!(
            a.send(NodeId(1), PacketEnvelope::new(vec![], 0)),
            Err(EnvError::QueueFull)
        );
        assert_eq!(router.route(&positions(&[(0, 0.0, 0.0)])), ROUTER_CAPACITY);
        assert!(a.broadcast(PacketEnvelope::new(vec![], 0)).is_ok());
    }

    #[test]
    fn test_send_after_router_shutdown_fails() {
        let mut router = RadioRouter::new(7.0);
        let a = router.attach(NodeId(0));
        drop(router);

        assert_eq!(
            a.broadcast(PacketEnvelope::new(vec![], 0)),
            Err(EnvError::ChannelClosed)
        );
    }
}
