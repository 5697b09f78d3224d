//! Hand-driven implementations of the environment traits.
//!
//! These are what unit tests plug into agents: the test owns the clock,
//! injects packets, flips the mobility idle flag and inspects everything the
//! agent sent or scheduled.

use crate::{Camera, EnvError, MissionContext, Mobility, NodeId, PacketEnvelope, RadioTransport, RawDetection};
use nalgebra::Vector3;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Context whose clock only moves when the test says so.
pub struct ManualContext {
    node: NodeId,
    now: Mutex<Duration>,
    timers: Mutex<Vec<(String, Duration)>>,
}

impl ManualContext {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            now: Mutex::new(Duration::ZERO),
            timers: Mutex::new(Vec::new()),
        }
    }

    pub fn shared(node: NodeId) -> Arc<Self> {
        Arc::new(Self::new(node))
    }

    pub fn set_time_secs(&self, secs: f64) {
        *self.now.lock().unwrap() = Duration::from_secs_f64(secs);
    }

    /// Returns and clears every timer scheduled so far.
    pub fn take_timers(&self) -> Vec<(String, Duration)> {
        std::mem::take(&mut *self.timers.lock().unwrap())
    }
}

impl MissionContext for ManualContext {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap()
    }

    fn schedule_timer(&self, timer: &str, fire_at: Duration) {
        self.timers.lock().unwrap().push((timer.to_string(), fire_at));
    }

    fn node_id(&self) -> NodeId {
        self.node
    }

    fn seed(&self) -> u64 {
        0
    }
}

/// Where a recorded packet was headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Unicast(NodeId),
    Broadcast,
}

/// Radio that records outgoing packets and serves a test-filled inbox.
pub struct LoopbackRadio {
    local_id: NodeId,
    outbox: Mutex<Vec<(Destination, PacketEnvelope)>>,
    inbox: Mutex<VecDeque<(NodeId, PacketEnvelope)>>,
}

impl LoopbackRadio {
    pub fn new(local_id: NodeId) -> Self {
        Self {
            local_id,
            outbox: Mutex::new(Vec::new()),
            inbox: Mutex::new(VecDeque::new()),
        }
    }

    pub fn shared(local_id: NodeId) -> Arc<Self> {
        Arc::new(Self::new(local_id))
    }

    /// Queues a packet as if `from` had sent it to this node.
    pub fn inject(&self, from: NodeId, packet: PacketEnvelope) {
        self.inbox.lock().unwrap().push_back((from, packet));
    }

    /// Returns and clears every packet sent so far.
    pub fn take_sent(&self) -> Vec<(Destination, PacketEnvelope)> {
        std::mem::take(&mut *self.outbox.lock().unwrap())
    }
}

impl RadioTransport for LoopbackRadio {
    fn send(&self, target: NodeId, packet: PacketEnvelope) -> Result<(), EnvError> {
        self.outbox
            .lock()
            .unwrap()
            .push((Destination::Unicast(target), packet));
        Ok(())
    }

    fn broadcast(&self, packet: PacketEnvelope) -> Result<(), EnvError> {
        self.outbox
            .lock()
            .unwrap()
            .push((Destination::Broadcast, packet));
        Ok(())
    }

    fn try_recv(&self) -> Option<(NodeId, PacketEnvelope)> {
        self.inbox.lock().unwrap().pop_front()
    }

    fn local_id(&self) -> NodeId {
        self.local_id
    }
}

#[derive(Debug, Default)]
struct MobilityState {
    missions: Vec<(Vec<Vector3<f64>>, bool)>,
    idle: bool,
}

/// Mobility plugin that records missions; the test decides when it is idle.
///
/// Cloning yields another handle on the same state, so a test can keep one
/// while the agent owns the other.
#[derive(Debug, Clone, Default)]
pub struct ScriptedMobility {
    state: Arc<Mutex<MobilityState>>,
}

impl ScriptedMobility {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MobilityState {
                missions: Vec::new(),
                idle: true,
            })),
        }
    }

    pub fn set_idle(&self, idle: bool) {
        self.state.lock().unwrap().idle = idle;
    }

    /// Every mission started so far, oldest first.
    pub fn missions(&self) -> Vec<(Vec<Vector3<f64>>, bool)> {
        self.state.lock().unwrap().missions.clone()
    }

    pub fn last_mission(&self) -> Option<Vec<Vector3<f64>>> {
        self.state
            .lock()
            .unwrap()
            .missions
            .last()
            .map(|(waypoints, _)| waypoints.clone())
    }
}

impl Mobility for ScriptedMobility {
    fn start_mission(&mut self, waypoints: Vec<Vector3<f64>>, looped: bool) {
        let mut state = self.state.lock().unwrap();
        state.idle = waypoints.is_empty();
        state.missions.push((waypoints, looped));
    }

    fn is_idle(&self) -> bool {
        self.state.lock().unwrap().idle
    }

    fn current_waypoint(&self) -> Option<Vector3<f64>> {
        let state = self.state.lock().unwrap();
        if state.idle {
            return None;
        }
        state
            .missions
            .last()
            .and_then(|(waypoints, _)| waypoints.first().copied())
    }
}

/// Camera that returns whatever the test last put in front of it.
#[derive(Debug, Clone, Default)]
pub struct FixedCamera {
    view: Arc<Mutex<Vec<RawDetection>>>,
}

impl FixedCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_view(&self, detections: Vec<RawDetection>) {
        *self.view.lock().unwrap() = detections;
    }
}

impl Camera for FixedCamera {
    fn take_picture(&self) -> Vec<RawDetection> {
        self.view.lock().unwrap().clone()
    }
}
