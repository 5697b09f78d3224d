//! Visiting agent (VQC) - flies to PoIs and ferries them back.
//!
//! Two modes:
//!
//! ```text
//!            ASSIGN (non-empty queue)
//! Satellite ─────────────────────────► Visiting
//!     ▲                                    │
//!     └──────── mission idle ──────────────┘
//! ```
//!
//! In **Satellite** mode the agent loiters beside the coordinator: it
//! predicts where the coordinator will be and flies to a formation slot next
//! to that intercept point. In **Visiting** mode it flies its visit queue.
//!
//! In both modes every PoI that comes within detection range is buffered as
//! *discovered* (bounded by the buffer capacity together with the queue) and
//! stays buffered until the coordinator acknowledges it.

use crate::catalog::{Poi, PoiCatalog, Urgency};
use crate::config::MissionConfig;
use crate::error::ProtocolError;
use crate::intercept::{formation_offset, solve_intercept, PatrolRoute, RendezvousModel};
use crate::messages::{AssignedPoi, DeliverEntry, Message};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use skyrelay_env::{MissionContext, Mobility, NodeId, PacketEnvelope, RadioTransport};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Periodic capacity announcement.
pub const HELLO_TIMER: &str = "hello";

/// Periodic rendezvous re-planning while loitering.
pub const ROAM_TIMER: &str = "roam";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Loitering beside the coordinator
    Satellite,
    /// Flying the visit queue
    Visiting,
}

/// A PoI the agent was told to visit.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitTarget {
    pub label: String,
    pub coord: [f64; 2],
    pub urgency: Urgency,
}

impl From<&AssignedPoi> for VisitTarget {
    fn from(poi: &AssignedPoi) -> Self {
        Self {
            label: poi.label.clone(),
            coord: poi.coord,
            urgency: poi.urgency,
        }
    }
}

/// A PoI reached but not yet acknowledged by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPoi {
    pub id: String,
    pub label: String,
}

/// End-of-run state of one visiting agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitorReport {
    pub node_id: NodeId,
    pub mode: Mode,
    /// Discovered but never acknowledged
    pub unacknowledged: usize,
    pub queued: usize,
    pub visited: usize,
    /// Discoveries of PoIs that were in the visit queue
    pub assigned_found: u64,
    /// Discoveries made without an assignment
    pub casual_found: u64,
    /// Distinct PoIs left behind because the buffer was full
    pub dropped: usize,
}

pub struct VisitingAgent<Ctx, Net>
where
    Ctx: MissionContext,
    Net: RadioTransport,
{
    pub node_id: NodeId,

    context: Arc<Ctx>,
    radio: Arc<Net>,
    mobility: Box<dyn Mobility>,

    config: MissionConfig,
    catalog: Arc<PoiCatalog>,
    model: RendezvousModel,

    mode: Mode,

    /// Reached, awaiting DELIVER_ACK
    discovered: Vec<DiscoveredPoi>,

    /// Acknowledged PoI ids
    visited: HashSet<String>,

    /// Assigned and not yet reached, in flight order
    visit_queue: Vec<VisitTarget>,

    /// Labels already reported as dropped
    overflowed: HashSet<String>,

    assigned_found: u64,
    casual_found: u64,

    position: Vector3<f64>,
}

impl<Ctx, Net> VisitingAgent<Ctx, Net>
where
    Ctx: MissionContext,
    Net: RadioTransport,
{
    pub fn new(
        context: Arc<Ctx>,
        radio: Arc<Net>,
        mobility: Box<dyn Mobility>,
        config: MissionConfig,
        catalog: Arc<PoiCatalog>,
        start: Vector3<f64>,
    ) -> Result<Self, ProtocolError> {
        let model = RendezvousModel::new(PatrolRoute::for_mission(&config)?);

        Ok(Self {
            node_id: radio.local_id(),
            context,
            radio,
            mobility,
            config,
            catalog,
            model,
            mode: Mode::Satellite,
            discovered: Vec::new(),
            visited: HashSet::new(),
            visit_queue: Vec::new(),
            overflowed: HashSet::new(),
            assigned_found: 0,
            casual_found: 0,
            position: start,
        })
    }

    pub fn now_secs(&self) -> f64 {
        self.context.now_secs()
    }

    /// Starts the periodic timers and heads for the coordinator.
    pub fn initialize(&mut self) {
        self.schedule(HELLO_TIMER);
        self.schedule(ROAM_TIMER);
        self.plan_rendezvous();
    }

    fn schedule(&self, timer: &str) {
        let fire_at = self.context.now() + Duration::from_secs_f64(self.config.hello_period_secs);
        self.context.schedule_timer(timer, fire_at);
    }

    pub fn handle_timer(&mut self, timer: &str) {
        match timer {
            HELLO_TIMER => {
                self.send_hello();
                self.schedule(HELLO_TIMER);
            }
            ROAM_TIMER => {
                if self.mode == Mode::Satellite && self.mobility.is_idle() {
                    self.plan_rendezvous();
                }
                self.schedule(ROAM_TIMER);
            }
            other => debug!("VQC {} ignoring unknown timer '{}'", self.node_id, other),
        }
    }

    fn send_hello(&self) {
        let free_slots = self
            .config
            .buffer_capacity
            .saturating_sub(self.visit_queue.len());
        let hello = Message::Hello {
            v_id: self.node_id,
            free_slots,
            position: [self.position.x, self.position.y, self.position.z],
        };

        let result = hello
            .encode(self.now_secs())
            .and_then(|packet| Ok(self.radio.broadcast(packet)?));
        if let Err(e) = result {
            warn!("VQC {} failed to broadcast HELLO: {}", self.node_id, e);
        }
    }

    fn send_to_coordinator(&self, message: &Message) {
        let result = message
            .encode(self.now_secs())
            .and_then(|packet| Ok(self.radio.send(NodeId::COORDINATOR, packet)?));
        if let Err(e) = result {
            warn!("VQC {} failed to send {}: {}", self.node_id, message.kind(), e);
        }
    }

    /// Flies to this agent's formation slot at the predicted intercept.
    ///
    /// Returns the chosen waypoint.
    pub fn plan_rendezvous(&mut self) -> Vector3<f64> {
        let now = self.now_secs();
        let hit = solve_intercept(
            &self.model,
            &self.position,
            self.config.vqc_speed,
            now,
            self.config.intercept_iterations,
        );
        let heading = self.model.heading(hit.time);
        let offset = formation_offset(self.node_id, &heading, self.config.formation_spacing);

        let area = self.config.area;
        let target = Vector3::new(
            (hit.point.x + offset.x).clamp(0.0, area),
            (hit.point.y + offset.y).clamp(0.0, area),
            self.config.vqc_altitude,
        );

        debug!(
            "VQC {} rendezvous at ({:.1}, {:.1}) t*={:.1}s",
            self.node_id, target.x, target.y, hit.time
        );
        self.mobility.start_mission(vec![target], false);
        target
    }

    /// Drains the radio inbox.
    pub fn process_inbox(&mut self) {
        while let Some((from, packet)) = self.radio.try_recv() {
            self.handle_packet(from, &packet);
        }
    }

    pub fn handle_packet(&mut self, from: NodeId, packet: &PacketEnvelope) {
        let message = match Message::decode(packet) {
            Ok(message) => message,
            Err(e) => {
                warn!("VQC {} dropping packet from {}: {}", self.node_id, from, e);
                return;
            }
        };

        // Other agents' HELLOs reach us through broadcast
        if message.v_id() != self.node_id {
            return;
        }

        match message {
            Message::HelloAck { coordinator, .. } => {
                if let Some(fix) = coordinator {
                    self.model
                        .reanchor(&Vector3::from(fix.position), fix.time);
                }
                self.flush_discovered();
            }
            Message::Assign { pois, .. } => self.on_assign(&pois),
            Message::DeliverAck { pids, .. } => self.on_deliver_ack(&pids),
            other => debug!("VQC {} ignoring {}", self.node_id, other.kind()),
        }
    }

    /// Sends the whole discovered buffer; it is cleared only by DELIVER_ACK.
    fn flush_discovered(&self) {
        if self.discovered.is_empty() {
            return;
        }
        let pids = self
            .discovered
            .iter()
            .map(|d| DeliverEntry::new(d.id.as_str(), d.label.as_str()))
            .collect();

        debug!("VQC {} delivering {} PoIs", self.node_id, self.discovered.len());
        self.send_to_coordinator(&Message::Deliver {
            v_id: self.node_id,
            pids,
        });
    }

    fn is_done(&self, label: &str) -> bool {
        self.discovered.iter().any(|d| d.label == label)
            || self
                .catalog
                .by_label(label)
                .map_or(false, |p| self.visited.contains(&p.id))
    }

    fn on_assign(&mut self, pois: &[AssignedPoi]) {
        if pois.is_empty() {
            debug!("VQC {} got an empty ASSIGN", self.node_id);
            return;
        }

        let mut merged: Vec<VisitTarget> = Vec::new();
        for target in pois
            .iter()
            .map(VisitTarget::from)
            .chain(self.visit_queue.drain(..))
        {
            if merged.iter().any(|t| t.label == target.label) {
                continue;
            }
            merged.push(target);
        }
        merged.retain(|t| !self.is_done(&t.label));

        let capacity = self
            .config
            .buffer_capacity
            .saturating_sub(self.discovered.len());
        if merged.len() > capacity {
            let dropped: Vec<String> = merged.drain(capacity..).map(|t| t.label).collect();
            warn!(
                "VQC {} buffer full, dropping assigned targets {:?}",
                self.node_id, dropped
            );
        }
        self.visit_queue = merged;

        if self.visit_queue.is_empty() {
            debug!("VQC {} has nothing new to visit", self.node_id);
            return;
        }

        let altitude = self.config.vqc_altitude;
        let waypoints = self
            .visit_queue
            .iter()
            .map(|t| Vector3::new(t.coord[0], t.coord[1], altitude))
            .collect();
        self.mobility.start_mission(waypoints, false);
        self.mode = Mode::Visiting;

        info!(
            "VQC {} visiting {:?}",
            self.node_id,
            self.visit_queue.iter().map(|t| t.label.as_str()).collect::<Vec<_>>()
        );
    }

    fn on_deliver_ack(&mut self, ids: &[String]) {
        for id in ids {
            if let Some(index) = self.discovered.iter().position(|d| &d.id == id) {
                self.discovered.remove(index);
                self.visited.insert(id.clone());
            }
        }
    }

    /// Records a new position, discovers nearby PoIs and ends a finished visit.
    pub fn handle_telemetry(&mut self, position: Vector3<f64>) {
        self.position = position;
        self.discover_nearby();

        if self.mode == Mode::Visiting && self.mobility.is_idle() {
            info!(
                "VQC {} visit finished ({} targets left), back to satellite",
                self.node_id,
                self.visit_queue.len()
            );
            self.mode = Mode::Satellite;
            self.plan_rendezvous();
        }
    }

    fn discover_nearby(&mut self) {
        let catalog = Arc::clone(&self.catalog);
        for poi in catalog.iter() {
            if self.visited.contains(&poi.id) || self.discovered.iter().any(|d| d.id == poi.id) {
                continue;
            }
            if !self.in_detect_range(poi) {
                continue;
            }
            self.try_discover(poi);
        }
    }

    fn in_detect_range(&self, poi: &Poi) -> bool {
        let ground = Vector3::new(poi.coord[0], poi.coord[1], 0.0);
        (self.position - ground).norm() <= self.config.detect_range
    }

    fn try_discover(&mut self, poi: &Poi) {
        let capacity = self.config.buffer_capacity;
        let queued = self.visit_queue.iter().position(|t| t.label == poi.label);

        let admitted = match queued {
            // Moves from the queue into the buffer: the total is unchanged
            Some(index) if self.discovered.len() < capacity => {
                self.visit_queue.remove(index);
                self.assigned_found += 1;
                true
            }
            None if self.buffer_load() < capacity => {
                self.casual_found += 1;
                true
            }
            _ => false,
        };

        if admitted {
            info!(
                "VQC {} found {} ({})",
                self.node_id,
                poi.label,
                if queued.is_some() { "assigned" } else { "casual" }
            );
            self.discovered.push(DiscoveredPoi {
                id: poi.id.clone(),
                label: poi.label.clone(),
            });
            self.overflowed.remove(&poi.label);
        } else if self.overflowed.insert(poi.label.clone()) {
            warn!(
                "VQC {} buffer full ({}/{}), dropping {}",
                self.node_id,
                self.buffer_load(),
                capacity,
                poi.label
            );
        }
    }

    /// Discovered plus queued PoIs; never exceeds the buffer capacity.
    pub fn buffer_load(&self) -> usize {
        self.discovered.len() + self.visit_queue.len()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn discovered(&self) -> &[DiscoveredPoi] {
        &self.discovered
    }

    pub fn visit_queue(&self) -> &[VisitTarget] {
        &self.visit_queue
    }

    pub fn is_visited(&self, id: &str) -> bool {
        self.visited.contains(id)
    }

    pub fn position(&self) -> Vector3<f64> {
        self.position
    }

    pub fn finish(&self) -> VisitorReport {
        let report = VisitorReport {
            node_id: self.node_id,
            mode: self.mode,
            unacknowledged: self.discovered.len(),
            queued: self.visit_queue.len(),
            visited: self.visited.len(),
            assigned_found: self.assigned_found,
            casual_found: self.casual_found,
            dropped: self.overflowed.len(),
        };
        info!(
            "VQC {} finished: visited={} assigned={} casual={} queued={} unacked={}",
            self.node_id,
            report.visited,
            report.assigned_found,
            report.casual_found,
            report.queued,
            report.unacknowledged
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyrelay_env::testing::{Destination, LoopbackRadio, ManualContext, ScriptedMobility};

    struct Harness {
        ctx: Arc<ManualContext>,
        radio: Arc<LoopbackRadio>,
        mobility: ScriptedMobility,
        vqc: VisitingAgent<ManualContext, LoopbackRadio>,
    }

    fn catalog() -> Vec<Poi> {
        vec![
            Poi::new("042-000", "POI-1", [10.0, 10.0], Urgency::High),
            Poi::new("042-001", "POI-2", [30.0, 10.0], Urgency::Low),
            Poi::new("042-002", "POI-3", [30.0, 30.0], Urgency::Medium),
            Poi::new("042-003", "POI-4", [12.0, 10.0], Urgency::Medium),
        ]
    }

    fn harness(id: u32, buffer: usize) -> Harness {
        let ctx = ManualContext::shared(NodeId(id));
        let radio = LoopbackRadio::shared(NodeId(id));
        let mobility = ScriptedMobility::new();
        let config = MissionConfig {
            buffer_capacity: buffer,
            ..MissionConfig::default()
        };
        let vqc = VisitingAgent::new(
            ctx.clone(),
            radio.clone(),
            Box::new(mobility.clone()),
            config,
            Arc::new(PoiCatalog::new(catalog())),
            Vector3::new(45.0, 45.0, 4.0),
        )
        .unwrap();
        Harness {
            ctx,
            radio,
            mobility,
            vqc,
        }
    }

    fn assigned(label: &str, x: f64, y: f64) -> AssignedPoi {
        AssignedPoi {
            label: label.into(),
            coord: [x, y],
            urgency: Urgency::Medium,
            ts: 0.0,
        }
    }

    fn send(h: &mut Harness, message: Message) {
        let packet = message.encode(h.vqc.now_secs()).unwrap();
        h.vqc.handle_packet(NodeId::COORDINATOR, &packet);
    }

    fn assign(h: &mut Harness, pois: Vec<AssignedPoi>) {
        let v_id = h.vqc.node_id;
        send(h, Message::Assign { v_id, pois });
    }

    fn sent_messages(radio: &LoopbackRadio) -> Vec<(Destination, Message)> {
        radio
            .take_sent()
            .into_iter()
            .map(|(to, p)| (to, Message::decode(&p).unwrap()))
            .collect()
    }

    fn labels(vqc: &VisitingAgent<ManualContext, LoopbackRadio>) -> Vec<&str> {
        vqc.visit_queue().iter().map(|t| t.label.as_str()).collect()
    }

    #[test]
    fn test_initialize_schedules_timers_and_roams() {
        let mut h = harness(1, 5);
        h.vqc.initialize();

        let timers: Vec<String> = h.ctx.take_timers().into_iter().map(|(n, _)| n).collect();
        assert_eq!(timers, vec![HELLO_TIMER, ROAM_TIMER]);

        let mission = h.mobility.last_mission().unwrap();
        assert_eq!(mission.len(), 1);
        assert_eq!(mission[0].z, 4.0);
        assert_eq!(h.vqc.mode(), Mode::Satellite);
    }

    #[test]
    fn test_hello_announces_free_slots() {
        let mut h = harness(2, 5);
        assign(&mut h, vec![assigned("POI-2", 30.0, 10.0), assigned("POI-3", 30.0, 30.0)]);

        h.vqc.handle_timer(HELLO_TIMER);
        let sent = sent_messages(&h.radio);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Destination::Broadcast);
        let Message::Hello { v_id, free_slots, position } = &sent[0].1 else {
            panic!("expected HELLO");
        };
        assert_eq!(*v_id, NodeId(2));
        assert_eq!(*free_slots, 3);
        assert_eq!(*position, [45.0, 45.0, 4.0]);
        assert_eq!(h.ctx.take_timers().len(), 1);
    }

    #[test]
    fn test_assign_starts_visit() {
        let mut h = harness(1, 5);
        assign(&mut h, vec![assigned("POI-2", 30.0, 10.0), assigned("POI-3", 30.0, 30.0)]);

        assert_eq!(h.vqc.mode(), Mode::Visiting);
        let mission = h.mobility.last_mission().unwrap();
        assert_eq!(mission, vec![Vector3::new(30.0, 10.0, 4.0), Vector3::new(30.0, 30.0, 4.0)]);
    }

    #[test]
    fn test_empty_assign_keeps_satellite() {
        let mut h = harness(1, 5);
        assign(&mut h, vec![]);
        assert_eq!(h.vqc.mode(), Mode::Satellite);
        assert!(h.mobility.missions().is_empty());
    }

    #[test]
    fn test_assign_for_another_agent_ignored() {
        let mut h = harness(1, 5);
        send(
            &mut h,
            Message::Assign {
                v_id: NodeId(4),
                pois: vec![assigned("POI-2", 30.0, 10.0)],
            },
        );
        assert!(h.vqc.visit_queue().is_empty());
    }

    #[test]
    fn test_merge_prioritizes_new_targets_and_caps() {
        let mut h = harness(1, 3);
        assign(&mut h, vec![assigned("POI-2", 30.0, 10.0), assigned("POI-3", 30.0, 30.0)]);
        assign(&mut h, vec![assigned("POI-3", 30.0, 30.0), assigned("POI-1", 10.0, 10.0)]);
        assert_eq!(labels(&h.vqc), vec!["POI-3", "POI-1", "POI-2"]);

        assign(&mut h, vec![assigned("POI-4", 12.0, 10.0)]);
        assert_eq!(labels(&h.vqc), vec!["POI-4", "POI-3", "POI-1"]);
        assert!(h.vqc.buffer_load() <= 3);
    }

    #[test]
    fn test_reaching_queued_target_is_assigned_discovery() {
        let mut h = harness(1, 5);
        assign(&mut h, vec![assigned("POI-2", 30.0, 10.0), assigned("POI-3", 30.0, 30.0)]);

        h.vqc.handle_telemetry(Vector3::new(30.0, 10.0, 4.0));
        assert_eq!(labels(&h.vqc), vec!["POI-3"]);
        assert_eq!(h.vqc.discovered()[0].id, "042-001");
        assert_eq!(h.vqc.buffer_load(), 2);

        let report = h.vqc.finish();
        assert_eq!(report.assigned_found, 1);
        assert_eq!(report.casual_found, 0);
    }

    #[test]
    fn test_casual_discovery_while_roaming() {
        let mut h = harness(1, 5);
        // Both POI-1 and POI-4 are within 8 m
        h.vqc.handle_telemetry(Vector3::new(11.0, 10.0, 4.0));
        let ids: Vec<&str> = h.vqc.discovered().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["042-000", "042-003"]);
        assert_eq!(h.vqc.finish().casual_found, 2);
    }

    #[test]
    fn test_full_buffer_drops_discovery() {
        // M = 1 and already holding POI-1
        let mut h = harness(1, 1);
        h.vqc.handle_telemetry(Vector3::new(5.0, 10.0, 4.0));
        assert_eq!(h.vqc.discovered().len(), 1);

        h.vqc.handle_telemetry(Vector3::new(30.0, 10.0, 4.0));
        h.vqc.handle_telemetry(Vector3::new(30.0, 10.0, 4.0));
        assert_eq!(h.vqc.discovered().len(), 1);
        assert_eq!(h.vqc.discovered()[0].label, "POI-1");
        assert_eq!(h.vqc.finish().dropped, 1);
    }

    #[test]
    fn test_hello_ack_flushes_without_clearing() {
        let mut h = harness(1, 5);
        h.vqc.handle_telemetry(Vector3::new(30.0, 10.0, 4.0));

        let v_id = h.vqc.node_id;
        send(&mut h, Message::HelloAck { v_id, coordinator: None });
        send(&mut h, Message::HelloAck { v_id, coordinator: None });

        let sent = sent_messages(&h.radio);
        assert_eq!(sent.len(), 2);
        for (to, message) in &sent {
            assert_eq!(*to, Destination::Unicast(NodeId::COORDINATOR));
            assert_eq!(
                *message,
                Message::Deliver {
                    v_id,
                    pids: vec![DeliverEntry::new("042-001", "POI-2")],
                }
            );
        }
        assert_eq!(h.vqc.discovered().len(), 1);
    }

    #[test]
    fn test_hello_ack_with_empty_buffer_sends_nothing() {
        let mut h = harness(1, 5);
        let v_id = h.vqc.node_id;
        send(&mut h, Message::HelloAck { v_id, coordinator: None });
        assert!(h.radio.take_sent().is_empty());
    }

    #[test]
    fn test_deliver_ack_retires_and_is_idempotent() {
        let mut h = harness(1, 5);
        h.vqc.handle_telemetry(Vector3::new(30.0, 10.0, 4.0));

        let v_id = h.vqc.node_id;
        let ack = Message::DeliverAck {
            v_id,
            pids: vec!["042-001".into()],
        };
        send(&mut h, ack.clone());
        send(&mut h, ack);

        assert!(h.vqc.discovered().is_empty());
        assert!(h.vqc.is_visited("042-001"));

        // A visited PoI is never rediscovered
        h.vqc.handle_telemetry(Vector3::new(30.0, 10.0, 4.0));
        assert!(h.vqc.discovered().is_empty());
        assert_eq!(h.vqc.finish().visited, 1);
    }

    #[test]
    fn test_idle_visit_returns_to_satellite() {
        let mut h = harness(1, 5);
        assign(&mut h, vec![assigned("POI-3", 30.0, 30.0)]);
        assert_eq!(h.vqc.mode(), Mode::Visiting);

        h.mobility.set_idle(true);
        h.vqc.handle_telemetry(Vector3::new(40.0, 40.0, 4.0));
        assert_eq!(h.vqc.mode(), Mode::Satellite);
        // Leftover target kept for the next merge
        assert_eq!(labels(&h.vqc), vec!["POI-3"]);
        assert_eq!(h.mobility.last_mission().unwrap().len(), 1);
    }

    #[test]
    fn test_formation_slots_differ_by_parity() {
        let mut odd = harness(1, 5);
        let mut even = harness(2, 5);
        let a = odd.vqc.plan_rendezvous();
        let b = even.vqc.plan_rendezvous();
        assert!((a - b).norm() > 1.0);
    }
}
