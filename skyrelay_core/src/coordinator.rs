//! Coordinator (EQC) - detects PoIs from its patrol and hands them out.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Coordinator                           │
//! │                                                              │
//! │  "detect" timer ──► Camera ──► DetectionFilter ──► pending   │
//! │                                                      │       │
//! │  HELLO ──► encounters ──────► AssignmentPolicy ◄─────┘       │
//! │                                      │                       │
//! │                                      ▼                       │
//! │                          in-flight ──► ASSIGN                │
//! │                              │                               │
//! │  DELIVER ──► reconcile ◄─────┘ ──► Metrics ──► DELIVER_ACK   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every handler runs to completion and never fails: protocol anomalies are
//! logged and the offending entry or packet is dropped.

use crate::catalog::{Poi, PoiCatalog};
use crate::config::MissionConfig;
use crate::detection::DetectionFilter;
use crate::error::ProtocolError;
use crate::intercept::PatrolRoute;
use crate::messages::{AssignedPoi, CoordinatorFix, DeliverEntry, Message};
use crate::metrics::{DeliveryOutcome, Metrics, MetricsSummary};
use crate::policy::{AssignLimits, AssignmentBatch, AssignmentPolicy, EncounterState, PolicyKind};

use nalgebra::Vector3;
use skyrelay_env::{Camera, MissionContext, Mobility, NodeId, PacketEnvelope, RadioTransport};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Name of the periodic detection timer.
pub const DETECT_TIMER: &str = "detect";

/// The single exploration agent.
///
/// Generic over the context and radio implementations so the same protocol
/// code runs against the simulator or the hand-driven test doubles.
pub struct Coordinator<Ctx, Net>
where
    Ctx: MissionContext,
    Net: RadioTransport,
{
    /// Node identifier (always the coordinator id)
    pub node_id: NodeId,

    context: Arc<Ctx>,
    radio: Arc<Net>,
    camera: Box<dyn Camera>,
    mobility: Box<dyn Mobility>,

    config: MissionConfig,
    catalog: Arc<PoiCatalog>,
    route: PatrolRoute,

    filter: DetectionFilter,

    /// Detected, not yet assigned or delivered, in detection order
    pending: Vec<Poi>,

    /// Visiting agents that have said HELLO, by id
    encounters: BTreeMap<NodeId, EncounterState>,

    /// label → assign time, for PoIs assigned but not yet delivered
    in_flight: HashMap<String, f64>,

    /// `None` when the configured name is unknown
    policy: Option<Box<dyn AssignmentPolicy>>,

    metrics: Metrics,

    position: Vector3<f64>,
    waypoint: Option<Vector3<f64>>,
}

impl<Ctx, Net> Coordinator<Ctx, Net>
where
    Ctx: MissionContext,
    Net: RadioTransport,
{
    /// Creates a coordinator parked at the start of its patrol.
    ///
    /// An unknown policy name is not an error here: it is logged, and every
    /// assignment cycle of the run is skipped.
    pub fn new(
        context: Arc<Ctx>,
        radio: Arc<Net>,
        camera: Box<dyn Camera>,
        mobility: Box<dyn Mobility>,
        config: MissionConfig,
        catalog: Arc<PoiCatalog>,
    ) -> Result<Self, ProtocolError> {
        let route = PatrolRoute::for_mission(&config)?;

        let policy = match config.policy.parse::<PolicyKind>() {
            Ok(kind) => Some(kind.build()),
            Err(e) => {
                error!("{}; no PoIs will be assigned", e);
                None
            }
        };

        let position = route.waypoints()[0];
        let start = context.now_secs();

        Ok(Self {
            node_id: radio.local_id(),
            filter: DetectionFilter::new(config.detect_epsilon),
            context,
            radio,
            camera,
            mobility,
            config,
            catalog,
            route,
            pending: Vec::new(),
            encounters: BTreeMap::new(),
            in_flight: HashMap::new(),
            policy,
            metrics: Metrics::new(start),
            position,
            waypoint: None,
        })
    }

    /// Returns the current mission time from the context.
    pub fn now_secs(&self) -> f64 {
        self.context.now_secs()
    }

    /// Starts the patrol and the detection timer.
    pub fn initialize(&mut self) {
        let now = self.now_secs();
        self.metrics.reset(now);
        self.mobility
            .start_mission(self.route.waypoints().to_vec(), true);
        self.schedule_detect();

        info!(
            "EQC {} patrolling {} waypoints (policy={})",
            self.node_id,
            self.route.waypoints().len(),
            self.policy_name().unwrap_or("none")
        );
    }

    fn schedule_detect(&self) {
        let fire_at = self.context.now() + Duration::from_secs_f64(self.config.detect_period_secs);
        self.context.schedule_timer(DETECT_TIMER, fire_at);
    }

    /// Dispatches a fired timer.
    pub fn handle_timer(&mut self, timer: &str) {
        match timer {
            DETECT_TIMER => self.on_detect_tick(),
            other => debug!("EQC ignoring unknown timer '{}'", other),
        }
    }

    fn on_detect_tick(&mut self) {
        let now = self.now_secs();
        let detections = self.camera.take_picture();
        let discovered = self
            .filter
            .process(self.catalog.pois(), &detections, now);

        for poi in discovered {
            if self.metrics.is_delivered(&poi.label) {
                debug!("EQC saw {} but it was already delivered", poi.label);
                continue;
            }
            info!("EQC detected {} at t={:.1}s", poi.label, now);
            self.pending.push(poi);
        }

        self.schedule_detect();
    }

    /// Records the coordinator's own position.
    pub fn handle_telemetry(&mut self, position: Vector3<f64>) {
        self.position = position;

        let waypoint = self.mobility.current_waypoint();
        if waypoint != self.waypoint {
            if let Some(wp) = waypoint {
                debug!("EQC heading to waypoint ({:.1}, {:.1})", wp.x, wp.y);
            }
            self.waypoint = waypoint;
        }
    }

    /// Drains the radio inbox.
    pub fn process_inbox(&mut self) {
        while let Some((from, packet)) = self.radio.try_recv() {
            self.handle_packet(from, &packet);
        }
    }

    /// Handles one incoming packet.
    pub fn handle_packet(&mut self, from: NodeId, packet: &PacketEnvelope) {
        let message = match Message::decode(packet) {
            Ok(message) => message,
            Err(e) => {
                warn!("EQC dropping packet from {}: {}", from, e);
                return;
            }
        };

        let agent = message.v_id();
        if !matches!(message, Message::Hello { .. }) && !self.encounters.contains_key(&agent) {
            warn!(
                "EQC dropping {} from VQC {}: no HELLO seen yet",
                message.kind(),
                agent
            );
            return;
        }

        match message {
            Message::Hello {
                v_id,
                free_slots,
                position,
            } => self.on_hello(v_id, free_slots, position),
            Message::Deliver { v_id, pids } => self.on_deliver(v_id, &pids),
            other => warn!("EQC ignoring unexpected {} from {}", other.kind(), from),
        }
    }

    fn on_hello(&mut self, v_id: NodeId, free_slots: usize, position: [f64; 3]) {
        let now = self.now_secs();
        let gap = self.config.encounter_gap_secs;

        match self.encounters.get_mut(&v_id) {
            Some(state) => {
                if now - state.last_hello_time > gap {
                    debug!("New encounter with VQC {} (quota reset)", v_id);
                    state.assigned_this_encounter = 0;
                }
                state.free_slots = free_slots;
                state.position = position;
                state.last_hello_time = now;
            }
            None => {
                info!("First HELLO from VQC {} ({} free slots)", v_id, free_slots);
                self.encounters
                    .insert(v_id, EncounterState::new(free_slots, position, now));
            }
        }

        let fix = CoordinatorFix {
            position: [self.position.x, self.position.y, self.position.z],
            time: now,
        };
        self.send(
            v_id,
            &Message::HelloAck {
                v_id,
                coordinator: Some(fix),
            },
        );

        self.run_assignment();
    }

    fn on_deliver(&mut self, v_id: NodeId, entries: &[DeliverEntry]) {
        let now = self.now_secs();
        let mut acknowledged = Vec::with_capacity(entries.len());

        for entry in entries {
            let (id, label) = match entry.validate() {
                Ok(fields) => fields,
                Err(e) => {
                    warn!("EQC skipping DELIVER entry from VQC {}: {}", v_id, e);
                    self.metrics.record_malformed();
                    continue;
                }
            };

            let assigned_at = self.in_flight.remove(label);
            match self.metrics.record_delivery(label, assigned_at, now) {
                DeliveryOutcome::Assigned { latency } => {
                    info!("VQC {} delivered {} (latency {:.2}s)", v_id, label, latency)
                }
                DeliveryOutcome::AutoDelivered => {
                    info!("VQC {} delivered {} unassigned", v_id, label)
                }
                DeliveryOutcome::Redundant => {
                    debug!("VQC {} re-delivered {}", v_id, label)
                }
            }
            acknowledged.push(id.to_string());
        }

        let metrics = &self.metrics;
        self.pending.retain(|p| !metrics.is_delivered(&p.label));

        self.send(
            v_id,
            &Message::DeliverAck {
                v_id,
                pids: acknowledged,
            },
        );

        self.run_assignment();
    }

    /// Runs one assignment cycle and dispatches its batches.
    pub fn run_assignment(&mut self) {
        let Some(policy) = self.policy.as_mut() else {
            error!(
                "Unknown assignment policy '{}'; skipping assignment",
                self.config.policy
            );
            return;
        };
        if self.pending.is_empty() {
            return;
        }

        let limits = AssignLimits {
            max_per_encounter: self.config.max_assign_per_encounter,
            buffer_capacity: self.config.buffer_capacity,
        };
        let batches = policy.select(&self.pending, &self.encounters, &limits);

        for batch in batches {
            self.apply_batch(batch);
        }
    }

    fn apply_batch(&mut self, batch: AssignmentBatch) {
        let now = self.now_secs();
        let AssignmentBatch { agent, pois } = batch;
        let Some(state) = self.encounters.get_mut(&agent) else {
            warn!("Policy picked unknown VQC {}; batch dropped", agent);
            return;
        };

        let count = pois.len();
        state.free_slots = state.free_slots.saturating_sub(count);
        state.assigned_this_encounter += count;
        self.metrics
            .record_assign(count, state.assigned_this_encounter);

        self.pending
            .retain(|p| !pois.iter().any(|a| a.label == p.label));

        let assigned: Vec<AssignedPoi> = pois
            .iter()
            .map(|poi| {
                self.in_flight.insert(poi.label.clone(), now);
                let detected_at = self.filter.first_seen(&poi.label).unwrap_or(now);
                AssignedPoi::from_poi(poi, detected_at)
            })
            .collect();

        info!(
            "ASSIGN {:?} -> VQC {}",
            pois.iter().map(|p| p.label.as_str()).collect::<Vec<_>>(),
            agent
        );
        self.send(
            agent,
            &Message::Assign {
                v_id: agent,
                pois: assigned,
            },
        );
    }

    fn send(&self, target: NodeId, message: &Message) {
        let result = message
            .encode(self.now_secs())
            .and_then(|packet| Ok(self.radio.send(target, packet)?));
        if let Err(e) = result {
            warn!("EQC failed to send {} to {}: {}", message.kind(), target, e);
        }
    }

    /// Computes and logs the final metrics.
    pub fn finish(&self) -> MetricsSummary {
        let summary = self
            .metrics
            .summarize(self.now_secs(), self.in_flight.len());

        info!(
            "EQC finished: unique={} redundant={} auto={} malformed={}",
            summary.unique_delivered,
            summary.redundant_delivers,
            summary.auto_delivered,
            summary.malformed_entries
        );
        info!(
            "  assigns={} success={} rate={} avg_latency={} discovery_rate={}",
            summary.assigns_sent,
            summary.assign_success,
            fmt_rate(summary.success_rate),
            fmt_rate(summary.avg_latency_secs),
            fmt_rate(summary.discovery_rate)
        );
        info!(
            "  detections: {} raw, {} PoIs, {} still pending",
            self.filter.raw_count(),
            self.filter.match_count(),
            self.pending.len()
        );
        if summary.leaked_in_flight > 0 {
            let mut leaked: Vec<&str> = self.in_flight.keys().map(String::as_str).collect();
            leaked.sort_unstable();
            warn!("  never delivered after ASSIGN: {:?}", leaked);
        }

        summary
    }

    pub fn pending(&self) -> &[Poi] {
        &self.pending
    }

    pub fn is_in_flight(&self, label: &str) -> bool {
        self.in_flight.contains_key(label)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn encounter(&self, agent: NodeId) -> Option<&EncounterState> {
        self.encounters.get(&agent)
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn policy_name(&self) -> Option<&'static str> {
        self.policy.as_ref().map(|p| p.name())
    }

    pub fn position(&self) -> Vector3<f64> {
        self.position
    }
}

fn fmt_rate(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.3}", v),
        None => "undefined".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Urgency;
    use skyrelay_env::testing::{Destination, FixedCamera, LoopbackRadio, ManualContext, ScriptedMobility};
    use skyrelay_env::RawDetection;

    struct Harness {
        ctx: Arc<ManualContext>,
        radio: Arc<LoopbackRadio>,
        camera: FixedCamera,
        mobility: ScriptedMobility,
        eqc: Coordinator<ManualContext, LoopbackRadio>,
    }

    fn harness(policy: &str, pois: Vec<Poi>) -> Harness {
        let ctx = ManualContext::shared(NodeId::COORDINATOR);
        let radio = LoopbackRadio::shared(NodeId::COORDINATOR);
        let camera = FixedCamera::new();
        let mobility = ScriptedMobility::new();
        let config = MissionConfig {
            policy: policy.to_string(),
            ..MissionConfig::default()
        };
        let mut eqc = Coordinator::new(
            ctx.clone(),
            radio.clone(),
            Box::new(camera.clone()),
            Box::new(mobility.clone()),
            config,
            Arc::new(PoiCatalog::new(pois)),
        )
        .unwrap();
        eqc.initialize();
        Harness {
            ctx,
            radio,
            camera,
            mobility,
            eqc,
        }
    }

    fn poi(i: usize, x: f64, y: f64, urgency: Urgency) -> Poi {
        Poi::new(format!("042-{i:03}"), format!("POI-{}", i + 1), [x, y], urgency)
    }

    fn five_pois() -> Vec<Poi> {
        (0..5)
            .map(|i| poi(i, 5.0 + i as f64, 5.0, Urgency::Medium))
            .collect()
    }

    fn packet(message: Message) -> PacketEnvelope {
        message.encode(0.0).unwrap()
    }

    fn hello(v: u32, free: usize) -> PacketEnvelope {
        packet(Message::Hello {
            v_id: NodeId(v),
            free_slots: free,
            position: [5.0, 5.0, 4.0],
        })
    }

    fn deliver(v: u32, entries: Vec<DeliverEntry>) -> PacketEnvelope {
        packet(Message::Deliver {
            v_id: NodeId(v),
            pids: entries,
        })
    }

    fn sent_messages(radio: &LoopbackRadio) -> Vec<(Destination, Message)> {
        radio
            .take_sent()
            .into_iter()
            .map(|(to, p)| (to, Message::decode(&p).unwrap()))
            .collect()
    }

    fn assigned_labels(messages: &[(Destination, Message)]) -> Vec<String> {
        messages
            .iter()
            .filter_map(|(_, m)| match m {
                Message::Assign { pois, .. } => Some(pois.iter().map(|p| p.label.clone())),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Puts every catalog PoI in front of the camera and fires the tick.
    fn detect_all(h: &mut Harness, pois: &[Poi]) {
        h.camera.set_view(
            pois.iter()
                .map(|p| RawDetection::new(Vector3::new(p.coord[0], p.coord[1], 0.0)))
                .collect(),
        );
        h.eqc.handle_timer(DETECT_TIMER);
    }

    #[test]
    fn test_initialize_starts_looped_patrol() {
        let h = harness("greedy", vec![]);
        let missions = h.mobility.missions();
        assert_eq!(missions.len(), 1);
        assert!(missions[0].1, "patrol must loop");
        assert_eq!(missions[0].0.len(), 12);

        let timers = h.ctx.take_timers();
        assert_eq!(timers, vec![(DETECT_TIMER.to_string(), Duration::from_secs(1))]);
    }

    #[test]
    fn test_detect_tick_registers_once_and_reschedules() {
        let pois = five_pois();
        let mut h = harness("greedy", pois.clone());
        h.ctx.take_timers();

        detect_all(&mut h, &pois[..2]);
        detect_all(&mut h, &pois[..3]);

        let labels: Vec<&str> = h.eqc.pending().iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["POI-1", "POI-2", "POI-3"]);
        assert_eq!(h.ctx.take_timers().len(), 2);
    }

    #[test]
    fn test_hello_gets_ack_with_fix_then_assign() {
        let pois = five_pois();
        let mut h = harness("greedy", pois.clone());
        detect_all(&mut h, &pois[..1]);

        h.ctx.set_time_secs(2.0);
        h.radio.inject(NodeId(1), hello(1, 5));
        h.eqc.process_inbox();

        let sent = sent_messages(&h.radio);
        assert_eq!(sent[0].0, Destination::Unicast(NodeId(1)));
        let Message::HelloAck { coordinator: Some(fix), .. } = &sent[0].1 else {
            panic!("expected HELLO_ACK with coordinator fix");
        };
        assert_eq!(fix.time, 2.0);

        let Message::Assign { pois: assigned, .. } = &sent[1].1 else {
            panic!("expected ASSIGN");
        };
        assert_eq!(assigned[0].label, "POI-1");
        // ts is the first-detection time, not the assign time
        assert_eq!(assigned[0].ts, 0.0);

        assert!(h.eqc.pending().is_empty());
        assert!(h.eqc.is_in_flight("POI-1"));
        assert_eq!(h.eqc.encounter(NodeId(1)).unwrap().free_slots, 4);
    }

    #[test]
    fn test_encounter_throttle_across_hellos() {
        let pois = five_pois();
        let mut h = harness("greedy", pois.clone());
        detect_all(&mut h, &pois);

        // Three HELLOs 1 s apart are one encounter
        for t in [1.0, 2.0, 3.0] {
            h.ctx.set_time_secs(t);
            h.eqc.handle_packet(NodeId(1), &hello(1, 5));
        }
        assert_eq!(assigned_labels(&sent_messages(&h.radio)).len(), 3);
        assert_eq!(h.eqc.encounter(NodeId(1)).unwrap().assigned_this_encounter, 3);

        // A 2 s silence starts a new encounter
        h.ctx.set_time_secs(5.0);
        h.eqc.handle_packet(NodeId(1), &hello(1, 5));
        assert_eq!(assigned_labels(&sent_messages(&h.radio)).len(), 2);
        assert_eq!(h.eqc.in_flight_count(), 5);
    }

    #[test]
    fn test_hello_exactly_at_gap_stays_in_encounter() {
        let pois = five_pois();
        let mut h = harness("greedy", pois.clone());
        detect_all(&mut h, &pois);

        h.ctx.set_time_secs(0.5);
        h.eqc.handle_packet(NodeId(1), &hello(1, 5));
        assert_eq!(assigned_labels(&sent_messages(&h.radio)).len(), 3);

        // 1.2 s is not more than the gap: quota stays used up
        h.ctx.set_time_secs(1.7);
        h.eqc.handle_packet(NodeId(1), &hello(1, 5));
        assert!(assigned_labels(&sent_messages(&h.radio)).is_empty());
        assert_eq!(h.eqc.encounter(NodeId(1)).unwrap().assigned_this_encounter, 3);

        // Just past the gap a new encounter begins
        h.ctx.set_time_secs(3.0);
        h.eqc.handle_packet(NodeId(1), &hello(1, 5));
        assert_eq!(assigned_labels(&sent_messages(&h.radio)).len(), 2);
    }

    #[test]
    fn test_hello_replay_does_not_double_count() {
        let mut h = harness("greedy", vec![]);
        h.ctx.set_time_secs(1.0);
        h.eqc.handle_packet(NodeId(2), &hello(2, 3));
        h.eqc.handle_packet(NodeId(2), &hello(2, 3));

        let state = h.eqc.encounter(NodeId(2)).unwrap();
        assert_eq!(state.free_slots, 3);
        assert_eq!(state.assigned_this_encounter, 0);
        assert_eq!(h.eqc.metrics().processed_entries(), 0);
    }

    #[test]
    fn test_deliver_from_unknown_agent_is_dropped() {
        let mut h = harness("greedy", vec![]);
        h.eqc
            .handle_packet(NodeId(3), &deliver(3, vec![DeliverEntry::new("042-000", "POI-1")]));

        assert!(h.radio.take_sent().is_empty());
        assert_eq!(h.eqc.metrics().processed_entries(), 0);
    }

    #[test]
    fn test_undecodable_packet_is_dropped() {
        let mut h = harness("greedy", vec![]);
        h.eqc
            .handle_packet(NodeId(1), &PacketEnvelope::new(b"not json".to_vec(), 0));
        assert!(h.radio.take_sent().is_empty());
    }

    #[test]
    fn test_matched_delivery_measures_latency_and_acks() {
        let pois = five_pois();
        let mut h = harness("greedy", pois.clone());
        detect_all(&mut h, &pois[..1]);

        h.ctx.set_time_secs(1.0);
        h.eqc.handle_packet(NodeId(1), &hello(1, 5));
        h.radio.take_sent();

        h.ctx.set_time_secs(4.5);
        h.eqc.handle_packet(
            NodeId(1),
            &deliver(
                1,
                vec![
                    DeliverEntry::new("042-000", "POI-1"),
                    DeliverEntry {
                        id: None,
                        label: Some("POI-2".into()),
                    },
                ],
            ),
        );

        let latencies = h.eqc.metrics().latencies();
        assert_eq!(latencies.len(), 1);
        assert!((latencies[0].1 - 3.5).abs() < 1e-9);
        assert!(!h.eqc.is_in_flight("POI-1"));

        let sent = sent_messages(&h.radio);
        assert_eq!(
            sent[0].1,
            Message::DeliverAck {
                v_id: NodeId(1),
                pids: vec!["042-000".into()],
            }
        );

        let summary = h.eqc.finish();
        assert_eq!(summary.malformed_entries, 1);
        assert_eq!(summary.assign_success, 1);
        assert!(summary.is_conserved());
    }

    #[test]
    fn test_every_valid_entry_adds_coverage_sample() {
        let pois = five_pois();
        let mut h = harness("greedy", pois.clone());
        detect_all(&mut h, &pois[..1]);

        h.ctx.set_time_secs(1.0);
        h.eqc.handle_packet(NodeId(1), &hello(1, 5));
        assert!(h.eqc.is_in_flight("POI-1"));

        h.ctx.set_time_secs(4.0);
        h.eqc.handle_packet(
            NodeId(1),
            &deliver(
                1,
                vec![
                    DeliverEntry::new("042-000", "POI-1"),
                    DeliverEntry::new("042-001", "POI-2"),
                    DeliverEntry::new("042-001", "POI-2"),
                    DeliverEntry {
                        id: Some("042-002".into()),
                        label: None,
                    },
                ],
            ),
        );

        assert_eq!(
            h.eqc.metrics().coverage_timeline(),
            &[(4.0, 1), (4.0, 2), (4.0, 2)]
        );
        let summary = h.eqc.finish();
        assert_eq!(summary.assign_success, 1);
        assert_eq!(summary.auto_delivered, 1);
        assert_eq!(summary.redundant_delivers, 1);
        assert_eq!(summary.malformed_entries, 1);
    }

    #[test]
    fn test_casual_delivery_clears_pending() {
        let pois = five_pois();
        let mut h = harness("greedy", pois.clone());
        detect_all(&mut h, &pois[..2]);

        // Zero free slots: nothing gets assigned on HELLO
        h.eqc.handle_packet(NodeId(1), &hello(1, 0));
        h.eqc
            .handle_packet(NodeId(1), &deliver(1, vec![DeliverEntry::new("042-001", "POI-2")]));
        h.eqc
            .handle_packet(NodeId(1), &deliver(1, vec![DeliverEntry::new("042-001", "POI-2")]));

        let labels: Vec<&str> = h.eqc.pending().iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["POI-1"]);

        let summary = h.eqc.finish();
        assert_eq!(summary.unique_delivered, 1);
        assert_eq!(summary.auto_delivered, 1);
        assert_eq!(summary.redundant_delivers, 1);
        assert!(summary.is_conserved());
    }

    #[test]
    fn test_delivered_poi_not_pending_again() {
        let pois = five_pois();
        let mut h = harness("greedy", pois.clone());
        h.eqc.handle_packet(NodeId(1), &hello(1, 0));
        h.eqc
            .handle_packet(NodeId(1), &deliver(1, vec![DeliverEntry::new("042-000", "POI-1")]));

        detect_all(&mut h, &pois[..1]);
        assert!(h.eqc.pending().is_empty());
    }

    #[test]
    fn test_unknown_policy_skips_assignment() {
        let pois = five_pois();
        let mut h = harness("simulated_annealing", pois.clone());
        assert_eq!(h.eqc.policy_name(), None);
        detect_all(&mut h, &pois);

        h.eqc.handle_packet(NodeId(1), &hello(1, 5));
        let sent = sent_messages(&h.radio);
        assert_eq!(sent.len(), 1, "only the HELLO_ACK goes out");
        assert_eq!(h.eqc.pending().len(), 5);

        // Deliveries are still accounted for
        h.eqc
            .handle_packet(NodeId(1), &deliver(1, vec![DeliverEntry::new("042-004", "POI-5")]));
        assert_eq!(h.eqc.finish().unique_delivered, 1);
    }

    #[test]
    fn test_round_robin_alternates_agents() {
        let pois = five_pois();
        let mut h = harness("round_robin", pois.clone());
        h.eqc.handle_packet(NodeId(1), &hello(1, 5));
        h.eqc.handle_packet(NodeId(2), &hello(2, 5));
        h.radio.take_sent();

        detect_all(&mut h, &pois[..2]);
        h.eqc.run_assignment();
        h.eqc.run_assignment();

        let sent = sent_messages(&h.radio);
        let targets: Vec<Destination> = sent.iter().map(|(to, _)| *to).collect();
        assert_eq!(
            targets,
            vec![Destination::Unicast(NodeId(1)), Destination::Unicast(NodeId(2))]
        );
        assert_eq!(assigned_labels(&sent), vec!["POI-1", "POI-2"]);
    }

    #[test]
    fn test_telemetry_tracks_position() {
        let mut h = harness("greedy", vec![]);
        h.eqc.handle_telemetry(Vector3::new(3.0, 0.0, 7.0));
        assert_eq!(h.eqc.position(), Vector3::new(3.0, 0.0, 7.0));
    }
}
