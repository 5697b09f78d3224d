//! SimWorld - The simulation harness container.
//!
//! One step of the world, at the configured tick rate:
//!
//! ```text
//! advance clock ─► move vehicles ─► telemetry ─► fire due timers ─► route radio
//!                                                                    (until quiet)
//! ```

use crate::context::SimContext;
use crate::mobility::SimMobility;
use crate::network::{RadioRouter, RadioStats, SimRadio};
use crate::oracle::{Oracle, SimCamera};

use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use skyrelay_core::intercept::PatrolRoute;
use skyrelay_core::{
    ConfigError, Coordinator, MetricsSummary, MissionConfig, PoiCatalog, ProtocolError,
    VisitingAgent, VisitorReport,
};
use skyrelay_env::{MissionContext, NodeId};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default world step rate.
pub const DEFAULT_TICK_RATE_HZ: u32 = 10;

/// Radio delivery rounds per step before giving up on quiescence.
const MAX_ROUTING_ROUNDS: usize = 32;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Invalid mission config: {0}")]
    Config(#[from] ConfigError),

    #[error("Agent setup failed: {0}")]
    Protocol(#[from] ProtocolError),
}

/// A visiting agent and the vehicle it flies.
struct VisitorSlot {
    agent: VisitingAgent<SimContext, SimRadio>,
    vehicle: SimMobility,
}

/// Everything a finished run reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub seed: u64,
    pub policy: String,
    pub ticks: u64,
    pub final_time_secs: f64,

    /// Coordinator metrics at `finish()`
    pub metrics: MetricsSummary,

    pub visitors: Vec<VisitorReport>,
    pub radio: RadioStats,

    /// Highest discovered + queued count seen on any agent
    pub max_buffer_load: usize,

    /// Steps at which some agent exceeded its buffer capacity
    pub buffer_violations: u64,

    /// Distance flown by the coordinator
    pub eqc_distance: f64,
}

/// The SimWorld - container for the entire simulation.
pub struct SimWorld {
    pub config: MissionConfig,

    /// Shared simulation context (virtual clock + timer queue)
    pub context: Arc<SimContext>,

    pub catalog: Arc<PoiCatalog>,

    /// Ground truth oracle
    pub oracle: Arc<Oracle>,

    router: RadioRouter,

    coordinator: Coordinator<SimContext, SimRadio>,
    eqc_vehicle: SimMobility,

    visitors: BTreeMap<NodeId, VisitorSlot>,

    tick_rate_hz: u32,
    tick_count: u64,

    max_buffer_load: usize,
    buffer_violations: u64,
}

impl SimWorld {
    /// Builds the coordinator and `num_vqcs` visiting agents.
    pub fn new(config: MissionConfig) -> Result<Self, SimError> {
        config.validate()?;

        // Separate seed for start positions so the catalog stays put when
        // the fleet size changes
        let physics_seed = config.seed.wrapping_mul(0x9e3779b97f4a7c15);
        let mut rng = ChaCha8Rng::seed_from_u64(physics_seed);

        let context = SimContext::shared(config.seed);
        let catalog = Arc::new(PoiCatalog::generate(config.seed, config.num_pois, config.area));
        let oracle = Arc::new(Oracle::new(&catalog));
        let mut router = RadioRouter::new(config.radio_range);

        let patrol_start = PatrolRoute::for_mission(&config)?.waypoints()[0];
        let eqc_vehicle = SimMobility::new(patrol_start, config.eqc_speed);
        let eqc_radio = Arc::new(router.attach(NodeId::COORDINATOR));
        let camera = SimCamera::new(
            NodeId::COORDINATOR,
            Arc::clone(&oracle),
            eqc_vehicle.clone(),
            config.camera_reach,
        );
        let coordinator = Coordinator::new(
            context.for_node(NodeId::COORDINATOR),
            eqc_radio,
            Box::new(camera),
            Box::new(eqc_vehicle.clone()),
            config.clone(),
            Arc::clone(&catalog),
        )?;

        let mut visitors = BTreeMap::new();
        for i in 1..=config.num_vqcs {
            let id = NodeId(i as u32);
            let start = Vector3::new(
                rng.gen_range(0.0..config.area),
                rng.gen_range(0.0..config.area),
                config.vqc_altitude,
            );
            let vehicle = SimMobility::new(start, config.vqc_speed);
            let agent = VisitingAgent::new(
                context.for_node(id),
                Arc::new(router.attach(id)),
                Box::new(vehicle.clone()),
                config.clone(),
                Arc::clone(&catalog),
                start,
            )?;
            visitors.insert(id, VisitorSlot { agent, vehicle });
        }

        Ok(Self {
            config,
            context,
            catalog,
            oracle,
            router,
            coordinator,
            eqc_vehicle,
            visitors,
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            tick_count: 0,
            max_buffer_load: 0,
            buffer_violations: 0,
        })
    }

    /// Sets the step rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz.max(1);
        self
    }

    /// Starts every agent's mission and timers.
    pub fn initialize(&mut self) {
        self.coordinator.initialize();
        for slot in self.visitors.values_mut() {
            slot.agent.initialize();
        }
        self.publish_positions();
        info!(
            "World ready: {} PoIs, {} VQCs, policy={}",
            self.catalog.len(),
            self.visitors.len(),
            self.config.policy
        );
    }

    fn positions(&self) -> BTreeMap<NodeId, Vector3<f64>> {
        let mut positions = BTreeMap::new();
        positions.insert(NodeId::COORDINATOR, self.eqc_vehicle.position());
        for (&id, slot) in &self.visitors {
            positions.insert(id, slot.vehicle.position());
        }
        positions
    }

    fn publish_positions(&self) {
        for (id, position) in self.positions() {
            self.oracle.update_vehicle(id, position);
        }
    }

    /// Advances the simulation by one step.
    pub fn step(&mut self) {
        let dt = 1.0 / self.tick_rate_hz as f64;
        self.context.advance_time(Duration::from_secs_f64(dt));

        // Move
        self.eqc_vehicle.step(dt);
        for slot in self.visitors.values() {
            slot.vehicle.step(dt);
        }
        self.publish_positions();

        // Telemetry
        self.coordinator
            .handle_telemetry(self.eqc_vehicle.position());
        for slot in self.visitors.values_mut() {
            let position = slot.vehicle.position();
            slot.agent.handle_telemetry(position);
        }

        // Timers
        while let Some((node, timer)) = self.context.pop_due() {
            if node.is_coordinator() {
                self.coordinator.handle_timer(&timer);
            } else if let Some(slot) = self.visitors.get_mut(&node) {
                slot.agent.handle_timer(&timer);
            }
        }

        self.route_until_quiet();
        self.check_buffers();
        self.tick_count += 1;
    }

    fn route_until_quiet(&mut self) {
        let positions = self.positions();
        for _ in 0..MAX_ROUTING_ROUNDS {
            if self.router.route(&positions) == 0 {
                return;
            }
            self.coordinator.process_inbox();
            for slot in self.visitors.values_mut() {
                slot.agent.process_inbox();
            }
        }
        warn!("Radio still busy after {} rounds at t={:.1}s", MAX_ROUTING_ROUNDS, self.time());
    }

    fn check_buffers(&mut self) {
        let capacity = self.config.buffer_capacity;
        for (id, slot) in &self.visitors {
            let load = slot.agent.buffer_load();
            self.max_buffer_load = self.max_buffer_load.max(load);
            if load > capacity {
                self.buffer_violations += 1;
                warn!("VQC {} holds {} PoIs, capacity {}", id, load, capacity);
            }
        }
    }

    /// Runs until the configured duration and reports.
    pub fn run(&mut self) -> RunReport {
        self.initialize();

        let duration = self.config.duration_secs;
        let report_every = (self.tick_rate_hz as u64 * 10).max(1);
        while self.time() + 1e-9 < duration {
            self.step();
            if self.tick_count % report_every == 0 {
                debug!(
                    "  t={:.1}s | pending={} | in_flight={} | delivered={}",
                    self.time(),
                    self.coordinator.pending().len(),
                    self.coordinator.in_flight_count(),
                    self.coordinator.metrics().unique_count()
                );
            }
        }

        self.finish()
    }

    /// Calls `finish()` on every agent and collects the results.
    pub fn finish(&self) -> RunReport {
        let metrics = self.coordinator.finish();
        let visitors = self
            .visitors
            .values()
            .map(|slot| slot.agent.finish())
            .collect();

        RunReport {
            seed: self.config.seed,
            policy: self.config.policy.clone(),
            ticks: self.tick_count,
            final_time_secs: self.time(),
            metrics,
            visitors,
            radio: self.router.stats(),
            max_buffer_load: self.max_buffer_load,
            buffer_violations: self.buffer_violations,
            eqc_distance: self.eqc_vehicle.odometer(),
        }
    }

    /// Returns the current simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.context.now().as_secs_f64()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Number of visiting agents.
    pub fn agent_count(&self) -> usize {
        self.visitors.len()
    }

    pub fn coordinator(&self) -> &Coordinator<SimContext, SimRadio> {
        &self.coordinator
    }

    pub fn visitor(&self, id: NodeId) -> Option<&VisitingAgent<SimContext, SimRadio>> {
        self.visitors.get(&id).map(|slot| &slot.agent)
    }

    pub fn visitor_position(&self, id: NodeId) -> Option<Vector3<f64>> {
        self.visitors.get(&id).map(|slot| slot.vehicle.position())
    }
}
