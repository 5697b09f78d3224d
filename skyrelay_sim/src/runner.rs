//! Scenario runner - executes a mission scenario and checks its invariants.

use crate::scenarios::ScenarioId;
use crate::world::{RunReport, SimWorld, DEFAULT_TICK_RATE_HZ};

use skyrelay_core::{MissionConfig, PolicyKind};
use tracing::{debug, info};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Assignment policy name
    pub policy: String,

    /// Whether the run upheld every invariant
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Full report, absent when the world could not be built
    pub report: Option<RunReport>,
}

/// Runs scenarios for one seed.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Parameters every scenario starts from
    base: MissionConfig,

    /// World steps per simulated second
    tick_rate_hz: u32,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, base: MissionConfig) -> Self {
        Self {
            seed,
            base,
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
        }
    }

    /// Sets the world step rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz;
        self
    }

    /// Overrides the assignment policy.
    pub fn with_policy(mut self, policy: PolicyKind) -> Self {
        self.base.policy = policy.name().to_string();
        self
    }

    /// Sets the run duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.base.duration_secs = secs;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        let mut config = scenario.configure(&self.base);
        config.seed = self.seed;

        info!(
            "Starting scenario: {} (seed={}, policy={})",
            scenario.name(),
            self.seed,
            config.policy
        );
        debug!("  {}", scenario.description());

        let mut world = match SimWorld::new(config.clone()) {
            Ok(world) => world.with_tick_rate(self.tick_rate_hz),
            Err(e) => {
                return ScenarioResult {
                    scenario,
                    seed: self.seed,
                    policy: config.policy,
                    passed: false,
                    total_ticks: 0,
                    final_time_secs: 0.0,
                    failure_reason: Some(e.to_string()),
                    report: None,
                }
            }
        };

        let report = world.run();
        let failure_reason = check_invariants(&config, &report).err();

        ScenarioResult {
            scenario,
            seed: self.seed,
            policy: config.policy,
            passed: failure_reason.is_none(),
            total_ticks: report.ticks,
            final_time_secs: report.final_time_secs,
            failure_reason,
            report: Some(report),
        }
    }
}

/// Verifies the run-wide guarantees of the protocol.
pub fn check_invariants(config: &MissionConfig, report: &RunReport) -> Result<(), String> {
    let m = &report.metrics;

    if !m.is_conserved() {
        return Err(format!(
            "Conservation violated: unique {} + redundant {} != processed {}",
            m.unique_delivered, m.redundant_delivers, m.processed_entries
        ));
    }

    if report.buffer_violations > 0 || report.max_buffer_load > config.buffer_capacity {
        return Err(format!(
            "Buffer bound violated: max load {} > capacity {} ({} violations)",
            report.max_buffer_load, config.buffer_capacity, report.buffer_violations
        ));
    }

    if m.max_assigned_per_encounter > config.max_assign_per_encounter {
        return Err(format!(
            "Encounter throttle violated: {} PoIs in one encounter (max {})",
            m.max_assigned_per_encounter, config.max_assign_per_encounter
        ));
    }

    if let Some(min) = m.min_latency_secs {
        if min < 0.0 {
            return Err(format!("Negative delivery latency: {:.3}s", min));
        }
    }

    if m.assign_success > m.assigns_sent {
        return Err(format!(
            "More assignment successes ({}) than assignments ({})",
            m.assign_success, m.assigns_sent
        ));
    }

    if m.unique_delivered > config.num_pois {
        return Err(format!(
            "{} unique deliveries from {} PoIs",
            m.unique_delivered, config.num_pois
        ));
    }

    Ok(())
}
