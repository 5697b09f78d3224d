//! Mission scenarios for the simulator.

use skyrelay_core::MissionConfig;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Default mission parameters
    Baseline,

    /// Many PoIs for the same fleet
    Dense,

    /// Twice the fleet in the same area
    Crowded,

    /// One-slot buffers, one PoI per encounter
    TightBuffer,

    /// Few PoIs spread over a larger area
    Sparse,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Baseline,
            ScenarioId::Dense,
            ScenarioId::Crowded,
            ScenarioId::TightBuffer,
            ScenarioId::Sparse,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Baseline => "baseline",
            ScenarioId::Dense => "dense",
            ScenarioId::Crowded => "crowded",
            ScenarioId::TightBuffer => "tight_buffer",
            ScenarioId::Sparse => "sparse",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Baseline => "25 PoIs, 5 VQCs, buffer 5, 50 m area",
            ScenarioId::Dense => "60 PoIs for 5 VQCs: pending set never drains",
            ScenarioId::Crowded => "10 VQCs competing for the coordinator",
            ScenarioId::TightBuffer => "buffer 1 and 1 PoI per encounter: drop paths",
            ScenarioId::Sparse => "8 PoIs in an 80 m area: long idle stretches",
        }
    }

    /// Applies the scenario on top of a base configuration.
    pub fn configure(&self, base: &MissionConfig) -> MissionConfig {
        let mut config = base.clone();
        match self {
            ScenarioId::Baseline => {}
            ScenarioId::Dense => config.num_pois = 60,
            ScenarioId::Crowded => config.num_vqcs = base.num_vqcs * 2,
            ScenarioId::TightBuffer => {
                config.buffer_capacity = 1;
                config.max_assign_per_encounter = 1;
            }
            ScenarioId::Sparse => {
                config.num_pois = 8;
                config.area = 80.0;
            }
        }
        config
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "baseline" | "default" => Ok(ScenarioId::Baseline),
            "dense" => Ok(ScenarioId::Dense),
            "crowded" => Ok(ScenarioId::Crowded),
            "tight_buffer" | "tightbuffer" | "tight" => Ok(ScenarioId::TightBuffer),
            "sparse" => Ok(ScenarioId::Sparse),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
