//! Mission parameters shared by every agent in a run.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for a mission.
///
/// Distances are meters, speeds m/s, times seconds. Every field has a
/// default, so a JSON file only needs to list what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    /// Master seed (PoI catalog, start positions)
    pub seed: u64,

    /// Side `L` of the square search area
    pub area: f64,

    /// Number of PoIs generated for the run
    pub num_pois: usize,

    /// Number of visiting agents
    pub num_vqcs: usize,

    /// Per-agent buffer capacity `M` (discovered + queued)
    pub buffer_capacity: usize,

    /// Run length
    pub duration_secs: f64,

    /// Oblique reach of the coordinator's camera
    pub camera_reach: f64,

    /// Distance at which a visiting agent registers a PoI
    pub detect_range: f64,

    /// Radio transmission range
    pub radio_range: f64,

    /// Planar tolerance when matching detections to PoIs
    pub detect_epsilon: f64,

    /// Cap on PoIs assigned to one agent per encounter
    pub max_assign_per_encounter: usize,

    /// HELLO gap that starts a new encounter
    pub encounter_gap_secs: f64,

    /// Assignment policy name (`greedy`, `round_robin`, `load_balancing`)
    pub policy: String,

    pub eqc_speed: f64,
    pub vqc_speed: f64,
    pub eqc_altitude: f64,
    pub vqc_altitude: f64,

    /// Distance between lawnmower lanes of the patrol
    pub patrol_lane_spacing: f64,

    /// Lateral spacing between agents loitering near the coordinator
    pub formation_spacing: f64,

    /// Fixed-point refinements when solving for the intercept time
    pub intercept_iterations: usize,

    /// Period of the coordinator's detection tick
    pub detect_period_secs: f64,

    /// Period of the visiting agents' HELLO and roam timers
    pub hello_period_secs: f64,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            area: 50.0,
            num_pois: 25,
            num_vqcs: 5,
            buffer_capacity: 5,
            duration_secs: 100.0,
            camera_reach: 15.0,
            detect_range: 8.0,
            radio_range: 7.0,
            detect_epsilon: 0.2,
            max_assign_per_encounter: 3,
            encounter_gap_secs: 1.2,
            policy: "greedy".to_string(),
            eqc_speed: 5.0,
            vqc_speed: 5.0,
            eqc_altitude: 7.0,
            vqc_altitude: 4.0,
            patrol_lane_spacing: 10.0,
            formation_spacing: 2.0,
            intercept_iterations: 5,
            detect_period_secs: 1.0,
            hello_period_secs: 1.0,
        }
    }
}

impl MissionConfig {
    /// Loads a configuration from a JSON file and validates it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects parameters the protocol cannot run with.
    ///
    /// The policy name is not checked here; the coordinator logs an unknown
    /// policy and runs without assigning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("area", self.area),
            ("duration_secs", self.duration_secs),
            ("camera_reach", self.camera_reach),
            ("detect_range", self.detect_range),
            ("radio_range", self.radio_range),
            ("detect_epsilon", self.detect_epsilon),
            ("eqc_speed", self.eqc_speed),
            ("vqc_speed", self.vqc_speed),
            ("patrol_lane_spacing", self.patrol_lane_spacing),
            ("detect_period_secs", self.detect_period_secs),
            ("hello_period_secs", self.hello_period_secs),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::invalid(field, format!("must be > 0, got {value}")));
            }
        }
        if self.buffer_capacity == 0 {
            return Err(ConfigError::invalid("buffer_capacity", "must be at least 1"));
        }
        if self.max_assign_per_encounter == 0 {
            return Err(ConfigError::invalid("max_assign_per_encounter", "must be at least 1"));
        }
        if self.encounter_gap_secs < 0.0 {
            return Err(ConfigError::invalid("encounter_gap_secs", "must not be negative"));
        }
        Ok(())
    }
}
