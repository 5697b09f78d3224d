//! Detection filter: turns raw camera detections into first-time PoI sightings.

use crate::catalog::Poi;
use nalgebra::Vector3;
use skyrelay_env::RawDetection;
use std::collections::HashMap;

/// True when `point` sits on `poi` within a planar tolerance, at ground level.
pub fn matches(poi: &Poi, point: &Vector3<f64>, epsilon: f64) -> bool {
    (point.x - poi.coord[0]).abs() < epsilon
        && (point.y - poi.coord[1]).abs() < epsilon
        && point.z.abs() < epsilon
}

/// Remembers which PoIs have been seen and when.
#[derive(Debug, Clone)]
pub struct DetectionFilter {
    epsilon: f64,

    /// label → time of first detection
    first_seen: HashMap<String, f64>,

    /// Raw detections processed (every node the camera saw)
    raw_count: u64,

    /// Detections that turned out to be new PoIs
    match_count: u64,
}

impl DetectionFilter {
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon,
            first_seen: HashMap::new(),
            raw_count: 0,
            match_count: 0,
        }
    }

    /// Matches a camera picture against the catalog.
    ///
    /// Returns the PoIs seen for the first time, in catalog order. A PoI that
    /// was already registered is ignored no matter how often it reappears.
    pub fn process(&mut self, catalog: &[Poi], detections: &[RawDetection], now: f64) -> Vec<Poi> {
        self.raw_count += detections.len() as u64;
        if detections.is_empty() {
            return Vec::new();
        }

        let points: Vec<Vector3<f64>> = detections.iter().map(RawDetection::point).collect();
        let mut discovered = Vec::new();

        for poi in catalog {
            if self.first_seen.contains_key(&poi.label) {
                continue;
            }
            if points.iter().any(|p| matches(poi, p, self.epsilon)) {
                self.first_seen.insert(poi.label.clone(), now);
                self.match_count += 1;
                discovered.push(poi.clone());
            }
        }

        discovered
    }

    /// When the PoI with this label was first detected.
    pub fn first_seen(&self, label: &str) -> Option<f64> {
        self.first_seen.get(label).copied()
    }

    pub fn raw_count(&self) -> u64 {
        self.raw_count
    }

    pub fn match_count(&self) -> u64 {
        self.match_count
    }
}
