//! The PoI catalog: deterministic, seed-reproducible Points of Interest.
//!
//! A catalog is generated once per run and is read-only afterwards. Every
//! agent may hold a shared reference to it; nothing in it ever changes.

use nalgebra::Vector2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How urgently a PoI needs a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Urgency {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl Urgency {
    /// Numeric weight used by distance-weighted scoring.
    pub fn weight(self) -> f64 {
        self as u8 as f64
    }
}

impl TryFrom<u8> for Urgency {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Urgency::Low),
            2 => Ok(Urgency::Medium),
            3 => Ok(Urgency::High),
            other => Err(format!("urgency must be 1, 2 or 3, got {other}")),
        }
    }
}

impl From<Urgency> for u8 {
    fn from(urgency: Urgency) -> Self {
        urgency as u8
    }
}

/// A Point of Interest on the ground.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    /// Globally unique id: `{seed:03}-{index:03}`
    pub id: String,

    /// Human-facing label, unique within a run: `POI-{index+1}`
    pub label: String,

    /// Ground position [x, y] in meters
    pub coord: [f64; 2],

    pub urgency: Urgency,
}

impl Poi {
    pub fn new(id: impl Into<String>, label: impl Into<String>, coord: [f64; 2], urgency: Urgency) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            coord,
            urgency,
        }
    }

    /// Ground position as a vector.
    pub fn point(&self) -> Vector2<f64> {
        Vector2::new(self.coord[0], self.coord[1])
    }
}

/// Generates `n` PoIs uniformly over an `area × area` square.
///
/// Deterministic in `seed` and prefix-stable: the i-th PoI depends only on
/// `seed` and `i`, so `generate(s, n, a)[..k] == generate(s, k, a)`.
pub fn generate(seed: u64, n: usize, area: f64) -> Vec<Poi> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    (0..n)
        .map(|i| {
            let x = rng.gen_range(0.0..area);
            let y = rng.gen_range(0.0..area);
            let urgency = match rng.gen_range(1u8..=3) {
                1 => Urgency::Low,
                2 => Urgency::Medium,
                _ => Urgency::High,
            };
            Poi::new(
                format!("{seed:03}-{i:03}"),
                format!("POI-{}", i + 1),
                [x, y],
                urgency,
            )
        })
        .collect()
}

/// Read-only PoI set with label lookup.
#[derive(Debug, Clone, Default)]
pub struct PoiCatalog {
    pois: Vec<Poi>,
    by_label: HashMap<String, usize>,
}

impl PoiCatalog {
    pub fn new(pois: Vec<Poi>) -> Self {
        let by_label = pois
            .iter()
            .enumerate()
            .map(|(idx, p)| (p.label.clone(), idx))
            .collect();
        Self {
            pois,
            by_label,
        }
    }

    /// Generates and indexes a catalog in one step.
    pub fn generate(seed: u64, n: usize, area: f64) -> Self {
        Self::new(generate(seed, n, area))
    }

    pub fn pois(&self) -> &[Poi] {
        &self.pois
    }

    pub fn iter(&self) -> impl Iterator<Item = &Poi> {
        self.pois.iter()
    }

    pub fn by_label(&self, label: &str) -> Option<&Poi> {
        self.by_label.get(label).map(|&idx| &self.pois[idx])
    }

    pub fn len(&self) -> usize {
        self.pois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pois.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_prefix_stable() {
        let long = generate(7, 50, 50.0);
        let short = generate(7, 25, 50.0);
        assert_eq!(&long[..25], &short[..]);
    }

    #[test]
    fn test_generate_is_deterministic_per_seed() {
        assert_eq!(generate(100, 10, 50.0), generate(100, 10, 50.0));
        assert_ne!(generate(100, 10, 50.0), generate(101, 10, 50.0));
    }

    #[test]
    fn test_generated_fields() {
        let pois = generate(7, 12, 30.0);
        assert_eq!(pois[0].id, "007-000");
        assert_eq!(pois[0].label, "POI-1");
        assert_eq!(pois[11].id, "007-011");
        assert_eq!(pois[11].label, "POI-12");
        for poi in &pois {
            assert!((0.0..30.0).contains(&poi.coord[0]));
            assert!((0.0..30.0).contains(&poi.coord[1]));
        }
    }

    #[test]
    fn test_urgency_serializes_as_integer() {
        let poi = Poi::new("a", "POI-1", [1.0, 2.0], Urgency::High);
        let json = serde_json::to_value(&poi).unwrap();
        assert_eq!(json["urgency"], 3);

        let back: Poi = serde_json::from_value(json).unwrap();
        assert_eq!(back.urgency, Urgency::High);
        assert!(serde_json::from_str::<Urgency>("4").is_err());
    }

    #[test]
    fn test_catalog_lookups() {
        let catalog = PoiCatalog::generate(3, 5, 50.0);
        assert_eq!(catalog.len(), 5);
        assert_eq!(catalog.by_label("POI-2").unwrap().id, "003-001");
        assert_eq!(catalog.pois()[4].label, "POI-5");
        assert!(catalog.by_label("POI-99").is_none());
    }
}
