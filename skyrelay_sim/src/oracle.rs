//! Ground truth oracle for simulation.
//!
//! The Oracle maintains the "God's eye view" of the simulated world:
//! - True positions of all PoIs (on the ground, z = 0)
//! - True positions of all vehicles, refreshed by the world every step
//!
//! It backs the coordinator's camera: a picture is every ground-truth node
//! within camera reach, PoIs and airborne vehicles alike.

use crate::mobility::SimMobility;
use nalgebra::Vector3;
use skyrelay_core::PoiCatalog;
use skyrelay_env::{Camera, NodeId, RawDetection};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// The Oracle - knows where everything really is.
pub struct Oracle {
    pois: Vec<Vector3<f64>>,

    vehicles: Mutex<BTreeMap<NodeId, Vector3<f64>>>,
}

impl Oracle {
    pub fn new(catalog: &PoiCatalog) -> Self {
        Self {
            pois: catalog
                .iter()
                .map(|p| Vector3::new(p.coord[0], p.coord[1], 0.0))
                .collect(),
            vehicles: Mutex::new(BTreeMap::new()),
        }
    }

    /// Records where a vehicle is now.
    pub fn update_vehicle(&self, node: NodeId, position: Vector3<f64>) {
        self.vehicles.lock().unwrap().insert(node, position);
    }

    /// Every ground-truth node within `reach` of `viewpoint`.
    ///
    /// `exclude` is the observer itself.
    pub fn visible_from(&self, viewpoint: &Vector3<f64>, reach: f64, exclude: NodeId) -> Vec<RawDetection> {
        let vehicles = self.vehicles.lock().unwrap();
        self.pois
            .iter()
            .chain(
                vehicles
                    .iter()
                    .filter(|(&node, _)| node != exclude)
                    .map(|(_, position)| position),
            )
            .filter(|p| (*p - viewpoint).norm() <= reach)
            .map(|p| RawDetection::new(*p))
            .collect()
    }
}

/// Camera mounted on a simulated vehicle.
pub struct SimCamera {
    node: NodeId,
    oracle: Arc<Oracle>,
    vehicle: SimMobility,
    reach: f64,
}

impl SimCamera {
    pub fn new(node: NodeId, oracle: Arc<Oracle>, vehicle: SimMobility, reach: f64) -> Self {
        Self {
            node,
            oracle,
            vehicle,
            reach,
        }
    }
}

impl Camera for SimCamera {
    fn take_picture(&self) -> Vec<RawDetection> {
        self.oracle
            .visible_from(&self.vehicle.position(), self.reach, self.node)
    }
}
