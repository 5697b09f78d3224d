//! Onboard hardware plugins: mobility and camera.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A raw detection returned by the camera.
///
/// The camera knows nothing about PoIs; it reports every node it sees. Matching
/// detections against the PoI catalog is the protocol's job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// Position of the detected node [x, y, z] in meters
    pub position: [f64; 3],
}

impl RawDetection {
    pub fn new(position: Vector3<f64>) -> Self {
        Self {
            position: [position.x, position.y, position.z],
        }
    }

    pub fn point(&self) -> Vector3<f64> {
        Vector3::from(self.position)
    }
}

/// Waypoint-following flight controller.
pub trait Mobility {
    /// Replaces the current mission with an ordered list of waypoints.
    ///
    /// When `looped` is true the vehicle flies back to the first waypoint
    /// after the last and starts over, forever.
    fn start_mission(&mut self, waypoints: Vec<Vector3<f64>>, looped: bool);

    /// True when no mission is running (finished or never started).
    fn is_idle(&self) -> bool;

    /// The waypoint currently being flown to.
    fn current_waypoint(&self) -> Option<Vector3<f64>>;
}

/// Downward-facing camera.
pub trait Camera {
    /// Takes a picture and returns every node in view.
    fn take_picture(&self) -> Vec<RawDetection>;
}
