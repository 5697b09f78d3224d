//! Straight-line waypoint follower.

use nalgebra::Vector3;
use skyrelay_env::Mobility;
use std::sync::{Arc, Mutex};

/// Distance at which a waypoint counts as reached.
pub const WAYPOINT_TOLERANCE: f64 = 1.0;

#[derive(Debug)]
struct Kinematics {
    position: Vector3<f64>,
    speed: f64,
    waypoints: Vec<Vector3<f64>>,
    index: usize,
    looped: bool,
    /// Distance flown since the start of the run
    odometer: f64,
}

impl Kinematics {
    fn is_idle(&self) -> bool {
        self.index >= self.waypoints.len()
    }

    fn reached(&self) -> bool {
        (self.waypoints[self.index] - self.position).norm() <= WAYPOINT_TOLERANCE
    }

    fn advance(&mut self) {
        self.index += 1;
        if self.index >= self.waypoints.len() && self.looped {
            self.index = 0;
        }
    }
}

/// Simulated flight controller.
///
/// Clones share the vehicle: the agent commands it through one handle while
/// the world advances it and reads its position through another.
#[derive(Debug, Clone)]
pub struct SimMobility {
    state: Arc<Mutex<Kinematics>>,
}

impl SimMobility {
    pub fn new(position: Vector3<f64>, speed: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(Kinematics {
                position,
                speed,
                waypoints: Vec::new(),
                index: 0,
                looped: false,
                odometer: 0.0,
            })),
        }
    }

    pub fn position(&self) -> Vector3<f64> {
        self.state.lock().unwrap().position
    }

    pub fn odometer(&self) -> f64 {
        self.state.lock().unwrap().odometer
    }

    /// Flies for `dt` seconds.
    ///
    /// Reaching a waypoint ends the step there; the next waypoint is taken
    /// on the following step. Waypoints already within tolerance are skipped
    /// first, so a mission starting where the vehicle stands moves at once.
    pub fn step(&self, dt: f64) {
        let mut k = self.state.lock().unwrap();

        let mut skipped = 0;
        while !k.is_idle() && skipped < k.waypoints.len() && k.reached() {
            k.advance();
            skipped += 1;
        }
        if k.is_idle() {
            return;
        }

        let target = k.waypoints[k.index];
        let delta = target - k.position;
        let distance = delta.norm();
        let travel = (k.speed * dt).min(distance);
        if distance > 0.0 {
            k.position += delta * (travel / distance);
            k.odometer += travel;
        }

        if k.reached() {
            k.advance();
        }
    }
}

impl Mobility for SimMobility {
    fn start_mission(&mut self, waypoints: Vec<Vector3<f64>>, looped: bool) {
        let mut k = self.state.lock().unwrap();
        k.waypoints = waypoints;
        k.index = 0;
        k.looped = looped;
    }

    fn is_idle(&self) -> bool {
        self.state.lock().unwrap().is_idle()
    }

    fn current_waypoint(&self) -> Option<Vector3<f64>> {
        let k = self.state.lock().unwrap();
        k.waypoints.get(k.index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flies_to_waypoint_and_goes_idle() {
        let mut mobility = SimMobility::new(Vector3::zeros(), 5.0);
        assert!(mobility.is_idle());

        mobility.start_mission(vec![Vector3::new(10.0, 0.0, 0.0)], false);
        assert!(!mobility.is_idle());

        mobility.step(1.0);
        assert!((mobility.position().x - 5.0).abs() < 1e-9);
        assert!(!mobility.is_idle());

        mobility.step(1.0);
        assert!(mobility.is_idle());
        assert!((mobility.odometer() - 10.0).abs() < 1e-9);
        assert_eq!(mobility.current_waypoint(), None);
    }

    #[test]
    fn test_looped_mission_never_idles() {
        let mut mobility = SimMobility::new(Vector3::zeros(), 10.0);
        mobility.start_mission(
            vec![Vector3::new(10.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 0.0)],
            true,
        );
        for _ in 0..10 {
            mobility.step(1.0);
            assert!(!mobility.is_idle());
        }
    }

    #[test]
    fn test_empty_mission_is_idle() {
        let mut mobility = SimMobility::new(Vector3::zeros(), 5.0);
        mobility.start_mission(Vec::new(), true);
        assert!(mobility.is_idle());
    }
}
