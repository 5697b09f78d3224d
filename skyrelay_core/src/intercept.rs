//! Rendezvous prediction: where will the coordinator be, and where should a
//! visiting agent fly to meet it?
//!
//! The coordinator patrols a fixed, looping waypoint route at constant speed,
//! so its future position is a pure function of arc length:
//!
//! ```text
//!   s(t) = s_anchor + v_patrol · (t − t_anchor)      (mod cycle length)
//!   p(t) = route.point_at(s(t))
//! ```
//!
//! A visiting agent at `x` flying at `v` meets it at the `t*` where
//! `|x − p(t*)| / v == t* − now`, found by fixed-point iteration.

use crate::config::MissionConfig;
use crate::error::ProtocolError;
use nalgebra::{Vector2, Vector3};
use skyrelay_env::NodeId;

/// A closed patrol loop flown at constant speed.
///
/// After the last waypoint the vehicle flies straight back to the first.
#[derive(Debug, Clone, PartialEq)]
pub struct PatrolRoute {
    waypoints: Vec<Vector3<f64>>,
    speed: f64,

    /// Arc length at the start of each segment
    segment_starts: Vec<f64>,

    /// Length of each segment (the last one closes the loop)
    segment_lengths: Vec<f64>,

    cycle_length: f64,
}

impl PatrolRoute {
    pub fn new(waypoints: Vec<Vector3<f64>>, speed: f64) -> Result<Self, ProtocolError> {
        if waypoints.is_empty() {
            return Err(ProtocolError::InvalidRoute("no waypoints".into()));
        }
        if !(speed.is_finite() && speed > 0.0) {
            return Err(ProtocolError::InvalidRoute(format!("speed must be > 0, got {speed}")));
        }

        let n = waypoints.len();
        let mut segment_starts = Vec::with_capacity(n);
        let mut segment_lengths = Vec::with_capacity(n);
        let mut total = 0.0;
        for i in 0..n {
            let length = (waypoints[(i + 1) % n] - waypoints[i]).norm();
            segment_starts.push(total);
            segment_lengths.push(length);
            total += length;
        }

        Ok(Self {
            waypoints,
            speed,
            segment_starts,
            segment_lengths,
            cycle_length: total,
        })
    }

    /// Boustrophedon sweep over an `area × area` square.
    ///
    /// Lanes run along x at `y = 0, spacing, 2·spacing, …` plus a final lane
    /// at `y = area`, alternating direction.
    pub fn lawnmower(area: f64, lane_spacing: f64, altitude: f64, speed: f64) -> Result<Self, ProtocolError> {
        if !(area > 0.0 && lane_spacing > 0.0) {
            return Err(ProtocolError::InvalidRoute(format!(
                "area ({area}) and lane spacing ({lane_spacing}) must be > 0"
            )));
        }

        let mut lanes = Vec::new();
        let mut y = 0.0;
        while y < area {
            lanes.push(y);
            y += lane_spacing;
        }
        lanes.push(area);

        let waypoints = lanes
            .iter()
            .enumerate()
            .flat_map(|(k, &y)| {
                let (from, to) = if k % 2 == 0 { (0.0, area) } else { (area, 0.0) };
                [Vector3::new(from, y, altitude), Vector3::new(to, y, altitude)]
            })
            .collect();

        Self::new(waypoints, speed)
    }

    /// The coordinator's patrol for a mission. Both sides of the protocol
    /// build it from the same configuration.
    pub fn for_mission(config: &MissionConfig) -> Result<Self, ProtocolError> {
        Self::lawnmower(
            config.area,
            config.patrol_lane_spacing,
            config.eqc_altitude,
            config.eqc_speed,
        )
    }

    pub fn waypoints(&self) -> &[Vector3<f64>] {
        &self.waypoints
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn cycle_length(&self) -> f64 {
        self.cycle_length
    }

    /// Index of the segment containing arc length `s`, and the offset into it.
    fn locate(&self, s: f64) -> (usize, f64) {
        if self.cycle_length <= 0.0 {
            return (0, 0.0);
        }
        let s = s.rem_euclid(self.cycle_length);
        let idx = match self
            .segment_starts
            .iter()
            .rposition(|&start| start <= s)
        {
            Some(idx) => idx,
            None => 0,
        };
        (idx, (s - self.segment_starts[idx]).min(self.segment_lengths[idx]))
    }

    /// Position after flying `s` meters from the first waypoint.
    pub fn point_at(&self, s: f64) -> Vector3<f64> {
        let (idx, offset) = self.locate(s);
        let length = self.segment_lengths[idx];
        let from = self.waypoints[idx];
        if length <= 0.0 {
            return from;
        }
        let to = self.waypoints[(idx + 1) % self.waypoints.len()];
        from + (to - from) * (offset / length)
    }

    /// Unit planar direction of travel at arc length `s`.
    ///
    /// Zero-length segments borrow the direction of the next real one; a
    /// route that never moves heads along +x.
    pub fn heading_at(&self, s: f64) -> Vector2<f64> {
        let (start, _) = self.locate(s);
        let n = self.waypoints.len();
        for step in 0..n {
            let idx = (start + step) % n;
            let delta = self.waypoints[(idx + 1) % n] - self.waypoints[idx];
            let planar = Vector2::new(delta.x, delta.y);
            let norm = planar.norm();
            if norm > 1e-9 {
                return planar / norm;
            }
        }
        Vector2::new(1.0, 0.0)
    }

    /// Arc length of the route point closest (in the plane) to `point`.
    pub fn project(&self, point: &Vector3<f64>) -> f64 {
        let p = Vector2::new(point.x, point.y);
        let n = self.waypoints.len();
        let mut best = (f64::INFINITY, 0.0);

        for i in 0..n {
            let a = self.waypoints[i];
            let b = self.waypoints[(i + 1) % n];
            let a2 = Vector2::new(a.x, a.y);
            let ab = Vector2::new(b.x - a.x, b.y - a.y);
            let len_sq = ab.norm_squared();
            let t = if len_sq > 0.0 {
                ((p - a2).dot(&ab) / len_sq).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let distance = (a2 + ab * t - p).norm();
            if distance < best.0 {
                best = (distance, self.segment_starts[i] + t * self.segment_lengths[i]);
            }
        }

        best.1
    }
}

/// Time-indexed prediction of the coordinator's position.
#[derive(Debug, Clone, PartialEq)]
pub struct RendezvousModel {
    route: PatrolRoute,

    /// Arc length the coordinator was at when `anchor_time` was observed
    anchor_arc: f64,
    anchor_time: f64,
}

impl RendezvousModel {
    /// Assumes the coordinator leaves the first waypoint at time 0.
    pub fn new(route: PatrolRoute) -> Self {
        Self {
            route,
            anchor_arc: 0.0,
            anchor_time: 0.0,
        }
    }

    /// Re-synchronizes the phase from an observed coordinator position.
    pub fn reanchor(&mut self, position: &Vector3<f64>, time: f64) {
        self.anchor_arc = self.route.project(position);
        self.anchor_time = time;
    }

    fn arc_at(&self, time: f64) -> f64 {
        self.anchor_arc + self.route.speed() * (time - self.anchor_time)
    }

    /// Predicted coordinator position at `time`.
    pub fn predict(&self, time: f64) -> Vector3<f64> {
        self.route.point_at(self.arc_at(time))
    }

    /// Predicted coordinator heading at `time`.
    pub fn heading(&self, time: f64) -> Vector2<f64> {
        self.route.heading_at(self.arc_at(time))
    }
}

/// Where and when an agent meets the coordinator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intercept {
    pub time: f64,
    /// Predicted coordinator position at `time`
    pub point: Vector3<f64>,
}

/// Solves `t* − now == |from − p(t*)| / speed` by fixed-point iteration.
pub fn solve_intercept(
    model: &RendezvousModel,
    from: &Vector3<f64>,
    speed: f64,
    now: f64,
    iterations: usize,
) -> Intercept {
    let planar = |p: &Vector3<f64>| Vector2::new(p.x - from.x, p.y - from.y).norm();

    let mut time = now;
    for _ in 0..iterations {
        let target = model.predict(time);
        time = now + planar(&target) / speed;
    }

    Intercept {
        time,
        point: model.predict(time),
    }
}

/// Lateral slot of an agent beside the coordinator.
///
/// Even ids sit to the left of the heading, odd ids to the right; the
/// distance grows with `⌈id / 2⌉` so pairs of agents fan out.
pub fn formation_offset(agent: NodeId, heading: &Vector2<f64>, spacing: f64) -> Vector2<f64> {
    let id = agent.get();
    let side = if id % 2 == 0 { 1.0 } else { -1.0 };
    let depth = id.div_ceil(2) as f64;
    let left = Vector2::new(-heading.y, heading.x);
    left * (side * spacing * depth)
}
