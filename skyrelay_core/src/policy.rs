//! Assignment policies: which pending PoIs go to which visiting agent.
//!
//! A policy only *selects*. The coordinator applies the selection (moves the
//! PoIs out of pending, stamps them in-flight, sends ASSIGN, charges the
//! agent's free slots and encounter quota), so every policy shares the same
//! bookkeeping and can be swapped by configuration.

use crate::catalog::Poi;
use crate::error::ProtocolError;
use nalgebra::Vector2;
use skyrelay_env::NodeId;
use std::collections::{BTreeMap, HashSet};

/// Lower bound on the distance used in scoring, so a PoI right below the
/// agent gets a huge but finite score.
pub const MIN_SCORE_DISTANCE: f64 = 1e-6;

/// What the coordinator knows about one visiting agent.
#[derive(Debug, Clone, PartialEq)]
pub struct EncounterState {
    /// Free buffer slots as last announced, minus what was assigned since
    pub free_slots: usize,

    /// Position [x, y, z] from the last HELLO
    pub position: [f64; 3],

    /// Time of the last HELLO
    pub last_hello_time: f64,

    /// PoIs assigned during the current encounter
    pub assigned_this_encounter: usize,
}

impl EncounterState {
    pub fn new(free_slots: usize, position: [f64; 3], now: f64) -> Self {
        Self {
            free_slots,
            position,
            last_hello_time: now,
            assigned_this_encounter: 0,
        }
    }

    /// PoIs this agent may still receive during the current encounter.
    pub fn remaining_quota(&self, max_per_encounter: usize) -> usize {
        max_per_encounter.saturating_sub(self.assigned_this_encounter)
    }

    /// True when the agent can take at least one more PoI right now.
    pub fn can_accept(&self, max_per_encounter: usize) -> bool {
        self.free_slots > 0 && self.remaining_quota(max_per_encounter) > 0
    }

    fn planar_position(&self) -> Vector2<f64> {
        Vector2::new(self.position[0], self.position[1])
    }
}

/// Limits every policy must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignLimits {
    pub max_per_encounter: usize,
    pub buffer_capacity: usize,
}

/// PoIs chosen for one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentBatch {
    pub agent: NodeId,
    pub pois: Vec<Poi>,
}

/// Strategy selecting pending PoIs for visiting agents.
///
/// Implementations must never put the same PoI in two batches of one call,
/// and must never exceed an agent's free slots or remaining encounter quota.
pub trait AssignmentPolicy: Send {
    /// Configuration name of the policy.
    fn name(&self) -> &'static str;

    /// Chooses batches from `pending` (in pending order) for `agents`.
    fn select(
        &mut self,
        pending: &[Poi],
        agents: &BTreeMap<NodeId, EncounterState>,
        limits: &AssignLimits,
    ) -> Vec<AssignmentBatch>;
}

/// Urgency-over-distance score of a PoI for an agent at `position`.
pub fn score(poi: &Poi, position: &Vector2<f64>) -> f64 {
    let distance = (poi.point() - position).norm().max(MIN_SCORE_DISTANCE);
    poi.urgency.weight() / distance
}

/// Best `limit` PoIs for one agent, skipping labels in `taken`.
///
/// The sort is stable, so equal scores keep pending order.
fn greedy_pick(
    pending: &[Poi],
    taken: &HashSet<String>,
    state: &EncounterState,
    limit: usize,
) -> Vec<Poi> {
    let position = state.planar_position();
    let mut scored: Vec<(f64, &Poi)> = pending
        .iter()
        .filter(|p| !taken.contains(&p.label))
        .map(|p| (score(p, &position), p))
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    scored
        .into_iter()
        .take(limit)
        .map(|(_, p)| p.clone())
        .collect()
}

/// Nearest-and-most-urgent first, for every agent with room.
#[derive(Debug, Default)]
pub struct Greedy;

impl AssignmentPolicy for Greedy {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn select(
        &mut self,
        pending: &[Poi],
        agents: &BTreeMap<NodeId, EncounterState>,
        limits: &AssignLimits,
    ) -> Vec<AssignmentBatch> {
        let mut taken = HashSet::new();
        let mut batches = Vec::new();

        for (&agent, state) in agents {
            if !state.can_accept(limits.max_per_encounter) {
                continue;
            }
            let limit = state
                .free_slots
                .min(state.remaining_quota(limits.max_per_encounter));
            let pois = greedy_pick(pending, &taken, state, limit);
            if pois.is_empty() {
                continue;
            }
            taken.extend(pois.iter().map(|p| p.label.clone()));
            batches.push(AssignmentBatch { agent, pois });
        }

        batches
    }
}

/// One PoI per call, handed to agents in turn.
#[derive(Debug, Default)]
pub struct RoundRobin {
    /// Position in the rotation; persists across calls
    next_index: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssignmentPolicy for RoundRobin {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn select(
        &mut self,
        pending: &[Poi],
        agents: &BTreeMap<NodeId, EncounterState>,
        limits: &AssignLimits,
    ) -> Vec<AssignmentBatch> {
        let Some(head) = pending.first() else {
            return Vec::new();
        };
        let ids: Vec<NodeId> = agents.keys().copied().collect();
        if ids.is_empty() {
            return Vec::new();
        }

        for _ in 0..ids.len() {
            let agent = ids[self.next_index % ids.len()];
            self.next_index = self.next_index.wrapping_add(1);

            if agents[&agent].can_accept(limits.max_per_encounter) {
                return vec![AssignmentBatch {
                    agent,
                    pois: vec![head.clone()],
                }];
            }
        }

        Vec::new()
    }
}

/// Feed the emptiest agent, greedily.
#[derive(Debug, Default)]
pub struct LoadBalancing;

impl AssignmentPolicy for LoadBalancing {
    fn name(&self) -> &'static str {
        "load_balancing"
    }

    fn select(
        &mut self,
        pending: &[Poi],
        agents: &BTreeMap<NodeId, EncounterState>,
        limits: &AssignLimits,
    ) -> Vec<AssignmentBatch> {
        if pending.is_empty() || limits.buffer_capacity == 0 {
            return Vec::new();
        }

        let mut best: Option<(NodeId, f64)> = None;
        for (&agent, state) in agents {
            if state.free_slots == 0 {
                continue;
            }
            let ratio = state.free_slots as f64 / limits.buffer_capacity as f64;
            if best.map_or(true, |(_, max_ratio)| ratio > max_ratio) {
                best = Some((agent, ratio));
            }
        }

        let Some((agent, _)) = best else {
            return Vec::new();
        };
        let state = &agents[&agent];
        if !state.can_accept(limits.max_per_encounter) {
            return Vec::new();
        }

        let limit = state
            .free_slots
            .min(state.remaining_quota(limits.max_per_encounter));
        let pois = greedy_pick(pending, &HashSet::new(), state, limit);
        if pois.is_empty() {
            return Vec::new();
        }
        vec![AssignmentBatch { agent, pois }]
    }
}

/// The built-in policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Greedy,
    RoundRobin,
    LoadBalancing,
}

impl PolicyKind {
    pub fn all() -> Vec<PolicyKind> {
        vec![PolicyKind::Greedy, PolicyKind::RoundRobin, PolicyKind::LoadBalancing]
    }

    pub fn name(&self) -> &'static str {
        match self {
            PolicyKind::Greedy => "greedy",
            PolicyKind::RoundRobin => "round_robin",
            PolicyKind::LoadBalancing => "load_balancing",
        }
    }

    /// Instantiates a fresh policy of this kind.
    pub fn build(self) -> Box<dyn AssignmentPolicy> {
        match self {
            PolicyKind::Greedy => Box::new(Greedy),
            PolicyKind::RoundRobin => Box::new(RoundRobin::new()),
            PolicyKind::LoadBalancing => Box::new(LoadBalancing),
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for PolicyKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "greedy" => Ok(PolicyKind::Greedy),
            "round_robin" | "roundrobin" | "rr" => Ok(PolicyKind::RoundRobin),
            "load_balancing" | "loadbalancing" | "lb" => Ok(PolicyKind::LoadBalancing),
            _ => Err(ProtocolError::UnknownPolicy(s.to_string())),
        }
    }
}
