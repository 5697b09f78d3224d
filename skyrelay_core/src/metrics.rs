//! SkyRelay Mission Metrics
//! ========================
//!
//! Accumulates what the coordinator observes during a run:
//! - **Delivery accounting**: unique, redundant and assignment-matched deliveries
//! - **Latency**: time from ASSIGN to the matching DELIVER
//! - **Coverage**: unique deliveries over elapsed time
//!
//! `Metrics` is an explicit value owned by the coordinator and reset at
//! mission start; [`MetricsSummary`] is the read-only view handed to
//! reporting code at `finish()`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How a single DELIVER entry was accounted for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeliveryOutcome {
    /// Matched an in-flight assignment
    Assigned { latency: f64 },
    /// First delivery of a label nobody assigned
    AutoDelivered,
    /// Label already delivered before
    Redundant,
}

/// Running counters for one mission.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    start_time: f64,

    /// Labels delivered at least once
    unique_ids: HashSet<String>,

    /// Deliveries of an already-delivered label
    redundant: u64,

    /// Unmatched first deliveries
    auto_delivered: u64,

    /// PoIs sent in ASSIGN messages
    assign_count: u64,

    /// Assigned PoIs that came back in a DELIVER
    assign_success: u64,

    /// Valid DELIVER entries processed
    processed_entries: u64,

    /// DELIVER entries skipped for missing fields
    malformed_entries: u64,

    /// (label, latency) for every matched delivery
    latencies: Vec<(String, f64)>,

    /// (elapsed, unique count) after every processed entry
    coverage_timeline: Vec<(f64, usize)>,

    /// Largest per-encounter assignment count seen for any agent
    max_assigned_per_encounter: usize,
}

impl Metrics {
    /// Starts a fresh set of counters at `start_time`.
    pub fn new(start_time: f64) -> Self {
        Self {
            start_time,
            ..Default::default()
        }
    }

    /// Clears everything and restarts the clock.
    pub fn reset(&mut self, start_time: f64) {
        *self = Self::new(start_time);
    }

    pub fn record_assign(&mut self, count: usize, encounter_total: usize) {
        self.assign_count += count as u64;
        self.max_assigned_per_encounter = self.max_assigned_per_encounter.max(encounter_total);
    }

    /// Accounts for one valid DELIVER entry.
    ///
    /// `assigned_at` is the popped in-flight timestamp, if the label was
    /// in flight. Every entry lands in exactly one of "new unique" or
    /// "redundant", so `unique + redundant == processed` always holds.
    pub fn record_delivery(&mut self, label: &str, assigned_at: Option<f64>, now: f64) -> DeliveryOutcome {
        self.processed_entries += 1;
        let first_time = self.unique_ids.insert(label.to_string());

        let outcome = match assigned_at {
            Some(t0) => {
                let latency = (now - t0).max(0.0);
                self.latencies.push((label.to_string(), latency));
                self.assign_success += 1;
                if !first_time {
                    self.redundant += 1;
                }
                DeliveryOutcome::Assigned { latency }
            }
            None if first_time => {
                self.auto_delivered += 1;
                DeliveryOutcome::AutoDelivered
            }
            None => {
                self.redundant += 1;
                DeliveryOutcome::Redundant
            }
        };

        self.coverage_timeline
            .push((now - self.start_time, self.unique_ids.len()));
        outcome
    }

    pub fn record_malformed(&mut self) {
        self.malformed_entries += 1;
    }

    pub fn is_delivered(&self, label: &str) -> bool {
        self.unique_ids.contains(label)
    }

    pub fn unique_count(&self) -> usize {
        self.unique_ids.len()
    }

    pub fn redundant_count(&self) -> u64 {
        self.redundant
    }

    pub fn processed_entries(&self) -> u64 {
        self.processed_entries
    }

    pub fn latencies(&self) -> &[(String, f64)] {
        &self.latencies
    }

    pub fn coverage_timeline(&self) -> &[(f64, usize)] {
        &self.coverage_timeline
    }

    /// Derives the final figures.
    ///
    /// Ratios whose denominator is zero come back as `None`.
    pub fn summarize(&self, now: f64, in_flight: usize) -> MetricsSummary {
        let elapsed = now - self.start_time;
        let positive: Vec<f64> = self
            .latencies
            .iter()
            .map(|(_, l)| *l)
            .filter(|l| *l > 0.0)
            .collect();

        MetricsSummary {
            elapsed_secs: elapsed,
            unique_delivered: self.unique_ids.len(),
            redundant_delivers: self.redundant,
            auto_delivered: self.auto_delivered,
            assigns_sent: self.assign_count,
            assign_success: self.assign_success,
            processed_entries: self.processed_entries,
            malformed_entries: self.malformed_entries,
            leaked_in_flight: in_flight,
            max_assigned_per_encounter: self.max_assigned_per_encounter,
            min_latency_secs: self
                .latencies
                .iter()
                .map(|(_, l)| *l)
                .fold(None, |acc: Option<f64>, l| Some(acc.map_or(l, |m| m.min(l)))),
            success_rate: ratio(self.assign_success as f64, self.assign_count as f64),
            avg_latency_secs: ratio(positive.iter().sum(), positive.len() as f64),
            discovery_rate: ratio(self.unique_ids.len() as f64, elapsed),
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    (denominator > 0.0).then(|| numerator / denominator)
}

/// Final figures of a mission, as reported at `finish()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub elapsed_secs: f64,
    pub unique_delivered: usize,
    pub redundant_delivers: u64,
    pub auto_delivered: u64,
    pub assigns_sent: u64,
    pub assign_success: u64,
    pub processed_entries: u64,
    pub malformed_entries: u64,
    /// Assignments never confirmed by a DELIVER
    pub leaked_in_flight: usize,
    pub max_assigned_per_encounter: usize,
    pub min_latency_secs: Option<f64>,
    /// `assign_success / assigns_sent`
    pub success_rate: Option<f64>,
    /// Mean over strictly positive latency samples
    pub avg_latency_secs: Option<f64>,
    /// Unique deliveries per second
    pub discovery_rate: Option<f64>,
}

impl MetricsSummary {
    /// True when every entry was counted once as unique or redundant.
    pub fn is_conserved(&self) -> bool {
        self.unique_delivered as u64 + self.redundant_delivers == self.processed_entries
    }
}

// =============================================================================
// TESTS
// =============================================================================
