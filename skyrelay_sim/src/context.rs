//! Simulation context implementing MissionContext for deterministic testing.

use skyrelay_env::{MissionContext, NodeId};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A timer waiting in the shared queue.
///
/// Ordered by fire time, then by the order in which it was scheduled, so
/// timers due at the same instant fire first-come first-served.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ScheduledTimer {
    fire_at_ns: u64,
    seq: u64,
    node: NodeId,
    name: String,
}

#[derive(Debug, Default)]
struct TimerQueue {
    heap: BinaryHeap<Reverse<ScheduledTimer>>,
    next_seq: u64,
}

/// Simulation context backed by a virtual clock.
///
/// Every node gets its own `SimContext` (so `node_id()` is right), but all of
/// them share one clock and one timer queue owned by the world.
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Node this handle schedules timers for
    node: NodeId,

    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<Mutex<u64>>,

    timers: Arc<Mutex<TimerQueue>>,
}

impl SimContext {
    /// Creates a new clock, bound to the coordinator.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            node: NodeId::COORDINATOR,
            virtual_time_ns: Arc::new(Mutex::new(0)),
            timers: Arc::new(Mutex::new(TimerQueue::default())),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Returns a handle on the same clock bound to another node.
    pub fn for_node(&self, node: NodeId) -> Arc<Self> {
        Arc::new(Self {
            seed: self.seed,
            node,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            timers: Arc::clone(&self.timers),
        })
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        let mut time = self.virtual_time_ns.lock().unwrap();
        *time += duration.as_nanos() as u64;
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        *self.virtual_time_ns.lock().unwrap()
    }

    /// Pops the earliest timer that is due, if any.
    pub fn pop_due(&self) -> Option<(NodeId, String)> {
        let now = self.time_ns();
        let mut queue = self.timers.lock().unwrap();
        match queue.heap.peek() {
            Some(Reverse(timer)) if timer.fire_at_ns <= now => {}
            _ => return None,
        }
        queue
            .heap
            .pop()
            .map(|Reverse(timer)| (timer.node, timer.name))
    }

    /// Number of timers still waiting.
    pub fn pending_timers(&self) -> usize {
        self.timers.lock().unwrap().heap.len()
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            node: self.node,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            timers: Arc::clone(&self.timers),
        }
    }
}

impl MissionContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(*self.virtual_time_ns.lock().unwrap())
    }

    fn schedule_timer(&self, timer: &str, fire_at: Duration) {
        let mut queue = self.timers.lock().unwrap();
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.heap.push(Reverse(ScheduledTimer {
            fire_at_ns: fire_at.as_nanos() as u64,
            seq,
            node: self.node,
            name: timer.to_string(),
        }));
    }

    fn node_id(&self) -> NodeId {
        self.node
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_context_time() {
        let ctx = SimContext::new(42);
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.advance_time(Duration::from_secs(1));
        assert_eq!(ctx.now(), Duration::from_secs(1));

        ctx.advance_time(Duration::from_millis(500));
        assert_eq!(ctx.now(), Duration::from_millis(1500));
    }

    #[test]
    fn test_node_handles_share_clock() {
        let root = SimContext::new(42);
        let vqc = root.for_node(NodeId(3));

        root.advance_time(Duration::from_secs(5));
        assert_eq!(vqc.now(), Duration::from_secs(5));
        assert_eq!(vqc.node_id(), NodeId(3));
        assert_eq!(vqc.seed(), 42);
    }

    #[test]
    fn test_timers_fire_in_time_then_schedule_order() {
        let root = SimContext::new(1);
        let a = root.for_node(NodeId(1));
        let b = root.for_node(NodeId(2));

        b.schedule_timer("hello", Duration::from_secs(1));
        a.schedule_timer("hello", Duration::from_secs(1));
        root.schedule_timer("detect", Duration::from_millis(500));
        a.schedule_timer("roam", Duration::from_secs(2));

        assert_eq!(root.pop_due(), None);

        root.advance_time(Duration::from_secs(1));
        assert_eq!(root.pop_due(), Some((NodeId(0), "detect".to_string())));
        assert_eq!(root.pop_due(), Some((NodeId(2), "hello".to_string())));
        assert_eq!(root.pop_due(), Some((NodeId(1), "hello".to_string())));
        assert_eq!(root.pop_due(), None);
        assert_eq!(root.pending_timers(), 1);
    }
}
