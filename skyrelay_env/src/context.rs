//! Clock and scheduler abstraction for SkyRelay agents.

use crate::types::NodeId;
use std::time::Duration;

/// The central interface for time and timer dispatch.
///
/// Agents never read a wall clock or sleep: they ask the context for the
/// current mission time and register named timers. Whoever owns the clock
/// (the simulation harness, or a flight controller on real hardware) calls
/// the agent's timer handler once `fire_at` is reached.
///
/// # Cancellation
///
/// There is none. A periodic timer is one that re-schedules itself from its
/// own handler; to stop it, simply do not re-schedule.
pub trait MissionContext {
    /// Returns the mission time elapsed since the run started.
    fn now(&self) -> Duration;

    /// Convenience accessor for `now()` in seconds.
    fn now_secs(&self) -> f64 {
        self.now().as_secs_f64()
    }

    /// Registers a one-shot timer for this node.
    ///
    /// # Arguments
    /// * `timer` - Name handed back to the agent when the timer fires
    /// * `fire_at` - Absolute mission time at which to fire
    fn schedule_timer(&self, timer: &str, fire_at: Duration);

    /// Returns the id of the node this context is bound to.
    fn node_id(&self) -> NodeId;

    /// Returns the mission seed (for logging/debugging).
    fn seed(&self) -> u64;
}
