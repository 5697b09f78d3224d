//! SkyRelay Core - Task Allocation and Delivery Protocol for Quadcopter Fleets
//!
//! One exploration quadcopter (the coordinator) patrols an area and spots
//! points of interest; several visiting quadcopters rendezvous with it,
//! receive PoIs to visit, and report back what they reached:
//! 1. **Detection**: camera sightings matched against the PoI catalog
//! 2. **Assignment**: pluggable policies throttled per encounter
//! 3. **Delivery**: acknowledged hand-back with exactly-once accounting

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod detection;
pub mod error;
pub mod intercept;
pub mod messages;
pub mod metrics;
pub mod policy;
pub mod visitor;

// Re-export key types for convenience
pub use catalog::{Poi, PoiCatalog, Urgency};
pub use config::MissionConfig;
pub use coordinator::Coordinator;
pub use error::{ConfigError, ProtocolError};
pub use messages::Message;
pub use metrics::{Metrics, MetricsSummary};
pub use policy::{AssignmentPolicy, PolicyKind};
pub use visitor::{Mode, VisitingAgent, VisitorReport};
