//! SkyRelay Simulation Harness
//!
//! A deterministic discrete-event world in which one coordinator and a fleet
//! of visiting agents run the delivery protocol unchanged.
//!
//! All sources of non-determinism are controlled:
//! - **Time**: a virtual clock stepped at a fixed rate, with a shared timer queue
//! - **Radio**: channels routed only between nodes within transmission range
//! - **Randomness**: PoI catalog and start positions derived from one 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimContext (Virtual Clock + Timer Queue)             │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                        │                            │
//! │  ┌────▼────┐              ┌────▼────┐                       │
//! │  │   EQC   │◄────────────►│  VQC    │     ...               │
//! │  │   #0    │  RadioRouter │   #1    │                       │
//! │  └─────────┘  (range)     └─────────┘                       │
//! │       ▲                        ▲                            │
//! │       │                        │                            │
//! │  ┌────┴────────────────────────┴────┐                       │
//! │  │   Oracle + SimMobility           │                       │
//! │  │   (ground truth, kinematics)     │                       │
//! │  └──────────────────────────────────┘                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use skyrelay_core::MissionConfig;
//! use skyrelay_sim::SimWorld;
//!
//! let mut world = SimWorld::new(MissionConfig::default())?;
//! let report = world.run();
//! assert!(report.metrics.is_conserved());
//! ```

mod context;
mod mobility;
mod network;
mod oracle;
mod world;
pub mod runner;
pub mod scenarios;

pub use context::SimContext;
pub use mobility::SimMobility;
pub use network::{RadioRouter, RadioStats, SimRadio};
pub use oracle::{Oracle, SimCamera};
pub use runner::{check_invariants, ScenarioResult, ScenarioRunner};
pub use world::{RunReport, SimError, SimWorld};
