//! SkyRelay Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction that lets the SkyRelay
//! protocol agents run unchanged on top of a simulator or a real flight stack.
//!
//! # Core Concept: The Reactor Pattern
//!
//! Agents never touch the outside world directly. Everything that is not pure
//! protocol logic is a collaborator behind a narrow trait:
//! - Time and timers (`MissionContext`)
//! - Radio (`RadioTransport`)
//! - Flight (`Mobility`)
//! - Vision (`Camera`)
//!
//! Handlers run to completion; the owner of the clock decides when timers
//! fire and when packets are handed over.
//!
//! # Example
//!
//! ```ignore
//! use skyrelay_env::{MissionContext, RadioTransport};
//!
//! fn pump<Ctx: MissionContext, Net: RadioTransport>(ctx: &Ctx, net: &Net) {
//!     while let Some((from, packet)) = net.try_recv() {
//!         handle_packet(ctx.now(), from, packet);
//!     }
//! }
//! ```

mod context;
mod error;
mod hardware;
mod network;
mod types;
pub mod testing;

pub use context::MissionContext;
pub use error::EnvError;
pub use hardware::{Camera, Mobility, RawDetection};
pub use network::RadioTransport;
pub use types::{NodeId, PacketEnvelope};
