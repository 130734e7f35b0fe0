//! Cumulus Simulated Cloud Provider
//!
//! Provider implementation backed by an in-process control plane.
//!
//! ## Module Structure
//!
//! - `sdk` - Simulated service clients and the shared control plane
//! - `resources` - Resource type definitions and per-type lifecycle adapters
//! - `provider` - SimProvider, dispatching lifecycle calls to the adapters

pub mod provider;
pub mod resources;
pub mod sdk;

pub use provider::SimProvider;
pub use sdk::{SimCloud, SimSettings, SnapshotError};
