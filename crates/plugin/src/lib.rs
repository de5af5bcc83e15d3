//! Plugin manager for weft hosts.
//!
//! [`PluginManager`] discovers shared libraries, validates their embedded
//! metadata against the expected interface, loads them and drives every loaded
//! plugin through the four lifecycle phases. Load failures are per-file and
//! never abort a scan.

mod config;
mod error;
mod lifecycle;
mod loader;
mod manager;

pub use config::{ManagerConfig, WeftConfig};
pub use error::{ConfigError, LoadError, Phase, PhaseError, PhaseFailure};
pub use loader::{DylibLoader, PluginLibrary, PluginLoader};
pub use manager::{LoadOutcome, PluginManager, PluginState};
