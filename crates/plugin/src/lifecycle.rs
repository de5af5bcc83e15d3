//! Four-phase startup across every tracked plugin.
//!
//! `initialize` runs in load order so a plugin finds its dependencies already
//! set up. The extension and delayed phases run in reverse load order, as does
//! teardown. No phase short-circuits: every plugin is called and every failure
//! is collected into one [`PhaseError`].

use std::path::PathBuf;

use tracing::{debug, warn};
use weft_plugin_abi::Lifecycle;

use crate::error::{Phase, PhaseError, PhaseFailure};
use crate::manager::{PluginManager, PluginState};

impl PluginManager {
	/// Calls `initialize(args)` on every plugin in load order.
	pub fn initialize_all(&mut self, args: &[String]) -> Result<(), PhaseError> {
		let mut failures = Vec::new();
		for path in &self.order {
			let Some(name) = self.names.get(path) else {
				continue;
			};
			let Some(record) = self.records.get_mut(name) else {
				continue;
			};
			let Some(instance) = record.instance.as_mut() else {
				continue;
			};
			match instance.initialize(args) {
				Ok(()) => {
					record.state = PluginState::Initialized;
					debug!(plugin = %name, "initialized");
				}
				Err(message) => {
					warn!(plugin = %name, %message, "initialize failed");
					failures.push(PhaseFailure {
						name: name.clone(),
						message: Some(message),
					});
				}
			}
		}
		finish(Phase::Initialize, failures)
	}

	/// Calls `extensions_initialize()` on every plugin in reverse load order.
	pub fn extensions_initialize_all(&mut self) -> Result<(), PhaseError> {
		self.run_reversed(
			Phase::ExtensionsInitialize,
			PluginState::ExtensionsInitialized,
			|p| p.extensions_initialize(),
		)
	}

	/// Calls `delayed_initialize()` on every plugin in reverse load order.
	pub fn delayed_initialize_all(&mut self) -> Result<(), PhaseError> {
		self.run_reversed(
			Phase::DelayedInitialize,
			PluginState::DelayedInitialized,
			|p| p.delayed_initialize(),
		)
	}

	fn run_reversed(
		&mut self,
		phase: Phase,
		reached: PluginState,
		call: fn(&mut dyn Lifecycle) -> bool,
	) -> Result<(), PhaseError> {
		let mut failures = Vec::new();
		let order: Vec<&PathBuf> = self.order.iter().rev().collect();
		for path in order {
			let Some(name) = self.names.get(path) else {
				continue;
			};
			let Some(record) = self.records.get_mut(name) else {
				continue;
			};
			let Some(instance) = record.instance.as_deref_mut() else {
				continue;
			};
			if call(instance) {
				record.state = reached;
				debug!(plugin = %name, %phase, "phase complete");
			} else {
				warn!(plugin = %name, %phase, "phase failed");
				failures.push(PhaseFailure {
					name: name.clone(),
					message: None,
				});
			}
		}
		finish(phase, failures)
	}
}

fn finish(phase: Phase, failures: Vec<PhaseFailure>) -> Result<(), PhaseError> {
	if failures.is_empty() {
		Ok(())
	} else {
		Err(PhaseError { phase, failures })
	}
}
