use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use weft_plugin_abi::ffi::WeftStatus;
use weft_plugin_abi::{CapabilityError, MetadataError};

/// Why a candidate file was not loaded.
///
/// Never returned from the manager's public API as an `Err`; it travels inside
/// [`LoadOutcome::Rejected`](crate::LoadOutcome::Rejected) and is logged.
#[derive(Debug, Error)]
pub enum LoadError {
	#[error("'{}' does not carry the shared-library suffix", path.display())]
	NotALibrary { path: PathBuf },
	#[error("failed to open '{}'", path.display())]
	Open {
		path: PathBuf,
		#[source]
		source: Box<dyn std::error::Error + Send + Sync>,
	},
	#[error("'{}' embeds no plugin metadata", path.display())]
	MissingMetadata { path: PathBuf },
	#[error(transparent)]
	Metadata(#[from] MetadataError),
	#[error("interface mismatch: expected '{expected}', found '{found}'")]
	InterfaceMismatch { expected: String, found: String },
	#[error("plugin '{0}' is disabled by configuration")]
	Disabled(String),
	#[error("'{}' exports no instance entry point", path.display())]
	MissingEntry { path: PathBuf },
	#[error("instance entry point returned {0:?}")]
	EntryFailed(WeftStatus),
	#[error(transparent)]
	Capability(#[from] CapabilityError),
}

/// Lifecycle phase driven across all plugins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
	Initialize,
	ExtensionsInitialize,
	DelayedInitialize,
}

impl fmt::Display for Phase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Phase::Initialize => "initialize",
			Phase::ExtensionsInitialize => "extensions_initialize",
			Phase::DelayedInitialize => "delayed_initialize",
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseFailure {
	pub name: String,
	/// Only `initialize` can describe its failure.
	pub message: Option<String>,
}

/// Every plugin that failed one phase, in the order they were called.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{phase} failed for {}", describe(.failures))]
pub struct PhaseError {
	pub phase: Phase,
	pub failures: Vec<PhaseFailure>,
}

fn describe(failures: &[PhaseFailure]) -> String {
	failures
		.iter()
		.map(|f| match &f.message {
			Some(msg) => format!("'{}' ({msg})", f.name),
			None => format!("'{}'", f.name),
		})
		.collect::<Vec<_>>()
		.join(", ")
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read '{}'", path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("invalid configuration in '{}'", path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},
}
