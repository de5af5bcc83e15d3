//! `weft.toml` configuration.
//!
//! ```toml
//! [plugins]
//! interface = "weft.PluginLifecycle/1"
//! suffix = "so"
//! dirs = ["plugins", "/usr/lib/weft"]
//! recursive = false
//! disabled = ["noisy-plugin"]
//! ```
//!
//! Every key is optional.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use weft_plugin_abi::WEFT_LIFECYCLE_IID;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WeftConfig {
	pub plugins: ManagerConfig,
}

/// Settings for a [`PluginManager`](crate::PluginManager).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
	/// Interface identifier a plugin's metadata must declare.
	pub interface: String,
	/// Shared-library file extension, without the dot.
	pub suffix: String,
	/// Directories scanned by `load_configured`.
	pub dirs: Vec<PathBuf>,
	pub recursive: bool,
	/// Plugin names rejected at validation.
	pub disabled: Vec<String>,
}

impl Default for ManagerConfig {
	fn default() -> Self {
		Self {
			interface: WEFT_LIFECYCLE_IID.to_string(),
			suffix: std::env::consts::DLL_EXTENSION.to_string(),
			dirs: Vec::new(),
			recursive: false,
			disabled: Vec::new(),
		}
	}
}

impl ManagerConfig {
	pub fn is_disabled(&self, name: &str) -> bool {
		self.disabled.iter().any(|d| d == name)
	}
}

impl WeftConfig {
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		let mut config: WeftConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})?;

		// Relative plugin dirs are taken relative to the config file.
		if let Some(base) = path.parent() {
			for dir in &mut config.plugins.dirs {
				if dir.is_relative() {
					*dir = base.join(&*dir);
				}
			}
		}
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;

	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn empty_file_yields_defaults() {
		let config: WeftConfig = toml::from_str("").unwrap();
		assert_eq!(config, WeftConfig::default());
		assert_eq!(config.plugins.interface, WEFT_LIFECYCLE_IID);
		assert_eq!(config.plugins.suffix, std::env::consts::DLL_EXTENSION);
	}

	#[test]
	fn relative_dirs_resolve_against_the_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("weft.toml");
		std::fs::write(
			&path,
			r#"
[plugins]
dirs = ["plugins", "/opt/weft"]
recursive = true
disabled = ["noisy"]
"#,
		)
		.unwrap();

		let config = WeftConfig::load(&path).unwrap();
		assert_eq!(
			config.plugins.dirs,
			vec![dir.path().join("plugins"), PathBuf::from("/opt/weft")]
		);
		assert!(config.plugins.recursive);
		assert!(config.plugins.is_disabled("noisy"));
		assert!(!config.plugins.is_disabled("quiet"));
	}

	#[test]
	fn load_errors_name_the_file() {
		let dir = tempfile::tempdir().unwrap();
		let missing = dir.path().join("absent.toml");
		assert!(matches!(WeftConfig::load(&missing), Err(ConfigError::Io { .. })));

		let broken = dir.path().join("broken.toml");
		std::fs::write(&broken, "[plugins]\nrecursive = \"yes\"\n").unwrap();
		let err = WeftConfig::load(&broken).unwrap_err();
		assert!(matches!(err, ConfigError::Parse { .. }));
		assert!(err.to_string().contains("broken.toml"));
	}
}
