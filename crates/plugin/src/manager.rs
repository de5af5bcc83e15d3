//! Plugin discovery, validation and bookkeeping.
//!
//! Each candidate moves through `Discovered → Validated → Loaded`; the
//! lifecycle phases in [`crate::lifecycle`] advance it further and
//! [`PluginManager::shutdown`] ends at `Released`, then unloads the library.
//!
//! # Invariants
//!
//! - `order` is the single source of truth for phase sequencing. Maps are only
//!   used for lookups, never iterated for ordering.
//! - A record's instance is released before its library is unloaded.
//! - A failed candidate never leaves state behind; its library is dropped
//!   (unloaded) before `load_plugin` returns.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;
use weft_plugin_abi::{Interface, Lifecycle, PluginMetadata};
use weft_registry::RegistryHub;

use crate::config::ManagerConfig;
use crate::error::LoadError;
use crate::loader::{DylibLoader, PluginLibrary, PluginLoader};

/// Where a loaded plugin stands in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
	Loaded,
	Initialized,
	ExtensionsInitialized,
	DelayedInitialized,
	Released,
}

/// Result of one [`PluginManager::load_plugin`] call.
#[derive(Debug)]
pub enum LoadOutcome {
	Loaded { name: String },
	/// Same path or same declared name already tracked; nothing changed.
	AlreadyLoaded { name: String },
	Rejected(LoadError),
}

impl LoadOutcome {
	pub fn is_loaded(&self) -> bool {
		matches!(self, LoadOutcome::Loaded { .. })
	}
}

pub(crate) struct PluginRecord {
	pub(crate) path: PathBuf,
	pub(crate) metadata: PluginMetadata,
	pub(crate) state: PluginState,
	/// Declared before `library` so a plain drop still releases first.
	pub(crate) instance: Option<Box<dyn Lifecycle>>,
	pub(crate) library: Option<Box<dyn PluginLibrary>>,
	/// Registry creators point into this library; it must stay mapped.
	pub(crate) pins_code: bool,
}

/// Loads plugin libraries and tracks them by path, name and load order.
pub struct PluginManager {
	config: ManagerConfig,
	loader: Box<dyn PluginLoader>,
	hub: &'static RegistryHub,
	pub(crate) order: Vec<PathBuf>,
	pub(crate) names: FxHashMap<PathBuf, String>,
	pub(crate) records: FxHashMap<String, PluginRecord>,
}

impl PluginManager {
	/// Manager over the platform loader and the process-wide registry hub.
	pub fn new(config: ManagerConfig) -> Self {
		Self::with_loader(config, DylibLoader, RegistryHub::global())
	}

	pub fn with_loader(
		config: ManagerConfig,
		loader: impl PluginLoader + 'static,
		hub: &'static RegistryHub,
	) -> Self {
		Self {
			config,
			loader: Box::new(loader),
			hub,
			order: Vec::new(),
			names: FxHashMap::default(),
			records: FxHashMap::default(),
		}
	}

	pub fn config(&self) -> &ManagerConfig {
		&self.config
	}

	pub fn hub(&self) -> &'static RegistryHub {
		self.hub
	}

	/// Validates and loads one candidate file.
	///
	/// Never fails: rejections are logged and returned as [`LoadOutcome::Rejected`].
	pub fn load_plugin(&mut self, path: impl AsRef<Path>) -> LoadOutcome {
		let path = path.as_ref();
		match self.try_load(path) {
			Ok(outcome) => outcome,
			Err(err) => {
				if matches!(err, LoadError::NotALibrary { .. }) {
					trace!(path = %path.display(), "skipping non-library file");
				} else {
					warn!(path = %path.display(), error = %err, "rejected plugin");
				}
				LoadOutcome::Rejected(err)
			}
		}
	}

	fn try_load(&mut self, path: &Path) -> Result<LoadOutcome, LoadError> {
		if !has_suffix(path, &self.config.suffix) {
			return Err(LoadError::NotALibrary {
				path: path.to_path_buf(),
			});
		}

		let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
		if let Some(name) = self.names.get(&path) {
			debug!(plugin = %name, path = %path.display(), "path already loaded");
			return Ok(LoadOutcome::AlreadyLoaded { name: name.clone() });
		}
		trace!(path = %path.display(), "discovered plugin candidate");

		let library = self.loader.open(&path)?;
		let metadata = library.metadata()?;

		if let Some(existing) = self.records.get(&metadata.name) {
			debug!(
				plugin = %metadata.name,
				path = %path.display(),
				existing = %existing.path.display(),
				"name already loaded"
			);
			return Ok(LoadOutcome::AlreadyLoaded { name: metadata.name });
		}
		if self.config.is_disabled(&metadata.name) {
			return Err(LoadError::Disabled(metadata.name));
		}
		if metadata.interface != self.config.interface {
			return Err(LoadError::InterfaceMismatch {
				expected: self.config.interface.clone(),
				found: metadata.interface,
			});
		}
		trace!(plugin = %metadata.name, "validated plugin");

		let instance = library.instantiate()?;
		let registered = library.register_types(self.hub);
		if registered > 0 {
			debug!(plugin = %metadata.name, registered, "applied plugin registrations");
		}

		let name = metadata.name.clone();
		info!(plugin = %name, version = %metadata.version, path = %path.display(), "loaded plugin");
		self.order.push(path.clone());
		self.names.insert(path.clone(), name.clone());
		self.records.insert(
			name.clone(),
			PluginRecord {
				path,
				metadata,
				state: PluginState::Loaded,
				instance: Some(instance),
				library: Some(library),
				pins_code: registered > 0,
			},
		);
		Ok(LoadOutcome::Loaded { name })
	}

	/// Loads every candidate directly inside `dir`. Returns how many loaded.
	pub fn load_plugins(&mut self, dir: impl AsRef<Path>) -> usize {
		self.scan(dir.as_ref(), false)
	}

	/// Recursive variant of [`load_plugins`](Self::load_plugins).
	pub fn find_load_plugins(&mut self, dir: impl AsRef<Path>) -> usize {
		self.scan(dir.as_ref(), true)
	}

	/// Scans every configured directory.
	pub fn load_configured(&mut self) -> usize {
		let dirs = self.config.dirs.clone();
		let recursive = self.config.recursive;
		dirs.iter().map(|dir| self.scan(dir, recursive)).sum()
	}

	fn scan(&mut self, dir: &Path, recursive: bool) -> usize {
		let walker = WalkDir::new(dir)
			.min_depth(1)
			.max_depth(if recursive { usize::MAX } else { 1 })
			.follow_links(true)
			.sort_by_file_name();

		let mut loaded = 0;
		for entry in walker {
			let entry = match entry {
				Ok(entry) => entry,
				Err(err) => {
					warn!(dir = %dir.display(), error = %err, "plugin scan error");
					continue;
				}
			};
			if !entry.file_type().is_file() {
				continue;
			}
			if self.load_plugin(entry.path()).is_loaded() {
				loaded += 1;
			}
		}
		debug!(dir = %dir.display(), recursive, loaded, "scanned plugin directory");
		loaded
	}

	pub fn is_loaded(&self, name: &str) -> bool {
		self.records.get(name).is_some_and(|r| r.instance.is_some())
	}

	pub fn get(&self, name: &str) -> Option<&dyn Lifecycle> {
		self.records.get(name)?.instance.as_deref()
	}

	/// Typed access to another interface the named plugin exposes.
	pub fn interface<T: Interface>(&self, name: &str) -> Option<&T> {
		let found = self.get(name)?.query(T::IID);
		if found.is_none() {
			debug!(plugin = name, iid = T::IID, "plugin does not expose interface");
		}
		found?.downcast::<T>()
	}

	pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Lifecycle + 'static)> {
		self.records.get_mut(name)?.instance.as_deref_mut()
	}

	pub fn metadata(&self, name: &str) -> Option<&PluginMetadata> {
		self.records.get(name).map(|r| &r.metadata)
	}

	pub fn state(&self, name: &str) -> Option<PluginState> {
		self.records.get(name).map(|r| r.state)
	}

	pub fn path(&self, name: &str) -> Option<&Path> {
		self.records.get(name).map(|r| r.path.as_path())
	}

	/// Names in load order.
	pub fn plugin_names(&self) -> Vec<String> {
		self.order
			.iter()
			.filter_map(|path| self.names.get(path).cloned())
			.collect()
	}

	pub fn len(&self) -> usize {
		self.order.len()
	}

	pub fn is_empty(&self) -> bool {
		self.order.is_empty()
	}

	/// Releases and unloads every plugin, last loaded first.
	///
	/// Idempotent. Libraries whose types were added to the registry hub stay
	/// mapped, since hub entries are never removed.
	pub fn shutdown(&mut self) {
		while let Some(path) = self.order.pop() {
			let Some(name) = self.names.remove(&path) else {
				continue;
			};
			let Some(mut record) = self.records.remove(&name) else {
				continue;
			};

			if let Some(mut instance) = record.instance.take() {
				instance.release();
			}
			record.state = PluginState::Released;
			debug!(plugin = %name, "released plugin");

			if let Some(library) = record.library.take() {
				if record.pins_code {
					debug!(plugin = %name, "keeping library mapped for registered types");
					std::mem::forget(library);
				} else {
					drop(library);
				}
			}
			info!(plugin = %name, path = %path.display(), "unloaded plugin");
		}
	}
}

impl Drop for PluginManager {
	fn drop(&mut self) {
		self.shutdown();
	}
}

impl std::fmt::Debug for PluginManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PluginManager")
			.field("config", &self.config)
			.field("plugins", &self.plugin_names())
			.finish_non_exhaustive()
	}
}

/// Exact extension match; Windows file names are case-insensitive.
fn has_suffix(path: &Path, suffix: &str) -> bool {
	let suffix = suffix.trim_start_matches('.');
	path.extension().and_then(OsStr::to_str).is_some_and(|ext| {
		if cfg!(windows) {
			ext.eq_ignore_ascii_case(suffix)
		} else {
			ext == suffix
		}
	})
}
