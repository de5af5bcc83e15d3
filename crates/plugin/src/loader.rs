//! Opening plugin libraries.
//!
//! The manager only sees the [`PluginLoader`] / [`PluginLibrary`] seam;
//! [`DylibLoader`] is the production implementation over `libloading`.

use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use tracing::trace;
use weft_plugin_abi::ffi::{
	INSTANCE_SYMBOL, METADATA_SYMBOL, REGISTER_SYMBOL, WeftLifecycleV1, WeftPluginInstanceFn,
	WeftPluginMetadata, WeftPluginRegisterFn, WeftStatus,
};
use weft_plugin_abi::host::{ForeignLifecycle, HOST_V1};
use weft_plugin_abi::{Lifecycle, PluginMetadata};
use weft_registry::RegistryHub;

use crate::error::LoadError;

/// Maps a candidate file into the process.
pub trait PluginLoader {
	fn open(&self, path: &Path) -> Result<Box<dyn PluginLibrary>, LoadError>;
}

/// An opened library. Dropping it unloads the library.
pub trait PluginLibrary {
	/// Reads the embedded descriptor without running plugin code.
	fn metadata(&self) -> Result<PluginMetadata, LoadError>;

	/// Obtains the lifecycle instance. The instance must not outlive `self`.
	fn instantiate(&self) -> Result<Box<dyn Lifecycle>, LoadError>;

	/// Applies the library's registry declarations to `hub`; returns how many ran.
	fn register_types(&self, hub: &RegistryHub) -> usize;
}

/// Loads plugins with the platform dynamic loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibLoader;

impl PluginLoader for DylibLoader {
	fn open(&self, path: &Path) -> Result<Box<dyn PluginLibrary>, LoadError> {
		// Directories and other non-files never reach the platform loader.
		if std::fs::metadata(path).is_ok_and(|meta| !meta.is_file()) {
			return Err(LoadError::NotALibrary {
				path: path.to_path_buf(),
			});
		}
		// SAFETY: loading runs the library's initializers; plugins are trusted
		// code by contract.
		let lib = unsafe { Library::new(path) }.map_err(|e| LoadError::Open {
			path: path.to_path_buf(),
			source: Box::new(e),
		})?;
		trace!(path = %path.display(), "mapped library");
		Ok(Box::new(Dylib {
			path: path.to_path_buf(),
			lib,
		}))
	}
}

struct Dylib {
	path: PathBuf,
	lib: Library,
}

impl PluginLibrary for Dylib {
	fn metadata(&self) -> Result<PluginMetadata, LoadError> {
		let missing = || LoadError::MissingMetadata {
			path: self.path.clone(),
		};
		// SAFETY: the symbol is a static `WeftPluginMetadata`; its address is the value.
		let symbol: Symbol<*const WeftPluginMetadata> =
			unsafe { self.lib.get(METADATA_SYMBOL) }.map_err(|_| missing())?;
		let ptr: *const WeftPluginMetadata = *symbol;
		// SAFETY: non-null statics in a mapped library stay valid while it is loaded.
		let raw = unsafe { ptr.as_ref() }.ok_or_else(missing)?;
		// SAFETY: the descriptor's strings point into the same static image.
		Ok(unsafe { PluginMetadata::from_raw(raw) }?)
	}

	fn instantiate(&self) -> Result<Box<dyn Lifecycle>, LoadError> {
		// SAFETY: the symbol's type is fixed by the ABI version checked in `metadata`.
		let entry: Symbol<WeftPluginInstanceFn> =
			unsafe { self.lib.get(INSTANCE_SYMBOL) }.map_err(|_| LoadError::MissingEntry {
				path: self.path.clone(),
			})?;

		let mut table = WeftLifecycleV1::empty();
		// SAFETY: `HOST_V1` is static; `table` is a valid out-pointer.
		let status = unsafe { entry(&HOST_V1, &mut table) };
		if status != WeftStatus::OK {
			return Err(LoadError::EntryFailed(status));
		}
		// SAFETY: the table came from this library, which the manager keeps loaded
		// until after the instance is released.
		let lifecycle = unsafe { ForeignLifecycle::from_table(table) }?;
		Ok(Box::new(lifecycle))
	}

	fn register_types(&self, hub: &RegistryHub) -> usize {
		// SAFETY: optional export with the ABI-defined signature.
		let Ok(register) = (unsafe { self.lib.get::<WeftPluginRegisterFn>(REGISTER_SYMBOL) }) else {
			return 0;
		};
		// SAFETY: `hub` is a live `RegistryHub` for the duration of the call.
		unsafe { register((hub as *const RegistryHub).cast()) }
	}
}
