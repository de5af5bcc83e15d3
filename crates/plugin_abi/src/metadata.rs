use crate::error::MetadataError;
use crate::ffi::{WEFT_PLUGIN_ABI_VERSION, WeftPluginMetadata, WeftStr};

/// Owned copy of a plugin's embedded descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMetadata {
	pub name: String,
	pub interface: String,
	pub version: String,
	pub description: String,
}

impl PluginMetadata {
	pub fn new(name: impl Into<String>, interface: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			interface: interface.into(),
			version: String::new(),
			description: String::new(),
		}
	}

	/// Copies a raw descriptor out of plugin memory.
	///
	/// # Safety
	///
	/// Every [`WeftStr`] in `raw` must point at memory that is readable for the
	/// duration of the call.
	pub unsafe fn from_raw(raw: &WeftPluginMetadata) -> Result<Self, MetadataError> {
		if raw.abi_version != WEFT_PLUGIN_ABI_VERSION {
			return Err(MetadataError::AbiMismatch {
				expected: WEFT_PLUGIN_ABI_VERSION,
				actual: raw.abi_version,
			});
		}
		let read = |s: &WeftStr, field: &'static str| -> Result<String, MetadataError> {
			// SAFETY: forwarded from the caller.
			unsafe { s.as_str() }
				.map(str::to_owned)
				.ok_or(MetadataError::InvalidUtf8(field))
		};
		let name = read(&raw.name, "name")?;
		if name.is_empty() {
			return Err(MetadataError::MissingName);
		}
		Ok(Self {
			name,
			interface: read(&raw.interface, "interface")?,
			version: read(&raw.version, "version")?,
			description: read(&raw.description, "description")?,
		})
	}
}
