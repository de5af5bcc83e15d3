//! `#[repr(C)]` types exchanged with plugin libraries.
//!
//! A plugin exports three symbols:
//!
//! | Symbol | Kind | Purpose |
//! |---|---|---|
//! | `WEFT_PLUGIN_METADATA` | data, [`WeftPluginMetadata`] | name + interface id, read without running plugin code |
//! | `weft_plugin_instance` | fn, [`WeftPluginInstanceFn`] | fills a [`WeftLifecycleV1`] operation table |
//! | `weft_plugin_register` | fn, [`WeftPluginRegisterFn`] (optional) | applies the plugin's registry declarations to the host hub |

use core::ffi::c_void;

/// ABI version shared by metadata, host services and lifecycle tables.
pub const WEFT_PLUGIN_ABI_VERSION: u32 = 1;

/// Interface identifier of the four-phase lifecycle capability.
pub const WEFT_LIFECYCLE_IID: &str = "weft.PluginLifecycle/1";

pub const METADATA_SYMBOL: &[u8] = b"WEFT_PLUGIN_METADATA\0";
pub const INSTANCE_SYMBOL: &[u8] = b"weft_plugin_instance\0";
pub const REGISTER_SYMBOL: &[u8] = b"weft_plugin_register\0";

/// Borrowed UTF-8 string slice.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct WeftStr {
	pub ptr: *const u8,
	pub len: usize,
}

// SAFETY: a WeftStr only ever points at immutable bytes (static data or a
// borrow that outlives the call it is passed to).
unsafe impl Send for WeftStr {}
unsafe impl Sync for WeftStr {}

impl WeftStr {
	pub const EMPTY: WeftStr = WeftStr::from_static("");

	pub const fn from_static(s: &'static str) -> Self {
		Self {
			ptr: s.as_ptr(),
			len: s.len(),
		}
	}

	/// Borrows `s` for the duration of a foreign call.
	pub fn borrowed(s: &str) -> Self {
		Self {
			ptr: s.as_ptr(),
			len: s.len(),
		}
	}

	/// Reads the slice back as `&str`; `None` for invalid UTF-8.
	///
	/// A null pointer reads as the empty string.
	///
	/// # Safety
	///
	/// `ptr` must be null or valid for reads of `len` bytes for `'a`.
	pub unsafe fn as_str<'a>(&self) -> Option<&'a str> {
		if self.ptr.is_null() {
			return Some("");
		}
		let bytes = unsafe { std::slice::from_raw_parts(self.ptr, self.len) };
		std::str::from_utf8(bytes).ok()
	}
}

#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WeftBool(pub u8);

impl WeftBool {
	pub const FALSE: WeftBool = WeftBool(0);
	pub const TRUE: WeftBool = WeftBool(1);

	pub fn is_true(self) -> bool {
		self.0 != 0
	}
}

impl From<bool> for WeftBool {
	fn from(value: bool) -> Self {
		if value { WeftBool::TRUE } else { WeftBool::FALSE }
	}
}

#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WeftStatus(pub i32);

impl WeftStatus {
	pub const OK: WeftStatus = WeftStatus(0);
	pub const FAILED: WeftStatus = WeftStatus(1);
	pub const INCOMPATIBLE: WeftStatus = WeftStatus(2);
	pub const PANICKED: WeftStatus = WeftStatus(3);
}

#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WeftLogLevel(pub u32);

impl WeftLogLevel {
	pub const ERROR: WeftLogLevel = WeftLogLevel(1);
	pub const WARN: WeftLogLevel = WeftLogLevel(2);
	pub const INFO: WeftLogLevel = WeftLogLevel(3);
	pub const DEBUG: WeftLogLevel = WeftLogLevel(4);
	pub const TRACE: WeftLogLevel = WeftLogLevel(5);
}

/// Descriptor embedded in every plugin as `WEFT_PLUGIN_METADATA`.
#[repr(C)]
#[derive(Debug)]
pub struct WeftPluginMetadata {
	pub abi_version: u32,
	/// Lookup key of the plugin inside the manager.
	pub name: WeftStr,
	/// Capability the plugin claims; compared against the manager's expected id.
	pub interface: WeftStr,
	pub version: WeftStr,
	pub description: WeftStr,
}

/// Host-provided sink for a descriptive `initialize` failure.
#[repr(C)]
pub struct WeftErrorSink {
	pub ctx: *mut c_void,
	pub write: extern "C" fn(ctx: *mut c_void, message: WeftStr),
}

/// Services the host offers to plugins.
#[repr(C)]
pub struct WeftHostV1 {
	pub struct_size: usize,
	pub abi_version: u32,
	pub log: Option<extern "C" fn(level: WeftLogLevel, plugin: WeftStr, message: WeftStr)>,
}

pub type WeftInitializeFn = unsafe extern "C" fn(
	instance: *mut c_void,
	args: *const WeftStr,
	nargs: usize,
	error: *const WeftErrorSink,
) -> WeftBool;
pub type WeftPhaseFn = unsafe extern "C" fn(instance: *mut c_void) -> WeftBool;
pub type WeftReleaseFn = unsafe extern "C" fn(instance: *mut c_void);
/// Returns the interface named `iid`, owned by `instance`, or null.
pub type WeftQueryFn = unsafe extern "C" fn(instance: *mut c_void, iid: WeftStr) -> *const c_void;

/// Lifecycle capability descriptor: version tag plus operation table.
///
/// `release` frees `instance`; no other operation may be called afterwards.
/// `query` is optional.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct WeftLifecycleV1 {
	pub struct_size: usize,
	pub abi_version: u32,
	pub instance: *mut c_void,
	pub initialize: Option<WeftInitializeFn>,
	pub extensions_initialize: Option<WeftPhaseFn>,
	pub delayed_initialize: Option<WeftPhaseFn>,
	pub release: Option<WeftReleaseFn>,
	pub query: Option<WeftQueryFn>,
}

impl WeftLifecycleV1 {
	/// Blank table for the host to hand to `weft_plugin_instance`.
	pub const fn empty() -> Self {
		Self {
			struct_size: 0,
			abi_version: 0,
			instance: core::ptr::null_mut(),
			initialize: None,
			extensions_initialize: None,
			delayed_initialize: None,
			release: None,
			query: None,
		}
	}
}

pub type WeftPluginInstanceFn =
	unsafe extern "C" fn(host: *const WeftHostV1, out: *mut WeftLifecycleV1) -> WeftStatus;
/// Returns the number of declarations applied.
pub type WeftPluginRegisterFn = unsafe extern "C" fn(hub: *const c_void) -> usize;
