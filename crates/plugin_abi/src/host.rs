//! Host-side half of the ABI.

use core::ffi::c_void;

use tracing::{debug, error, info, trace, warn};

use crate::error::CapabilityError;
use crate::ffi::{
	WEFT_PLUGIN_ABI_VERSION, WeftErrorSink, WeftHostV1, WeftInitializeFn, WeftLifecycleV1,
	WeftLogLevel, WeftPhaseFn, WeftQueryFn, WeftReleaseFn, WeftStr,
};
use crate::interface::InterfacePtr;
use crate::lifecycle::Lifecycle;

/// Services table handed to every plugin instance.
pub static HOST_V1: WeftHostV1 = WeftHostV1 {
	struct_size: size_of::<WeftHostV1>(),
	abi_version: WEFT_PLUGIN_ABI_VERSION,
	log: Some(host_log),
};

extern "C" fn host_log(level: WeftLogLevel, plugin: WeftStr, message: WeftStr) {
	// SAFETY: guests pass borrows that live for the duration of the call.
	let plugin = unsafe { plugin.as_str() }.unwrap_or("<invalid utf-8>");
	let message = unsafe { message.as_str() }.unwrap_or("<invalid utf-8>");
	match level {
		WeftLogLevel::ERROR => error!(target: "weft::plugin", plugin, "{message}"),
		WeftLogLevel::WARN => warn!(target: "weft::plugin", plugin, "{message}"),
		WeftLogLevel::INFO => info!(target: "weft::plugin", plugin, "{message}"),
		WeftLogLevel::DEBUG => debug!(target: "weft::plugin", plugin, "{message}"),
		_ => trace!(target: "weft::plugin", plugin, "{message}"),
	}
}

#[derive(Clone, Copy)]
struct Ops {
	initialize: WeftInitializeFn,
	extensions_initialize: WeftPhaseFn,
	delayed_initialize: WeftPhaseFn,
	release: WeftReleaseFn,
	query: Option<WeftQueryFn>,
}

/// [`Lifecycle`] backed by a plugin's validated operation table.
///
/// Releases the instance on drop if [`Lifecycle::release`] was never called.
/// The library that produced the table must stay loaded until then.
pub struct ForeignLifecycle {
	instance: *mut c_void,
	ops: Ops,
	released: bool,
}

// SAFETY: the instance is only reachable through this handle, and the ABI
// does not bind plugin calls to the loading thread.
unsafe impl Send for ForeignLifecycle {}

impl ForeignLifecycle {
	/// Validates the version tag and operation table.
	///
	/// A rejected table whose instance and `release` operation are both present
	/// is released before the error is returned.
	///
	/// # Safety
	///
	/// `table` must come from the `weft_plugin_instance` export of a library
	/// that stays loaded for the lifetime of the returned value.
	pub unsafe fn from_table(table: WeftLifecycleV1) -> Result<Self, CapabilityError> {
		match validate(&table) {
			Ok(ops) => Ok(Self {
				instance: table.instance,
				ops,
				released: false,
			}),
			Err(err) => {
				if let Some(release) = table.release
					&& !table.instance.is_null()
				{
					warn!(error = %err, "releasing instance of rejected lifecycle table");
					// SAFETY: the plugin handed over this instance and nothing else
					// will release it.
					unsafe { release(table.instance) };
				}
				Err(err)
			}
		}
	}

	pub fn is_released(&self) -> bool {
		self.released
	}
}

fn validate(table: &WeftLifecycleV1) -> Result<Ops, CapabilityError> {
	let expected = size_of::<WeftLifecycleV1>();
	if table.struct_size < expected {
		return Err(CapabilityError::StructSize {
			expected,
			actual: table.struct_size,
		});
	}
	if table.abi_version != WEFT_PLUGIN_ABI_VERSION {
		return Err(CapabilityError::AbiMismatch {
			expected: WEFT_PLUGIN_ABI_VERSION,
			actual: table.abi_version,
		});
	}
	if table.instance.is_null() {
		return Err(CapabilityError::NullInstance);
	}
	Ok(Ops {
		initialize: table.initialize.ok_or(CapabilityError::MissingOperation("initialize"))?,
		extensions_initialize: table
			.extensions_initialize
			.ok_or(CapabilityError::MissingOperation("extensions_initialize"))?,
		delayed_initialize: table
			.delayed_initialize
			.ok_or(CapabilityError::MissingOperation("delayed_initialize"))?,
		release: table.release.ok_or(CapabilityError::MissingOperation("release"))?,
		query: table.query,
	})
}

extern "C" fn capture_error(ctx: *mut c_void, message: WeftStr) {
	// SAFETY: `ctx` is the `String` owned by `ForeignLifecycle::initialize`.
	let buf = unsafe { &mut *ctx.cast::<String>() };
	let Some(message) = (unsafe { message.as_str() }) else {
		return;
	};
	if !buf.is_empty() {
		buf.push_str("; ");
	}
	buf.push_str(message);
}

impl Lifecycle for ForeignLifecycle {
	fn initialize(&mut self, args: &[String]) -> Result<(), String> {
		if self.released {
			return Err("plugin already released".into());
		}
		let raw: Vec<WeftStr> = args.iter().map(|a| WeftStr::borrowed(a)).collect();
		let mut message = String::new();
		let sink = WeftErrorSink {
			ctx: (&mut message as *mut String).cast(),
			write: capture_error,
		};
		// SAFETY: validated in `from_table`; `raw` and `sink` outlive the call.
		let ok = unsafe { (self.ops.initialize)(self.instance, raw.as_ptr(), raw.len(), &sink) };
		if ok.is_true() {
			Ok(())
		} else if message.is_empty() {
			Err("initialize reported failure".into())
		} else {
			Err(message)
		}
	}

	fn extensions_initialize(&mut self) -> bool {
		// SAFETY: validated in `from_table`, instance not yet released.
		!self.released && unsafe { (self.ops.extensions_initialize)(self.instance) }.is_true()
	}

	fn delayed_initialize(&mut self) -> bool {
		// SAFETY: as above.
		!self.released && unsafe { (self.ops.delayed_initialize)(self.instance) }.is_true()
	}

	fn release(&mut self) {
		if std::mem::replace(&mut self.released, true) {
			return;
		}
		// SAFETY: first and only release of this instance.
		unsafe { (self.ops.release)(self.instance) };
	}

	fn query<'a>(&'a self, iid: &'a str) -> Option<InterfacePtr<'a>> {
		if self.released {
			return None;
		}
		let query = self.ops.query?;
		// SAFETY: validated in `from_table`, instance not yet released.
		let ptr = unsafe { query(self.instance, WeftStr::borrowed(iid)) };
		// SAFETY: guest trampolines only answer with a value tagged `iid`, owned
		// by the instance, which outlives this borrow of `self`.
		unsafe { InterfacePtr::from_raw(iid, ptr) }
	}
}

impl Drop for ForeignLifecycle {
	fn drop(&mut self) {
		self.release();
	}
}
