//! Plugin-side half of the ABI.
//!
//! Trampolines adapt a Rust [`Lifecycle`] value to the C operation table. Every
//! call into plugin code runs under `catch_unwind` so a panic becomes a failed
//! phase instead of unwinding across the `extern "C"` boundary.

use core::ffi::c_void;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::OnceLock;

use weft_registry::RegistryHub;

use crate::ffi::{
	WEFT_PLUGIN_ABI_VERSION, WeftBool, WeftErrorSink, WeftHostV1, WeftInitializeFn, WeftLifecycleV1,
	WeftLogLevel, WeftPhaseFn, WeftQueryFn, WeftReleaseFn, WeftStatus, WeftStr,
};
use crate::lifecycle::Lifecycle;

static HOST: OnceLock<&'static WeftHostV1> = OnceLock::new();
static NAME: OnceLock<&'static str> = OnceLock::new();

/// Builds `P` and writes its operation table to `out`.
///
/// Called by the `weft_plugin_instance` export generated by
/// [`export_plugin!`](crate::export_plugin).
///
/// # Safety
///
/// `host` must be null or point to a host table that outlives the plugin.
/// `out` must be null or valid for writes.
pub unsafe fn instantiate<P>(
	name: &'static str,
	host: *const WeftHostV1,
	out: *mut WeftLifecycleV1,
) -> WeftStatus
where
	P: Lifecycle + Default + 'static,
{
	if out.is_null() {
		return WeftStatus::FAILED;
	}
	if !host.is_null() {
		// SAFETY: the caller guarantees the host table lives for the whole plugin lifetime.
		let host: &'static WeftHostV1 = unsafe { &*host };
		if host.abi_version != WEFT_PLUGIN_ABI_VERSION || host.struct_size < size_of::<WeftHostV1>() {
			return WeftStatus::INCOMPATIBLE;
		}
		let _ = HOST.set(host);
	}
	let _ = NAME.set(name);

	let Ok(plugin) = catch_unwind(P::default) else {
		return WeftStatus::PANICKED;
	};
	// SAFETY: `out` was checked non-null; the caller guarantees it is writable.
	unsafe { out.write(table_for(Box::new(plugin))) };
	WeftStatus::OK
}

/// Operation table driving `plugin` through its lifecycle.
///
/// Ownership moves into the table; the `release` operation drops it.
pub fn table_for<P: Lifecycle + 'static>(plugin: Box<P>) -> WeftLifecycleV1 {
	WeftLifecycleV1 {
		struct_size: size_of::<WeftLifecycleV1>(),
		abi_version: WEFT_PLUGIN_ABI_VERSION,
		instance: Box::into_raw(plugin).cast(),
		initialize: Some(initialize::<P> as WeftInitializeFn),
		extensions_initialize: Some(extensions_initialize::<P> as WeftPhaseFn),
		delayed_initialize: Some(delayed_initialize::<P> as WeftPhaseFn),
		release: Some(release::<P> as WeftReleaseFn),
		query: Some(query::<P> as WeftQueryFn),
	}
}

/// Applies this image's `register!` declarations to the host's hub.
///
/// # Safety
///
/// `hub` must be null or point to a live [`RegistryHub`] compiled by the same
/// toolchain against the same `weft-registry` version.
pub unsafe fn register_into(hub: *const c_void) -> usize {
	// SAFETY: see the function contract.
	match unsafe { hub.cast::<RegistryHub>().as_ref() } {
		Some(hub) => weft_registry::register_linked(hub),
		None => 0,
	}
}

/// Forwards `message` to the host's log service, if it offered one.
pub fn log(level: WeftLogLevel, message: &str) {
	let Some(log) = HOST.get().and_then(|h| h.log) else {
		return;
	};
	let name = NAME.get().copied().unwrap_or_default();
	log(level, WeftStr::borrowed(name), WeftStr::borrowed(message));
}

pub fn error(message: &str) {
	log(WeftLogLevel::ERROR, message);
}

pub fn warn(message: &str) {
	log(WeftLogLevel::WARN, message);
}

pub fn info(message: &str) {
	log(WeftLogLevel::INFO, message);
}

pub fn debug(message: &str) {
	log(WeftLogLevel::DEBUG, message);
}

unsafe extern "C" fn initialize<P: Lifecycle>(
	instance: *mut c_void,
	args: *const WeftStr,
	nargs: usize,
	error: *const WeftErrorSink,
) -> WeftBool {
	// SAFETY: `instance` came from `table_for::<P>` and has not been released.
	let plugin = unsafe { &mut *instance.cast::<P>() };
	let args: Vec<String> = if args.is_null() {
		Vec::new()
	} else {
		// SAFETY: the host passes `nargs` borrowed strings valid for this call.
		unsafe { std::slice::from_raw_parts(args, nargs) }
			.iter()
			.map(|a| unsafe { a.as_str() }.unwrap_or_default().to_owned())
			.collect()
	};

	let message = match catch_unwind(AssertUnwindSafe(|| plugin.initialize(&args))) {
		Ok(Ok(())) => return WeftBool::TRUE,
		Ok(Err(message)) => message,
		Err(_) => "panicked during initialize".to_string(),
	};
	// SAFETY: the sink, when given, is valid for this call.
	if let Some(sink) = unsafe { error.as_ref() } {
		(sink.write)(sink.ctx, WeftStr::borrowed(&message));
	}
	WeftBool::FALSE
}

unsafe extern "C" fn extensions_initialize<P: Lifecycle>(instance: *mut c_void) -> WeftBool {
	// SAFETY: as in `initialize`.
	let plugin = unsafe { &mut *instance.cast::<P>() };
	catch_unwind(AssertUnwindSafe(|| plugin.extensions_initialize()))
		.unwrap_or(false)
		.into()
}

unsafe extern "C" fn delayed_initialize<P: Lifecycle>(instance: *mut c_void) -> WeftBool {
	// SAFETY: as in `initialize`.
	let plugin = unsafe { &mut *instance.cast::<P>() };
	catch_unwind(AssertUnwindSafe(|| plugin.delayed_initialize()))
		.unwrap_or(false)
		.into()
}

unsafe extern "C" fn query<P: Lifecycle>(instance: *mut c_void, iid: WeftStr) -> *const c_void {
	// SAFETY: as in `initialize`; `iid` is borrowed for this call.
	let plugin = unsafe { &*instance.cast::<P>() };
	let Some(iid) = (unsafe { iid.as_str() }) else {
		return core::ptr::null();
	};
	catch_unwind(AssertUnwindSafe(|| match plugin.query(iid) {
		Some(found) if found.iid() == iid => found.as_ptr(),
		_ => core::ptr::null(),
	}))
	.unwrap_or(core::ptr::null())
}

unsafe extern "C" fn release<P: Lifecycle>(instance: *mut c_void) {
	// SAFETY: ownership returns from the table; the host calls this at most once.
	let mut plugin = unsafe { Box::from_raw(instance.cast::<P>()) };
	let _ = catch_unwind(AssertUnwindSafe(move || {
		plugin.release();
		drop(plugin);
	}));
}

/// Generates the three exports the host looks for.
///
/// ```ignore
/// weft_plugin_abi::export_plugin!(
///     MyPlugin,
///     name: "my-plugin",
///     version: env!("CARGO_PKG_VERSION"),
///     description: "Does things",
/// );
/// ```
#[macro_export]
macro_rules! export_plugin {
	(
		$plugin:ty,
		name: $name:expr,
		version: $version:expr
		$(, description: $description:expr)?
		$(,)?
	) => {
		#[unsafe(no_mangle)]
		pub static WEFT_PLUGIN_METADATA: $crate::ffi::WeftPluginMetadata =
			$crate::ffi::WeftPluginMetadata {
				abi_version: $crate::ffi::WEFT_PLUGIN_ABI_VERSION,
				name: $crate::ffi::WeftStr::from_static($name),
				interface: $crate::ffi::WeftStr::from_static($crate::ffi::WEFT_LIFECYCLE_IID),
				version: $crate::ffi::WeftStr::from_static($version),
				description: $crate::ffi::WeftStr::from_static($crate::__weft_opt!($($description)?)),
			};

		/// # Safety
		///
		/// Same contract as `weft_plugin_abi::guest::instantiate`.
		#[unsafe(no_mangle)]
		pub unsafe extern "C" fn weft_plugin_instance(
			host: *const $crate::ffi::WeftHostV1,
			out: *mut $crate::ffi::WeftLifecycleV1,
		) -> $crate::ffi::WeftStatus {
			unsafe { $crate::guest::instantiate::<$plugin>($name, host, out) }
		}

		/// # Safety
		///
		/// Same contract as `weft_plugin_abi::guest::register_into`.
		#[unsafe(no_mangle)]
		pub unsafe extern "C" fn weft_plugin_register(hub: *const ::core::ffi::c_void) -> usize {
			unsafe { $crate::guest::register_into(hub) }
		}
	};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __weft_opt {
	() => {
		""
	};
	($value:expr) => {
		$value
	};
}
