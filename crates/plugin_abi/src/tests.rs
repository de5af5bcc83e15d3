use std::cell::RefCell;

use pretty_assertions::assert_eq;
use weft_registry::{RegistryHub, TypedView, keyed, register};

use crate::ffi::{WeftHostV1, WeftLifecycleV1, WeftPluginMetadata, WeftStatus, WeftStr};
use crate::guest::table_for;
use crate::host::{ForeignLifecycle, HOST_V1};
use crate::{
	CapabilityError, Interface, InterfacePtr, Lifecycle, MetadataError, PluginMetadata,
	WEFT_LIFECYCLE_IID,
};

thread_local! {
	static EVENTS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

fn record(event: impl Into<String>) {
	EVENTS.with(|e| e.borrow_mut().push(event.into()));
}

fn take_events() -> Vec<String> {
	EVENTS.with(|e| std::mem::take(&mut *e.borrow_mut()))
}

#[derive(Default)]
struct Recorder;

impl Lifecycle for Recorder {
	fn initialize(&mut self, args: &[String]) -> Result<(), String> {
		record(format!("init {}", args.join(" ")));
		if args.iter().any(|a| a == "--panic") {
			panic!("asked to panic");
		}
		if args.iter().any(|a| a == "--fail") {
			return Err("refused --fail".into());
		}
		Ok(())
	}

	fn extensions_initialize(&mut self) -> bool {
		record("extensions");
		true
	}

	fn delayed_initialize(&mut self) -> bool {
		record("delayed");
		false
	}

	fn release(&mut self) {
		record("release");
	}

	fn query<'a>(&'a self, iid: &'a str) -> Option<InterfacePtr<'a>> {
		InterfacePtr::answer(iid, self)
	}
}

impl Recorder {
	fn label(&self) -> &'static str {
		"recorder"
	}
}

unsafe impl Interface for Recorder {
	const IID: &'static str = "weft.abi.tests.Recorder/1";
}

crate::export_plugin!(
	Recorder,
	name: "recorder",
	version: "0.1.0",
	description: "records lifecycle calls",
);

fn instance() -> ForeignLifecycle {
	let mut table = WeftLifecycleV1::empty();
	let status = unsafe { weft_plugin_instance(&HOST_V1, &mut table) };
	assert_eq!(status, WeftStatus::OK);
	unsafe { ForeignLifecycle::from_table(table) }.expect("valid table")
}

#[test]
fn exported_metadata_reads_back() {
	let meta = unsafe { PluginMetadata::from_raw(&WEFT_PLUGIN_METADATA) }.unwrap();
	assert_eq!(meta.name, "recorder");
	assert_eq!(meta.interface, WEFT_LIFECYCLE_IID);
	assert_eq!(meta.version, "0.1.0");
	assert_eq!(meta.description, "records lifecycle calls");
}

#[test]
fn metadata_rejects_foreign_abi_and_empty_name() {
	let mut raw = WeftPluginMetadata {
		abi_version: 99,
		name: WeftStr::from_static("x"),
		interface: WeftStr::from_static(WEFT_LIFECYCLE_IID),
		version: WeftStr::EMPTY,
		description: WeftStr::EMPTY,
	};
	assert_eq!(
		unsafe { PluginMetadata::from_raw(&raw) },
		Err(MetadataError::AbiMismatch { expected: 1, actual: 99 })
	);

	raw.abi_version = crate::WEFT_PLUGIN_ABI_VERSION;
	raw.name = WeftStr::EMPTY;
	assert_eq!(unsafe { PluginMetadata::from_raw(&raw) }, Err(MetadataError::MissingName));
}

#[test]
fn phases_cross_the_boundary_in_order() {
	take_events();
	let mut plugin = instance();

	plugin.initialize(&["a".into(), "b".into()]).unwrap();
	assert!(plugin.extensions_initialize());
	assert!(!plugin.delayed_initialize());
	drop(plugin);

	assert_eq!(take_events(), vec!["init a b", "extensions", "delayed", "release"]);
}

#[test]
fn initialize_failure_carries_the_message() {
	take_events();
	let mut plugin = instance();
	assert_eq!(plugin.initialize(&["--fail".into()]), Err("refused --fail".to_string()));
}

#[test]
fn initialize_panic_becomes_an_error() {
	let mut plugin = instance();
	let err = plugin.initialize(&["--panic".into()]).unwrap_err();
	assert!(err.contains("panicked"), "{err}");
}

#[test]
fn release_runs_once() {
	take_events();
	let mut plugin = instance();
	plugin.release();
	plugin.release();
	assert!(plugin.is_released());
	assert!(!plugin.extensions_initialize());
	assert!(plugin.initialize(&[]).is_err());
	drop(plugin);

	assert_eq!(take_events(), vec!["release"]);
}

#[test]
fn malformed_tables_are_rejected() {
	let blank = WeftLifecycleV1::empty();
	assert!(matches!(
		unsafe { ForeignLifecycle::from_table(blank) }.err(),
		Some(CapabilityError::StructSize { actual: 0, .. })
	));

	let mut bad = table_for(Box::new(Recorder));
	bad.abi_version = 7;
	assert_eq!(
		unsafe { ForeignLifecycle::from_table(bad) }.err(),
		Some(CapabilityError::AbiMismatch { expected: 1, actual: 7 })
	);

	let mut bad = table_for(Box::new(Recorder));
	bad.extensions_initialize = None;
	assert_eq!(
		unsafe { ForeignLifecycle::from_table(bad) }.err(),
		Some(CapabilityError::MissingOperation("extensions_initialize"))
	);

	let mut bad = table_for(Box::new(Recorder));
	let instance = bad.instance;
	bad.instance = std::ptr::null_mut();
	assert_eq!(
		unsafe { ForeignLifecycle::from_table(bad) }.err(),
		Some(CapabilityError::NullInstance)
	);
	// The nulled-out instance was never handed over; free it here.
	drop(unsafe { Box::from_raw(instance.cast::<Recorder>()) });

	drop(unsafe { ForeignLifecycle::from_table(table_for(Box::new(Recorder))) }.unwrap());
}

#[test]
fn rejected_table_releases_its_instance() {
	take_events();

	let mut bad = table_for(Box::new(Recorder));
	bad.abi_version = 7;
	assert!(unsafe { ForeignLifecycle::from_table(bad) }.is_err());
	assert_eq!(take_events(), vec!["release"]);

	let mut bad = table_for(Box::new(Recorder));
	bad.delayed_initialize = None;
	assert!(unsafe { ForeignLifecycle::from_table(bad) }.is_err());
	assert_eq!(take_events(), vec!["release"]);

	let mut bad = table_for(Box::new(Recorder));
	let instance = bad.instance;
	bad.release = None;
	assert!(unsafe { ForeignLifecycle::from_table(bad) }.is_err());
	assert!(take_events().is_empty());
	drop(unsafe { Box::from_raw(instance.cast::<Recorder>()) });
}

#[test]
fn query_reaches_the_plugin_interface() {
	let plugin = instance();

	let found = plugin.query(Recorder::IID).expect("recorder answers its own iid");
	assert_eq!(found.iid(), Recorder::IID);
	assert_eq!(found.downcast::<Recorder>().map(Recorder::label), Some("recorder"));
	assert!(plugin.query("weft.abi.tests.Unknown/1").is_none());
}

#[derive(Default)]
struct Mislabel {
	inner: Recorder,
}

impl Lifecycle for Mislabel {
	fn initialize(&mut self, _args: &[String]) -> Result<(), String> {
		Ok(())
	}

	fn query<'a>(&'a self, _iid: &'a str) -> Option<InterfacePtr<'a>> {
		Some(InterfacePtr::of(&self.inner))
	}
}

struct Other;

unsafe impl Interface for Other {
	const IID: &'static str = "weft.abi.tests.Other/1";
}

#[test]
fn mistagged_answers_do_not_cross_the_boundary() {
	let mut plugin = unsafe { ForeignLifecycle::from_table(table_for(Box::new(Mislabel::default()))) }
		.unwrap();

	assert!(plugin.query(Other::IID).is_none());
	assert!(plugin.query(Recorder::IID).is_some());
	assert!(InterfacePtr::of(&Other).downcast::<Recorder>().is_none());

	plugin.release();
	assert!(plugin.query(Recorder::IID).is_none());
}

#[test]
fn newer_host_table_is_incompatible() {
	let host = WeftHostV1 {
		struct_size: size_of::<WeftHostV1>(),
		abi_version: 2,
		log: None,
	};
	let mut table = WeftLifecycleV1::empty();
	let status = unsafe { weft_plugin_instance(&host, &mut table) };
	assert_eq!(status, WeftStatus::INCOMPATIBLE);
	assert!(table.instance.is_null());
}

trait Gauge {
	fn depth(&self) -> u32;
}
keyed!(dyn Gauge => "weft.abi.tests.Gauge");

#[derive(Default)]
struct Needle;
impl Gauge for Needle {
	fn depth(&self) -> u32 {
		3
	}
}
keyed!(Needle => "Needle");
register!(Needle => dyn Gauge);

#[test]
fn register_export_fills_the_given_hub() {
	let hub = RegistryHub::new();
	let applied = unsafe { weft_plugin_register((&hub as *const RegistryHub).cast()) };
	assert!(applied >= 1);

	let gauges = TypedView::<dyn Gauge>::new(&hub);
	assert_eq!(gauges.create("Needle", ()).unwrap().depth(), 3);

	assert_eq!(unsafe { weft_plugin_register(std::ptr::null()) }, 0);
}
