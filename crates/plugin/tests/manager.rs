use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use rustc_hash::FxHashMap;
use weft_demo_plugin::DemoPlugin;
use weft_plugin::{
	DylibLoader, LoadError, LoadOutcome, ManagerConfig, Phase, PhaseError, PhaseFailure,
	PluginLibrary, PluginLoader, PluginManager, PluginState,
};
use weft_plugin_abi::{Interface, InterfacePtr, Lifecycle, PluginMetadata, WEFT_LIFECYCLE_IID};
use weft_registry::{ErasedCreator, RegistryHub, TypedView, keyed};

#[derive(Clone, Default)]
struct Journal(Rc<RefCell<Vec<String>>>);

impl Journal {
	fn push(&self, event: String) {
		self.0.borrow_mut().push(event);
	}

	fn take(&self) -> Vec<String> {
		std::mem::take(&mut *self.0.borrow_mut())
	}
}

#[derive(Clone, Copy)]
struct Script {
	name: &'static str,
	interface: &'static str,
	fail_initialize: bool,
	fail_extensions: bool,
	/// Adds one `dyn Tool` creator to the hub when registered.
	registers: bool,
}

impl Script {
	fn named(name: &'static str) -> Self {
		Self {
			name,
			interface: WEFT_LIFECYCLE_IID,
			fail_initialize: false,
			fail_extensions: false,
			registers: false,
		}
	}
}

/// Serves scripted plugins keyed by file name.
#[derive(Default)]
struct ScriptedLoader {
	scripts: FxHashMap<String, Script>,
	journal: Journal,
}

impl ScriptedLoader {
	fn with(mut self, file: &str, script: Script) -> Self {
		self.scripts.insert(file.to_string(), script);
		self
	}
}

impl PluginLoader for ScriptedLoader {
	fn open(&self, path: &Path) -> Result<Box<dyn PluginLibrary>, LoadError> {
		let file = path.file_name().and_then(|f| f.to_str()).unwrap_or_default();
		self.journal.push(format!("open {file}"));
		let Some(script) = self.scripts.get(file).copied() else {
			return Err(LoadError::Open {
				path: path.to_path_buf(),
				source: "no such library".into(),
			});
		};
		Ok(Box::new(ScriptedLibrary {
			script,
			journal: self.journal.clone(),
		}))
	}
}

struct ScriptedLibrary {
	script: Script,
	journal: Journal,
}

impl PluginLibrary for ScriptedLibrary {
	fn metadata(&self) -> Result<PluginMetadata, LoadError> {
		Ok(PluginMetadata::new(self.script.name, self.script.interface))
	}

	fn instantiate(&self) -> Result<Box<dyn Lifecycle>, LoadError> {
		Ok(Box::new(ScriptedPlugin {
			script: self.script,
			journal: self.journal.clone(),
		}))
	}

	fn register_types(&self, hub: &RegistryHub) -> usize {
		if !self.script.registers {
			return 0;
		}
		let name = self.script.name;
		self.journal.push(format!("register {name}"));
		hub.add(
			TOOL_FAMILY,
			name,
			ErasedCreator::new::<dyn Tool, (), _>(move |()| {
				Box::new(NamedTool(name)) as Box<dyn Tool>
			}),
		);
		1
	}
}

impl Drop for ScriptedLibrary {
	fn drop(&mut self) {
		self.journal.push(format!("unload {}", self.script.name));
	}
}

struct ScriptedPlugin {
	script: Script,
	journal: Journal,
}

impl ScriptedPlugin {
	fn name(&self) -> &'static str {
		self.script.name
	}
}

unsafe impl Interface for ScriptedPlugin {
	const IID: &'static str = "weft.tests.ScriptedPlugin/1";
}

const TOOL_FAMILY: &str = "weft.tests.Tool";

trait Tool {
	fn label(&self) -> &'static str;
}
keyed!(dyn Tool => TOOL_FAMILY);

struct NamedTool(&'static str);

impl Tool for NamedTool {
	fn label(&self) -> &'static str {
		self.0
	}
}

impl Lifecycle for ScriptedPlugin {
	fn initialize(&mut self, args: &[String]) -> Result<(), String> {
		self.journal
			.push(format!("initialize {} [{}]", self.script.name, args.join(" ")));
		if self.script.fail_initialize {
			return Err(format!("{} cannot start", self.script.name));
		}
		Ok(())
	}

	fn extensions_initialize(&mut self) -> bool {
		self.journal.push(format!("extensions {}", self.script.name));
		!self.script.fail_extensions
	}

	fn delayed_initialize(&mut self) -> bool {
		self.journal.push(format!("delayed {}", self.script.name));
		true
	}

	fn release(&mut self) {
		self.journal.push(format!("release {}", self.script.name));
	}

	fn query<'a>(&'a self, iid: &'a str) -> Option<InterfacePtr<'a>> {
		InterfacePtr::answer(iid, self)
	}
}

fn config() -> ManagerConfig {
	ManagerConfig {
		suffix: "so".into(),
		..ManagerConfig::default()
	}
}

fn hub() -> &'static RegistryHub {
	Box::leak(Box::new(RegistryHub::new()))
}

fn manager(loader: ScriptedLoader) -> (PluginManager, Journal) {
	let journal = loader.journal.clone();
	(PluginManager::with_loader(config(), loader, hub()), journal)
}

fn abc() -> (PluginManager, Journal) {
	let loader = ScriptedLoader::default()
		.with("a.so", Script::named("A"))
		.with("b.so", Script::named("B"))
		.with("c.so", Script::named("C"));
	let (mut mgr, journal) = manager(loader);
	for file in ["a.so", "b.so", "c.so"] {
		assert!(mgr.load_plugin(file).is_loaded());
	}
	journal.take();
	(mgr, journal)
}

#[test]
fn load_then_lookup_by_name() {
	let (mut mgr, journal) = manager(ScriptedLoader::default().with("foo.so", Script::named("Foo")));

	let outcome = mgr.load_plugin("foo.so");
	assert!(matches!(outcome, LoadOutcome::Loaded { ref name } if name == "Foo"));
	assert!(mgr.is_loaded("Foo"));
	assert!(mgr.get("Foo").is_some());
	assert_eq!(mgr.state("Foo"), Some(PluginState::Loaded));
	assert_eq!(mgr.metadata("Foo").map(|m| m.interface.as_str()), Some(WEFT_LIFECYCLE_IID));

	let again = mgr.load_plugin("foo.so");
	assert!(matches!(again, LoadOutcome::AlreadyLoaded { ref name } if name == "Foo"));
	assert_eq!(mgr.len(), 1);
	assert_eq!(journal.take(), vec!["open foo.so"]);
}

#[test]
fn same_name_from_another_path_is_a_no_op() {
	let (mut mgr, journal) = manager(
		ScriptedLoader::default()
			.with("foo.so", Script::named("Foo"))
			.with("foo-copy.so", Script::named("Foo")),
	);

	assert!(mgr.load_plugin("foo.so").is_loaded());
	assert!(matches!(mgr.load_plugin("foo-copy.so"), LoadOutcome::AlreadyLoaded { .. }));

	assert_eq!(mgr.plugin_names(), vec!["Foo".to_string()]);
	assert_eq!(mgr.path("Foo"), Some(Path::new("foo.so")));
	assert_eq!(journal.take(), vec!["open foo.so", "open foo-copy.so", "unload Foo"]);
}

#[test]
fn non_library_file_is_rejected_before_opening() {
	let (mut mgr, journal) = manager(ScriptedLoader::default());

	let outcome = mgr.load_plugin("notes.txt");
	assert!(matches!(outcome, LoadOutcome::Rejected(LoadError::NotALibrary { .. })));
	assert!(journal.take().is_empty(), "loader must not be called");
	assert!(mgr.is_empty());
}

#[test]
fn directories_are_not_libraries() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir
		.path()
		.join(format!("looks-like.{}", std::env::consts::DLL_EXTENSION));
	fs::create_dir(&path).unwrap();

	let mut mgr = PluginManager::new(ManagerConfig::default());
	let outcome = mgr.load_plugin(&path);
	assert!(matches!(outcome, LoadOutcome::Rejected(LoadError::NotALibrary { .. })), "{outcome:?}");
	assert!(mgr.is_empty());
}

#[test]
fn typed_interface_lookup() {
	let (mut mgr, _journal) = manager(ScriptedLoader::default().with("foo.so", Script::named("Foo")));
	assert!(mgr.load_plugin("foo.so").is_loaded());

	let plugin = mgr.interface::<ScriptedPlugin>("Foo").expect("scripted plugins expose themselves");
	assert_eq!(plugin.name(), "Foo");
	assert!(mgr.interface::<DemoPlugin>("Foo").is_none());
	assert!(mgr.interface::<ScriptedPlugin>("Bar").is_none());

	mgr.shutdown();
	assert!(mgr.interface::<ScriptedPlugin>("Foo").is_none());
}

#[test]
fn registering_plugin_keeps_its_library_mapped() {
	let loader = ScriptedLoader::default()
		.with("plain.so", Script::named("Plain"))
		.with(
			"tools.so",
			Script {
				registers: true,
				..Script::named("Tools")
			},
		);
	let (mut mgr, journal) = manager(loader);
	let hub = mgr.hub();

	assert!(mgr.load_plugin("plain.so").is_loaded());
	assert!(mgr.load_plugin("tools.so").is_loaded());
	assert_eq!(journal.take(), vec!["open plain.so", "open tools.so", "register Tools"]);

	let tools = TypedView::<dyn Tool>::new(hub);
	assert_eq!(tools.type_keys(), vec!["Tools".to_string()]);
	assert_eq!(hub.version(TOOL_FAMILY), 1);

	mgr.shutdown();
	assert_eq!(journal.take(), vec!["release Tools", "release Plain", "unload Plain"]);
	assert_eq!(tools.create("Tools", ()).unwrap().label(), "Tools");
}

#[test]
fn rejected_candidates_register_nothing() {
	let loader = ScriptedLoader::default().with(
		"tools.so",
		Script {
			registers: true,
			..Script::named("Tools")
		},
	);
	let journal = loader.journal.clone();
	let config = ManagerConfig {
		disabled: vec!["Tools".into()],
		..config()
	};
	let mut mgr = PluginManager::with_loader(config, loader, hub());

	assert!(matches!(mgr.load_plugin("tools.so"), LoadOutcome::Rejected(LoadError::Disabled(_))));
	assert!(mgr.hub().families().is_empty());
	assert_eq!(journal.take(), vec!["open tools.so", "unload Tools"]);
}

#[test]
fn interface_mismatch_unloads_the_candidate() {
	let foreign = Script {
		interface: "other.Interface/9",
		..Script::named("Stranger")
	};
	let (mut mgr, journal) = manager(ScriptedLoader::default().with("x.so", foreign));

	let outcome = mgr.load_plugin("x.so");
	let LoadOutcome::Rejected(LoadError::InterfaceMismatch { expected, found }) = &outcome else {
		panic!("expected interface mismatch, got {outcome:?}");
	};
	assert_eq!(expected, WEFT_LIFECYCLE_IID);
	assert_eq!(found, "other.Interface/9");
	assert!(!mgr.is_loaded("Stranger"));
	assert_eq!(journal.take(), vec!["open x.so", "unload Stranger"]);
}

#[test]
fn disabled_plugins_are_rejected() {
	let loader = ScriptedLoader::default().with("quiet.so", Script::named("Quiet"));
	let journal = loader.journal.clone();
	let config = ManagerConfig {
		disabled: vec!["Quiet".into()],
		..config()
	};
	let mut mgr = PluginManager::with_loader(config, loader, hub());

	assert!(matches!(
		mgr.load_plugin("quiet.so"),
		LoadOutcome::Rejected(LoadError::Disabled(ref name)) if name == "Quiet"
	));
	assert!(mgr.is_empty());
	assert_eq!(journal.take(), vec!["open quiet.so", "unload Quiet"]);
}

#[test]
fn open_failure_does_not_stop_later_loads() {
	let (mut mgr, _journal) = manager(ScriptedLoader::default().with("good.so", Script::named("Good")));

	assert!(matches!(mgr.load_plugin("broken.so"), LoadOutcome::Rejected(LoadError::Open { .. })));
	assert!(mgr.load_plugin("good.so").is_loaded());
	assert_eq!(mgr.plugin_names(), vec!["Good".to_string()]);
}

#[test]
fn phases_follow_load_order_then_reverse() {
	let (mut mgr, journal) = abc();
	let args = vec!["--fast".to_string()];

	mgr.initialize_all(&args).unwrap();
	mgr.extensions_initialize_all().unwrap();
	mgr.delayed_initialize_all().unwrap();

	assert_eq!(
		journal.take(),
		vec![
			"initialize A [--fast]",
			"initialize B [--fast]",
			"initialize C [--fast]",
			"extensions C",
			"extensions B",
			"extensions A",
			"delayed C",
			"delayed B",
			"delayed A",
		]
	);
	for name in ["A", "B", "C"] {
		assert_eq!(mgr.state(name), Some(PluginState::DelayedInitialized));
	}
}

#[test]
fn teardown_releases_in_reverse_load_order() {
	let (mgr, journal) = abc();
	drop(mgr);

	assert_eq!(
		journal.take(),
		vec!["release C", "unload C", "release B", "unload B", "release A", "unload A"]
	);
}

#[test]
fn shutdown_is_idempotent() {
	let (mut mgr, journal) = abc();
	mgr.shutdown();
	assert_eq!(journal.take().len(), 6);
	assert!(mgr.is_empty());
	assert!(!mgr.is_loaded("A"));
	assert!(mgr.get("A").is_none());

	mgr.shutdown();
	drop(mgr);
	assert!(journal.take().is_empty());
}

#[test]
fn initialize_failure_does_not_stop_the_phase() {
	let loader = ScriptedLoader::default()
		.with("a.so", Script::named("A"))
		.with(
			"b.so",
			Script {
				fail_initialize: true,
				..Script::named("B")
			},
		)
		.with("c.so", Script::named("C"));
	let (mut mgr, journal) = manager(loader);
	for file in ["a.so", "b.so", "c.so"] {
		mgr.load_plugin(file);
	}
	journal.take();

	let err = mgr.initialize_all(&[]).unwrap_err();
	assert_eq!(
		err,
		PhaseError {
			phase: Phase::Initialize,
			failures: vec![PhaseFailure {
				name: "B".into(),
				message: Some("B cannot start".into()),
			}],
		}
	);
	assert_eq!(err.to_string(), "initialize failed for 'B' (B cannot start)");
	assert_eq!(journal.take(), vec!["initialize A []", "initialize B []", "initialize C []"]);

	assert_eq!(mgr.state("A"), Some(PluginState::Initialized));
	assert_eq!(mgr.state("B"), Some(PluginState::Loaded));
	assert_eq!(mgr.state("C"), Some(PluginState::Initialized));
}

#[test]
fn extension_failures_are_collected_in_call_order() {
	let failing = |name| Script {
		fail_extensions: true,
		..Script::named(name)
	};
	let loader = ScriptedLoader::default()
		.with("a.so", failing("A"))
		.with("b.so", Script::named("B"))
		.with("c.so", failing("C"));
	let (mut mgr, _journal) = manager(loader);
	for file in ["a.so", "b.so", "c.so"] {
		mgr.load_plugin(file);
	}

	let err = mgr.extensions_initialize_all().unwrap_err();
	assert_eq!(err.phase, Phase::ExtensionsInitialize);
	let names: Vec<_> = err.failures.iter().map(|f| f.name.as_str()).collect();
	assert_eq!(names, vec!["C", "A"]);
	assert!(err.failures.iter().all(|f| f.message.is_none()));
}

fn touch(path: &Path) {
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).unwrap();
	}
	fs::write(path, b"").unwrap();
}

fn tree_loader() -> ScriptedLoader {
	ScriptedLoader::default()
		.with("a.so", Script::named("A"))
		.with("b.so", Script::named("B"))
		.with("c.so", Script::named("C"))
}

fn plugin_tree() -> tempfile::TempDir {
	let dir = tempfile::tempdir().unwrap();
	touch(&dir.path().join("b.so"));
	touch(&dir.path().join("a.so"));
	touch(&dir.path().join("README.txt"));
	touch(&dir.path().join("nested/c.so"));
	dir
}

#[test]
fn directory_scans_are_sorted_and_optionally_recursive() {
	let dir = plugin_tree();
	let (mut mgr, _journal) = manager(tree_loader());

	assert_eq!(mgr.load_plugins(dir.path()), 2);
	assert_eq!(mgr.plugin_names(), vec!["A".to_string(), "B".to_string()]);

	assert_eq!(mgr.find_load_plugins(dir.path()), 1);
	assert_eq!(
		mgr.plugin_names(),
		vec!["A".to_string(), "B".to_string(), "C".to_string()]
	);
}

#[test]
fn configured_directories_are_scanned() {
	let dir = plugin_tree();
	let loader = tree_loader();
	let config = ManagerConfig {
		dirs: vec![dir.path().to_path_buf(), dir.path().join("missing")],
		recursive: true,
		..config()
	};
	let mut mgr = PluginManager::with_loader(config, loader, hub());

	assert_eq!(mgr.load_configured(), 3);
	assert_eq!(mgr.len(), 3);
}

#[test]
fn platform_loader_rejects_garbage_files() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir
		.path()
		.join(format!("bogus.{}", std::env::consts::DLL_EXTENSION));
	fs::write(&path, b"definitely not a shared library").unwrap();

	let mut mgr = PluginManager::new(ManagerConfig::default());
	let outcome = mgr.load_plugin(&path);
	assert!(matches!(outcome, LoadOutcome::Rejected(LoadError::Open { .. })), "{outcome:?}");
	assert!(mgr.is_empty());
}

/// Finds the `weft-demo-plugin` shared library cargo built next to this test.
fn demo_library() -> Option<std::path::PathBuf> {
	if let Some(path) = std::env::var_os("WEFT_DEMO_PLUGIN") {
		return Some(path.into());
	}
	let exe = std::env::current_exe().ok()?;
	let deps = exe.parent()?;
	let prefix = format!("{}weft_demo_plugin", std::env::consts::DLL_PREFIX);
	let suffix = format!(".{}", std::env::consts::DLL_EXTENSION);
	[Some(deps), deps.parent()]
		.into_iter()
		.flatten()
		.filter_map(|dir| fs::read_dir(dir).ok())
		.flatten()
		.filter_map(Result::ok)
		.map(|entry| entry.path())
		.find(|path| {
			path.file_name()
				.and_then(|f| f.to_str())
				.is_some_and(|f| f.starts_with(&prefix) && f.ends_with(&suffix))
		})
}

#[test]
fn demo_plugin_runs_through_the_platform_loader() {
	let Some(path) = demo_library() else {
		eprintln!("weft-demo-plugin shared library not found; set WEFT_DEMO_PLUGIN to run");
		return;
	};
	let hub = hub();
	let mut mgr = PluginManager::with_loader(ManagerConfig::default(), DylibLoader, hub);

	let outcome = mgr.load_plugin(&path);
	assert!(matches!(outcome, LoadOutcome::Loaded { ref name } if name == "weft-demo"), "{outcome:?}");
	assert_eq!(hub.families(), vec!["weft.demo.Greeter".to_string()]);
	assert_eq!(hub.version("weft.demo.Greeter"), 2);

	mgr.initialize_all(&["--greet=tests".into()]).unwrap();
	let demo = mgr
		.interface::<DemoPlugin>("weft-demo")
		.expect("demo plugin exposes itself");
	assert_eq!(demo.greeting(), Some("hello, tests"));

	mgr.extensions_initialize_all().unwrap();
	mgr.delayed_initialize_all().unwrap();
	assert_eq!(mgr.state("weft-demo"), Some(PluginState::DelayedInitialized));

	mgr.shutdown();
	assert!(mgr.is_empty());
	let mut greeters: Vec<String> = hub
		.snapshot("weft.demo.Greeter")
		.iter()
		.map(|e| e.type_key.to_string())
		.collect();
	greeters.sort();
	assert_eq!(greeters, vec!["weft.demo.English", "weft.demo.Pirate"]);
}
