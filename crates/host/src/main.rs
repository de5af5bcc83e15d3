//! Weft host binary.
//!
//! Loads plugins from the configured directories, runs the four lifecycle
//! phases, reports what the plugins registered, then tears everything down.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use weft_plugin::{PhaseError, PluginManager, WeftConfig};
use weft_registry::RegistryHub;

const DEFAULT_CONFIG: &str = "weft.toml";

/// Host command line arguments.
#[derive(Parser, Debug)]
#[command(name = "weft-host")]
#[command(about = "Load weft plugins and drive their lifecycle")]
struct Args {
	/// Configuration file (defaults to ./weft.toml when present)
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Extra plugin directory; may be repeated
	#[arg(short, long = "plugins", value_name = "DIR")]
	plugins: Vec<PathBuf>,

	/// Scan plugin directories recursively
	#[arg(short, long)]
	recursive: bool,

	/// Exit with an error if any lifecycle phase reports a failure
	#[arg(long)]
	strict: bool,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,

	/// Arguments forwarded to every plugin's initialize phase
	#[arg(last = true)]
	args: Vec<String>,
}

fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	setup_tracing(args.verbose);

	let mut config = load_config(args.config.as_ref())?;
	if let Some(dirs) = std::env::var_os("WEFT_PLUGIN_DIR") {
		config.plugins.dirs.extend(std::env::split_paths(&dirs));
	}
	config.plugins.dirs.extend(args.plugins.iter().cloned());
	config.plugins.recursive |= args.recursive;

	info!(dirs = ?config.plugins.dirs, recursive = config.plugins.recursive, "starting weft-host");

	let mut manager = PluginManager::new(config.plugins);
	let loaded = manager.load_configured();
	info!(loaded, plugins = ?manager.plugin_names(), "plugin scan finished");
	log_registry(manager.hub());

	let mut failures = 0;
	failures += report(manager.initialize_all(&args.args));
	failures += report(manager.extensions_initialize_all());
	failures += report(manager.delayed_initialize_all());

	manager.shutdown();
	info!("shut down");

	if args.strict && failures > 0 {
		anyhow::bail!("{failures} plugin lifecycle failure(s)");
	}
	Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<WeftConfig> {
	match path {
		Some(path) => WeftConfig::load(path)
			.with_context(|| format!("loading config from {}", path.display())),
		None if std::path::Path::new(DEFAULT_CONFIG).is_file() => {
			WeftConfig::load(DEFAULT_CONFIG).context("loading ./weft.toml")
		}
		None => Ok(WeftConfig::default()),
	}
}

fn report(result: Result<(), PhaseError>) -> usize {
	match result {
		Ok(()) => 0,
		Err(err) => {
			warn!(error = %err, "lifecycle phase incomplete");
			err.failures.len()
		}
	}
}

fn log_registry(hub: &RegistryHub) {
	for family in hub.families() {
		let snapshot = hub.snapshot(&family);
		let types: Vec<&str> = snapshot.iter().map(|e| &*e.type_key).collect();
		info!(family = %family, version = snapshot.version(), ?types, "registry family");
	}
}

fn setup_tracing(verbose: bool) {
	use std::fs::OpenOptions;

	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::prelude::*;

	let filter = || {
		EnvFilter::try_from_default_env().unwrap_or_else(|_| {
			if verbose {
				EnvFilter::new("weft=trace,debug")
			} else {
				EnvFilter::new("info")
			}
		})
	};

	// WEFT_LOG_DIR diverts logs to a per-process file.
	if let Some(log_dir) = std::env::var_os("WEFT_LOG_DIR").map(PathBuf::from)
		&& std::fs::create_dir_all(&log_dir).is_ok()
	{
		let log_path = log_dir.join(format!("weft-host.{}.log", std::process::id()));
		if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
			let file_layer = tracing_subscriber::fmt::layer()
				.with_writer(file)
				.with_ansi(false)
				.with_target(true);
			tracing_subscriber::registry().with(filter()).with(file_layer).init();
			info!(path = ?log_path, "host tracing initialized");
			return;
		}
	}

	tracing_subscriber::registry()
		.with(filter())
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
		.init();
}
