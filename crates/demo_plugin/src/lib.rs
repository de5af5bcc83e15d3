//! Sample weft plugin.
//!
//! Greets through the host's log on startup and contributes two [`Greeter`]
//! implementations to the host's registry hub.

use weft_plugin_abi::{Interface, InterfacePtr, Lifecycle, export_plugin, guest};
use weft_registry::{keyed, register};

/// Family shared with hosts that link this crate as a library.
pub trait Greeter: Send {
	fn greet(&self, who: &str) -> String;
}
keyed!(dyn Greeter => "weft.demo.Greeter");

#[derive(Default)]
pub struct English;

impl Greeter for English {
	fn greet(&self, who: &str) -> String {
		format!("hello, {who}")
	}
}
keyed!(English => "weft.demo.English");
register!(English => dyn Greeter);

#[derive(Default)]
pub struct Pirate;

impl Greeter for Pirate {
	fn greet(&self, who: &str) -> String {
		format!("ahoy, {who}")
	}
}
keyed!(Pirate => "weft.demo.Pirate");
register!(Pirate => dyn Greeter);

#[derive(Default)]
pub struct DemoPlugin {
	greeting: Option<String>,
}

impl DemoPlugin {
	pub fn greeting(&self) -> Option<&str> {
		self.greeting.as_deref()
	}
}

// SAFETY: the identifier is unique to this type and versioned with the crate.
unsafe impl Interface for DemoPlugin {
	const IID: &'static str = concat!("weft.demo.DemoPlugin/", env!("CARGO_PKG_VERSION"));
}

impl Lifecycle for DemoPlugin {
	fn initialize(&mut self, args: &[String]) -> Result<(), String> {
		if args.iter().any(|a| a == "--demo-refuse") {
			return Err("told to refuse startup".into());
		}
		let who = args
			.iter()
			.find_map(|a| a.strip_prefix("--greet="))
			.unwrap_or("world");
		let line = English.greet(who);
		guest::info(&line);
		self.greeting = Some(line);
		Ok(())
	}

	fn extensions_initialize(&mut self) -> bool {
		guest::debug("extensions ready");
		true
	}

	fn release(&mut self) {
		guest::info("goodbye");
	}

	fn query<'a>(&'a self, iid: &'a str) -> Option<InterfacePtr<'a>> {
		InterfacePtr::answer(iid, self)
	}
}

export_plugin!(
	DemoPlugin,
	name: "weft-demo",
	version: env!("CARGO_PKG_VERSION"),
	description: "Greets on startup and registers sample greeters",
);
