use crate::interface::InterfacePtr;

/// Four-phase lifecycle every plugin goes through.
///
/// The manager drives `initialize` over all plugins in load order, then
/// `extensions_initialize` and `delayed_initialize` in reverse load order, and
/// finally `release` in reverse load order at shutdown.
pub trait Lifecycle {
	/// First phase; `Err` carries a human-readable reason.
	fn initialize(&mut self, args: &[String]) -> Result<(), String>;

	/// Runs once every plugin has initialized.
	fn extensions_initialize(&mut self) -> bool {
		true
	}

	/// Deferred work after startup has settled.
	fn delayed_initialize(&mut self) -> bool {
		true
	}

	/// Called exactly once, before the instance is dropped.
	fn release(&mut self) {}

	/// Answers a request for another interface this plugin implements.
	///
	/// Build the answer with [`InterfacePtr::answer`]; answers whose tag does
	/// not match `iid` are dropped at the boundary.
	fn query<'a>(&'a self, _iid: &'a str) -> Option<InterfacePtr<'a>> {
		None
	}
}
