//! Registry key derivation.
//!
//! Every family (`base_key`) and every implementation (`type_key`) is named by a
//! string. The default is the compiler's type name, which is only stable for a
//! single toolchain build. Anything crossing a module boundary must pin an
//! explicit key with [`keyed!`](crate::keyed).

/// Supplies the registry key for a type.
///
/// Implemented for concrete types (`type_key`) and for trait objects such as
/// `dyn Animal` (`base_key`).
pub trait Keyed: 'static {
	/// Returns the registry key for `Self`.
	fn key() -> &'static str {
		std::any::type_name::<Self>()
	}
}

/// Implements [`Keyed`] for a type, optionally pinning a stable key.
///
/// ```ignore
/// keyed!(dyn Animal => "Animal");
/// keyed!(Cat => "Cat");
/// keyed!(Scratchpad); // compiler-derived name, single-image use only
/// ```
#[macro_export]
macro_rules! keyed {
	($ty:ty) => {
		impl $crate::Keyed for $ty {}
	};
	($ty:ty => $key:expr) => {
		impl $crate::Keyed for $ty {
			fn key() -> &'static str {
				$key
			}
		}
	};
}
