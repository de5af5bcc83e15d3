//! Link-time self-registration.
//!
//! Each [`register!`](crate::register) invocation submits a [`Registration`] via
//! `inventory`. Registrations are never run implicitly by static constructors;
//! they are applied to a hub explicitly by [`register_linked`], which
//! [`RegistryHub::global`] calls once on creation and which a plugin calls from
//! its exported registration entry point against the host's hub.

use std::marker::PhantomData;

use crate::erased::ErasedCreator;
use crate::hub::RegistryHub;
use crate::key::Keyed;

/// Builds a concrete type from a construction-argument tuple.
///
/// Blanket-implemented for every `Default` type with no arguments.
pub trait Construct<A>: Sized {
	fn construct(args: A) -> Self;
}

impl<T: Default> Construct<()> for T {
	fn construct(_: ()) -> Self {
		T::default()
	}
}

/// Registers `D` under family `B` for argument tuple `A`.
///
/// `upcast` is the unsizing step from `Box<D>` to `Box<B>`; the macro passes an
/// identity closure and lets the compiler coerce.
pub struct SelfRegistrar<B: ?Sized, D, A> {
	upcast: fn(Box<D>) -> Box<B>,
	_args: PhantomData<fn(A)>,
}

impl<B, D, A> SelfRegistrar<B, D, A>
where
	B: ?Sized + Keyed,
	D: Keyed + Construct<A>,
	A: 'static,
{
	pub const fn new(upcast: fn(Box<D>) -> Box<B>) -> Self {
		Self {
			upcast,
			_args: PhantomData,
		}
	}

	/// Inserts the trampoline creator under `(B::key(), D::key())`.
	pub fn register(&self, hub: &RegistryHub) {
		let upcast = self.upcast;
		let creator = ErasedCreator::new::<B, A, _>(move |args| upcast(Box::new(D::construct(args))))
			.with_narrow::<D, A, _>(|args| Box::new(D::construct(args)));
		hub.add(B::key(), D::key(), creator);
	}
}

/// Deferred registration collected through `inventory`.
pub struct Registration {
	apply: fn(&RegistryHub),
}

impl Registration {
	pub const fn new(apply: fn(&RegistryHub)) -> Self {
		Self { apply }
	}
}

inventory::collect!(Registration);

/// Applies every registration linked into the calling image to `hub`.
///
/// Returns how many registrations ran.
pub fn register_linked(hub: &RegistryHub) -> usize {
	let mut count = 0;
	for reg in inventory::iter::<Registration> {
		(reg.apply)(hub);
		count += 1;
	}
	count
}

/// Declares that a concrete type implements a family.
///
/// ```ignore
/// register!(Cat => dyn Animal);
/// register!(Truck => dyn Vehicle, (String, u32));
/// ```
///
/// The concrete type must implement [`Construct`] for the argument tuple
/// (defaults to `()`, covered by any `Default` type).
#[macro_export]
macro_rules! register {
	($derived:ty => $base:ty) => {
		$crate::register!($derived => $base, ());
	};
	($derived:ty => $base:ty, $args:ty) => {
		const _: () = {
			fn __weft_register(hub: &$crate::RegistryHub) {
				$crate::SelfRegistrar::<$base, $derived, $args>::new(
					|d: ::std::boxed::Box<$derived>| -> ::std::boxed::Box<$base> { d },
				)
				.register(hub);
			}
			$crate::inventory::submit! { $crate::Registration::new(__weft_register) }
		};
	};
}
