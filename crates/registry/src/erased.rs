//! Type-erased creators stored in the hub.
//!
//! A creator is stored as `Arc<dyn Any>` next to a [`Signature`] tag naming the
//! family and argument tuple it was registered with. Typed views compare tags
//! before downcasting so a mismatched creator is reported instead of silently
//! failing a cast.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Widened constructor: builds a family instance from the argument tuple.
pub(crate) type WideFn<B, A> = dyn Fn(A) -> Box<B> + Send + Sync;

/// Narrowed constructor: builds the concrete type from the argument tuple.
pub(crate) type NarrowFn<D, A> = dyn Fn(A) -> Box<D> + Send + Sync;

/// Identity of a creator's `(family, arguments) -> instance` shape.
#[derive(Clone, Copy)]
pub struct Signature {
	base: TypeId,
	args: TypeId,
	base_name: &'static str,
	args_name: &'static str,
}

impl Signature {
	/// Returns the signature of creators producing `Box<B>` from `A`.
	pub fn of<B: ?Sized + 'static, A: 'static>() -> Self {
		Self {
			base: TypeId::of::<B>(),
			args: TypeId::of::<A>(),
			base_name: std::any::type_name::<B>(),
			args_name: std::any::type_name::<A>(),
		}
	}

	/// Human-readable family type.
	pub fn base_name(&self) -> &'static str {
		self.base_name
	}

	/// Human-readable argument tuple.
	pub fn args_name(&self) -> &'static str {
		self.args_name
	}
}

impl PartialEq for Signature {
	fn eq(&self, other: &Self) -> bool {
		self.base == other.base && self.args == other.args
	}
}

impl Eq for Signature {}

impl fmt::Debug for Signature {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} -> Box<{}>", self.args_name, self.base_name)
	}
}

/// A creator with its concrete types erased.
#[derive(Clone)]
pub struct ErasedCreator {
	signature: Signature,
	wide: Arc<dyn Any + Send + Sync>,
	narrow: Option<(TypeId, Arc<dyn Any + Send + Sync>)>,
}

impl ErasedCreator {
	/// Erases a family constructor.
	pub fn new<B, A, F>(create: F) -> Self
	where
		B: ?Sized + 'static,
		A: 'static,
		F: Fn(A) -> Box<B> + Send + Sync + 'static,
	{
		let wide: Arc<WideFn<B, A>> = Arc::new(create);
		Self {
			signature: Signature::of::<B, A>(),
			wide: Arc::new(wide),
			narrow: None,
		}
	}

	/// Attaches a constructor returning the concrete type, enabling
	/// [`TypedView::factory_for`](crate::TypedView::factory_for).
	pub fn with_narrow<D, A, F>(mut self, create: F) -> Self
	where
		D: 'static,
		A: 'static,
		F: Fn(A) -> Box<D> + Send + Sync + 'static,
	{
		let narrow: Arc<NarrowFn<D, A>> = Arc::new(create);
		self.narrow = Some((TypeId::of::<D>(), Arc::new(narrow)));
		self
	}

	/// Signature tag recorded at registration.
	pub fn signature(&self) -> Signature {
		self.signature
	}

	pub(crate) fn wide<B: ?Sized + 'static, A: 'static>(&self) -> Option<Arc<WideFn<B, A>>> {
		if self.signature != Signature::of::<B, A>() {
			return None;
		}
		self.wide.downcast_ref::<Arc<WideFn<B, A>>>().cloned()
	}

	pub(crate) fn narrow_any(&self) -> Option<&(TypeId, Arc<dyn Any + Send + Sync>)> {
		self.narrow.as_ref()
	}
}

impl fmt::Debug for ErasedCreator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ErasedCreator")
			.field("signature", &self.signature)
			.field("narrowed", &self.narrow.is_some())
			.finish()
	}
}
