//! Typed access to the interfaces a loaded plugin exposes beyond [`Lifecycle`].
//!
//! A host asks a plugin for an interface by identifier through
//! [`Lifecycle::query`]. The answer is an [`InterfacePtr`] tagged with the
//! identifier it was built for; [`InterfacePtr::downcast`] hands out a typed
//! reference only when that tag matches.
//!
//! [`Lifecycle`]: crate::Lifecycle
//! [`Lifecycle::query`]: crate::Lifecycle::query

use core::ffi::c_void;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// A type that can be handed across the plugin boundary by identifier.
///
/// # Safety
///
/// `IID` must name exactly one type. Host and plugin must agree on that type's
/// layout, which holds when both are built by the same toolchain from the same
/// crate version.
pub unsafe trait Interface: Sized + 'static {
	const IID: &'static str;
}

/// A borrowed interface answer, valid for as long as the answering instance.
#[derive(Clone, Copy, Debug)]
pub struct InterfacePtr<'a> {
	iid: &'a str,
	ptr: NonNull<c_void>,
	_borrow: PhantomData<&'a ()>,
}

impl<'a> InterfacePtr<'a> {
	pub fn of<T: Interface>(value: &'a T) -> Self {
		Self {
			iid: T::IID,
			ptr: NonNull::from(value).cast(),
			_borrow: PhantomData,
		}
	}

	/// Answers `iid` with `value` when `iid` names `T`.
	pub fn answer<T: Interface>(iid: &str, value: &'a T) -> Option<Self> {
		(iid == T::IID).then(|| Self::of(value))
	}

	/// Wraps a pointer received from the other side of the boundary.
	///
	/// Returns `None` for null.
	///
	/// # Safety
	///
	/// A non-null `ptr` must point to the type named by `iid` and stay valid
	/// for `'a`.
	pub unsafe fn from_raw(iid: &'a str, ptr: *const c_void) -> Option<Self> {
		Some(Self {
			iid,
			ptr: NonNull::new(ptr.cast_mut())?,
			_borrow: PhantomData,
		})
	}

	pub fn iid(&self) -> &'a str {
		self.iid
	}

	pub fn as_ptr(&self) -> *const c_void {
		self.ptr.as_ptr()
	}

	/// Returns the typed reference if this answer was built for `T`.
	pub fn downcast<T: Interface>(self) -> Option<&'a T> {
		if self.iid != T::IID {
			return None;
		}
		// SAFETY: the tag names `T` (unique by the `Interface` contract) and the
		// pointee outlives `'a` by construction.
		Some(unsafe { self.ptr.cast::<T>().as_ref() })
	}
}
