//! Strongly-typed views over one registry family.
//!
//! A [`TypedView`] turns the erased entries of `B::key()` into [`Factory`]
//! handles for a fixed argument tuple `A`. The typed list is cached and rebuilt
//! only when the hub's version for the family moves.
//!
//! # Invariants
//!
//! - Rebuilt lists are published with `ArcSwap` read-copy-update; a published
//!   cache never regresses to an older hub version.
//! - Creators whose [`Signature`] does not match `(B, A)` are skipped, never
//!   surfaced as errors.

use std::any::{Any, TypeId};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::debug;

use crate::erased::{NarrowFn, Signature, WideFn};
use crate::error::ViewError;
use crate::hub::{RegistryHub, Snapshot};
use crate::key::Keyed;

/// Which entry wins when a family holds the same `type_key` more than once.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
	/// Earliest registration wins.
	#[default]
	FirstWins,
	/// Latest registration shadows earlier ones.
	LastWins,
}

/// Reusable constructor for one implementation of family `B`.
pub struct Factory<B: ?Sized, A> {
	type_key: Arc<str>,
	create: Arc<WideFn<B, A>>,
}

impl<B: ?Sized, A> Clone for Factory<B, A> {
	fn clone(&self) -> Self {
		Self {
			type_key: self.type_key.clone(),
			create: self.create.clone(),
		}
	}
}

impl<B: ?Sized, A> Factory<B, A> {
	pub fn type_key(&self) -> &str {
		&self.type_key
	}

	/// Builds a new, exclusively owned instance.
	pub fn create(&self, args: A) -> Box<B> {
		(self.create)(args)
	}
}

impl<B: ?Sized, A> std::fmt::Debug for Factory<B, A> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Factory").field("type_key", &self.type_key).finish()
	}
}

/// Constructor narrowed to the concrete type `D`.
pub struct NarrowFactory<D, A> {
	type_key: Arc<str>,
	create: Arc<NarrowFn<D, A>>,
}

impl<D, A> Clone for NarrowFactory<D, A> {
	fn clone(&self) -> Self {
		Self {
			type_key: self.type_key.clone(),
			create: self.create.clone(),
		}
	}
}

impl<D, A> NarrowFactory<D, A> {
	pub fn type_key(&self) -> &str {
		&self.type_key
	}

	pub fn create(&self, args: A) -> Box<D> {
		(self.create)(args)
	}
}

struct ViewEntry<B: ?Sized, A> {
	factory: Factory<B, A>,
	narrow: Option<(TypeId, Arc<dyn Any + Send + Sync>)>,
}

/// Typed entry list derived from one hub snapshot.
pub struct Entries<B: ?Sized, A> {
	version: u64,
	items: Vec<ViewEntry<B, A>>,
}

impl<B: ?Sized + 'static, A: 'static> Entries<B, A> {
	fn empty() -> Self {
		Self {
			version: 0,
			items: Vec::new(),
		}
	}

	fn build(base_key: &str, snapshot: &Snapshot) -> Self {
		let expected = Signature::of::<B, A>();
		let mut items = Vec::with_capacity(snapshot.len());
		for raw in snapshot.iter() {
			let Some(create) = raw.creator.wide::<B, A>() else {
				debug!(
					base_key,
					type_key = %raw.type_key,
					found = ?raw.creator.signature(),
					expected = ?expected,
					"skipping creator with mismatched signature"
				);
				continue;
			};
			items.push(ViewEntry {
				factory: Factory {
					type_key: raw.type_key.clone(),
					create,
				},
				narrow: raw.creator.narrow_any().cloned(),
			});
		}
		Self {
			version: snapshot.version(),
			items,
		}
	}
}

impl<B: ?Sized, A> Entries<B, A> {
	/// Hub version this list was derived from.
	pub fn version(&self) -> u64 {
		self.version
	}

	pub fn len(&self) -> usize {
		self.items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	/// Factories in registration order, duplicates included.
	pub fn iter(&self) -> impl Iterator<Item = &Factory<B, A>> + '_ {
		self.items.iter().map(|e| &e.factory)
	}
}

/// Typed access to the family `B` for construction arguments `A`.
pub struct TypedView<'h, B: ?Sized + Keyed, A: 'static = ()> {
	hub: &'h RegistryHub,
	policy: DuplicatePolicy,
	cache: ArcSwap<Entries<B, A>>,
}

impl<B: ?Sized + Keyed, A: 'static> TypedView<'static, B, A> {
	/// View over the process-wide hub.
	pub fn global() -> Self {
		Self::new(RegistryHub::global())
	}
}

impl<'h, B: ?Sized + Keyed, A: 'static> TypedView<'h, B, A> {
	pub fn new(hub: &'h RegistryHub) -> Self {
		Self::with_policy(hub, DuplicatePolicy::default())
	}

	pub fn with_policy(hub: &'h RegistryHub, policy: DuplicatePolicy) -> Self {
		Self {
			hub,
			policy,
			cache: ArcSwap::from_pointee(Entries::empty()),
		}
	}

	pub fn policy(&self) -> DuplicatePolicy {
		self.policy
	}

	/// Returns the typed entries, rebuilding if the hub has moved on.
	pub fn entries(&self) -> Arc<Entries<B, A>> {
		let base_key = B::key();
		let current = self.cache.load_full();
		if current.version == self.hub.version(base_key) {
			return current;
		}

		let rebuilt = Arc::new(Entries::build(base_key, &self.hub.snapshot(base_key)));
		debug!(base_key, version = rebuilt.version, len = rebuilt.len(), "rebuilt typed view");
		self.cache.rcu(|cur| {
			if cur.version >= rebuilt.version {
				Arc::clone(cur)
			} else {
				Arc::clone(&rebuilt)
			}
		});
		self.cache.load_full()
	}

	/// Registered implementation keys in registration order.
	pub fn type_keys(&self) -> Vec<String> {
		self.entries().iter().map(|f| f.type_key().to_string()).collect()
	}

	/// Builds the implementation registered as `type_key`.
	pub fn create(&self, type_key: &str, args: A) -> Result<Box<B>, ViewError> {
		let factory = self.factory_of(type_key).ok_or_else(|| ViewError::NotFound {
			base_key: B::key().to_string(),
			type_key: type_key.to_string(),
		})?;
		Ok(factory.create(args))
	}

	/// Returns a reusable factory for `type_key`.
	pub fn factory_of(&self, type_key: &str) -> Option<Factory<B, A>> {
		let entries = self.entries();
		self.find(&entries, type_key).map(|e| e.factory.clone())
	}

	/// Returns a factory narrowed to the concrete type `D`.
	///
	/// `None` when `D::key()` is not registered, or when the entry resolved for
	/// that key was not registered as a `D`.
	pub fn factory_for<D: Keyed>(&self) -> Option<NarrowFactory<D, A>> {
		let entries = self.entries();
		let entry = self.find(&entries, D::key())?;
		let (type_id, narrow) = entry.narrow.as_ref()?;
		if *type_id != TypeId::of::<D>() {
			return None;
		}
		let create = narrow.downcast_ref::<Arc<NarrowFn<D, A>>>()?.clone();
		Some(NarrowFactory {
			type_key: entry.factory.type_key.clone(),
			create,
		})
	}

	pub fn is_registered(&self, type_key: &str) -> bool {
		let entries = self.entries();
		self.find(&entries, type_key).is_some()
	}

	pub fn is_type_registered<D: Keyed>(&self) -> bool {
		self.is_registered(D::key())
	}

	fn find<'e>(&self, entries: &'e Entries<B, A>, type_key: &str) -> Option<&'e ViewEntry<B, A>> {
		let matches = |e: &&ViewEntry<B, A>| &*e.factory.type_key == type_key;
		match self.policy {
			DuplicatePolicy::FirstWins => entries.items.iter().find(matches),
			DuplicatePolicy::LastWins => entries.items.iter().rev().find(matches),
		}
	}
}
