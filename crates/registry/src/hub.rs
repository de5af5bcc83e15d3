//! Process-wide registry hub with copy-on-write buckets.
//!
//! # Mental model
//!
//! * One bucket per `base_key`, created on first registration and never removed.
//! * A bucket publishes an immutable [`Snapshot`] through `ArcSwap`. Writers build
//!   a replacement (previous entries + one) and swap it in; the version travels
//!   inside the snapshot so readers see entries and version together.
//! * Readers that already pinned a snapshot keep it unchanged for as long as they
//!   hold it, regardless of later registrations.
//!
//! # Concurrency
//!
//! The bucket map sits behind a `parking_lot::RwLock`. `snapshot`/`version` take
//! the read side; `add` takes the write side, which serializes writers across all
//! families. Publication is a single atomic store.

use std::any::Any;
use std::ops::Deref;
use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::erased::ErasedCreator;

/// One registered implementation: its key and its erased creator.
#[derive(Clone, Debug)]
pub struct RawEntry {
	pub type_key: Arc<str>,
	pub creator: ErasedCreator,
}

/// Immutable, point-in-time view of one family's entries.
#[derive(Clone, Debug)]
pub struct Snapshot {
	inner: Arc<Published>,
}

#[derive(Debug)]
struct Published {
	version: u64,
	entries: Box<[RawEntry]>,
}

static EMPTY: LazyLock<Snapshot> = LazyLock::new(|| Snapshot {
	inner: Arc::new(Published {
		version: 0,
		entries: Box::new([]),
	}),
});

impl Snapshot {
	/// Number of successful registrations this snapshot reflects.
	pub fn version(&self) -> u64 {
		self.inner.version
	}

	/// Returns true if both snapshots are the same publication.
	pub fn ptr_eq(&self, other: &Snapshot) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl Deref for Snapshot {
	type Target = [RawEntry];

	fn deref(&self) -> &[RawEntry] {
		&self.inner.entries
	}
}

struct Bucket {
	published: ArcSwap<Published>,
}

/// Map from family key to its bucket of registered creators.
pub struct RegistryHub {
	buckets: RwLock<FxHashMap<Box<str>, Bucket>>,
	/// Named singletons, see [`RegistryHub::instance`].
	pub(crate) instances: Mutex<FxHashMap<Box<str>, Arc<dyn Any + Send + Sync>>>,
}

static GLOBAL: LazyLock<RegistryHub> = LazyLock::new(|| {
	let hub = RegistryHub::new();
	let linked = crate::registrar::register_linked(&hub);
	trace!(linked, "registry hub created");
	hub
});

impl RegistryHub {
	/// Creates an empty, isolated hub.
	pub fn new() -> Self {
		Self {
			buckets: RwLock::new(FxHashMap::default()),
			instances: Mutex::new(FxHashMap::default()),
		}
	}

	/// Returns the process-wide hub.
	///
	/// Created on first use; creation collects every registration linked into
	/// the current image, so it is usable before any application setup.
	pub fn global() -> &'static RegistryHub {
		&GLOBAL
	}

	/// Appends a creator to `base_key`'s bucket and publishes the new snapshot.
	///
	/// Never fails. Duplicate `type_key`s within a family are kept.
	pub fn add(&self, base_key: &str, type_key: &str, creator: ErasedCreator) {
		let mut buckets = self.buckets.write();
		let bucket = buckets.entry(Box::from(base_key)).or_insert_with(|| Bucket {
			published: ArcSwap::from_pointee(Published {
				version: 0,
				entries: Box::new([]),
			}),
		});

		let old = bucket.published.load();
		let mut entries = Vec::with_capacity(old.entries.len() + 1);
		entries.extend(old.entries.iter().cloned());
		entries.push(RawEntry {
			type_key: Arc::from(type_key),
			creator,
		});
		let version = old.version + 1;
		drop(old);

		bucket.published.store(Arc::new(Published {
			version,
			entries: entries.into_boxed_slice(),
		}));
		trace!(base_key, type_key, version, "registered creator");
	}

	/// Returns the current entries of `base_key`; empty for an unknown family.
	pub fn snapshot(&self, base_key: &str) -> Snapshot {
		let buckets = self.buckets.read();
		match buckets.get(base_key) {
			Some(bucket) => Snapshot {
				inner: bucket.published.load_full(),
			},
			None => EMPTY.clone(),
		}
	}

	/// Returns the number of registrations for `base_key`; 0 when unknown.
	pub fn version(&self, base_key: &str) -> u64 {
		let buckets = self.buckets.read();
		buckets
			.get(base_key)
			.map_or(0, |bucket| bucket.published.load().version)
	}

	/// Returns every family key that has a bucket, sorted.
	pub fn families(&self) -> Vec<String> {
		let buckets = self.buckets.read();
		let mut keys: Vec<String> = buckets.keys().map(|k| k.to_string()).collect();
		keys.sort_unstable();
		keys
	}
}

impl Default for RegistryHub {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for RegistryHub {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let buckets = self.buckets.read();
		let mut map = f.debug_map();
		for (key, bucket) in buckets.iter() {
			map.entry(key, &bucket.published.load().version);
		}
		map.finish()
	}
}
