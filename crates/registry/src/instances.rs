//! Named process-wide instances.
//!
//! Beside its creator buckets a hub keeps at most one shared object per key.
//! The first [`RegistryHub::instance`] call for a key builds it; every later
//! call, and [`RegistryHub::get_instance`], hands out the same `Arc`.

use std::any::{Any, type_name};
use std::sync::Arc;

use tracing::{trace, warn};

use crate::error::ViewError;
use crate::hub::RegistryHub;
use crate::key::Keyed;

impl RegistryHub {
	/// Returns the instance named `T::key()`, creating it on first use.
	///
	/// `T::default` runs under the hub's instance lock and must not call back
	/// into this hub's instance table.
	pub fn instance<T>(&self) -> Result<Arc<T>, ViewError>
	where
		T: Keyed + Default + Send + Sync,
	{
		let key = T::key();
		let mut instances = self.instances.lock();
		let shared = instances.entry(Box::from(key)).or_insert_with(|| {
			trace!(key, "created named instance");
			Arc::new(T::default()) as Arc<dyn Any + Send + Sync>
		});
		downcast::<T>(key, Arc::clone(shared))
	}

	/// Returns the instance named `T::key()` if one was created.
	pub fn get_instance<T>(&self) -> Option<Arc<T>>
	where
		T: Keyed + Send + Sync,
	{
		let key = T::key();
		let shared = self.instances.lock().get(key).cloned();
		let Some(shared) = shared else {
			warn!(key, "no named instance");
			return None;
		};
		match downcast::<T>(key, shared) {
			Ok(instance) => Some(instance),
			Err(err) => {
				warn!(error = %err, "named instance lookup failed");
				None
			}
		}
	}

	/// Returns true if an instance named `key` exists.
	pub fn has_instance(&self, key: &str) -> bool {
		self.instances.lock().contains_key(key)
	}
}

fn downcast<T: Any + Send + Sync>(
	key: &str,
	shared: Arc<dyn Any + Send + Sync>,
) -> Result<Arc<T>, ViewError> {
	shared.downcast::<T>().map_err(|_| ViewError::InstanceType {
		key: key.to_string(),
		expected: type_name::<T>(),
	})
}
