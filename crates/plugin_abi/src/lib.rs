//! Stable boundary between the weft host and dynamically loaded plugins.
//!
//! Plugins implement [`Lifecycle`] and expose it with [`export_plugin!`]. The
//! host reads the embedded [`PluginMetadata`] before running any plugin code,
//! then wraps the returned operation table in a [`host::ForeignLifecycle`].
//! Further interfaces a plugin implements are reached by identifier through
//! [`Lifecycle::query`] and typed with [`InterfacePtr::downcast`].
//!
//! Registry declarations travel across the boundary as a `&RegistryHub`, so a
//! plugin must be built with the same toolchain and `weft-registry` version as
//! the host. Everything else is plain `#[repr(C)]` data.

pub mod ffi;
pub mod guest;
pub mod host;

mod error;
mod interface;
mod lifecycle;
mod metadata;

#[cfg(test)]
mod tests;

pub use error::{CapabilityError, MetadataError};
pub use ffi::{WEFT_LIFECYCLE_IID, WEFT_PLUGIN_ABI_VERSION};
pub use interface::{Interface, InterfacePtr};
pub use lifecycle::Lifecycle;
pub use metadata::PluginMetadata;
