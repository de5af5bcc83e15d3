//! Capability registry for independently built modules.
//!
//! Concrete types declare, with [`register!`], that they implement an abstract
//! family such as `dyn Animal`. Declarations are collected at link time and
//! applied to a [`RegistryHub`]: the process-wide hub applies the host image's
//! declarations on first use, and each loaded plugin applies its own through an
//! explicit registration entry point.
//!
//! Consumers read through a [`TypedView`], which enumerates and constructs the
//! registered implementations of one family for one construction-argument tuple.
//!
//! ```ignore
//! trait Animal { fn speak(&self) -> String; }
//! keyed!(dyn Animal => "Animal");
//!
//! #[derive(Default)]
//! struct Cat;
//! impl Animal for Cat { fn speak(&self) -> String { "meow".into() } }
//! keyed!(Cat => "Cat");
//! register!(Cat => dyn Animal);
//!
//! let animals = TypedView::<dyn Animal>::global();
//! let cat = animals.create("Cat", ())?;
//! ```
//!
//! A hub also keeps one shared instance per key, created on first request with
//! [`RegistryHub::instance`] and fetched later with [`RegistryHub::get_instance`].

mod erased;
mod error;
mod hub;
mod instances;
mod key;
mod registrar;
mod view;


#[doc(hidden)]
pub use inventory;

pub use erased::{ErasedCreator, Signature};
pub use error::ViewError;
pub use hub::{RawEntry, RegistryHub, Snapshot};
pub use key::Keyed;
pub use registrar::{Construct, Registration, SelfRegistrar, register_linked};
pub use view::{DuplicatePolicy, Entries, Factory, NarrowFactory, TypedView};
