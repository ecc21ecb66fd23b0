//! Extension contracts.
//!
//! This module defines the extension behavior trait, the shared handle that
//! carries per-instance base state, extension factories, and the id registry
//! used to name extensions.

pub mod class;
pub mod handle;
pub mod id_registry;

pub use class::{ExtensionClass, ExtensionFactory, RegisterHook};
pub use handle::{Extension, ExtensionHandle, HookResult};
pub use id_registry::{derive_base_name, short_type_name, IdRegistry, Identified};
