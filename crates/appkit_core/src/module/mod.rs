//! Module registration.
//!
//! Wires loosely typed modules (applications, extension classes, extension
//! instances, callables, property objects) into an application and an
//! id-keyed registry using a prepare-then-commit protocol.

pub mod registry;

pub use registry::{
    Module, ModuleFn, ModuleObject, ModuleRegistry, Registration, UseHook, DEFAULT_TARGET_PATHS,
};
