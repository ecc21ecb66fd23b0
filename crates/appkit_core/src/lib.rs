//! Application scaffold core.
//!
//! An [`Application`] owns pluggable [`Extension`]s and id-keyed services,
//! and fans lifecycle events (`init`, `reinit`, `start`, `restart`) and ad-hoc
//! calls out to them in registration order. Everything here is
//! single-threaded and synchronous.

pub mod app;
pub mod error;
pub mod events;
pub mod extension;
pub mod logging;
pub mod module;
pub mod ready;
pub mod service;

pub use app::{
    AddTarget, Added, AppOptions, Application, ApplicationBuilder, CallArg, CallFn, CallTarget,
    DataEntry, DataKey, Dispatched, ExtCallOptions, ExtCallResults, ResultSink, STATE_AUTO_START,
};
pub use error::{AppError, AppResult, HandlerError};
pub use events::{
    EventBus, LifecycleEvent, Listener, ListenerId, EVENT_INIT, EVENT_REINIT, EVENT_RESTART,
    EVENT_START,
};
pub use extension::{
    derive_base_name, Extension, ExtensionClass, ExtensionFactory, ExtensionHandle, HookResult,
    IdRegistry, Identified, RegisterHook,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig};
pub use module::{Module, ModuleFn, ModuleObject, ModuleRegistry, Registration, UseHook};
pub use ready::{ReadyCallback, ReadyScheduler, ReadySignal};
pub use service::{Service, ServiceBuilder, ServiceRef, Webservice, WebserviceBuilder};

/// Minimal health-check API for smoke tests.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
