//! Application composition layer.
//!
//! # Responsibility
//! - Own extensions and services and coordinate their lifecycle.
//! - Provide compound event dispatch and ad-hoc per-extension calls.
//!
//! # See also
//! - `extension` for the extension contracts.
//! - `module` for two-phase module registration.

pub mod application;
pub mod ext_call;
pub mod options;

pub use application::{AddTarget, Added, Application, DataEntry, DataKey, STATE_AUTO_START};
pub(crate) use application::WeakApplication;
pub use ext_call::{
    CallArg, CallFn, CallTarget, Dispatched, ExtCallOptions, ExtCallResults, ResultSink,
};
pub use options::{AppOptions, ApplicationBuilder};
