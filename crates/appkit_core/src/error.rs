//! Error taxonomy for application, extension and module APIs.
//!
//! # Responsibility
//! - Carry enough context (offending value, owning app, event name) to
//!   diagnose a failed call from its error alone.
//! - Keep handler faults distinct from argument/state faults.
//!
//! # Invariants
//! - Handler faults are propagated as-is; the core never retries or masks them.
//! - Duplicate extension ids are not errors; they are logged by the app.

use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

pub type AppResult<T> = Result<T, AppError>;

/// Failure reported by an event listener, lifecycle hook or ad-hoc callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for HandlerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for HandlerError {}

/// Lets hooks call back into the app with `?`.
impl From<AppError> for HandlerError {
    fn from(err: AppError) -> Self {
        Self::new(err.to_string())
    }
}

/// Application-level errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Wrong shape or type passed to `add`, `ext_call` or a registration setter.
    InvalidArgument { value: String, app: String },
    /// Two modules resolved to the same registry id.
    DuplicateModuleId(String),
    /// Owner-dependent state read on an extension that has no live owner.
    MissingOwner { extension: String },
    /// A listener, hook or callable failed while handling `event`.
    Handler { event: String, source: HandlerError },
}

impl AppError {
    pub(crate) fn invalid_argument(value: &dyn Debug, app: &str) -> Self {
        Self::InvalidArgument {
            value: format!("{value:?}"),
            app: app.to_string(),
        }
    }

    pub(crate) fn handler(event: &str, source: HandlerError) -> Self {
        Self::Handler {
            event: event.to_string(),
            source,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument { value, app } => {
                write!(f, "invalid argument for app `{app}`: {value}")
            }
            Self::DuplicateModuleId(id) => write!(f, "module id already registered: {id}"),
            Self::MissingOwner { extension } => {
                write!(f, "extension `{extension}` has no owning application")
            }
            Self::Handler { event, source } => write!(f, "handler for `{event}` failed: {source}"),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Handler { source, .. } => Some(source),
            _ => None,
        }
    }
}
