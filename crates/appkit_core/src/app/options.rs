//! Application construction options.

use crate::app::Application;
use crate::error::{AppResult, HandlerError};
use crate::events::Listener;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::rc::Rc;

const DEFAULT_APP_NAME: &str = "app";

/// Static configuration fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct AppOptions {
    /// Diagnostic label carried by errors and log lines.
    pub name: String,
    /// Seeds the `autoStart` state flag gating ready-triggered start.
    pub auto_start: bool,
    /// `trigger_all` fires on extensions before the application when set.
    pub all_ext_first: bool,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_APP_NAME.to_string(),
            auto_start: true,
            all_ext_first: false,
        }
    }
}

impl AppOptions {
    /// Parses options from JSON. Missing fields take defaults.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Builds an [`Application`], wiring listeners before the first `init`.
#[derive(Default)]
pub struct ApplicationBuilder {
    pub(crate) options: AppOptions,
    pub(crate) listeners: Vec<(String, Listener)>,
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(mut self, options: AppOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options.name = name.into();
        self
    }

    pub fn auto_start(mut self, enabled: bool) -> Self {
        self.options.auto_start = enabled;
        self
    }

    pub fn all_ext_first(mut self, enabled: bool) -> Self {
        self.options.all_ext_first = enabled;
        self
    }

    /// Subscribes `listener` on the application's own bus before `init`
    /// fires during construction.
    pub fn on<F>(mut self, name: &str, listener: F) -> Self
    where
        F: Fn(&[Value]) -> Result<(), HandlerError> + 'static,
    {
        self.listeners.push((name.to_string(), Rc::new(listener)));
        self
    }

    /// Creates the application and runs its first `init`.
    ///
    /// # Errors
    /// - Propagates any `init` listener failure.
    pub fn build(self) -> AppResult<Application> {
        Application::from_builder(self)
    }
}
