//! Service contracts and the default webservice implementation.
//!
//! # Responsibility
//! - Define what the application needs from a service: a stable id.
//! - Define what it needs from a builder: an id, a synchronous build and a
//!   "built" notification.
//!
//! # Invariants
//! - `WebserviceBuilder::build` constructs at most one service instance.
//! - "Built" callbacks run until one full round succeeds; a failed round is
//!   retried by the next `build`, a successful one is never repeated.

use crate::error::HandlerError;
use log::{debug, warn};
use once_cell::unsync::OnceCell;
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Service instance stored by an application under its id.
pub trait Service: 'static {
    fn service_id(&self) -> &str;
}

/// Shared service reference.
pub type ServiceRef = Rc<dyn Service>;

/// Callback run once a builder has produced its service.
pub type BuiltCallback = Rc<dyn Fn(&ServiceRef) -> Result<(), HandlerError>>;

/// Deferred service construction.
pub trait ServiceBuilder {
    fn service_id(&self) -> &str;

    /// Produces the service and runs the "built" callbacks.
    fn build(&self) -> Result<ServiceRef, HandlerError>;

    /// Registers a callback for the "built" signal.
    fn on_built(&self, callback: BuiltCallback);
}

/// Plain service described by an id and an options map.
#[derive(Debug, Clone, PartialEq)]
pub struct Webservice {
    id: String,
    options: Map<String, Value>,
}

impl Webservice {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_options(id, Map::new())
    }

    pub fn with_options(id: impl Into<String>, options: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            options,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }
}

impl Service for Webservice {
    fn service_id(&self) -> &str {
        &self.id
    }
}

/// Builder that collects options and produces a [`Webservice`] on `build`.
pub struct WebserviceBuilder {
    id: String,
    options: RefCell<Map<String, Value>>,
    built: OnceCell<ServiceRef>,
    notified: Cell<bool>,
    callbacks: RefCell<Vec<BuiltCallback>>,
}

impl WebserviceBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            options: RefCell::new(Map::new()),
            built: OnceCell::new(),
            notified: Cell::new(false),
            callbacks: RefCell::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Sets one option used by the next `build`. Ignored once built.
    pub fn set_option(&self, key: impl Into<String>, value: Value) -> &Self {
        self.options.borrow_mut().insert(key.into(), value);
        self
    }

    pub fn is_built(&self) -> bool {
        self.built.get().is_some()
    }

    /// Whether every "built" callback has run successfully.
    pub fn is_notified(&self) -> bool {
        self.notified.get()
    }
}

impl ServiceBuilder for WebserviceBuilder {
    fn service_id(&self) -> &str {
        &self.id
    }

    fn build(&self) -> Result<ServiceRef, HandlerError> {
        let service = Rc::clone(self.built.get_or_init(|| {
            let options = self.options.borrow().clone();
            debug!(
                "event=service_built module=service status=ok id={}",
                self.id
            );
            let service: ServiceRef = Rc::new(Webservice::with_options(self.id.clone(), options));
            service
        }));
        if self.notified.get() {
            return Ok(service);
        }

        let callbacks = self.callbacks.borrow().clone();
        for callback in callbacks {
            if let Err(err) = callback(&service) {
                warn!(
                    "event=service_notify module=service status=error id={} error={}",
                    self.id, err
                );
                return Err(err);
            }
        }
        self.notified.set(true);
        Ok(service)
    }

    fn on_built(&self, callback: BuiltCallback) {
        self.callbacks.borrow_mut().push(callback);
    }
}

impl Debug for WebserviceBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebserviceBuilder")
            .field("id", &self.id)
            .field("built", &self.is_built())
            .field("notified", &self.is_notified())
            .field("callbacks", &self.callbacks.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{ServiceBuilder, ServiceRef, WebserviceBuilder};
    use crate::error::HandlerError;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn build_applies_options_and_notifies_once() {
        let builder = WebserviceBuilder::new("api");
        builder.set_option("base_url", json!("https://example.test"));
        let notified = Rc::new(Cell::new(0));
        let counter = Rc::clone(&notified);
        builder.on_built(Rc::new(move |service: &ServiceRef| -> Result<(), HandlerError> {
            assert_eq!(service.service_id(), "api");
            counter.set(counter.get() + 1);
            Ok(())
        }));

        let first = builder.build().expect("first build");
        let second = builder.build().expect("second build");
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(notified.get(), 1);
        assert!(builder.is_built());
        assert!(builder.is_notified());
    }

    #[test]
    fn failed_notification_is_retried_by_next_build() {
        let builder = WebserviceBuilder::new("api");
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        builder.on_built(Rc::new(move |_: &ServiceRef| -> Result<(), HandlerError> {
            counter.set(counter.get() + 1);
            if counter.get() == 1 {
                return Err(HandlerError::new("store unavailable"));
            }
            Ok(())
        }));

        let err = builder.build().err().expect("first notification fails");
        assert_eq!(err.message(), "store unavailable");
        assert!(builder.is_built());
        assert!(!builder.is_notified());

        let first = builder.build().expect("retry succeeds");
        let second = builder.build().expect("already notified");
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(hits.get(), 2);
        assert!(builder.is_notified());
    }
}
