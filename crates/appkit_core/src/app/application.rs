//! Application: extension/service ownership, lifecycle and registration.
//!
//! # Responsibility
//! - Own the ordered extension list, the id-keyed extension and service maps,
//!   free-form state and the per-key data store.
//! - Fan lifecycle events out to the application and its extensions.
//!
//! # Invariants
//! - `extensions` and `extensions_by_id` hold exactly the same handles, with
//!   no duplicates; registration order is dispatch order.
//! - `inited` and `started` flip false -> true once and are flipped before
//!   any event fires, so reentrant calls take the reinit/restart path.
//! - No `RefCell` borrow is held while user code (hooks, listeners,
//!   callables) runs.

use crate::app::options::{AppOptions, ApplicationBuilder};
use crate::error::{AppError, AppResult, HandlerError};
use crate::events::{
    EventBus, ListenerId, EVENT_INIT, EVENT_REINIT, EVENT_RESTART, EVENT_START,
};
use crate::extension::{Extension, ExtensionClass, ExtensionHandle, IdRegistry, Identified};
use crate::ready::ReadyScheduler;
use crate::service::{ServiceBuilder, ServiceRef, WebserviceBuilder};
use log::{debug, error, info, warn};
use once_cell::unsync::OnceCell;
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};
use uuid::Uuid;

/// State key holding the auto-start flag.
pub const STATE_AUTO_START: &str = "autoStart";

const APP_TYPE_NAME: &str = "Application";

/// Everything [`Application::add`] accepts, resolved once at the call
/// boundary.
pub enum AddTarget {
    /// Existing extension instance; re-owned by this app if needed.
    Extension(ExtensionHandle),
    /// Extension behavior not yet wrapped in a handle.
    Boxed(Box<dyn Extension>),
    /// Extension factory; instantiated with this app and its defaults.
    Class(ExtensionClass),
    /// Service instance stored under its id; last write wins.
    Service(ServiceRef),
    /// Service builder; built synchronously, result stored.
    Builder(Rc<dyn ServiceBuilder>),
    /// Service id; yields a deferred [`WebserviceBuilder`].
    Identifier(String),
    /// Items added one by one, in order.
    Batch(Vec<AddTarget>),
    /// Loosely typed input: strings and arrays are accepted.
    Value(Value),
}

impl Debug for AddTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Extension(handle) => f.debug_tuple("Extension").field(handle).finish(),
            Self::Boxed(behavior) => f.debug_tuple("Boxed").field(&behavior.type_name()).finish(),
            Self::Class(class) => f.debug_tuple("Class").field(class).finish(),
            Self::Service(service) => f.debug_tuple("Service").field(&service.service_id()).finish(),
            Self::Builder(builder) => f.debug_tuple("Builder").field(&builder.service_id()).finish(),
            Self::Identifier(id) => f.debug_tuple("Identifier").field(id).finish(),
            Self::Batch(items) => f.debug_tuple("Batch").field(items).finish(),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

impl From<ExtensionHandle> for AddTarget {
    fn from(handle: ExtensionHandle) -> Self {
        Self::Extension(handle)
    }
}

impl From<ExtensionClass> for AddTarget {
    fn from(class: ExtensionClass) -> Self {
        Self::Class(class)
    }
}

impl From<Box<dyn Extension>> for AddTarget {
    fn from(behavior: Box<dyn Extension>) -> Self {
        Self::Boxed(behavior)
    }
}

impl From<ServiceRef> for AddTarget {
    fn from(service: ServiceRef) -> Self {
        Self::Service(service)
    }
}

impl From<Rc<dyn ServiceBuilder>> for AddTarget {
    fn from(builder: Rc<dyn ServiceBuilder>) -> Self {
        Self::Builder(builder)
    }
}

impl From<&str> for AddTarget {
    fn from(id: &str) -> Self {
        Self::Identifier(id.to_string())
    }
}

impl From<String> for AddTarget {
    fn from(id: String) -> Self {
        Self::Identifier(id)
    }
}

impl From<Value> for AddTarget {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Vec<AddTarget>> for AddTarget {
    fn from(items: Vec<AddTarget>) -> Self {
        Self::Batch(items)
    }
}

/// Result of [`Application::add`].
#[derive(Debug, Clone)]
pub enum Added {
    App(Application),
    /// Only produced when adding a bare service id.
    Builder(Rc<WebserviceBuilder>),
}

impl Added {
    pub fn app(&self) -> Option<&Application> {
        match self {
            Self::App(app) => Some(app),
            Self::Builder(_) => None,
        }
    }

    pub fn into_builder(self) -> Option<Rc<WebserviceBuilder>> {
        match self {
            Self::App(_) => None,
            Self::Builder(builder) => Some(builder),
        }
    }
}

/// Key into the application data store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataKey {
    Identity(Uuid),
    Name(String),
}

impl From<Uuid> for DataKey {
    fn from(identity: Uuid) -> Self {
        Self::Identity(identity)
    }
}

impl From<&Application> for DataKey {
    fn from(app: &Application) -> Self {
        Self::Identity(app.identity())
    }
}

impl From<&ExtensionHandle> for DataKey {
    fn from(handle: &ExtensionHandle) -> Self {
        Self::Identity(handle.identity())
    }
}

impl From<&str> for DataKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for DataKey {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

pub type DataEntry = Rc<RefCell<Map<String, Value>>>;

/// Root composition object. Clones share the same application.
#[derive(Clone)]
pub struct Application {
    inner: Rc<AppInner>,
}

struct AppInner {
    identity: Uuid,
    options: AppOptions,
    events: EventBus,
    extensions: RefCell<Vec<ExtensionHandle>>,
    extensions_by_id: RefCell<BTreeMap<String, ExtensionHandle>>,
    services: RefCell<BTreeMap<String, ServiceRef>>,
    state: RefCell<Map<String, Value>>,
    inited: Cell<bool>,
    started: Cell<bool>,
    id_registry: OnceCell<IdRegistry>,
    data_store: RefCell<HashMap<DataKey, DataEntry>>,
}

/// Non-owning application reference held by extensions and callbacks.
#[derive(Clone)]
pub(crate) struct WeakApplication(Weak<AppInner>);

impl WeakApplication {
    pub(crate) fn upgrade(&self) -> Option<Application> {
        self.0.upgrade().map(|inner| Application { inner })
    }

    pub(crate) fn points_to(&self, app: &Application) -> bool {
        std::ptr::eq(self.0.as_ptr(), Rc::as_ptr(&app.inner))
    }
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Creates an application and runs its first `init`.
    ///
    /// Construction has no side effect outside the application; auto-start
    /// is wired separately by [`Application::attach_to_environment`].
    pub fn new(options: AppOptions) -> AppResult<Self> {
        ApplicationBuilder::new().options(options).build()
    }

    pub(crate) fn from_builder(builder: ApplicationBuilder) -> AppResult<Self> {
        let ApplicationBuilder { options, listeners } = builder;
        let mut state = Map::new();
        state.insert(STATE_AUTO_START.to_string(), Value::Bool(options.auto_start));

        let app = Self {
            inner: Rc::new(AppInner {
                identity: Uuid::new_v4(),
                options,
                events: EventBus::new(),
                extensions: RefCell::new(Vec::new()),
                extensions_by_id: RefCell::new(BTreeMap::new()),
                services: RefCell::new(BTreeMap::new()),
                state: RefCell::new(state),
                inited: Cell::new(false),
                started: Cell::new(false),
                id_registry: OnceCell::new(),
                data_store: RefCell::new(HashMap::new()),
            }),
        };
        for (name, listener) in listeners {
            app.inner.events.subscribe(&name, listener);
        }

        info!(
            "event=app_create module=app status=ok name={} auto_start={} all_ext_first={}",
            app.name(),
            app.inner.options.auto_start,
            app.inner.options.all_ext_first
        );
        app.init(&[])?;
        Ok(app)
    }

    /// Schedules `start` for when `scheduler` reports the host ready.
    ///
    /// Skipped when the `autoStart` state flag is not `true`. Returns whether
    /// a callback was scheduled. A failing deferred `start` is logged.
    pub fn attach_to_environment(&self, scheduler: &dyn ReadyScheduler) -> bool {
        let auto_start = self
            .state_value(STATE_AUTO_START)
            .and_then(|value| value.as_bool())
            .unwrap_or(false);
        if !auto_start {
            info!(
                "event=app_auto_start module=app status=skip name={}",
                self.name()
            );
            return false;
        }

        let weak = self.downgrade();
        scheduler.schedule_once_ready(Box::new(move || {
            let Some(app) = weak.upgrade() else {
                debug!("event=app_auto_start module=app status=skip reason=dropped");
                return;
            };
            if let Err(err) = app.start() {
                error!(
                    "event=app_auto_start module=app status=error name={} error={}",
                    app.name(),
                    err
                );
            }
        }));
        debug!(
            "event=app_auto_start module=app status=scheduled name={}",
            self.name()
        );
        true
    }

    /// Fires `init` on the application the first time; every later call
    /// fires `reinit` on the application and all extensions.
    pub fn init(&self, args: &[Value]) -> AppResult<()> {
        if self.inner.inited.replace(true) {
            debug!("event=app_reinit module=app status=start name={}", self.name());
            self.trigger_all(EVENT_REINIT, args)?;
            return Ok(());
        }
        debug!("event=app_init module=app status=start name={}", self.name());
        self.inner.events.trigger(EVENT_INIT, args)?;
        Ok(())
    }

    /// Fires `start` on the application and all extensions the first time;
    /// every later call fires `restart`.
    pub fn start(&self) -> AppResult<()> {
        if self.inner.started.replace(true) {
            debug!("event=app_restart module=app status=start name={}", self.name());
            self.trigger_all(EVENT_RESTART, &[])?;
            return Ok(());
        }
        info!("event=app_start module=app status=start name={}", self.name());
        self.trigger_all(EVENT_START, &[])?;
        Ok(())
    }

    pub fn is_inited(&self) -> bool {
        self.inner.inited.get()
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.get()
    }

    /// Compound dispatch using the ordering fixed by `allExtFirst`.
    pub fn trigger_all(&self, name: &str, args: &[Value]) -> AppResult<&Self> {
        if self.inner.options.all_ext_first {
            self.trigger_ext_this(name, args)
        } else {
            self.trigger_this_ext(name, args)
        }
    }

    /// Fires on the application, then on each extension in registration order.
    ///
    /// The extension list is captured before the application's listeners run;
    /// an extension they add is brought up by `add` and not visited again.
    pub fn trigger_this_ext(&self, name: &str, args: &[Value]) -> AppResult<&Self> {
        let extensions = self.extensions();
        self.inner.events.trigger(name, args)?;
        for extension in extensions {
            extension.trigger(name, args)?;
        }
        Ok(self)
    }

    /// Fires on each extension in registration order, then on the application.
    pub fn trigger_ext_this(&self, name: &str, args: &[Value]) -> AppResult<&Self> {
        for extension in self.extensions() {
            extension.trigger(name, args)?;
        }
        self.inner.events.trigger(name, args)?;
        Ok(self)
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn on<F>(&self, name: &str, listener: F) -> ListenerId
    where
        F: Fn(&[Value]) -> Result<(), HandlerError> + 'static,
    {
        self.inner.events.on(name, listener)
    }

    pub fn off(&self, name: &str, id: ListenerId) -> bool {
        self.inner.events.off(name, id)
    }

    /// Fires `name` on the application only.
    pub fn trigger(&self, name: &str, args: &[Value]) -> AppResult<&Self> {
        self.inner.events.trigger(name, args)?;
        Ok(self)
    }

    /// Alias of [`Application::trigger`].
    pub fn emit(&self, name: &str, args: &[Value]) -> AppResult<&Self> {
        self.trigger(name, args)
    }

    /// Registers an extension, class, service, builder, service id or batch.
    ///
    /// Returns the application, except for a bare service id which returns
    /// the deferred builder created for it.
    ///
    /// # Errors
    /// - [`AppError::InvalidArgument`] for values of an unsupported shape.
    ///   Inside a batch this aborts the remaining items.
    /// - Propagates hook, listener and builder failures.
    pub fn add(&self, target: impl Into<AddTarget>) -> AppResult<Added> {
        match target.into() {
            AddTarget::Batch(items) => {
                for item in items {
                    self.add(item)?;
                }
                Ok(Added::App(self.clone()))
            }
            AddTarget::Class(class) => {
                let handle = class.instantiate(self, &class.defaults());
                self.add_extension(handle)
            }
            AddTarget::Extension(handle) => self.add_extension(handle),
            AddTarget::Boxed(behavior) => self.add_extension(ExtensionHandle::from_boxed(behavior)),
            AddTarget::Service(service) => {
                self.store_service(service);
                Ok(Added::App(self.clone()))
            }
            AddTarget::Builder(builder) => {
                let service = builder
                    .build()
                    .map_err(|source| AppError::handler(builder.service_id(), source))?;
                self.store_service(service);
                Ok(Added::App(self.clone()))
            }
            AddTarget::Identifier(id) => self.add_service_id(id),
            AddTarget::Value(Value::String(id)) => self.add_service_id(id),
            AddTarget::Value(Value::Array(items)) => self.add(AddTarget::Batch(
                items.into_iter().map(AddTarget::Value).collect(),
            )),
            AddTarget::Value(other) => Err(self.invalid_argument(&other)),
        }
    }

    fn add_extension(&self, handle: ExtensionHandle) -> AppResult<Added> {
        if !handle.is_owned_by(self) {
            handle.set_app(self);
        }
        let id = handle.id()?;

        let existing = self.inner.extensions_by_id.borrow().get(&id).cloned();
        match existing {
            Some(existing) if existing.ptr_eq(&handle) => {
                debug!("event=extension_add module=app status=skip reason=already_added id={id}");
                return Ok(Added::App(self.clone()));
            }
            Some(_) => {
                // First registrant keeps the id; the newcomer is dropped.
                warn!(
                    "event=extension_add module=app status=duplicate app={} id={} type={}",
                    self.name(),
                    id,
                    handle.type_name()
                );
                return Ok(Added::App(self.clone()));
            }
            None => {}
        }

        self.inner
            .extensions_by_id
            .borrow_mut()
            .insert(id.clone(), handle.clone());
        self.inner.extensions.borrow_mut().push(handle.clone());
        info!(
            "event=extension_add module=app status=ok app={} id={} type={}",
            self.name(),
            id,
            handle.type_name()
        );

        if self.is_inited() {
            handle.trigger(EVENT_INIT, &[])?;
        }
        if self.is_started() {
            handle.trigger(EVENT_START, &[])?;
        }
        Ok(Added::App(self.clone()))
    }

    fn add_service_id(&self, id: String) -> AppResult<Added> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(self.invalid_argument(&id));
        }

        let builder = Rc::new(WebserviceBuilder::new(trimmed));
        let weak = self.downgrade();
        builder.on_built(Rc::new(
            move |service: &ServiceRef| -> Result<(), HandlerError> {
                if let Some(app) = weak.upgrade() {
                    app.add(AddTarget::Service(Rc::clone(service)))?;
                }
                Ok(())
            },
        ));
        debug!("event=service_builder_create module=app status=ok id={trimmed}");
        Ok(Added::Builder(builder))
    }

    fn store_service(&self, service: ServiceRef) {
        let id = service.service_id().to_string();
        let replaced = self
            .inner
            .services
            .borrow_mut()
            .insert(id.clone(), service)
            .is_some();
        debug!("event=service_add module=app status=ok id={id} replaced={replaced}");
    }

    /// Detached snapshot of the extensions in registration order.
    pub fn extensions(&self) -> Vec<ExtensionHandle> {
        self.inner.extensions.borrow().clone()
    }

    pub fn extension(&self, id: &str) -> Option<ExtensionHandle> {
        self.inner.extensions_by_id.borrow().get(id).cloned()
    }

    pub fn has_extension(&self, id: &str) -> bool {
        self.inner.extensions_by_id.borrow().contains_key(id)
    }

    /// Extension ids in registration order.
    pub fn extension_ids(&self) -> Vec<String> {
        self.extensions()
            .iter()
            .filter_map(|handle| handle.cached_id().map(str::to_string))
            .collect()
    }

    pub fn service(&self, id: &str) -> Option<ServiceRef> {
        self.inner.services.borrow().get(id).cloned()
    }

    pub fn service_ids(&self) -> Vec<String> {
        self.inner.services.borrow().keys().cloned().collect()
    }

    pub fn state_value(&self, key: &str) -> Option<Value> {
        self.inner.state.borrow().get(key).cloned()
    }

    /// Sets one state entry, returning the previous value.
    pub fn set_state(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.inner.state.borrow_mut().insert(key.into(), value)
    }

    pub fn state_snapshot(&self) -> Map<String, Value> {
        self.inner.state.borrow().clone()
    }

    /// Returns the side-table entry for `key`, creating it on first access.
    pub fn data(&self, key: impl Into<DataKey>) -> DataEntry {
        let mut store = self.inner.data_store.borrow_mut();
        Rc::clone(store.entry(key.into()).or_default())
    }

    /// Lazily created id registry shared by all extensions of this app.
    pub fn id_registry(&self) -> &IdRegistry {
        self.inner.id_registry.get_or_init(IdRegistry::new)
    }

    pub fn name(&self) -> &str {
        &self.inner.options.name
    }

    pub fn options(&self) -> &AppOptions {
        &self.inner.options
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakApplication {
        WeakApplication(Rc::downgrade(&self.inner))
    }

    pub(crate) fn invalid_argument(&self, value: &dyn Debug) -> AppError {
        AppError::invalid_argument(value, self.name())
    }
}

impl Identified for Application {
    fn identity(&self) -> Uuid {
        self.inner.identity
    }

    fn type_name(&self) -> &str {
        APP_TYPE_NAME
    }
}

impl Debug for Application {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.name())
            .field("inited", &self.is_inited())
            .field("started", &self.is_started())
            .field("extensions", &self.inner.extensions.borrow().len())
            .field("services", &self.inner.services.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Added, AddTarget, Application, DataKey, STATE_AUTO_START};
    use crate::app::AppOptions;
    use crate::error::AppError;
    use serde_json::{json, Value};
    use std::rc::Rc;

    fn app() -> Application {
        Application::new(AppOptions::default()).expect("app should build")
    }

    #[test]
    fn construction_inits_but_does_not_start() {
        let app = app();
        assert!(app.is_inited());
        assert!(!app.is_started());
        assert_eq!(app.state_value(STATE_AUTO_START), Some(Value::Bool(true)));
    }

    #[test]
    fn data_entries_are_stable_per_key() {
        let app = app();
        let first = app.data(&app);
        first.borrow_mut().insert("hits".to_string(), json!(1));
        let second = app.data(DataKey::from(&app));
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(second.borrow().get("hits"), Some(&json!(1)));
        assert!(!Rc::ptr_eq(&first, &app.data("other")));
    }

    #[test]
    fn rejects_non_string_values() {
        let app = app();
        let err = app.add(json!({"id": 1})).expect_err("objects are not add targets");
        match err {
            AppError::InvalidArgument { value, app } => {
                assert!(value.contains("id"));
                assert_eq!(app, "app");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn blank_service_id_is_invalid() {
        let app = app();
        let err = app.add("   ").expect_err("blank id must fail");
        assert!(matches!(err, AppError::InvalidArgument { .. }));
    }

    #[test]
    fn value_array_is_added_as_batch() {
        let app = app();
        let added = app
            .add(AddTarget::Value(json!(["api", "auth"])))
            .expect("batch should add");
        assert!(matches!(added, Added::App(_)));
    }
}
