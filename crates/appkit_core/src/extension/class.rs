//! Extension factories ("classes") that an application can instantiate.

use crate::app::Application;
use crate::error::AppResult;
use crate::extension::handle::{Extension, ExtensionHandle};
use crate::extension::id_registry::{short_type_name, Identified};
use crate::module::UseHook;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use uuid::Uuid;

/// Builds one extension for an application from an options map.
pub type ExtensionFactory = Rc<dyn Fn(&Application, &Map<String, Value>) -> Box<dyn Extension>>;

/// Replaces the plain `add` when a class is committed through the module
/// registry.
pub type RegisterHook = Rc<dyn Fn(&Application, ExtensionHandle) -> AppResult<()>>;

/// Factory reference for one extension type.
#[derive(Clone)]
pub struct ExtensionClass {
    identity: Uuid,
    name: String,
    factory: ExtensionFactory,
    declared_id: Option<String>,
    register_hook: Option<RegisterHook>,
    use_hook: Option<UseHook>,
    defaults: Rc<RefCell<Map<String, Value>>>,
}

impl ExtensionClass {
    pub fn new<F, E>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Application, &Map<String, Value>) -> E + 'static,
        E: Extension,
    {
        let boxed: ExtensionFactory = Rc::new(
            move |app: &Application, options: &Map<String, Value>| -> Box<dyn Extension> {
                Box::new(factory(app, options))
            },
        );
        Self {
            identity: Uuid::new_v4(),
            name: name.into(),
            factory: boxed,
            declared_id: None,
            register_hook: None,
            use_hook: None,
            defaults: Rc::new(RefCell::new(Map::new())),
        }
    }

    /// Class for a `Default`-constructible extension, named after its type.
    pub fn of<E: Extension + Default>() -> Self {
        Self::new(short_type_name(std::any::type_name::<E>()), |_, _| {
            E::default()
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.declared_id = Some(id.into());
        self
    }

    pub fn with_register_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Application, ExtensionHandle) -> AppResult<()> + 'static,
    {
        self.register_hook = Some(Rc::new(hook));
        self
    }

    pub fn with_use_hook(mut self, hook: UseHook) -> Self {
        self.use_hook = Some(hook);
        self
    }

    pub fn with_default(self, key: impl Into<String>, value: Value) -> Self {
        self.defaults.borrow_mut().insert(key.into(), value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_id(&self) -> Option<&str> {
        self.declared_id.as_deref()
    }

    pub fn register_hook(&self) -> Option<&RegisterHook> {
        self.register_hook.as_ref()
    }

    pub fn use_hook(&self) -> Option<&UseHook> {
        self.use_hook.as_ref()
    }

    pub fn defaults(&self) -> Map<String, Value> {
        self.defaults.borrow().clone()
    }

    pub fn set_defaults(&self, defaults: Map<String, Value>) {
        *self.defaults.borrow_mut() = defaults;
    }

    /// Creates a fresh instance owned by `app`. The caller adds it.
    pub fn instantiate(&self, app: &Application, options: &Map<String, Value>) -> ExtensionHandle {
        let handle = ExtensionHandle::from_boxed((self.factory)(app, options));
        handle.set_app(app);
        handle
    }
}

impl Identified for ExtensionClass {
    fn identity(&self) -> Uuid {
        self.identity
    }

    fn type_name(&self) -> &str {
        &self.name
    }
}

impl Debug for ExtensionClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionClass")
            .field("name", &self.name)
            .field("declared_id", &self.declared_id)
            .finish()
    }
}
