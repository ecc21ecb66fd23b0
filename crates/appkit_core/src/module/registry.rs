//! Two-phase module registration.
//!
//! # Responsibility
//! - Capture a loosely typed module (`for_module`), let callers configure the
//!   registration, then commit it (`use_id`) into an application and into an
//!   id -> module registry.
//!
//! # Invariants
//! - No two committed modules share an id.
//! - The registry remembers the most recent application passed through
//!   `for_module` and hands it to later registrations.
//! - No registry borrow is held while module hooks run.

use crate::app::{AddTarget, Application};
use crate::error::{AppError, AppResult};
use crate::extension::{ExtensionClass, ExtensionHandle, Identified};
use log::info;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use uuid::Uuid;

/// Property paths tried, in order, for the default `set` target.
pub const DEFAULT_TARGET_PATHS: &[&str] = &["module.defaults", "module.options", "options"];

/// Root property under which the module's own properties are exposed.
const MODULE_PROPERTY: &str = "module";
/// Created at the root when no default target resolves.
const FALLBACK_TARGET: &str = "options";
const NO_APP: &str = "<none>";

/// Commit hook that takes over registration entirely.
pub type UseHook = Rc<dyn Fn(&Registration<'_>) -> AppResult<()>>;

/// Callable module; invoked with the registration on commit.
#[derive(Clone)]
pub struct ModuleFn {
    identity: Uuid,
    name: String,
    declared_id: Option<String>,
    callable: UseHook,
}

impl ModuleFn {
    pub fn new<F>(name: impl Into<String>, callable: F) -> Self
    where
        F: Fn(&Registration<'_>) -> AppResult<()> + 'static,
    {
        Self {
            identity: Uuid::new_v4(),
            name: name.into(),
            declared_id: None,
            callable: Rc::new(callable),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.declared_id = Some(id.into());
        self
    }
}

impl Identified for ModuleFn {
    fn identity(&self) -> Uuid {
        self.identity
    }

    fn type_name(&self) -> &str {
        &self.name
    }
}

/// Arbitrary object module: a property bag with an optional `use` hook.
#[derive(Clone)]
pub struct ModuleObject {
    identity: Uuid,
    type_name: String,
    declared_id: Option<String>,
    properties: Rc<RefCell<Map<String, Value>>>,
    use_hook: Option<UseHook>,
}

impl ModuleObject {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            identity: Uuid::new_v4(),
            type_name: type_name.into(),
            declared_id: None,
            properties: Rc::new(RefCell::new(Map::new())),
            use_hook: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.declared_id = Some(id.into());
        self
    }

    pub fn with_property(self, key: impl Into<String>, value: Value) -> Self {
        self.properties.borrow_mut().insert(key.into(), value);
        self
    }

    pub fn with_use_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Registration<'_>) -> AppResult<()> + 'static,
    {
        self.use_hook = Some(Rc::new(hook));
        self
    }

    pub fn properties(&self) -> Map<String, Value> {
        self.properties.borrow().clone()
    }

    pub fn property(&self, key: &str) -> Option<Value> {
        self.properties.borrow().get(key).cloned()
    }
}

impl Identified for ModuleObject {
    fn identity(&self) -> Uuid {
        self.identity
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }
}

/// Anything that can be registered as a module.
#[derive(Clone)]
pub enum Module {
    App(Application),
    Class(ExtensionClass),
    Instance(ExtensionHandle),
    Callable(ModuleFn),
    Object(ModuleObject),
}

impl Module {
    pub fn identity(&self) -> Uuid {
        match self {
            Self::App(app) => app.identity(),
            Self::Class(class) => class.identity(),
            Self::Instance(handle) => handle.identity(),
            Self::Callable(callable) => callable.identity(),
            Self::Object(object) => object.identity(),
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Self::App(app) => app.type_name(),
            Self::Class(class) => class.type_name(),
            Self::Instance(handle) => handle.type_name(),
            Self::Callable(callable) => callable.type_name(),
            Self::Object(object) => object.type_name(),
        }
    }

    pub fn declared_id(&self) -> Option<String> {
        match self {
            Self::App(_) => None,
            Self::Class(class) => class.declared_id().map(str::to_string),
            Self::Instance(handle) => handle.behavior().declared_id(),
            Self::Callable(callable) => callable.declared_id.clone(),
            Self::Object(object) => object.declared_id.clone(),
        }
    }

    fn use_hook(&self) -> Option<UseHook> {
        match self {
            Self::Class(class) => class.use_hook().cloned(),
            Self::Object(object) => object.use_hook.clone(),
            _ => None,
        }
    }

    fn properties(&self) -> Map<String, Value> {
        match self {
            Self::Class(class) => {
                let mut properties = Map::new();
                properties.insert("defaults".to_string(), Value::Object(class.defaults()));
                properties
            }
            Self::Object(object) => object.properties(),
            _ => Map::new(),
        }
    }

    fn write_back(&self, properties: &Map<String, Value>) {
        match self {
            Self::Class(class) => {
                if let Some(Value::Object(defaults)) = properties.get("defaults") {
                    class.set_defaults(defaults.clone());
                }
            }
            Self::Object(object) => {
                *object.properties.borrow_mut() = properties.clone();
            }
            _ => {}
        }
    }
}

impl Debug for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::App(_) => "App",
            Self::Class(_) => "Class",
            Self::Instance(_) => "Instance",
            Self::Callable(_) => "Callable",
            Self::Object(_) => "Object",
        };
        f.debug_struct("Module")
            .field("kind", &kind)
            .field("type", &self.type_name())
            .finish()
    }
}

impl From<Application> for Module {
    fn from(app: Application) -> Self {
        Self::App(app)
    }
}

impl From<ExtensionClass> for Module {
    fn from(class: ExtensionClass) -> Self {
        Self::Class(class)
    }
}

impl From<ExtensionHandle> for Module {
    fn from(handle: ExtensionHandle) -> Self {
        Self::Instance(handle)
    }
}

impl From<ModuleFn> for Module {
    fn from(callable: ModuleFn) -> Self {
        Self::Callable(callable)
    }
}

impl From<ModuleObject> for Module {
    fn from(object: ModuleObject) -> Self {
        Self::Object(object)
    }
}

/// Id -> module registry with a reverse identity -> id map.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: RefCell<BTreeMap<String, Module>>,
    ids: RefCell<HashMap<Uuid, String>>,
    app: RefCell<Option<Application>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose registrations target `app` until another application
    /// passes through `for_module`.
    pub fn with_app(app: &Application) -> Self {
        let registry = Self::new();
        *registry.app.borrow_mut() = Some(app.clone());
        registry
    }

    /// Phase one: captures `module` and returns its registration handle.
    pub fn for_module(&self, module: impl Into<Module>) -> Registration<'_> {
        let module = module.into();
        if let Module::App(app) = &module {
            *self.app.borrow_mut() = Some(app.clone());
        }
        let app = self.app.borrow().clone();

        let mut properties = Map::new();
        properties.insert(
            MODULE_PROPERTY.to_string(),
            Value::Object(module.properties()),
        );
        Registration {
            registry: self,
            module,
            app,
            properties,
        }
    }

    pub fn current_app(&self) -> Option<Application> {
        self.app.borrow().clone()
    }

    pub fn get(&self, id: &str) -> Option<Module> {
        self.modules.borrow().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.modules.borrow().contains_key(id)
    }

    pub fn id_of(&self, module: &Module) -> Option<String> {
        self.ids.borrow().get(&module.identity()).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.modules.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.modules.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.borrow().is_empty()
    }

    fn record(&self, id: String, module: Module) {
        self.ids.borrow_mut().insert(module.identity(), id.clone());
        self.modules.borrow_mut().insert(id, module);
    }
}

impl Debug for ModuleRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("ids", &self.ids())
            .field("app", &self.current_app().map(|app| app.name().to_string()))
            .finish()
    }
}

/// Registration handle between `for_module` and `use_id`.
#[derive(Debug)]
pub struct Registration<'r> {
    registry: &'r ModuleRegistry,
    module: Module,
    app: Option<Application>,
    properties: Map<String, Value>,
}

impl Registration<'_> {
    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn app(&self) -> Option<&Application> {
        self.app.as_ref()
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Reads the value at a dot-separated property path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let (parent, key) = split_path(path);
        object_at(&self.properties, parent)?.get(key)
    }

    /// First of [`DEFAULT_TARGET_PATHS`] that resolves to an object.
    pub fn default_target(&self) -> &'static str {
        DEFAULT_TARGET_PATHS
            .iter()
            .copied()
            .find(|path| object_at(&self.properties, path).is_some())
            .unwrap_or(FALLBACK_TARGET)
    }

    /// Writes `key` into the default target object.
    pub fn set(&mut self, key: &str, value: Value) -> AppResult<&mut Self> {
        let target = self.default_target();
        self.write(target, key, value)
    }

    /// Writes `value` at an explicit dot-separated path, creating missing
    /// intermediate objects.
    ///
    /// # Errors
    /// - [`AppError::InvalidArgument`] for an empty path or when an
    ///   intermediate segment holds a non-object value.
    pub fn set_path(&mut self, path: &str, value: Value) -> AppResult<&mut Self> {
        let (parent, key) = split_path(path);
        if key.is_empty() {
            return Err(self.invalid_argument(&path));
        }
        self.write(parent, key, value)
    }

    /// Runs free-form setup with the registration as its argument.
    pub fn call<F>(&mut self, setup: F) -> AppResult<&mut Self>
    where
        F: FnOnce(&mut Self) -> AppResult<()>,
    {
        setup(self)?;
        Ok(self)
    }

    /// Options resolved from the default target; empty when absent.
    pub fn options(&self) -> Map<String, Value> {
        object_at(&self.properties, self.default_target())
            .cloned()
            .unwrap_or_default()
    }

    /// Phase two: commits the module under `id` or a derived id.
    ///
    /// Without `id`: the module's declared id, else an id minted by the
    /// module's own application, else by the captured application, else the
    /// module's type name.
    ///
    /// # Errors
    /// - [`AppError::DuplicateModuleId`] when the id is taken.
    /// - [`AppError::MissingOwner`] for an extension class with no captured
    ///   application.
    /// - Propagates hook and `add` failures.
    pub fn use_id(self, id: Option<&str>) -> AppResult<String> {
        let id = match id.map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) => value.to_string(),
            None => self.resolve_id(),
        };
        if self.registry.contains(&id) {
            return Err(AppError::DuplicateModuleId(id));
        }

        if let Some(hook) = self.module.use_hook() {
            hook(&self)?;
        } else {
            match &self.module {
                Module::Class(class) => {
                    let app = self.app.clone().ok_or_else(|| AppError::MissingOwner {
                        extension: class.name().to_string(),
                    })?;
                    let handle = class.instantiate(&app, &self.options());
                    match class.register_hook() {
                        Some(register) => register(&app, handle)?,
                        None => {
                            app.add(AddTarget::Extension(handle))?;
                        }
                    }
                }
                Module::Callable(callable) => (callable.callable)(&self)?,
                Module::Instance(handle) => {
                    if let Some(app) = &self.app {
                        app.add(AddTarget::Extension(handle.clone()))?;
                    }
                }
                Module::App(_) | Module::Object(_) => {}
            }
        }

        if let Some(Value::Object(properties)) = self.properties.get(MODULE_PROPERTY) {
            self.module.write_back(properties);
        }
        info!(
            "event=module_use module=module_registry status=ok id={} type={}",
            id,
            self.module.type_name()
        );
        self.registry.record(id.clone(), self.module);
        Ok(id)
    }

    fn resolve_id(&self) -> String {
        if let Some(id) = self.module.declared_id() {
            return id;
        }
        if let Module::App(app) = &self.module {
            return app.id_registry().id(app);
        }
        if let Some(app) = &self.app {
            return app
                .id_registry()
                .id_for(self.module.identity(), self.module.type_name());
        }
        self.module.type_name().to_string()
    }

    fn write(&mut self, parent: &str, key: &str, value: Value) -> AppResult<&mut Self> {
        let Some(target) = object_at_mut(&mut self.properties, parent) else {
            return Err(self.invalid_argument(&parent));
        };
        target.insert(key.to_string(), value);
        Ok(self)
    }

    fn invalid_argument(&self, value: &dyn Debug) -> AppError {
        let app = self.app.as_ref().map_or(NO_APP, Application::name);
        AppError::invalid_argument(value, app)
    }
}

fn split_path(path: &str) -> (&str, &str) {
    path.rsplit_once('.').unwrap_or(("", path))
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|segment| !segment.is_empty())
}

fn object_at<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Map<String, Value>> {
    let mut current = root;
    for segment in segments(path) {
        current = current.get(segment)?.as_object()?;
    }
    Some(current)
}

fn object_at_mut<'a>(
    root: &'a mut Map<String, Value>,
    path: &str,
) -> Option<&'a mut Map<String, Value>> {
    let mut current = root;
    for segment in segments(path) {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = entry.as_object_mut()?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::{object_at, object_at_mut, split_path, ModuleObject, ModuleRegistry};
    use serde_json::{json, Map, Value};

    #[test]
    fn split_path_separates_last_segment() {
        assert_eq!(split_path("module.options.url"), ("module.options", "url"));
        assert_eq!(split_path("url"), ("", "url"));
    }

    #[test]
    fn object_at_mut_creates_missing_objects_but_not_through_primitives() {
        let mut root = Map::new();
        object_at_mut(&mut root, "a.b")
            .expect("missing objects are created")
            .insert("c".to_string(), json!(1));
        assert_eq!(root["a"]["b"]["c"], json!(1));

        root.insert("flat".to_string(), json!(3));
        assert!(object_at_mut(&mut root, "flat.x").is_none());
        assert!(object_at(&root, "flat").is_none());
    }

    #[test]
    fn default_target_falls_back_to_root_options() {
        let registry = ModuleRegistry::new();
        let mut registration = registry.for_module(ModuleObject::new("Plain"));
        assert_eq!(registration.default_target(), "options");
        registration
            .set("debug", Value::Bool(true))
            .expect("fallback target is writable");
        assert_eq!(registration.get("options.debug"), Some(&Value::Bool(true)));
    }

    #[test]
    fn default_target_prefers_module_options() {
        let registry = ModuleRegistry::new();
        let module = ModuleObject::new("Widget").with_property("options", json!({}));
        let mut registration = registry.for_module(module);
        assert_eq!(registration.default_target(), "module.options");
        registration
            .set("size", json!(3))
            .expect("module options are writable");
        assert_eq!(registration.options().get("size"), Some(&json!(3)));
    }
}
