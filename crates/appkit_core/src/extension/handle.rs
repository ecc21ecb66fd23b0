//! Extension behavior contract and shared extension handle.
//!
//! # Responsibility
//! - Define the hooks a concrete extension may implement.
//! - Carry the base state every extension has: identity, owner, id, events.
//!
//! # Invariants
//! - Owner is held weakly; the application owns its extensions, not the
//!   other way around.
//! - Once computed, an extension id never changes, even if the owner does.
//! - A lifecycle hook runs before the extension's own event listeners.

use crate::app::{Application, WeakApplication};
use crate::error::{AppError, AppResult, HandlerError};
use crate::events::{EventBus, LifecycleEvent, ListenerId};
use crate::extension::id_registry::{short_type_name, Identified};
use once_cell::unsync::OnceCell;
use serde_json::Value;
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use uuid::Uuid;

pub type HookResult = Result<(), HandlerError>;

/// Behavior of one extension.
///
/// Every hook defaults to a no-op, so an extension implements only the
/// events it cares about.
pub trait Extension: 'static {
    /// Type name used to derive the extension id.
    fn type_name(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Fixed id; bypasses the application's id registry when set.
    fn declared_id(&self) -> Option<String> {
        None
    }

    fn on_init(&self, _ext: &ExtensionHandle, _args: &[Value]) -> HookResult {
        Ok(())
    }

    fn on_reinit(&self, _ext: &ExtensionHandle, _args: &[Value]) -> HookResult {
        Ok(())
    }

    fn on_start(&self, _ext: &ExtensionHandle, _args: &[Value]) -> HookResult {
        Ok(())
    }

    fn on_restart(&self, _ext: &ExtensionHandle, _args: &[Value]) -> HookResult {
        Ok(())
    }

    /// Named-method table used by `Application::ext_call`.
    ///
    /// Returns `None` when this extension has no method called `name`.
    fn call_method(
        &self,
        _name: &str,
        _ext: &ExtensionHandle,
        _args: &[Value],
    ) -> Option<Result<Value, HandlerError>> {
        None
    }
}

/// Shared handle to one extension instance.
///
/// Clones point at the same instance; identity comparisons use
/// [`ExtensionHandle::ptr_eq`] or [`Identified::identity`].
#[derive(Clone)]
pub struct ExtensionHandle {
    inner: Rc<ExtensionInner>,
}

struct ExtensionInner {
    identity: Uuid,
    behavior: Box<dyn Extension>,
    owner: RefCell<Option<WeakApplication>>,
    id: OnceCell<String>,
    events: EventBus,
}

impl ExtensionHandle {
    /// Wraps `extension` without an owner.
    pub fn new(extension: impl Extension) -> Self {
        Self::from_boxed(Box::new(extension))
    }

    pub fn from_boxed(behavior: Box<dyn Extension>) -> Self {
        Self {
            inner: Rc::new(ExtensionInner {
                identity: Uuid::new_v4(),
                behavior,
                owner: RefCell::new(None),
                id: OnceCell::new(),
                events: EventBus::new(),
            }),
        }
    }

    /// Wraps `extension` with `app` as owner. The app still has to `add` it.
    pub fn with_app(extension: impl Extension, app: &Application) -> Self {
        let handle = Self::new(extension);
        handle.set_app(app);
        handle
    }

    pub fn behavior(&self) -> &dyn Extension {
        self.inner.behavior.as_ref()
    }

    /// Returns the owning application.
    ///
    /// # Errors
    /// - [`AppError::MissingOwner`] when no owner was set or it was dropped.
    pub fn app(&self) -> AppResult<Application> {
        self.inner
            .owner
            .borrow()
            .as_ref()
            .and_then(WeakApplication::upgrade)
            .ok_or_else(|| AppError::MissingOwner {
                extension: self.type_name().to_string(),
            })
    }

    pub fn has_app(&self) -> bool {
        self.app().is_ok()
    }

    pub fn is_owned_by(&self, app: &Application) -> bool {
        self.inner
            .owner
            .borrow()
            .as_ref()
            .is_some_and(|owner| owner.points_to(app))
    }

    /// Points the extension at `app`. Registration is a separate step.
    pub fn set_app(&self, app: &Application) {
        *self.inner.owner.borrow_mut() = Some(app.downgrade());
    }

    /// Returns the extension id, resolving it on first read.
    ///
    /// A declared id wins; otherwise the owner's id registry mints one.
    /// A resolved id stays readable after the owner is dropped.
    ///
    /// # Errors
    /// - [`AppError::MissingOwner`] when first read without a live owner.
    pub fn id(&self) -> AppResult<String> {
        if let Some(id) = self.inner.id.get() {
            return Ok(id.clone());
        }
        let app = self.app()?;
        let id = self
            .inner
            .id
            .get_or_init(|| match self.inner.behavior.declared_id() {
                Some(id) => id,
                None => app.id_registry().id(self),
            });
        Ok(id.clone())
    }

    /// Returns the id if it was already resolved.
    pub fn cached_id(&self) -> Option<&str> {
        self.inner.id.get().map(String::as_str)
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

    /// Fires `name` on this extension: the matching lifecycle hook, then
    /// the extension's own listeners.
    pub fn trigger(&self, name: &str, args: &[Value]) -> AppResult<&Self> {
        if let Some(event) = LifecycleEvent::parse(name) {
            let behavior = self.inner.behavior.as_ref();
            let hooked = match event {
                LifecycleEvent::Init => behavior.on_init(self, args),
                LifecycleEvent::Reinit => behavior.on_reinit(self, args),
                LifecycleEvent::Start => behavior.on_start(self, args),
                LifecycleEvent::Restart => behavior.on_restart(self, args),
            };
            hooked.map_err(|source| AppError::handler(name, source))?;
        }
        self.inner.events.trigger(name, args)?;
        Ok(self)
    }

    /// Alias of [`ExtensionHandle::trigger`].
    pub fn emit(&self, name: &str, args: &[Value]) -> AppResult<&Self> {
        self.trigger(name, args)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Identified for ExtensionHandle {
    fn identity(&self) -> Uuid {
        self.inner.identity
    }

    fn type_name(&self) -> &str {
        self.inner.behavior.type_name()
    }
}

impl Debug for ExtensionHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionHandle")
            .field("type", &self.type_name())
            .field("id", &self.cached_id())
            .field("identity", &self.inner.identity)
            .finish()
    }
}

impl<E: Extension> From<E> for ExtensionHandle {
    fn from(extension: E) -> Self {
        Self::new(extension)
    }
}
