//! Named-event publish/subscribe bus.
//!
//! # Responsibility
//! - Provide the `on`/`off`/`trigger`/`emit` capability shared by
//!   applications and extensions.
//!
//! # Invariants
//! - Listeners run in subscription order.
//! - Dispatch iterates a snapshot, so listeners may subscribe or unsubscribe
//!   while an event is in flight without affecting the current dispatch.
//! - The first failing listener aborts the rest of that dispatch.

use crate::error::{AppError, AppResult, HandlerError};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Event fired once per application lifetime on first `init`.
pub const EVENT_INIT: &str = "init";
/// Event fired on every `init` after the first.
pub const EVENT_REINIT: &str = "reinit";
/// Event fired once per application lifetime on first `start`.
pub const EVENT_START: &str = "start";
/// Event fired on every `start` after the first.
pub const EVENT_RESTART: &str = "restart";

/// Listener callback; receives the trigger arguments.
pub type Listener = Rc<dyn Fn(&[Value]) -> Result<(), HandlerError>>;

/// Lifecycle events with a dedicated extension hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Init,
    Reinit,
    Start,
    Restart,
}

impl LifecycleEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => EVENT_INIT,
            Self::Reinit => EVENT_REINIT,
            Self::Start => EVENT_START,
            Self::Restart => EVENT_RESTART,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            EVENT_INIT => Some(Self::Init),
            EVENT_REINIT => Some(Self::Reinit),
            EVENT_START => Some(Self::Start),
            EVENT_RESTART => Some(Self::Restart),
            _ => None,
        }
    }
}

/// Token returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct EventBus {
    listeners: RefCell<BTreeMap<String, Vec<(ListenerId, Listener)>>>,
    next_id: Cell<u64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `listener` to `name`.
    pub fn on<F>(&self, name: &str, listener: F) -> ListenerId
    where
        F: Fn(&[Value]) -> Result<(), HandlerError> + 'static,
    {
        self.subscribe(name, Rc::new(listener))
    }

    /// Subscribes an already shared listener.
    pub fn subscribe(&self, name: &str, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    /// Removes one subscription. Returns `false` when it was not present.
    pub fn off(&self, name: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let Some(entries) = listeners.get_mut(name) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(name);
        }
        removed
    }

    /// Runs every listener of `name` with `args`.
    ///
    /// # Errors
    /// - Returns [`AppError::Handler`] with the first listener failure.
    pub fn trigger(&self, name: &str, args: &[Value]) -> AppResult<&Self> {
        let snapshot = self
            .listeners
            .borrow()
            .get(name)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(_, listener)| Rc::clone(listener))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        for listener in snapshot {
            listener(args).map_err(|source| AppError::handler(name, source))?;
        }
        Ok(self)
    }

    /// Alias of [`EventBus::trigger`].
    pub fn emit(&self, name: &str, args: &[Value]) -> AppResult<&Self> {
        self.trigger(name, args)
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.borrow().get(name).map_or(0, Vec::len)
    }
}

impl Debug for EventBus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let counts = self
            .listeners
            .borrow()
            .iter()
            .map(|(name, entries)| (name.clone(), entries.len()))
            .collect::<BTreeMap<_, _>>();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}
