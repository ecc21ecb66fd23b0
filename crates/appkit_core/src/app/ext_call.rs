//! Ad-hoc per-extension dispatch (`ext_call`).
//!
//! # Responsibility
//! - Normalize the accepted call shapes into one target plus arguments.
//! - Invoke the target on every extension in registration order, optionally
//!   collecting each return value.
//!
//! # Invariants
//! - The call target is validated before any extension is visited.
//! - A named method missing on an extension is skipped and records `null`.
//! - The first failing call aborts the remaining extensions.

use crate::app::Application;
use crate::error::{AppError, AppResult, HandlerError};
use crate::extension::{ExtensionHandle, Identified};
use log::trace;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use uuid::Uuid;

/// Callable invoked with the extension followed by the call arguments.
pub type CallFn = Rc<dyn Fn(&ExtensionHandle, &[Value]) -> Result<Value, HandlerError>>;

/// What to run against each extension.
#[derive(Clone)]
pub enum CallTarget {
    /// Named method resolved through `Extension::call_method`.
    Method(String),
    Function(CallFn),
}

impl CallTarget {
    pub fn method(name: impl Into<String>) -> Self {
        Self::Method(name.into())
    }

    pub fn function<F>(callable: F) -> Self
    where
        F: Fn(&ExtensionHandle, &[Value]) -> Result<Value, HandlerError> + 'static,
    {
        Self::Function(Rc::new(callable))
    }

    fn label(&self) -> &str {
        match self {
            Self::Method(name) => name,
            Self::Function(_) => "<function>",
        }
    }
}

impl Debug for CallTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Method(name) => f.debug_tuple("Method").field(name).finish(),
            Self::Function(_) => f.write_str("Function(<function>)"),
        }
    }
}

/// Where per-extension return values go.
#[derive(Debug, Clone)]
pub enum ResultSink {
    /// Create a fresh result map and return it.
    Create,
    /// Write into a caller-supplied map, which is also returned.
    Into(ExtCallResults),
}

/// Options-object call form (`{ rv, fn }`).
#[derive(Debug, Clone, Default)]
pub struct ExtCallOptions {
    pub rv: Option<ResultSink>,
    /// When set, every positional argument is a call argument.
    pub target: Option<CallTarget>,
}

/// One positional `ext_call` argument.
#[derive(Clone)]
pub enum CallArg {
    Value(Value),
    Function(CallFn),
    Sink(ResultSink),
    Options(ExtCallOptions),
}

impl CallArg {
    pub fn function<F>(callable: F) -> Self
    where
        F: Fn(&ExtensionHandle, &[Value]) -> Result<Value, HandlerError> + 'static,
    {
        Self::Function(Rc::new(callable))
    }
}

impl Debug for CallArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Function(_) => f.write_str("Function(<function>)"),
            Self::Sink(sink) => f.debug_tuple("Sink").field(sink).finish(),
            Self::Options(options) => f.debug_tuple("Options").field(options).finish(),
        }
    }
}

impl From<Value> for CallArg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for CallArg {
    fn from(value: &str) -> Self {
        Self::Value(Value::String(value.to_string()))
    }
}

impl From<ResultSink> for CallArg {
    fn from(sink: ResultSink) -> Self {
        Self::Sink(sink)
    }
}

impl From<ExtCallOptions> for CallArg {
    fn from(options: ExtCallOptions) -> Self {
        Self::Options(options)
    }
}

impl From<CallTarget> for CallArg {
    fn from(target: CallTarget) -> Self {
        match target {
            CallTarget::Method(name) => Self::Value(Value::String(name)),
            CallTarget::Function(callable) => Self::Function(callable),
        }
    }
}

/// Return values keyed by extension identity. Clones share storage.
#[derive(Clone, Default)]
pub struct ExtCallResults {
    entries: Rc<RefCell<HashMap<Uuid, (ExtensionHandle, Value)>>>,
}

impl ExtCallResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, extension: &ExtensionHandle) -> Option<Value> {
        self.entries
            .borrow()
            .get(&extension.identity())
            .map(|(_, value)| value.clone())
    }

    pub fn contains(&self, extension: &ExtensionHandle) -> bool {
        self.entries.borrow().contains_key(&extension.identity())
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Extensions with a recorded value, in no particular order.
    pub fn extensions(&self) -> Vec<ExtensionHandle> {
        self.entries
            .borrow()
            .values()
            .map(|(handle, _)| handle.clone())
            .collect()
    }

    pub fn insert(&self, extension: &ExtensionHandle, value: Value) -> Option<Value> {
        self.entries
            .borrow_mut()
            .insert(extension.identity(), (extension.clone(), value))
            .map(|(_, previous)| previous)
    }
}

impl Debug for ExtCallResults {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtCallResults")
            .field("len", &self.len())
            .finish()
    }
}

/// Return of [`Application::ext_call`]: the app, or the requested results.
#[derive(Debug, Clone)]
pub enum Dispatched {
    App(Application),
    Results(ExtCallResults),
}

impl Dispatched {
    pub fn into_results(self) -> Option<ExtCallResults> {
        match self {
            Self::App(_) => None,
            Self::Results(results) => Some(results),
        }
    }
}

struct ResolvedCall {
    sink: Option<ResultSink>,
    target: CallTarget,
    args: Vec<Value>,
}

impl Application {
    /// Runs a callable or named method against every extension.
    ///
    /// Accepted shapes:
    /// - `[target, args..]`
    /// - `[Sink(..), target, args..]`
    /// - `[Options { rv, target: Some(..) }, args..]`
    /// - `[Options { rv, target: None }, target, args..]`
    ///
    /// A string target names a method; a function target receives the
    /// extension and the arguments.
    ///
    /// # Errors
    /// - [`AppError::InvalidArgument`] for a missing or non-callable target,
    ///   or a non-value call argument.
    /// - Propagates the first failing call.
    pub fn ext_call(&self, args: Vec<CallArg>) -> AppResult<Dispatched> {
        let ResolvedCall { sink, target, args } = self.resolve_call(args)?;
        let results = match sink {
            Some(ResultSink::Create) => Some(ExtCallResults::new()),
            Some(ResultSink::Into(results)) => Some(results),
            None => None,
        };

        for extension in self.extensions() {
            let value = match &target {
                CallTarget::Method(name) => {
                    match extension.behavior().call_method(name, &extension, &args) {
                        Some(outcome) => {
                            outcome.map_err(|source| AppError::handler(name, source))?
                        }
                        None => {
                            trace!(
                                "event=ext_call module=app status=skip method={} type={}",
                                name,
                                extension.type_name()
                            );
                            Value::Null
                        }
                    }
                }
                CallTarget::Function(callable) => callable(&extension, &args)
                    .map_err(|source| AppError::handler(target.label(), source))?,
            };
            if let Some(results) = &results {
                results.insert(&extension, value);
            }
        }

        Ok(match results {
            Some(results) => Dispatched::Results(results),
            None => Dispatched::App(self.clone()),
        })
    }

    /// Calls method `name` on every extension that defines it.
    pub fn ext_call_method(&self, name: &str, args: &[Value]) -> AppResult<()> {
        let mut call = vec![CallArg::from(name)];
        call.extend(args.iter().cloned().map(CallArg::Value));
        self.ext_call(call)?;
        Ok(())
    }

    /// Runs `target` on every extension and returns the collected values.
    pub fn ext_call_collect(&self, target: CallTarget, args: &[Value]) -> AppResult<ExtCallResults> {
        let mut call = vec![
            CallArg::Options(ExtCallOptions {
                rv: Some(ResultSink::Create),
                target: Some(target),
            }),
        ];
        call.extend(args.iter().cloned().map(CallArg::Value));
        match self.ext_call(call)? {
            Dispatched::Results(results) => Ok(results),
            Dispatched::App(_) => Ok(ExtCallResults::new()),
        }
    }

    fn resolve_call(&self, args: Vec<CallArg>) -> AppResult<ResolvedCall> {
        let mut rest = VecDeque::from(args);
        let mut sink = None;
        let mut target = None;

        match rest.pop_front() {
            Some(CallArg::Options(options)) => {
                sink = options.rv;
                target = options.target;
            }
            Some(CallArg::Sink(requested)) => sink = Some(requested),
            Some(other) => rest.push_front(other),
            None => {}
        }

        let target = match target {
            Some(target) => target,
            None => match rest.pop_front() {
                Some(CallArg::Value(Value::String(name))) => CallTarget::Method(name),
                Some(CallArg::Function(callable)) => CallTarget::Function(callable),
                Some(other) => return Err(self.invalid_argument(&other)),
                None => return Err(self.invalid_argument(&"missing call target")),
            },
        };

        let args = rest
            .into_iter()
            .map(|arg| match arg {
                CallArg::Value(value) => Ok(value),
                other => Err(self.invalid_argument(&other)),
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(ResolvedCall { sink, target, args })
    }
}

#[cfg(test)]
mod tests {
    use super::{CallArg, CallTarget, Dispatched, ExtCallOptions, ResultSink};
    use crate::app::{AppOptions, Application};
    use crate::error::AppError;
    use serde_json::{json, Value};

    fn app() -> Application {
        Application::new(AppOptions::default()).expect("app should build")
    }

    #[test]
    fn rejects_non_callable_target_before_visiting_extensions() {
        let err = app()
            .ext_call(vec![CallArg::Value(json!(5))])
            .expect_err("numbers are not call targets");
        assert!(matches!(err, AppError::InvalidArgument { .. }));
    }

    #[test]
    fn rejects_missing_target() {
        let err = app()
            .ext_call(vec![CallArg::Sink(ResultSink::Create)])
            .expect_err("target is required");
        assert!(matches!(err, AppError::InvalidArgument { .. }));
    }

    #[test]
    fn returns_app_without_sink_and_results_with_one() {
        let app = app();
        let plain = app
            .ext_call(vec![CallArg::from("noop")])
            .expect("method call should succeed");
        assert!(matches!(plain, Dispatched::App(_)));

        let collected = app
            .ext_call(vec![
                CallArg::Options(ExtCallOptions {
                    rv: Some(ResultSink::Create),
                    target: Some(CallTarget::function(|_, _| Ok(Value::Null))),
                }),
                CallArg::Value(json!(1)),
            ])
            .expect("function call should succeed");
        let results = collected.into_results().expect("results requested");
        assert!(results.is_empty());
    }
}
