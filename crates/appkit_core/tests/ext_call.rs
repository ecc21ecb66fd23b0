use appkit_core::{
    AppError, AppOptions, Application, CallArg, CallTarget, Dispatched, ExtCallOptions,
    ExtCallResults, Extension, ExtensionHandle, HandlerError, ResultSink,
};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;

type Calls = Rc<RefCell<Vec<String>>>;

/// Defines `foo`, which sums its numeric arguments.
struct Adder {
    name: &'static str,
    calls: Calls,
}

impl Extension for Adder {
    fn declared_id(&self) -> Option<String> {
        Some(self.name.to_string())
    }

    fn call_method(
        &self,
        name: &str,
        _ext: &ExtensionHandle,
        args: &[Value],
    ) -> Option<Result<Value, HandlerError>> {
        match name {
            "foo" => {
                self.calls.borrow_mut().push(format!("{}:foo", self.name));
                let sum = args.iter().filter_map(Value::as_i64).sum::<i64>();
                Some(Ok(json!(sum)))
            }
            "fail" => Some(Err(HandlerError::new(format!("{} failed", self.name)))),
            _ => None,
        }
    }
}

/// Defines no methods.
struct Silent(&'static str);

impl Extension for Silent {
    fn declared_id(&self) -> Option<String> {
        Some(self.0.to_string())
    }
}

struct Fixture {
    app: Application,
    calls: Calls,
    adder: ExtensionHandle,
    silent: ExtensionHandle,
    second_adder: ExtensionHandle,
}

fn fixture() -> Fixture {
    let app = Application::new(AppOptions::default()).expect("app should build");
    let calls: Calls = Rc::new(RefCell::new(Vec::new()));
    let adder = ExtensionHandle::new(Adder {
        name: "a",
        calls: Rc::clone(&calls),
    });
    let silent = ExtensionHandle::new(Silent("s"));
    let second_adder = ExtensionHandle::new(Adder {
        name: "b",
        calls: Rc::clone(&calls),
    });
    for handle in [&adder, &silent, &second_adder] {
        app.add(handle.clone()).expect("extension should add");
    }
    Fixture {
        app,
        calls,
        adder,
        silent,
        second_adder,
    }
}

#[test]
fn method_call_skips_extensions_without_the_method() {
    let fx = fixture();
    let outcome = fx
        .app
        .ext_call(vec!["foo".into(), json!(1).into(), json!(2).into()])
        .expect("call should succeed");

    assert!(matches!(outcome, Dispatched::App(ref app) if app.ptr_eq(&fx.app)));
    assert_eq!(*fx.calls.borrow(), vec!["a:foo", "b:foo"]);
}

#[test]
fn collector_shorthand_creates_results_with_null_for_skipped() {
    let fx = fixture();
    let results = fx
        .app
        .ext_call(vec![
            ResultSink::Create.into(),
            "foo".into(),
            json!(1).into(),
            json!(2).into(),
        ])
        .expect("call should succeed")
        .into_results()
        .expect("results requested");

    assert_eq!(results.len(), 3);
    assert_eq!(results.get(&fx.adder), Some(json!(3)));
    assert_eq!(results.get(&fx.silent), Some(Value::Null));
    assert_eq!(results.get(&fx.second_adder), Some(json!(3)));
}

#[test]
fn collector_shorthand_fills_a_supplied_sink() {
    let fx = fixture();
    let sink = ExtCallResults::new();
    let returned = fx
        .app
        .ext_call(vec![
            ResultSink::Into(sink.clone()).into(),
            "foo".into(),
            json!(5).into(),
        ])
        .expect("call should succeed")
        .into_results()
        .expect("sink returned");

    assert_eq!(sink.len(), 3);
    assert_eq!(returned.get(&fx.adder), Some(json!(5)));
    assert!(sink.contains(&fx.silent));
}

#[test]
fn options_form_with_function_uses_every_positional_argument() {
    let fx = fixture();
    let results = fx
        .app
        .ext_call(vec![
            ExtCallOptions {
                rv: Some(ResultSink::Create),
                target: Some(CallTarget::function(|ext, args| {
                    Ok(json!(format!("{}:{}", ext.id()?, args.len())))
                })),
            }
            .into(),
            json!("x").into(),
        ])
        .expect("call should succeed")
        .into_results()
        .expect("results requested");

    let mut keys = results
        .extensions()
        .iter()
        .map(|handle| handle.id().expect("id"))
        .collect::<Vec<_>>();
    keys.sort();
    assert_eq!(keys, vec!["a", "b", "s"]);
    assert_eq!(results.get(&fx.silent), Some(json!("s:1")));
    assert_eq!(fx.app.extensions().len(), 3);
}

#[test]
fn options_form_without_target_shifts_the_next_argument() {
    let fx = fixture();
    let results = fx
        .app
        .ext_call(vec![
            ExtCallOptions {
                rv: Some(ResultSink::Create),
                target: None,
            }
            .into(),
            "foo".into(),
            json!(4).into(),
        ])
        .expect("call should succeed")
        .into_results()
        .expect("results requested");

    assert_eq!(results.get(&fx.second_adder), Some(json!(4)));
}

#[test]
fn function_call_runs_in_registration_order() {
    let fx = fixture();
    let order = Rc::new(RefCell::new(Vec::<String>::new()));
    let seen = Rc::clone(&order);
    fx.app
        .ext_call(vec![CallArg::function(move |ext, _| {
            seen.borrow_mut().push(ext.id()?);
            Ok(Value::Null)
        })])
        .expect("call should succeed");

    assert_eq!(*order.borrow(), vec!["a", "s", "b"]);
}

#[test]
fn failing_method_aborts_remaining_extensions() {
    let fx = fixture();
    let err = fx
        .app
        .ext_call_method("fail", &[])
        .expect_err("first adder fails");

    assert!(matches!(err, AppError::Handler { ref event, .. } if event == "fail"));
    assert!(err.to_string().contains("a failed"));
}

#[test]
fn non_value_call_argument_is_rejected() {
    let fx = fixture();
    let err = fx
        .app
        .ext_call(vec!["foo".into(), ResultSink::Create.into()])
        .expect_err("sinks are not call arguments");
    assert!(matches!(err, AppError::InvalidArgument { .. }));
    assert!(fx.calls.borrow().is_empty());
}

#[test]
fn collect_shorthand_returns_results() {
    let fx = fixture();
    let results = fx
        .app
        .ext_call_collect(CallTarget::method("foo"), &[json!(7)])
        .expect("collect should succeed");
    assert_eq!(results.get(&fx.adder), Some(json!(7)));
    assert_eq!(results.get(&fx.silent), Some(Value::Null));
}
