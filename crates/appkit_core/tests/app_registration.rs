use appkit_core::{
    AddTarget, Added, AppError, AppOptions, Application, Extension, ExtensionClass,
    ExtensionHandle, Identified, Service, ServiceBuilder, ServiceRef, Webservice,
    WebserviceBuilder,
};
use serde_json::{json, Value};
use std::rc::Rc;

fn app() -> Application {
    Application::new(AppOptions::default()).expect("app should build")
}

#[derive(Default)]
struct PageExtension;

impl Extension for PageExtension {}

#[derive(Default)]
struct NavExt;

impl Extension for NavExt {}

struct Fixed(&'static str);

impl Extension for Fixed {
    fn declared_id(&self) -> Option<String> {
        Some(self.0.to_string())
    }
}

#[test]
fn ids_are_derived_from_type_names_with_numbered_collisions() {
    let app = app();
    for _ in 0..3 {
        app.add(ExtensionHandle::new(PageExtension))
            .expect("page should add");
    }
    app.add(ExtensionHandle::new(NavExt)).expect("nav should add");

    assert_eq!(app.extension_ids(), vec!["page", "page2", "page3", "nav"]);
}

#[test]
fn adding_the_same_extension_twice_is_a_no_op() {
    let app = app();
    let page = ExtensionHandle::new(PageExtension);
    app.add(page.clone()).expect("first add");
    app.add(page.clone()).expect("second add");

    assert_eq!(app.extensions().len(), 1);
    assert_eq!(page.id().expect("id"), "page");
}

#[test]
fn duplicate_id_keeps_the_first_registrant() {
    let app = app();
    let first = ExtensionHandle::new(Fixed("shared"));
    let second = ExtensionHandle::new(Fixed("shared"));
    app.add(AddTarget::Batch(vec![
        first.clone().into(),
        second.clone().into(),
        ExtensionHandle::new(Fixed("other")).into(),
    ]))
    .expect("duplicates are not fatal");

    let registered = app.extension("shared").expect("shared registered");
    assert!(registered.ptr_eq(&first));
    assert_eq!(app.extension_ids(), vec!["shared", "other"]);
}

#[test]
fn lookup_round_trip_and_detached_snapshot() {
    let app = app();
    let page = ExtensionHandle::new(PageExtension);
    app.add(page.clone()).expect("page should add");
    let id = page.id().expect("id");

    assert!(app.extension(&id).expect("lookup").ptr_eq(&page));
    let mut snapshot = app.extensions();
    assert_eq!(
        snapshot.iter().filter(|handle| handle.ptr_eq(&page)).count(),
        1
    );
    snapshot.clear();
    assert_eq!(app.extensions().len(), 1);
}

#[test]
fn extension_class_is_instantiated_with_the_app() {
    let app = app();
    let class = ExtensionClass::of::<PageExtension>();
    app.add(class).expect("class should add");

    let page = app.extension("page").expect("instance registered");
    assert!(page.is_owned_by(&app));
}

#[test]
fn foreign_extension_is_reassigned_to_the_adding_app() {
    let first = app();
    let second = app();
    let page = ExtensionHandle::with_app(PageExtension, &first);
    assert!(page.is_owned_by(&first));

    second.add(page.clone()).expect("page should add");
    assert!(page.is_owned_by(&second));
    assert!(second.has_extension("page"));
    assert!(!first.has_extension("page"));
}

#[test]
fn id_is_stable_after_owner_changes() {
    let first = app();
    let second = app();
    first
        .add(ExtensionHandle::new(PageExtension))
        .expect("filler should add");
    let page = ExtensionHandle::with_app(PageExtension, &first);
    assert_eq!(page.id().expect("id"), "page2");

    second.add(page.clone()).expect("page should add");
    assert_eq!(page.id().expect("id"), "page2");
    assert!(second.has_extension("page2"));
}

#[test]
fn reading_id_without_owner_fails() {
    let page = ExtensionHandle::new(PageExtension);
    let err = page.id().expect_err("no owner yet");
    assert!(matches!(err, AppError::MissingOwner { .. }));
    assert!(matches!(page.app(), Err(AppError::MissingOwner { .. })));
}

#[test]
fn resolved_id_outlives_the_owner() {
    let page = ExtensionHandle::new(PageExtension);
    {
        let app = app();
        app.add(page.clone()).expect("page should add");
        assert_eq!(page.id().expect("id"), "page");
    }

    assert!(matches!(page.app(), Err(AppError::MissingOwner { .. })));
    assert_eq!(page.id().expect("cached id"), "page");
}

#[test]
fn services_are_stored_by_id_with_last_write_winning() {
    let app = app();
    let first: ServiceRef = Rc::new(Webservice::new("api"));
    let second: ServiceRef = Rc::new(Webservice::new("api"));
    app.add(Rc::clone(&first)).expect("first service");
    app.add(Rc::clone(&second)).expect("second service");

    let stored = app.service("api").expect("service stored");
    assert!(Rc::ptr_eq(&stored, &second));
    assert_eq!(app.service_ids(), vec!["api"]);
}

#[test]
fn builder_is_built_synchronously() {
    let app = app();
    let builder = Rc::new(WebserviceBuilder::new("auth"));
    builder.set_option("realm", json!("main"));
    let builder: Rc<dyn ServiceBuilder> = builder;
    app.add(builder).expect("builder should add");

    let service = app.service("auth").expect("service stored");
    assert_eq!(service.service_id(), "auth");
}

#[test]
fn bare_id_returns_a_deferred_builder_wired_back_into_the_app() {
    let app = app();
    let added = app.add("search").expect("id should add");
    let builder = added.into_builder().expect("bare id yields a builder");
    assert!(app.service("search").is_none());

    builder.set_option("limit", json!(10));
    let built = builder.build().expect("build");
    let stored = app.service("search").expect("built service stored");
    assert!(Rc::ptr_eq(&built, &stored));

    let builder: Rc<dyn ServiceBuilder> = builder;
    app.add(builder).expect("re-adding the built builder is idempotent");
    assert_eq!(app.service_ids(), vec!["search"]);
}

#[test]
fn add_returns_the_app_for_everything_but_bare_ids() {
    let app = app();
    let added = app
        .add(ExtensionHandle::new(PageExtension))
        .expect("page should add");
    match added {
        Added::App(returned) => assert!(returned.ptr_eq(&app)),
        Added::Builder(_) => panic!("extensions return the app"),
    }
}

#[test]
fn invalid_item_aborts_the_rest_of_a_batch() {
    let app = app();
    let err = app
        .add(AddTarget::Batch(vec![
            ExtensionHandle::new(Fixed("before")).into(),
            AddTarget::Value(json!(42)),
            ExtensionHandle::new(Fixed("after")).into(),
        ]))
        .expect_err("numbers are not add targets");

    match err {
        AppError::InvalidArgument { value, app: app_name } => {
            assert!(value.contains("42"));
            assert_eq!(app_name, app.name());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(app.has_extension("before"));
    assert!(!app.has_extension("after"));
}

#[test]
fn json_values_resolve_to_ids_and_batches() {
    let app = app();
    let added = app.add(Value::String("feed".to_string())).expect("string id");
    assert!(added.into_builder().is_some());
    app.add(json!(["a", ["b"]])).expect("nested arrays");
}

#[test]
fn app_identity_is_usable_as_data_key() {
    let app = app();
    let entry = app.data(app.identity());
    entry.borrow_mut().insert("k".to_string(), json!(true));
    assert_eq!(app.data(&app).borrow().get("k"), Some(&json!(true)));
}
