//! Edge case tests for ferry-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use ferry_engine::mock::{MemoryStore, MockRemote, RecordingLive, RemoteCall};
use ferry_engine::{
    Cascade, Collaborators, Engine, Error, Fields, Model, ModelSchema, NetworkMonitor, RecordKey,
    RemoteResult, RemoteService, Status, Store, StoredRecord, SyncConfig,
};
use futures::future::LocalBoxFuture;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;

fn create_test_schema() -> ModelSchema {
    ModelSchema::new("items").with_fields(["id", "name", "count", "data"])
}

struct Setup {
    engine: Engine,
    store: Store,
    remote: MockRemote,
    local: MemoryStore,
    live: RecordingLive,
}

fn setup(schema: ModelSchema) -> Setup {
    setup_with(schema, SyncConfig::default(), MockRemote::new(), MemoryStore::new())
}

fn setup_with(
    schema: ModelSchema,
    config: SyncConfig,
    remote: MockRemote,
    local: MemoryStore,
) -> Setup {
    let engine = Engine::new(NetworkMonitor::new(true));
    let live = RecordingLive::new();
    let store = engine
        .store(
            schema,
            config,
            Collaborators::new(Rc::new(remote.clone()))
                .with_local(Rc::new(local.clone()))
                .with_live(Rc::new(live.clone())),
        )
        .unwrap();

    Setup {
        engine,
        store,
        remote,
        local,
        live,
    }
}

fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

/// Remote service that runs a hook while a call is open, standing in for
/// the application acting during a request.
struct HookedRemote {
    inner: MockRemote,
    hook: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl HookedRemote {
    fn new(inner: MockRemote) -> Self {
        Self {
            inner,
            hook: RefCell::new(None),
        }
    }

    fn on_next_call(&self, hook: impl FnOnce() + 'static) {
        *self.hook.borrow_mut() = Some(Box::new(hook));
    }

    fn run_hook(&self) {
        let hook = self.hook.borrow_mut().take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl RemoteService for HookedRemote {
    fn create(&self, key: &RecordKey, fields: &Fields) -> LocalBoxFuture<'static, RemoteResult> {
        let call = self.inner.create(key, fields);
        self.run_hook();
        call
    }

    fn update(&self, key: &RecordKey, fields: &Fields) -> LocalBoxFuture<'static, RemoteResult> {
        let call = self.inner.update(key, fields);
        self.run_hook();
        call
    }

    fn remove(&self, key: &RecordKey) -> LocalBoxFuture<'static, RemoteResult> {
        let call = self.inner.remove(key);
        self.run_hook();
        call
    }
}

fn hooked_setup() -> (Engine, Store, MockRemote, Rc<HookedRemote>, RecordingLive) {
    let engine = Engine::default();
    let remote = MockRemote::new();
    let hooked = Rc::new(HookedRemote::new(remote.clone()));
    let live = RecordingLive::new();
    let store = engine
        .store(
            create_test_schema(),
            SyncConfig::default(),
            Collaborators::new(hooked.clone())
                .with_local(Rc::new(MemoryStore::new()))
                .with_live(Rc::new(live.clone())),
        )
        .unwrap();
    (engine, store, remote, hooked, live)
}

// ============================================================================
// String Edge Cases
// ============================================================================

#[tokio::test]
async fn unicode_strings() {
    let s = setup(create_test_schema());

    let names = vec![
        "日本語テスト",
        "Привет мир",
        "مرحبا بالعالم",
        "🎉🚀💯",
        "Hello\nWorld\tTab",
        "Null\0Test",
        "",
    ];

    for (i, name) in names.iter().enumerate() {
        s.store.create(json!({"id": i, "name": name})).unwrap();
    }
    s.engine.run_until_idle().await;

    for (i, name) in names.iter().enumerate() {
        let key = RecordKey::new(i.to_string());
        let sent = s.remote.calls_for(&key);
        assert_eq!(sent[0].fields().unwrap()["name"], json!(name));

        let stored = s.local.get(&key).unwrap();
        let reloaded = StoredRecord::from_json(&stored.to_json().unwrap()).unwrap();
        assert_eq!(reloaded.fields["name"], json!(name), "failed for {name:?}");
    }
}

#[tokio::test]
async fn very_long_strings() {
    let s = setup(create_test_schema());
    let long = "x".repeat(100_000);

    let model = s.store.create(json!({"id": 1, "name": long})).unwrap();
    s.engine.run_until_idle().await;

    assert_eq!(model.status(), Status::Synced);
    assert_eq!(model.saved().unwrap()["name"], json!(long));
}

// ============================================================================
// Key Edge Cases
// ============================================================================

#[test]
fn composite_key_joins_parts() {
    let schema = ModelSchema::new("members").with_composite_key(["org", "id"]);
    let s = setup(schema);

    let model = s.store.build(json!({"org": "acme", "id": 7})).unwrap();
    assert_eq!(model.key(), Some(RecordKey::from("acme/7")));

    let missing = s.store.build(json!({"org": "acme"}));
    assert!(matches!(missing, Err(Error::MissingKeyField { .. })));
}

#[test]
fn missing_or_null_key_is_generated() {
    let s = setup(create_test_schema());

    let generated = s.store.build(json!({"name": "a"})).unwrap();
    let from_null = s.store.build(json!({"id": null, "name": "b"})).unwrap();

    let key = generated.key().unwrap();
    assert_eq!(key.as_str().len(), 36);
    assert_eq!(generated.get("id"), Some(json!(key.as_str())));
    assert_ne!(from_null.key(), Some(key));
}

#[tokio::test]
async fn keys_with_special_characters() {
    let s = setup(create_test_schema());
    let ids = ["with space", "with:colon", "with.dot", "with@at", "ünïcödé", "a/b"];

    for id in ids {
        s.store.create(json!({"id": id})).unwrap();
    }
    s.engine.run_until_idle().await;

    for id in ids {
        let model = s.store.get(id).unwrap();
        assert_eq!(model.status(), Status::Synced, "failed for {id}");
    }
    assert_eq!(s.remote.calls().len(), ids.len());
}

#[test]
fn key_can_be_replaced_before_first_save() {
    let s = setup(create_test_schema());

    let model = s.store.build(json!({"id": "draft", "name": "a"})).unwrap();
    s.store.remove_key(&model).unwrap();
    assert_eq!(model.key(), None);
    assert_eq!(model.get("id"), None);

    model.set("id", json!("final")).unwrap();
    model.save().unwrap();
    assert_eq!(model.key(), Some(RecordKey::from("final")));
    assert!(s.store.contains("final"));
}

// ============================================================================
// Schema Edge Cases
// ============================================================================

#[tokio::test]
async fn undeclared_fields_are_dropped() {
    let s = setup(create_test_schema());

    let model = s
        .store
        .create(json!({"id": 1, "name": "a", "secret": "x"}))
        .unwrap();
    assert_eq!(model.get("secret"), None);
    assert!(matches!(
        model.set("secret", json!("y")),
        Err(Error::UnknownField { .. })
    ));

    s.remote.push_ok(json!({"id": 1, "name": "a", "secret": "z", "count": 3}));
    s.engine.run_until_idle().await;

    assert_eq!(model.get("secret"), None);
    assert_eq!(model.get("count"), Some(json!(3)));
}

#[test]
fn defaults_fill_absent_fields_only() {
    let schema = create_test_schema().with_default("count", json!(0));
    let s = setup(schema);

    let fresh = s.store.build(json!({"id": 1})).unwrap();
    let given = s.store.build(json!({"id": 2, "count": 5})).unwrap();

    assert_eq!(fresh.get("count"), Some(json!(0)));
    assert_eq!(given.get("count"), Some(json!(5)));
}

#[test]
fn schema_with_undeclared_key_rejected() {
    let engine = Engine::default();
    let schema = ModelSchema::new("items").with_fields(["name"]);
    let result = engine.store(
        schema,
        SyncConfig::default(),
        Collaborators::new(Rc::new(MockRemote::new())),
    );
    assert!(matches!(result, Err(Error::InvalidSchema(_))));
}

// ============================================================================
// JSON Edge Cases
// ============================================================================

#[tokio::test]
async fn nested_change_sends_whole_field() {
    let s = setup(create_test_schema());
    let model = s
        .store
        .put_remote_data(json!({"id": 1, "data": {"a": {"b": [1, 2, 3]}, "c": true}}))
        .unwrap();
    s.engine.run_until_idle().await;

    model
        .set("data", json!({"a": {"b": [1, 2, 4]}, "c": true}))
        .unwrap();
    model.save().unwrap();
    s.engine.run_until_idle().await;

    assert_eq!(
        s.remote.calls(),
        vec![RemoteCall::Update {
            key: RecordKey::from("1"),
            fields: fields(json!({"data": {"a": {"b": [1, 2, 4]}, "c": true}}))
        }]
    );
}

#[tokio::test]
async fn non_object_response_is_treated_as_empty() {
    let s = setup(create_test_schema());

    s.remote.push_ok(json!(["not", "an", "object"]));
    let model = s.store.create(json!({"id": 1, "name": "a"})).unwrap();
    s.engine.run_until_idle().await;

    assert_eq!(model.status(), Status::Synced);
    assert_eq!(model.fields(), fields(json!({"id": 1, "name": "a"})));
}

#[test]
fn non_object_payloads_rejected() {
    let s = setup(create_test_schema());

    for payload in [json!(null), json!(1), json!("x"), json!([{"id": 1}])] {
        assert!(matches!(
            s.store.build(payload.clone()),
            Err(Error::InvalidPayload(_))
        ));
        assert!(matches!(
            s.store.put_remote_data(payload),
            Err(Error::InvalidPayload(_))
        ));
    }
}

// ============================================================================
// Operation Ordering Edge Cases
// ============================================================================

#[tokio::test]
async fn rapid_saves_same_record() {
    let s = setup(create_test_schema());
    let model = s.store.create(json!({"id": 1, "count": 0})).unwrap();

    for i in 1..=50 {
        model.set("count", json!(i)).unwrap();
        model.save().unwrap();
    }
    s.engine.run_until_idle().await;

    assert_eq!(s.remote.calls().len(), 1);
    assert_eq!(s.remote.calls()[0].fields().unwrap()["count"], json!(50));
    assert_eq!(model.status(), Status::Synced);
    assert!(!model.has_pending_operations());
}

#[tokio::test]
async fn many_records() {
    let s = setup_with(
        create_test_schema(),
        SyncConfig::default(),
        MockRemote::new().with_latency(1),
        MemoryStore::new(),
    );

    for i in 0..200 {
        s.store.create(json!({"id": i, "count": i})).unwrap();
    }
    s.engine.run_until_idle().await;

    assert_eq!(s.remote.calls().len(), 200);
    assert_eq!(s.remote.max_in_flight_per_key(), 1);
    assert_eq!(s.local.len(), 200);
    assert!(s.store.all().iter().all(|m| m.status() == Status::Synced));
    assert!(s.engine.is_idle());
}

#[tokio::test]
async fn edits_during_a_save_survive_the_response() {
    let (engine, store, remote, hooked, _live) = hooked_setup();
    let model = store
        .put_remote_data(json!({"id": 1, "name": "z", "count": 1}))
        .unwrap();
    engine.run_until_idle().await;

    model.set("count", json!(2)).unwrap();
    model.save().unwrap();

    let editing = model.clone();
    hooked.on_next_call(move || editing.set("name", json!("local")).unwrap());
    remote.push_ok(json!({"id": 1, "name": "server", "count": 2}));
    engine.run_until_idle().await;

    assert_eq!(model.status(), Status::Synced);
    assert_eq!(model.get("name"), Some(json!("local")));
    assert_eq!(model.saved().unwrap()["name"], json!("server"));
    assert_eq!(model.changes(), fields(json!({"name": "local"})));
}

#[tokio::test]
async fn remove_during_a_save_still_reaches_remote() {
    let (engine, store, remote, hooked, live) = hooked_setup();

    let model = store.create(json!({"id": 1, "name": "a"})).unwrap();
    let removing = model.clone();
    hooked.on_next_call(move || removing.remove().unwrap());
    engine.run_until_idle().await;

    let calls = remote.calls();
    assert_eq!(calls.len(), 2);
    assert!(matches!(calls[0], RemoteCall::Create { .. }));
    assert!(matches!(calls[1], RemoteCall::Remove { .. }));
    assert_eq!(model.status(), Status::Deleted);
    assert!(live.published().is_empty());
    assert_eq!(live.removed(), vec![RecordKey::from("1")]);
}

// ============================================================================
// Removal Edge Cases
// ============================================================================

#[tokio::test]
async fn save_after_remove_rejected() {
    let s = setup(create_test_schema());
    let model = s.store.create(json!({"id": 1})).unwrap();
    s.engine.run_until_idle().await;

    model.remove().unwrap();
    assert!(matches!(model.save(), Err(Error::OperationOnDeleted(_))));
    s.engine.run_until_idle().await;
    assert!(matches!(model.save(), Err(Error::OperationOnDeleted(_))));
}

#[tokio::test]
async fn key_reusable_after_removal() {
    let s = setup(create_test_schema());
    let first = s.store.create(json!({"id": 1, "name": "a"})).unwrap();
    s.engine.run_until_idle().await;

    first.remove().unwrap();
    let second = s.store.create(json!({"id": 1, "name": "b"})).unwrap();
    s.engine.run_until_idle().await;

    assert_eq!(first.status(), Status::Deleted);
    assert_eq!(second.status(), Status::Synced);
    assert_eq!(s.store.get("1"), Some(second));
}

#[tokio::test]
async fn local_only_remove() {
    let s = setup(create_test_schema());
    let model = s.store.put_remote_data(json!({"id": 1})).unwrap();
    s.engine.run_until_idle().await;

    model.remove_with(Cascade::LOCAL).unwrap();
    s.engine.run_until_idle().await;

    assert!(s.remote.calls().is_empty());
    assert!(s.live.removed().is_empty());
    assert_eq!(model.status(), Status::Deleted);
    assert!(s.local.is_empty());
}

#[tokio::test]
async fn remove_without_rest_still_broadcasts() {
    let s = setup(create_test_schema());
    let model = s.store.put_remote_data(json!({"id": 1})).unwrap();
    s.engine.run_until_idle().await;

    model.remove_with(Cascade::NO_REST).unwrap();
    s.engine.run_until_idle().await;

    assert!(s.remote.calls().is_empty());
    assert_eq!(s.live.removed(), vec![RecordKey::from("1")]);
    assert_eq!(model.status(), Status::Deleted);
}

#[tokio::test]
async fn live_remove_cancels_pending_replay() {
    let s = setup(create_test_schema());
    let model = s.store.put_remote_data(json!({"id": 1, "name": "z"})).unwrap();
    s.engine.run_until_idle().await;

    s.engine.network().set_online(false);
    model.set("name", json!("a")).unwrap();
    model.save().unwrap();
    s.engine.run_until_idle().await;
    assert_eq!(model.status(), Status::SavePending);

    assert!(s.store.live_remove("1"));
    assert!(!s.store.live_remove("1"));
    s.engine.network().set_online(true);
    s.engine.run_until_idle().await;

    assert!(s.remote.calls().is_empty());
    assert_eq!(model.status(), Status::Deleted);
    assert!(s.local.is_empty());
}

// ============================================================================
// Snapshot Edge Cases
// ============================================================================

#[tokio::test]
async fn pending_save_survives_restart() {
    let local = MemoryStore::new();

    {
        let s = setup_with(
            create_test_schema(),
            SyncConfig::default(),
            MockRemote::new(),
            local.clone(),
        );
        let model = s.store.put_remote_data(json!({"id": 1, "name": "z"})).unwrap();
        s.engine.run_until_idle().await;

        s.engine.network().set_online(false);
        model.set("name", json!("a")).unwrap();
        model.save().unwrap();
        s.engine.run_until_idle().await;
    }

    let stored = local.get(&RecordKey::from("1")).unwrap();
    assert_eq!(stored.status, Status::SavePending);

    let s = setup_with(
        create_test_schema(),
        SyncConfig::default(),
        MockRemote::new(),
        local.clone(),
    );
    assert_eq!(s.store.load().await.unwrap(), 1);
    s.engine.run_until_idle().await;

    assert_eq!(
        s.remote.calls(),
        vec![RemoteCall::Update {
            key: RecordKey::from("1"),
            fields: fields(json!({"name": "a"}))
        }]
    );
    let model: Model = s.store.get("1").unwrap();
    assert_eq!(model.status(), Status::Synced);
    assert_eq!(local.get(&RecordKey::from("1")).unwrap().status, Status::Synced);
}

#[tokio::test]
async fn load_twice_does_not_duplicate() {
    let local = MemoryStore::new();
    let s = setup_with(
        create_test_schema(),
        SyncConfig::default(),
        MockRemote::new(),
        local.clone(),
    );
    let record = ferry_engine::Record::from_remote(fields(json!({"id": 1})));
    local.insert(StoredRecord::capture(RecordKey::from("1"), &record));

    assert_eq!(s.store.load().await.unwrap(), 1);
    assert_eq!(s.store.load().await.unwrap(), 0);
    assert_eq!(s.store.len(), 1);
}

#[test]
fn snapshot_from_future_version_rejected() {
    let json = r#"{"formatVersion": 99, "key": "1", "fields": {}, "status": "synced"}"#;
    assert!(matches!(
        StoredRecord::from_json(json),
        Err(Error::InvalidSnapshot(_))
    ));
}

// ============================================================================
// Lifecycle Edge Cases
// ============================================================================

#[tokio::test]
async fn dropped_store_abandons_queued_work() {
    let engine = Engine::default();
    let remote = MockRemote::new();
    let store = engine
        .store(
            create_test_schema(),
            SyncConfig::default(),
            Collaborators::new(Rc::new(remote.clone())),
        )
        .unwrap();

    let model = store.create(json!({"id": 1})).unwrap();
    drop(store);
    engine.run_until_idle().await;

    assert!(remote.calls().is_empty());
    assert!(matches!(model.save(), Err(Error::StoreClosed)));
    assert!(matches!(model.set("name", json!("a")), Err(Error::StoreClosed)));
}

#[tokio::test]
async fn engine_is_busy_while_a_call_is_open() {
    let engine = Rc::new(Engine::default());
    let remote = MockRemote::new();
    let hooked = Rc::new(HookedRemote::new(remote.clone()));
    let store = engine
        .store(
            create_test_schema(),
            SyncConfig::default(),
            Collaborators::new(hooked.clone()),
        )
        .unwrap();

    let idle_during_call = Rc::new(RefCell::new(None));
    let seen = idle_during_call.clone();
    let watching = engine.clone();
    hooked.on_next_call(move || *seen.borrow_mut() = Some(watching.is_idle()));

    store.create(json!({"id": 1})).unwrap();
    assert!(!engine.is_idle());
    engine.run_until_idle().await;

    assert_eq!(*idle_during_call.borrow(), Some(false));
    assert!(engine.is_idle());
    assert_eq!(remote.calls().len(), 1);
}

#[test]
fn network_status_is_observable() {
    let engine = Engine::default();
    let mut rx = engine.network().subscribe();
    assert!(*rx.borrow_and_update());

    engine.network().set_online(false);
    assert!(rx.has_changed().unwrap());
    assert!(!*rx.borrow_and_update());
}
