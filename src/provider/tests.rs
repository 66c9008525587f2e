use std::{cell::RefCell, rc::Rc};

use assert_call::{call, CallRecorder};
use futures::{channel::oneshot, FutureExt};

use super::*;
use crate::{
    core::Runtime,
    effect,
    utils::test_helpers::{bulbasaur, BULBASAUR_JSON},
    MemorySource,
};

type FetchResult = Result<Vec<u8>, FetchError>;

/// A source whose single fetch resolves when the returned sender is used.
fn deferred_source() -> (impl StaticSource, oneshot::Sender<FetchResult>) {
    let (tx, rx) = oneshot::channel::<FetchResult>();
    let rx = RefCell::new(Some(rx));
    let source = move |path: &str| {
        let rx = rx.borrow_mut().take();
        let path = path.to_string();
        async move {
            match rx {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(FetchError::Unavailable(path))),
                None => Err(FetchError::Unavailable(path)),
            }
        }
        .boxed_local()
    };
    (source, tx)
}

fn activate_deferred() -> (StoreProvider, oneshot::Sender<FetchResult>) {
    let (source, tx) = deferred_source();
    (StoreProvider::activate(source, &StoreConfig::default()), tx)
}

#[test]
fn read_before_load_resolves() {
    let mut rt = Runtime::new();
    let (provider, _tx) = activate_deferred();
    let store = provider.store().clone();

    let state = store.snapshot(&mut rt.sc());
    assert!(state.records.is_empty());
    assert_eq!(state.search, "foo");

    rt.update();
    let state = store.snapshot(&mut rt.sc());
    assert!(state.records.is_empty());
    assert_eq!(state.search, "foo");
    assert!(provider.load_status(&mut rt.sc()).is_loading());
}

#[test]
fn load_replaces_dataset() {
    let mut rt = Runtime::new();
    let (provider, tx) = activate_deferred();
    rt.update();

    tx.send(Ok(BULBASAUR_JSON.as_bytes().to_vec())).unwrap();
    rt.update();

    let state = provider.store().snapshot(&mut rt.sc());
    assert_eq!(&*state.records, &[bulbasaur()]);
    assert_eq!(state.search, "foo");
    assert!(matches!(
        provider.load_status(&mut rt.sc()),
        LoadStatus::Loaded { count: 1 }
    ));
}

#[test]
fn search_after_load() {
    let mut rt = Runtime::new();
    let (provider, tx) = activate_deferred();
    tx.send(Ok(BULBASAUR_JSON.as_bytes().to_vec())).unwrap();
    rt.update();

    let store = provider.store();
    let records = store.records(&mut rt.sc());
    store.set_search_text("char", rt.ac());
    let state = store.snapshot(&mut rt.sc());
    assert!(Rc::ptr_eq(&state.records, &records));
    assert_eq!(&*state.records, &[bulbasaur()]);
    assert_eq!(state.search, "char");
}

#[test]
fn network_error_keeps_empty_dataset() {
    let mut rt = Runtime::new();
    let (provider, tx) = activate_deferred();
    rt.update();

    tx.send(Err(FetchError::Unavailable("network down".into())))
        .unwrap();
    rt.update();

    let state = provider.store().snapshot(&mut rt.sc());
    assert!(state.records.is_empty());
    assert_eq!(state.search, "foo");
    match provider.load_status(&mut rt.sc()) {
        LoadStatus::Failed(e) => {
            assert!(matches!(*e, LoadError::Fetch { .. }));
            assert_eq!(
                e.to_string(),
                "failed to fetch `/pokemon.json`: resource unavailable: network down"
            );
        }
        status => panic!("unexpected status: {status}"),
    }
}

#[test]
fn malformed_json_keeps_empty_dataset() {
    let mut rt = Runtime::new();
    let source = MemorySource::new().with("/pokemon.json", "<html>oops</html>");
    let provider = StoreProvider::activate(source, &StoreConfig::default());
    rt.update();

    assert!(provider.store().records(&mut rt.sc()).is_empty());
    assert!(matches!(
        provider.load_status(&mut rt.sc()),
        LoadStatus::Failed(e) if matches!(*e, LoadError::Parse { .. })
    ));
}

#[test]
fn failed_load_keeps_previous_dataset() {
    let mut rt = Runtime::new();
    let (provider, tx) = activate_deferred();
    let store = provider.store().clone();
    store.replace_dataset(vec![bulbasaur()], rt.ac());

    tx.send(Err(FetchError::NotFound("/pokemon.json".into())))
        .unwrap();
    rt.update();
    assert_eq!(&*store.records(&mut rt.sc()), &[bulbasaur()]);
}

#[test]
fn missing_resource() {
    let mut rt = Runtime::new();
    let provider = StoreProvider::activate(MemorySource::new(), &StoreConfig::default());
    rt.update();
    assert!(provider.store().records(&mut rt.sc()).is_empty());
    assert_eq!(
        provider.load_status(&mut rt.sc()).to_string(),
        "failed: failed to fetch `/pokemon.json`: `/pokemon.json` not found"
    );
}

#[test]
fn load_uses_config() {
    let mut rt = Runtime::new();
    let source = MemorySource::new().with("/data/dex.json", BULBASAUR_JSON);
    let config = StoreConfig {
        resource_path: "/data/dex.json".into(),
        initial_search: String::new(),
    };
    let provider = StoreProvider::activate(source, &config);
    rt.update();

    let state = provider.store().snapshot(&mut rt.sc());
    assert_eq!(state.records.len(), 1);
    assert_eq!(state.search, "");
}

#[test]
fn fetches_exactly_once() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let source = |path: &str| {
        call!("fetch {path}");
        futures::future::ready(Ok::<_, FetchError>(b"[]".to_vec())).boxed_local()
    };
    let provider = StoreProvider::activate(source, &StoreConfig::default());
    cr.verify(());
    rt.update();
    cr.verify("fetch /pokemon.json");

    provider.store().set_search_text("x", rt.ac());
    rt.update();
    cr.verify(());
}

#[test]
fn consumers_are_notified_of_load() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let (provider, tx) = activate_deferred();
    let _s = provider
        .store()
        .subscribe(|s| call!("{} {}", s.records.len(), s.search));
    rt.update();
    cr.verify("0 foo");

    tx.send(Ok(BULBASAUR_JSON.as_bytes().to_vec())).unwrap();
    rt.update();
    cr.verify("1 foo");
}

#[test]
fn load_status_is_observable() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let (provider, tx) = activate_deferred();
    let provider = Rc::new(provider);
    let _e = effect({
        let provider = provider.clone();
        move |sc| call!("{}", provider.load_status(sc))
    });
    rt.update();
    cr.verify("loading");

    tx.send(Ok(b"[]".to_vec())).unwrap();
    rt.update();
    cr.verify("loaded 0 records");
}

#[test]
fn teardown_before_resolution_discards_result() {
    let mut rt = Runtime::new();
    let (provider, tx) = activate_deferred();
    let store = provider.store().clone();
    rt.update();

    tx.send(Ok(BULBASAUR_JSON.as_bytes().to_vec())).unwrap();
    drop(provider);
    rt.update();

    assert!(store.records(&mut rt.sc()).is_empty());
}

#[test]
fn teardown_cancels_pending_fetch() {
    let mut rt = Runtime::new();
    let (provider, tx) = activate_deferred();
    let store = provider.store().clone();
    rt.update();
    assert!(!tx.is_canceled());

    drop(provider);
    rt.update();
    assert!(tx.is_canceled()); // the in-flight fetch was dropped
    assert!(store.records(&mut rt.sc()).is_empty());
}

#[test]
fn teardown_does_not_notify_consumers() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let (provider, tx) = activate_deferred();
    let store = provider.store().clone();
    let _s = store.subscribe(|s| call!("{} {}", s.records.len(), s.search));
    rt.update();
    cr.verify("0 foo");

    drop(provider);
    rt.update();
    cr.verify(());
    assert!(tx.is_canceled());
}

#[test]
fn runtime_drop_cancels_pending_fetch() {
    let mut rt = Runtime::new();
    let (provider, tx) = activate_deferred();
    rt.update();
    assert!(!tx.is_canceled());
    drop(rt);
    assert!(tx.is_canceled());
    drop(provider);
}

#[test]
#[should_panic(expected = "`Runtime` is not created.")]
fn activate_without_runtime() {
    let _provider = StoreProvider::activate(MemorySource::new(), &StoreConfig::default());
}

#[test]
fn config_defaults() {
    let config: StoreConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, StoreConfig::default());
    assert_eq!(config.resource_path, "/pokemon.json");
    assert_eq!(config.initial_search, "foo");

    let config: StoreConfig = serde_json::from_str(r#"{"initial_search": ""}"#).unwrap();
    assert_eq!(config.resource_path, "/pokemon.json");
    assert_eq!(config.initial_search, "");
}
