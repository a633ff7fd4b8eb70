//! Thread confinement
//!
//! Stores and facades stay on their thread. The engine is shared; threads
//! open their own stores on the same path.

use crate::common::*;
use static_assertions::{assert_impl_all, assert_not_impl_any};
use std::thread;

assert_not_impl_any!(Store: Send, Sync);
assert_not_impl_any!(Person: Send, Sync);
assert_not_impl_any!(tether::LinkList<Dog>: Send, Sync);
assert_not_impl_any!(tether::NativeHandle: Send, Sync);
assert_impl_all!(InMemoryEngine: Send, Sync);

#[test]
fn test_per_thread_stores_share_data() {
    let t = TestStore::new();
    let workers: Vec<_> = (0..4)
        .map(|i| {
            let engine = t.engine.clone();
            let path = t.path.clone();
            thread::spawn(move || {
                let store = Store::open(engine, BindingConfig::with_path(path), schemas()).unwrap();
                let person = Person::new(&format!("worker-{}", i), i);
                store.write(|_| store.add(&person)).unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(t.store.count::<Person>().unwrap(), 4);
    let mut names: Vec<String> = t
        .store
        .all::<Person>()
        .unwrap()
        .iter()
        .map(|p| p.name().unwrap())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec!["worker-0", "worker-1", "worker-2", "worker-3"]
    );
}

#[test]
fn test_one_writer_per_path() {
    let t = TestStore::new();
    let peer = t.open_peer();

    let scope = t.store.begin_write().unwrap();
    let err = peer.begin_write().unwrap_err();
    assert!(err.is_native(NativeErrorKind::WriteTransactionActive), "{}", err);
    scope.rollback().unwrap();

    peer.write(|_| peer.add(&Person::new("Ada", 36))).unwrap();
    assert_eq!(t.store.count::<Person>().unwrap(), 1);
}
