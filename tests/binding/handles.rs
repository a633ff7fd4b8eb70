//! Handle lifetime
//!
//! Every native handle is destroyed exactly once: when its facade is dropped,
//! when it is released explicitly, or when an ancestor is released.

use crate::common::*;

#[test]
fn test_dropping_facade_destroys_its_row_handle() {
    let t = TestStore::new();
    let person = Person::new("Ada", 36);
    t.add(&person);
    let key = person.row_key().unwrap();

    let before = t.stats();
    {
        let found = t.store.find::<Person>(key).unwrap().unwrap();
        assert_eq!(found.name().unwrap(), "Ada");
        assert_eq!(t.stats().live_handles, before.live_handles + 1);
    }
    let after = t.stats();
    assert_eq!(after.live_handles, before.live_handles);
    assert_eq!(after.handles_destroyed, before.handles_destroyed + 1);
}

#[test]
fn test_close_cascades_to_every_handle() {
    let t = TestStore::new();
    let person = Person::new("Ada", 36);
    t.add(&person);
    let list = person.dogs().unwrap();

    t.store.close().unwrap();
    assert!(t.store.is_closed());
    assert_eq!(t.stats().live_handles, 0);

    assert!(!person.is_valid());
    assert!(!list.is_valid());
    assert!(matches!(person.name(), Err(Error::InvalidatedHandle { .. })));
    assert!(matches!(list.len(), Err(Error::InvalidatedHandle { .. })));

    // Dropping the facades afterwards destroys nothing twice
    let destroyed = t.stats().handles_destroyed;
    drop(list);
    drop(person);
    assert_eq!(t.stats().handles_destroyed, destroyed);
}

#[test]
fn test_closed_store_rejects_operations() {
    let t = TestStore::new();
    t.store.close().unwrap();
    assert!(matches!(
        t.store.begin_write(),
        Err(Error::InvalidatedHandle { .. })
    ));
    assert!(matches!(
        t.store.count::<Person>(),
        Err(Error::InvalidatedHandle { .. })
    ));
    assert!(matches!(
        t.store.refresh(),
        Err(Error::InvalidatedHandle { .. })
    ));
}

#[test]
fn test_dropping_store_releases_native_store() {
    let TestStore { engine, store, .. } = TestStore::new();
    assert!(engine.stats().live_handles > 0);
    drop(store);
    assert_eq!(engine.stats().live_handles, 0);
}

#[test]
fn test_live_facade_keeps_store_open() {
    let TestStore { engine, store, .. } = TestStore::new();
    let person = Person::new("Ada", 36);
    store.write(|_| store.add(&person)).unwrap();

    drop(store);
    assert!(person.is_valid());
    assert_eq!(person.name().unwrap(), "Ada");

    drop(person);
    assert_eq!(engine.stats().live_handles, 0);
}

#[test]
fn test_removed_object_is_invalidated() {
    let t = TestStore::new();
    let person = Person::new("Ada", 36);
    t.add(&person);
    let key = person.row_key().unwrap();
    let other = t.store.find::<Person>(key).unwrap().unwrap();

    t.store.write(|_| t.store.remove(&person)).unwrap();

    assert!(!person.is_valid());
    assert!(matches!(
        person.name(),
        Err(Error::InvalidatedHandle { .. })
    ));

    assert!(!other.is_valid());
    let err = other.name().unwrap_err();
    assert!(err.is_native(NativeErrorKind::RowDetached), "{}", err);

    assert!(t.store.find::<Person>(key).unwrap().is_none());
    assert_eq!(t.store.count::<Person>().unwrap(), 0);
}

#[test]
fn test_remove_requires_managed_object() {
    let t = TestStore::new();
    let person = Person::new("Ada", 36);
    let result = t.store.write(|_| t.store.remove(&person));
    assert!(matches!(result, Err(Error::NotManaged { .. })));
}
