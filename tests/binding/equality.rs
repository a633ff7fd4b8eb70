//! Facade equality
//!
//! Managed facades compare equal iff they are bound to the same native row.

use crate::common::*;

#[test]
fn test_facades_of_same_row_are_equal() {
    let t = TestStore::new();
    let person = Person::new("Ada", 36);
    t.add(&person);
    let key = person.row_key().unwrap();

    let a = t.store.find::<Person>(key).unwrap().unwrap();
    let b = t.store.object_at::<Person>(0).unwrap();
    assert!(person.core() == a.core());
    assert!(a.core() == b.core());
    assert!(person.same_row(&a));
    assert!(b.same_row(&person));
}

#[test]
fn test_facades_of_different_rows_differ() {
    let t = TestStore::new();
    let ada = Person::new("Ada", 36);
    let bob = Person::new("Ada", 36);
    t.add(&ada);
    t.add(&bob);
    assert!(ada.core() != bob.core());
    assert!(!ada.same_row(&bob));
}

#[test]
fn test_peer_store_facades_are_equal() {
    let t = TestStore::new();
    let person = Person::new("Ada", 36);
    t.add(&person);

    let peer = t.open_peer();
    let mirrored = peer
        .find::<Person>(person.row_key().unwrap())
        .unwrap()
        .unwrap();
    assert!(person.core() == mirrored.core());
}

#[test]
fn test_unmanaged_equal_only_to_itself() {
    let t = TestStore::new();
    let draft = Person::new("Ada", 36);
    let twin = Person::new("Ada", 36);
    assert!(draft.core() == draft.core());
    assert!(draft.core() != twin.core());

    let managed = Person::new("Ada", 36);
    t.add(&managed);
    assert!(draft.core() != managed.core());
    assert!(managed.core() != draft.core());
}

#[test]
fn test_released_facade_is_not_equal() {
    let t = TestStore::new();
    let person = Person::new("Ada", 36);
    t.add(&person);
    let other = t.store.object_at::<Person>(0).unwrap();

    t.store.write(|_| t.store.remove(&person)).unwrap();
    assert!(person.core() != other.core());
}
