//! Full object lifecycle across two stores on one path

use crate::common::*;
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn test_people_and_dogs() {
    let t = TestStore::new();

    // Drafts become managed on add; link targets come along
    let rex = Dog::new("Rex");
    let ada = Person::from_draft(PersonDraft {
        name: "Ada".to_string(),
        age: 36,
        dog: Some(rex.clone()),
        dogs: vec![rex.clone(), Dog::new("Fido")],
        ..PersonDraft::default()
    });
    t.add(&ada);
    assert_eq!(t.store.count::<Person>().unwrap(), 1);
    assert_eq!(t.store.count::<Dog>().unwrap(), 2);
    assert!(ada.dog().unwrap().unwrap().core() == rex.core());

    // Watch Ada from the first store
    let changes = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&changes);
    let id = ada
        .subscribe(move |name: &str| sink.borrow_mut().push(name.to_string()))
        .unwrap();

    // Edit Ada through a second store on the same path
    let peer = t.open_peer();
    let remote = peer.find::<Person>(ada.row_key().unwrap()).unwrap().unwrap();
    assert!(remote.core() == ada.core());
    peer.write(|_| {
        remote.set_age(37)?;
        remote.set_nickname(Some("Countess"))
    })
    .unwrap();

    assert_eq!(t.store.refresh().unwrap(), 2);
    assert_eq!(*changes.borrow(), vec!["age", "nickname"]);
    assert_eq!(ada.age().unwrap(), 37);

    // Removing Rex clears the link and shrinks the list
    changes.borrow_mut().clear();
    t.store.write(|_| t.store.remove(&rex)).unwrap();
    assert!(ada.dog().unwrap().is_none());
    assert_eq!(ada.dogs().unwrap().len().unwrap(), 1);
    assert_eq!(*changes.borrow(), vec!["dog", "dogs"]);

    // The peer sees the same state
    peer.refresh().unwrap();
    assert!(remote.dog().unwrap().is_none());
    assert_eq!(remote.dogs().unwrap().get(0).unwrap().name().unwrap(), "Fido");

    assert!(ada.unsubscribe(id).unwrap());
    peer.close().unwrap();
    t.store.close().unwrap();

    let stats = t.stats();
    assert_eq!(stats.live_handles, 0);
    assert_eq!(stats.live_observers, 0);
    assert_eq!(stats.observers_added, stats.observers_removed);
    assert!(!ada.is_valid());
}

#[test]
fn test_attach_then_edit_in_later_scope() {
    let t = TestStore::new();
    let person = Person::new("Ada", 36);
    assert!(!person.is_managed());

    t.store.write(|_| t.store.add(&person)).unwrap();
    assert!(person.is_managed());

    let loaded = t
        .store
        .find::<Person>(person.row_key().unwrap())
        .unwrap()
        .unwrap();
    assert!(loaded.core() == person.core());

    assert!(matches!(person.set_age(40), Err(Error::NotInWriteScope)));
    assert_eq!(person.age().unwrap(), 36);

    t.store
        .write(|_| {
            assert_eq!(loaded.age()?, 36);
            person.set_age(41)
        })
        .unwrap();
    t.store
        .write(|_| {
            assert_eq!(loaded.age()?, 41);
            Ok(())
        })
        .unwrap();
}
