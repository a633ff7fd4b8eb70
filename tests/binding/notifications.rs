//! Change notifications
//!
//! A facade registers with the engine on its first subscriber and
//! unregisters on its last. Callbacks are delivered on refresh and raised as
//! property names.

use crate::common::*;
use std::cell::RefCell;
use std::rc::Rc;

fn recorder() -> (Rc<RefCell<Vec<String>>>, impl FnMut(&str) + 'static) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    (seen, move |name: &str| sink.borrow_mut().push(name.to_string()))
}

#[test]
fn test_commit_raises_property_changed() {
    let t = TestStore::new();
    let person = Person::new("Ada", 36);
    t.add(&person);

    let (seen, handler) = recorder();
    person.subscribe(handler).unwrap();
    t.store.write(|_| person.set_age(37)).unwrap();

    assert_eq!(*seen.borrow(), vec!["age".to_string()]);
}

#[test]
fn test_peer_change_delivered_on_refresh() {
    let t = TestStore::new();
    let person = Person::new("Ada", 36);
    t.add(&person);
    let (seen, handler) = recorder();
    person.subscribe(handler).unwrap();

    let peer = t.open_peer();
    let mirrored = peer
        .find::<Person>(person.row_key().unwrap())
        .unwrap()
        .unwrap();
    peer.write(|_| {
        mirrored.set_name("Ada Lovelace")?;
        mirrored.set_name("Countess")?;
        mirrored.set_age(37)
    })
    .unwrap();

    assert!(seen.borrow().is_empty());
    assert_eq!(t.store.refresh().unwrap(), 2);
    assert_eq!(*seen.borrow(), vec!["name".to_string(), "age".to_string()]);
    assert_eq!(person.name().unwrap(), "Countess");

    // Nothing left to deliver
    assert_eq!(t.store.refresh().unwrap(), 0);
}

#[test]
fn test_refresh_deferred_inside_write_scope() {
    let t = TestStore::with_config(|c| c.auto_refresh = false);
    let person = Person::new("Ada", 36);
    t.add(&person);
    t.store.refresh().unwrap();
    let (seen, handler) = recorder();
    person.subscribe(handler).unwrap();

    let scope = t.store.begin_write().unwrap();
    person.set_age(40).unwrap();
    assert_eq!(t.store.refresh().unwrap(), 0);
    scope.commit().unwrap();
    assert!(seen.borrow().is_empty());

    assert_eq!(t.store.refresh().unwrap(), 1);
    assert_eq!(*seen.borrow(), vec!["age".to_string()]);
}

#[test]
fn test_every_handler_is_called() {
    let t = TestStore::new();
    let person = Person::new("Ada", 36);
    t.add(&person);
    let (first, a) = recorder();
    let (second, b) = recorder();
    person.subscribe(a).unwrap();
    person.subscribe(b).unwrap();

    t.store.write(|_| person.set_nickname(Some("A"))).unwrap();
    assert_eq!(*first.borrow(), vec!["nickname".to_string()]);
    assert_eq!(*second.borrow(), vec!["nickname".to_string()]);
    assert_eq!(t.stats().observers_added, 1);
}

#[test]
fn test_last_unsubscribe_unregisters_once() {
    let t = TestStore::new();
    let person = Person::new("Ada", 36);
    t.add(&person);
    let (_, a) = recorder();
    let (_, b) = recorder();
    let first = person.subscribe(a).unwrap();
    let second = person.subscribe(b).unwrap();

    assert!(person.unsubscribe(first).unwrap());
    assert_eq!(t.stats().observers_removed, 0);
    assert!(person.core().is_subscribed());

    assert!(person.unsubscribe(second).unwrap());
    assert!(!person.unsubscribe(second).unwrap());
    assert!(!person.core().is_subscribed());

    drop(person);
    let stats = t.stats();
    assert_eq!(stats.observers_removed, 1);
    assert_eq!(stats.live_observers, 0);
    assert_eq!(t.store.subscription_count(), 0);
}

#[test]
fn test_resubscribe_after_unsubscribe() {
    let t = TestStore::new();
    let person = Person::new("Ada", 36);
    t.add(&person);

    let (_, a) = recorder();
    let id = person.subscribe(a).unwrap();
    person.unsubscribe(id).unwrap();

    let (seen, b) = recorder();
    person.subscribe(b).unwrap();
    t.store.write(|_| person.set_age(50)).unwrap();

    assert_eq!(*seen.borrow(), vec!["age".to_string()]);
    assert_eq!(t.stats().observers_added, 2);
    assert_eq!(t.stats().live_observers, 1);
}

#[test]
fn test_dropped_object_unregisters_exactly_once() {
    let t = TestStore::new();
    let person = Person::new("Ada", 36);
    t.add(&person);
    let (seen, handler) = recorder();
    person.subscribe(handler).unwrap();
    let key = person.row_key().unwrap();

    drop(person);
    assert_eq!(t.stats().observers_removed, 1);
    assert_eq!(t.store.subscription_count(), 0);

    let peer = t.open_peer();
    let mirrored = peer.find::<Person>(key).unwrap().unwrap();
    peer.write(|_| mirrored.set_age(1)).unwrap();

    assert_eq!(t.store.refresh().unwrap(), 0);
    assert!(seen.borrow().is_empty());

    t.store.close().unwrap();
    assert_eq!(t.stats().observers_removed, 1);
}

#[test]
fn test_close_unsubscribes_every_object_once() {
    let t = TestStore::new();
    let ada = Person::new("Ada", 36);
    let rex = Dog::new("Rex");
    t.add(&ada);
    t.add(&rex);
    let (_, a) = recorder();
    let (_, b) = recorder();
    ada.subscribe(a).unwrap();
    rex.subscribe(b).unwrap();
    assert_eq!(t.store.subscription_count(), 2);

    t.store.close().unwrap();
    let stats = t.stats();
    assert_eq!(stats.observers_removed, 2);
    assert_eq!(stats.live_observers, 0);
    assert!(!ada.core().is_subscribed());

    drop(ada);
    drop(rex);
    assert_eq!(t.stats().observers_removed, 2);
}

#[test]
fn test_subscribe_requires_managed_object() {
    let _t = TestStore::new();
    let draft = Person::new("Ada", 36);
    let (_, handler) = recorder();
    assert!(matches!(
        draft.subscribe(handler),
        Err(Error::NotManaged { .. })
    ));
}

#[test]
fn test_handler_may_read_the_object() {
    let t = TestStore::new();
    let person = Person::new("Ada", 36);
    t.add(&person);

    let ages = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&ages);
    let weak = Rc::downgrade(&person);
    person
        .subscribe(move |_| {
            if let Some(p) = weak.upgrade() {
                sink.borrow_mut().push(p.age().unwrap());
            }
        })
        .unwrap();

    t.store.write(|_| person.set_age(41)).unwrap();
    assert_eq!(*ages.borrow(), vec![41]);
}

#[test]
fn test_removed_link_target_notifies_owner() {
    let t = TestStore::new();
    let rex = Dog::new("Rex");
    let person = Person::from_draft(PersonDraft {
        name: "Ada".to_string(),
        dog: Some(rex.clone()),
        ..PersonDraft::default()
    });
    t.add(&person);
    let (seen, handler) = recorder();
    person.subscribe(handler).unwrap();

    t.store.write(|_| t.store.remove(&rex)).unwrap();
    assert_eq!(*seen.borrow(), vec!["dog".to_string()]);
    assert!(person.dog().unwrap().is_none());
}
