//! Link lists

use crate::common::*;
use std::rc::Rc;

fn owner_with_dogs(t: &TestStore, names: &[&str]) -> (Rc<Person>, Vec<Rc<Dog>>) {
    let dogs: Vec<Rc<Dog>> = names.iter().map(|n| Dog::new(n)).collect();
    let person = Person::from_draft(PersonDraft {
        name: "Ada".to_string(),
        dogs: dogs.clone(),
        ..PersonDraft::default()
    });
    t.add(&person);
    (person, dogs)
}

fn names(list: &tether::LinkList<Dog>) -> Vec<String> {
    list.to_vec()
        .unwrap()
        .iter()
        .map(|d| d.name().unwrap())
        .collect()
}

#[test]
fn test_attach_fills_list_in_order() {
    let t = TestStore::new();
    let (person, dogs) = owner_with_dogs(&t, &["Rex", "Fido", "Bella"]);
    let list = person.dogs().unwrap();

    assert_eq!(list.len().unwrap(), 3);
    assert_eq!(names(&list), vec!["Rex", "Fido", "Bella"]);
    assert!(dogs.iter().all(|d| d.is_managed()));
    assert_eq!(t.store.count::<Dog>().unwrap(), 3);
    assert!(list.get(1).unwrap().core() == dogs[1].core());
}

#[test]
fn test_index_operations_are_bounds_checked() {
    let t = TestStore::new();
    let (person, dogs) = owner_with_dogs(&t, &["Rex", "Fido"]);
    let list = person.dogs().unwrap();

    assert!(matches!(
        list.get(2),
        Err(Error::OutOfRange { index: 2, size: 2 })
    ));
    let result = t.store.write(|_| list.remove_at(5));
    assert!(matches!(result, Err(Error::OutOfRange { index: 5, size: 2 })));
    let result = t.store.write(|_| list.insert(3, &dogs[0]));
    assert!(matches!(result, Err(Error::OutOfRange { index: 3, size: 2 })));
    assert!(matches!(
        list.find(&dogs[0], 3),
        Err(Error::OutOfRange { index: 3, size: 2 })
    ));
    assert_eq!(list.len().unwrap(), 2);
}

#[test]
fn test_insert_remove_and_find() {
    let t = TestStore::new();
    let (person, dogs) = owner_with_dogs(&t, &["Rex", "Fido"]);
    let list = person.dogs().unwrap();

    t.store
        .write(|_| {
            list.insert(0, &dogs[1])?;
            list.insert(3, &dogs[0])
        })
        .unwrap();
    assert_eq!(names(&list), vec!["Fido", "Rex", "Fido", "Rex"]);

    assert_eq!(list.find(&dogs[0], 0).unwrap(), Some(1));
    assert_eq!(list.find(&dogs[0], 2).unwrap(), Some(3));
    assert_eq!(list.find(&dogs[1], 3).unwrap(), None);
    assert_eq!(list.find(&dogs[1], 4).unwrap(), None);

    t.store.write(|_| list.remove_at(0)).unwrap();
    assert_eq!(names(&list), vec!["Rex", "Fido", "Rex"]);

    t.store.write(|_| list.clear()).unwrap();
    assert!(list.is_empty().unwrap());
    // Entries go, rows stay
    assert_eq!(t.store.count::<Dog>().unwrap(), 2);
}

#[test]
fn test_mutation_requires_write_scope() {
    let t = TestStore::new();
    let (person, dogs) = owner_with_dogs(&t, &["Rex"]);
    let list = person.dogs().unwrap();

    assert!(matches!(list.add(&dogs[0]), Err(Error::NotInWriteScope)));
    assert!(matches!(list.clear(), Err(Error::NotInWriteScope)));
    assert_eq!(list.len().unwrap(), 1);
}

#[test]
fn test_members_must_be_managed_by_same_store() {
    let t = TestStore::new();
    let (person, _) = owner_with_dogs(&t, &[]);
    let list = person.dogs().unwrap();

    let stray = Dog::new("Stray");
    let result = t.store.write(|_| list.add(&stray));
    assert!(matches!(result, Err(Error::NotManaged { .. })));
    assert!(!stray.is_managed());
    assert_eq!(list.find(&stray, 0).unwrap(), None);

    let other = TestStore::new();
    let foreign = Dog::new("Foreign");
    other.add(&foreign);
    let result = t.store.write(|_| list.add(&foreign));
    assert!(matches!(result, Err(Error::NotManaged { .. })));
    assert_eq!(list.find(&foreign, 0).unwrap(), None);
}

#[test]
fn test_removed_row_leaves_every_list() {
    let t = TestStore::new();
    let (person, dogs) = owner_with_dogs(&t, &["Rex", "Fido", "Rex2"]);
    let list = person.dogs().unwrap();

    t.store.write(|_| t.store.remove(&dogs[1])).unwrap();
    assert_eq!(names(&list), vec!["Rex", "Rex2"]);
}

#[test]
fn test_list_of_unmanaged_object_fails() {
    let _t = TestStore::new();
    let draft = Person::new("Ada", 36);
    assert!(matches!(draft.dogs(), Err(Error::NotManaged { .. })));
}
