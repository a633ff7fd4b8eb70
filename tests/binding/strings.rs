//! Variable-length values
//!
//! Strings and blobs are read with a first buffer of
//! `string_buffer_capacity` bytes and a second, exactly sized one when the
//! value does not fit.

use crate::common::*;

#[test]
fn test_string_lengths_across_buffer_boundary() {
    let t = TestStore::new();
    let person = Person::new("", 1);
    t.add(&person);

    for len in [0usize, 1, 127, 128, 129, 10_000] {
        let name = "x".repeat(len);
        t.store.write(|_| person.set_name(&name)).unwrap();
        assert_eq!(person.name().unwrap(), name, "length {}", len);
    }
}

#[test]
fn test_multibyte_string_grows_buffer() {
    let t = TestStore::with_config(|c| c.string_buffer_capacity = 3);
    let person = Person::new("Zoë Ångström 日本語", 1);
    t.add(&person);
    assert_eq!(person.name().unwrap(), "Zoë Ångström 日本語");
}

#[test]
fn test_null_string_is_not_empty_string() {
    let t = TestStore::new();
    let person = Person::new("Ada", 36);
    t.add(&person);
    assert_eq!(person.nickname().unwrap(), None);

    t.store.write(|_| person.set_nickname(Some(""))).unwrap();
    assert_eq!(person.nickname().unwrap(), Some(String::new()));

    t.store.write(|_| person.set_nickname(None)).unwrap();
    assert_eq!(person.nickname().unwrap(), None);
}

#[test]
fn test_non_nullable_string_rejects_null() {
    let t = TestStore::new();
    let person = Person::new("Ada", 36);
    t.add(&person);

    let result = t
        .store
        .write(|_| person.core().set_value("name", Value::Null));
    assert!(matches!(result, Err(Error::SchemaMismatch(_))));
    assert_eq!(person.name().unwrap(), "Ada");
}

#[test]
fn test_binary_round_trip() {
    let t = TestStore::with_config(|c| c.string_buffer_capacity = 16);
    let dog = Dog::new("Rex");
    t.add(&dog);
    assert_eq!(dog.photo().unwrap(), Vec::<u8>::new());

    let photo: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    t.store
        .write(|_| dog.core().set("photo", photo.clone()))
        .unwrap();
    assert_eq!(dog.photo().unwrap(), photo);
}

#[test]
fn test_timestamp_round_trip() {
    let t = TestStore::new();
    let person = Person::from_draft(PersonDraft {
        name: "Ada".to_string(),
        born: Some(at(-4_000_000_000)),
        ..PersonDraft::default()
    });
    t.add(&person);
    assert_eq!(
        person.core().get::<Option<chrono::DateTime<chrono::Utc>>>("born").unwrap(),
        Some(at(-4_000_000_000))
    );
}

mod roundtrip {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn nickname_survives_any_buffer_capacity(
            nickname in proptest::option::of(".{0,300}"),
            capacity in 1usize..64,
        ) {
            let t = TestStore::with_config(|c| c.string_buffer_capacity = capacity);
            let person = Person::new("Ada", 36);
            t.add(&person);
            t.store.write(|_| person.set_nickname(nickname.as_deref())).unwrap();
            prop_assert_eq!(person.nickname().unwrap(), nickname);
        }
    }
}
