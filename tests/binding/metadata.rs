//! Metadata caching and schema generations
//!
//! Property names are resolved to native columns once per type and schema
//! generation; property access never looks columns up again.

use crate::common::*;
use chrono::{DateTime, Utc};
use std::rc::Rc;
use std::sync::Arc;
use tether::{Metadata, ObjectCore};

/// `Person` as seen by a newer build with an extra property
struct PersonV2 {
    core: ObjectCore,
}

impl Persistable for PersonV2 {
    const TABLE: &'static str = "Person";

    fn schema() -> Result<ObjectSchema> {
        ObjectSchema::builder::<Self>()
            .property::<String>("name")
            .property::<i64>("age")
            .property::<Option<String>>("nickname")
            .property::<Option<DateTime<Utc>>>("born")
            .link::<Dog>("dog")
            .link_list::<Dog>("dogs")
            .property::<Option<String>>("email")
            .build()
    }

    fn from_core(core: ObjectCore) -> Self {
        Self { core }
    }

    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn copy_to(&self, _row: &RowWriter<'_>) -> Result<()> {
        Ok(())
    }
}

/// `Person` with `age` declared as text
struct PersonTextAge {
    core: ObjectCore,
}

impl Persistable for PersonTextAge {
    const TABLE: &'static str = "Person";

    fn schema() -> Result<ObjectSchema> {
        ObjectSchema::builder::<Self>()
            .property::<String>("name")
            .property::<String>("age")
            .build()
    }

    fn from_core(core: ObjectCore) -> Self {
        Self { core }
    }

    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn copy_to(&self, _row: &RowWriter<'_>) -> Result<()> {
        Ok(())
    }
}

#[test]
fn test_property_access_does_not_resolve_columns() {
    let t = TestStore::new();
    let person = Person::new("Ada", 36);
    t.add(&person);

    let lookups = t.stats().column_lookups;
    for _ in 0..50 {
        person.name().unwrap();
        person.age().unwrap();
    }
    t.store
        .write(|_| person.set_age(37).and_then(|_| person.set_name("A")))
        .unwrap();
    assert_eq!(t.stats().column_lookups, lookups);
}

#[test]
fn test_new_facades_share_cached_metadata() {
    let t = TestStore::new();
    let person = Person::new("Ada", 36);
    t.add(&person);
    let key = person.row_key().unwrap();

    let lookups = t.stats().column_lookups;
    let facades: Vec<Rc<Person>> = (0..20)
        .map(|_| t.store.find::<Person>(key).unwrap().unwrap())
        .collect();
    assert_eq!(t.stats().column_lookups, lookups);

    let first: Arc<Metadata> = facades[0].core().metadata().unwrap();
    let last = facades[19].core().metadata().unwrap();
    assert!(Arc::ptr_eq(&first, &last));
}

#[test]
fn test_unknown_or_mistyped_property() {
    let t = TestStore::new();
    let person = Person::new("Ada", 36);
    t.add(&person);

    assert!(matches!(
        person.core().get::<String>("missing"),
        Err(Error::SchemaMismatch(_))
    ));
    assert!(matches!(
        person.core().get::<f64>("age"),
        Err(Error::SchemaMismatch(_))
    ));
    assert!(matches!(
        ObjectSchema::builder::<PersonV2>().property::<u64>("visits").build(),
        Err(Error::UnsupportedType { .. })
    ));
    assert!(matches!(
        person.core().get_link::<Person>("dog"),
        Err(Error::SchemaMismatch(_))
    ));
}

#[test]
fn test_peer_schema_change_bumps_generation() {
    let t = TestStore::new();
    let person = Person::new("Ada", 36);
    t.add(&person);
    let before = t.store.schema_generation();

    let schemas = SchemaSet::new()
        .register::<PersonV2>()
        .and_then(|s| s.register::<Dog>())
        .unwrap();
    let newer = Store::open(
        t.engine.clone(),
        BindingConfig::with_path(t.path.clone()),
        schemas,
    )
    .unwrap();
    assert!(newer.schema_generation() > before);

    // Old metadata keeps working until the next refresh
    assert_eq!(t.store.schema_generation(), before);
    assert_eq!(person.name().unwrap(), "Ada");

    let lookups = t.stats().column_lookups;
    t.store.refresh().unwrap();
    assert_eq!(t.store.schema_generation(), newer.schema_generation());
    assert!(t.stats().column_lookups > lookups);

    assert_eq!(person.name().unwrap(), "Ada");
    assert_eq!(
        person.core().metadata().unwrap().generation(),
        newer.schema_generation()
    );

    let mirrored = newer
        .find::<PersonV2>(person.row_key().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(
        mirrored.core().get::<Option<String>>("email").unwrap(),
        None
    );
}

#[test]
fn test_conflicting_declaration_fails_open() {
    let t = TestStore::new();
    let schemas = SchemaSet::new().register::<PersonTextAge>().unwrap();
    let result = Store::open(
        t.engine.clone(),
        BindingConfig::with_path(t.path.clone()),
        schemas,
    );
    assert!(matches!(result, Err(Error::SchemaMismatch(_))));
}

#[test]
fn test_link_to_unregistered_type_fails_open() {
    let t = TestStore::new();
    let schemas = SchemaSet::new().register::<Person>().unwrap();
    let result = Store::open(
        t.engine.clone(),
        BindingConfig::with_path(unique_path("partial")),
        schemas,
    );
    assert!(matches!(result, Err(Error::SchemaMismatch(_))));
}
