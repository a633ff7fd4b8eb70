//! Shared test utilities for the integration test suites.
//!
//! Import via `mod common;` from any test's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use chrono::{DateTime, TimeZone, Utc};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};
pub use tether::{
    BindingConfig, EngineStats, Error, HandleKind, InMemoryEngine, NativeErrorKind, ObjectCore,
    ObjectSchema, Observable, Persistable, Result, RowWriter, SchemaSet, Store, Value,
};

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route binding logs to the test writer. Safe to call from every test.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique store path per call
pub fn unique_path(prefix: &str) -> String {
    format!("{}-{}", prefix, COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Fixed point in time at whole-second precision
pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).single().unwrap()
}

// ============================================================================
// Facades
// ============================================================================

/// Field values of a person before it is added to a store
#[derive(Default)]
pub struct PersonDraft {
    pub name: String,
    pub age: i64,
    pub nickname: Option<String>,
    pub born: Option<DateTime<Utc>>,
    pub dog: Option<Rc<Dog>>,
    pub dogs: Vec<Rc<Dog>>,
}

pub struct Person {
    core: ObjectCore,
    draft: PersonDraft,
}

impl Person {
    pub fn new(name: &str, age: i64) -> Rc<Self> {
        Self::from_draft(PersonDraft {
            name: name.to_string(),
            age,
            ..PersonDraft::default()
        })
    }

    pub fn from_draft(draft: PersonDraft) -> Rc<Self> {
        Rc::new(Self {
            core: ObjectCore::new(),
            draft,
        })
    }

    pub fn name(&self) -> Result<String> {
        self.core.get("name")
    }

    pub fn set_name(&self, name: &str) -> Result<()> {
        self.core.set("name", name.to_string())
    }

    pub fn age(&self) -> Result<i64> {
        self.core.get("age")
    }

    pub fn set_age(&self, age: i64) -> Result<()> {
        self.core.set("age", age)
    }

    pub fn nickname(&self) -> Result<Option<String>> {
        self.core.get("nickname")
    }

    pub fn set_nickname(&self, nickname: Option<&str>) -> Result<()> {
        self.core.set("nickname", nickname.map(str::to_string))
    }

    pub fn dog(&self) -> Result<Option<Rc<Dog>>> {
        self.core.get_link("dog")
    }

    pub fn set_dog(&self, dog: Option<&Rc<Dog>>) -> Result<()> {
        self.core.set_link("dog", dog)
    }

    pub fn dogs(&self) -> Result<tether::LinkList<Dog>> {
        self.core.get_list("dogs")
    }
}

impl Persistable for Person {
    const TABLE: &'static str = "Person";

    fn schema() -> Result<ObjectSchema> {
        ObjectSchema::builder::<Self>()
            .property::<String>("name")
            .property::<i64>("age")
            .property::<Option<String>>("nickname")
            .property::<Option<DateTime<Utc>>>("born")
            .link::<Dog>("dog")
            .link_list::<Dog>("dogs")
            .build()
    }

    fn from_core(core: ObjectCore) -> Self {
        Self {
            core,
            draft: PersonDraft::default(),
        }
    }

    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn copy_to(&self, row: &RowWriter<'_>) -> Result<()> {
        row.set("name", self.draft.name.clone())?;
        row.set("age", self.draft.age)?;
        row.set("nickname", self.draft.nickname.clone())?;
        row.set("born", self.draft.born)?;
        if let Some(dog) = &self.draft.dog {
            row.set_link("dog", Some(dog))?;
        }
        row.extend_list("dogs", &self.draft.dogs)
    }
}

pub struct Dog {
    core: ObjectCore,
    name: String,
    photo: Vec<u8>,
    buddy: Option<Rc<Dog>>,
}

impl Dog {
    pub fn new(name: &str) -> Rc<Self> {
        Rc::new(Self {
            core: ObjectCore::new(),
            name: name.to_string(),
            photo: Vec::new(),
            buddy: None,
        })
    }

    pub fn with_buddy(name: &str, buddy: Rc<Dog>) -> Rc<Self> {
        Rc::new(Self {
            core: ObjectCore::new(),
            name: name.to_string(),
            photo: Vec::new(),
            buddy: Some(buddy),
        })
    }

    pub fn name(&self) -> Result<String> {
        self.core.get("name")
    }

    pub fn set_name(&self, name: &str) -> Result<()> {
        self.core.set("name", name.to_string())
    }

    pub fn photo(&self) -> Result<Vec<u8>> {
        self.core.get("photo")
    }

    pub fn buddy(&self) -> Result<Option<Rc<Dog>>> {
        self.core.get_link("buddy")
    }
}

impl Persistable for Dog {
    const TABLE: &'static str = "Dog";

    fn schema() -> Result<ObjectSchema> {
        ObjectSchema::builder::<Self>()
            .property::<String>("name")
            .property::<Vec<u8>>("photo")
            .link::<Dog>("buddy")
            .build()
    }

    fn from_core(core: ObjectCore) -> Self {
        Self {
            core,
            name: String::new(),
            photo: Vec::new(),
            buddy: None,
        }
    }

    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn copy_to(&self, row: &RowWriter<'_>) -> Result<()> {
        row.set("name", self.name.clone())?;
        row.set("photo", self.photo.clone())?;
        row.set_link("buddy", self.buddy.as_ref())
    }
}

pub fn schemas() -> SchemaSet {
    SchemaSet::new()
        .register::<Person>()
        .and_then(|s| s.register::<Dog>())
        .unwrap()
}

// ============================================================================
// TestStore
// ============================================================================

/// Store on a fresh path of a private in-memory engine
pub struct TestStore {
    pub engine: Arc<InMemoryEngine>,
    pub store: Store,
    pub path: String,
}

impl TestStore {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(configure: impl FnOnce(&mut BindingConfig)) -> Self {
        init_tracing();
        let engine = Arc::new(InMemoryEngine::new());
        let path = unique_path("test");
        let mut config = BindingConfig::with_path(path.clone());
        configure(&mut config);
        let store = Store::open(engine.clone(), config, schemas()).unwrap();
        Self {
            engine,
            store,
            path,
        }
    }

    /// Second store on the same path and engine
    pub fn open_peer(&self) -> Store {
        Store::open(
            self.engine.clone(),
            BindingConfig::with_path(self.path.clone()),
            schemas(),
        )
        .unwrap()
    }

    pub fn stats(&self) -> EngineStats {
        self.engine.stats()
    }

    /// Add `object` in its own write scope
    pub fn add<T: Persistable>(&self, object: &Rc<T>) {
        self.store.write(|_| self.store.add(object)).unwrap();
    }
}
