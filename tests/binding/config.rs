//! `tether.toml` driven setup

use crate::common::*;
use std::sync::Arc;
use tempfile::TempDir;
use tether::CONFIG_FILE_NAME;

#[test]
fn test_open_from_config_file() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join(CONFIG_FILE_NAME);
    let mut config = BindingConfig::with_path(unique_path("from-file"));
    config.string_buffer_capacity = 2;
    config.auto_refresh = false;
    config.write_to_file(&file).unwrap();

    let loaded = BindingConfig::from_file(&file).unwrap();
    assert_eq!(loaded, config);

    let store = Store::open(Arc::new(InMemoryEngine::new()), loaded, schemas()).unwrap();
    assert_eq!(store.config().string_buffer_capacity, 2);

    let person = Person::new("A name longer than two bytes", 1);
    store.write(|_| store.add(&person)).unwrap();
    assert_eq!(person.name().unwrap(), "A name longer than two bytes");
}

#[test]
fn test_default_file_is_written_once() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join(CONFIG_FILE_NAME);

    BindingConfig::write_default_if_missing(&file).unwrap();
    assert_eq!(
        BindingConfig::from_file(&file).unwrap(),
        BindingConfig::default()
    );

    std::fs::write(&file, "path = \"edited\"\n").unwrap();
    BindingConfig::write_default_if_missing(&file).unwrap();
    assert_eq!(BindingConfig::from_file(&file).unwrap().path, "edited");
}

#[test]
fn test_invalid_config_fails_open() {
    let mut config = BindingConfig::with_path(unique_path("invalid"));
    config.string_buffer_capacity = 0;
    let result = Store::open(Arc::new(InMemoryEngine::new()), config, schemas());
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_malformed_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&file, "string_buffer_capacity = \"lots\"\n").unwrap();
    assert!(matches!(
        BindingConfig::from_file(&file),
        Err(Error::Config(_))
    ));
}
