//! Binding Integration Test Suite
//!
//! End-to-end tests of the binding layer over the in-memory engine.
//!
//! ## Modules
//!
//! - **strings**: variable-length values across the buffer-growth boundary
//! - **handles**: handle lifetime, cascading release, removed rows
//! - **equality**: facade identity versus native row identity
//! - **notifications**: subscription lifecycle and delivery
//! - **metadata**: column resolution caching and schema generations
//! - **link_lists**: ordered to-many relationships
//! - **attach**: unmanaged-to-managed transitions and auto-attach depth
//! - **threading**: thread confinement and per-thread stores
//! - **config**: `tether.toml` driven store setup
//! - **scenario**: full object lifecycle
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test binding
//! ```

#[path = "../common/mod.rs"]
mod common;

mod config;
mod equality;
mod handles;
mod link_lists;
mod metadata;
mod notifications;
mod scenario;
mod strings;
mod threading;
