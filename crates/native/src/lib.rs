//! Native engine interface for Tether
//!
//! This crate provides:
//! - [`NativeEngine`]: the handle-based function surface the binding layer consumes
//! - [`InMemoryEngine`]: an in-process engine implementing that surface
//!
//! The binding layer never touches engine internals; everything goes through
//! the trait, with errors reported via [`ErrorDescriptor`](tether_core::ErrorDescriptor).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod memory;

pub use engine::NativeEngine;
pub use memory::{EngineStats, InMemoryEngine};
