//! Hold storage layer.
//!
//! This crate defines the storage contract for versioned cargo specs:
//! - namespaces (pure grouping boundaries)
//! - append-only, immutable cargo specs tagged with per-cargo versions
//! - cargoes and the pointer to their active spec
//!
//! Design stance:
//! - The backing store is the only authority; nothing here caches state.
//! - Multi-step writes are one transaction per trait call.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod resolver;
mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryHoldStorage;
pub use traits::{CargoStore, HoldStorage, NamespaceStore, NewCargo, QueryWindow, SpecStore};
