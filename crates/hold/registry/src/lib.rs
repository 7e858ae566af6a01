//! Hold Registry - namespace and cargo registries
//!
//! The registries are the programmatic surface of Hold:
//!
//! - **NamespaceRegistry**: creates, lists and removes grouping boundaries
//! - **CargoRegistry**: creates cargoes, appends specs, repoints the active
//!   spec for rollback, and deletes cargoes with their history
//!
//! Both are thin façades over a [`hold_store::HoldStorage`] backend. They
//! validate input, log each write and transparently retry lost optimistic
//! races a bounded number of times.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod cargo;
pub mod config;
pub mod invariants;
pub mod namespace;

// Re-exports
pub use cargo::CargoRegistry;
pub use config::RegistryConfig;
pub use hold_store::{QueryWindow, StoreError, StoreResult};
pub use namespace::NamespaceRegistry;
