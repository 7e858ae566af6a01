//! Hold core types
//!
//! Shared vocabulary for the versioned cargo spec store:
//! - strongly-typed identifiers for namespaces, cargoes and specs
//! - the per-cargo spec version counter
//! - persisted records and the payloads callers submit

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

pub mod ids;
pub mod model;
pub mod version;

pub use ids::{validate_name, CargoKey, InvalidName, NamespaceName, SpecKey, MAX_NAME_LEN};
pub use model::{Cargo, CargoInspect, CargoSpec, CargoSpecPartial, Namespace};
pub use version::{InvalidVersion, SpecVersion};
