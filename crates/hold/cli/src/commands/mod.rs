//! CLI command implementations

pub mod cargo;
pub mod namespace;

use crate::error::{CliError, CliResult};
use hold_registry::{CargoRegistry, NamespaceRegistry};
use serde_json::Value;

/// Registries shared by every command.
pub struct Registries {
    pub namespaces: NamespaceRegistry,
    pub cargoes: CargoRegistry,
}

/// Parse a JSON document given inline or as `@path/to/file.json`.
pub(crate) fn parse_document(input: &str) -> CliResult<Value> {
    let contents = match input.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)?,
        None => input.to_string(),
    };
    serde_json::from_str(&contents).map_err(CliError::from)
}
