//! Strongly-typed identifiers for Hold entities
//!
//! Namespaces and cargoes are keyed by validated names, specs by UUID.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Longest accepted namespace or cargo name.
pub const MAX_NAME_LEN: usize = 63;

/// Separator between cargo name and namespace inside a [`CargoKey`].
const KEY_SEPARATOR: char = '.';

/// Returned when a namespace or cargo name is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} name `{name}`: {reason}")]
pub struct InvalidName {
    pub kind: &'static str,
    pub name: String,
    pub reason: &'static str,
}

/// Validate a user supplied name.
///
/// Names are 1..=63 ASCII alphanumerics, `-` or `_`. The `.` character is
/// reserved as the cargo key separator.
pub fn validate_name(kind: &'static str, name: &str) -> Result<(), InvalidName> {
    let reject = |reason| {
        Err(InvalidName {
            kind,
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return reject("must not be empty");
    }
    if name.len() > MAX_NAME_LEN {
        return reject("must be at most 63 characters");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return reject("only ascii alphanumerics, `-` and `_` are allowed");
    }
    Ok(())
}

/// Name of a namespace (primary key of the namespaces relation)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceName(String);

impl NamespaceName {
    /// Wrap a name without validation, e.g. when loading persisted rows.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Validate and wrap a caller supplied name.
    pub fn parse(name: impl Into<String>) -> Result<Self, InvalidName> {
        let name = name.into();
        validate_name("namespace", &name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NamespaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key of a cargo, stable for the cargo's lifetime.
///
/// Derived as `{name}.{namespace}`, which is unique because cargo names are
/// unique within a namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CargoKey(String);

impl CargoKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn from_parts(name: &str, namespace: &NamespaceName) -> Self {
        Self(format!("{name}{KEY_SEPARATOR}{namespace}"))
    }

    /// Split the key back into `(name, namespace)`.
    pub fn parts(&self) -> Option<(&str, &str)> {
        self.0.split_once(KEY_SEPARATOR)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CargoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Globally unique key of an immutable cargo spec. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecKey(Uuid);

impl SpecKey {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SpecKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SpecKey {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}
