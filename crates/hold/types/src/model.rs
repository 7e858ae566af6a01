use crate::ids::{CargoKey, NamespaceName, SpecKey};
use crate::version::SpecVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Isolation boundary grouping cargoes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub name: NamespaceName,
    pub created_at: DateTime<Utc>,
}

/// Immutable, versioned configuration snapshot of one cargo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CargoSpec {
    pub key: SpecKey,
    pub created_at: DateTime<Utc>,
    pub cargo_key: CargoKey,
    pub version: SpecVersion,
    /// Opaque configuration payload, schema owned by the caller.
    pub data: Value,
    /// Caller-defined annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Payload used to create a new spec. Key, version and timestamp are
/// assigned by storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CargoSpecPartial {
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl CargoSpecPartial {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A named, namespaced workload and the pointer to its active spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cargo {
    pub key: CargoKey,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub namespace_name: NamespaceName,
    /// Active spec. The only field that changes after creation.
    pub spec_key: SpecKey,
}

/// A cargo together with its resolved active spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CargoInspect {
    pub cargo: Cargo,
    pub spec: CargoSpec,
}
