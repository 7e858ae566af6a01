use serde::{Deserialize, Serialize};

/// Registry tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// How many times an update that lost an optimistic race is retried
    /// before `VersionConflict` is surfaced to the caller.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
}

fn default_max_conflict_retries() -> u32 {
    5
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: default_max_conflict_retries(),
        }
    }
}

impl RegistryConfig {
    pub fn with_max_conflict_retries(max_conflict_retries: u32) -> Self {
        Self {
            max_conflict_retries,
        }
    }
}
