//! Cargo registry
//!
//! Owns the lifecycle of cargoes: creation with a first spec, updates that
//! append a new spec and repoint the cargo, rollback to an existing spec of
//! the cargo's own history, and deletion together with that history.
//!
//! Every multi-step write is delegated to a single storage call so the
//! backend can run it as one transaction. The registry never caches cargo
//! state; each retry re-reads the active spec from storage.

use crate::config::RegistryConfig;
use hold_store::{HoldStorage, NewCargo, QueryWindow, StoreError, StoreResult};
use hold_types::{
    validate_name, Cargo, CargoInspect, CargoKey, CargoSpec, CargoSpecPartial, NamespaceName,
    SpecKey, SpecVersion,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Registry of cargoes and their versioned specs.
#[derive(Clone)]
pub struct CargoRegistry {
    storage: Arc<dyn HoldStorage>,
    config: RegistryConfig,
}

impl CargoRegistry {
    pub fn new(storage: Arc<dyn HoldStorage>, config: RegistryConfig) -> Self {
        Self { storage, config }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // ========== Writes ==========

    /// Create a cargo in `namespace` with its first spec active.
    #[instrument(skip(self, name, namespace, spec), fields(namespace = %namespace, name = %name))]
    pub async fn create(
        &self,
        name: &str,
        namespace: &NamespaceName,
        spec: CargoSpecPartial,
    ) -> StoreResult<CargoInspect> {
        validate_name("cargo", name)?;

        let inspect = self
            .storage
            .create_cargo(NewCargo {
                name: name.to_string(),
                namespace: namespace.clone(),
                spec,
            })
            .await?;

        info!(
            cargo = %inspect.cargo.key,
            version = %inspect.spec.version,
            "Cargo created"
        );
        Ok(inspect)
    }

    /// Append a new spec and make it active.
    ///
    /// Lost optimistic races are retried up to `max_conflict_retries` times,
    /// each time against a freshly read active spec.
    #[instrument(skip(self, key, spec), fields(cargo = %key))]
    pub async fn update(&self, key: &CargoKey, spec: CargoSpecPartial) -> StoreResult<CargoInspect> {
        let mut attempt: u32 = 0;
        loop {
            let current = self.require_cargo(key).await?;
            match self
                .storage
                .update_cargo(key, &current.spec_key, spec.clone())
                .await
            {
                Ok(inspect) => {
                    info!(
                        cargo = %key,
                        version = %inspect.spec.version,
                        attempts = attempt + 1,
                        "Cargo updated"
                    );
                    return Ok(inspect);
                }
                Err(err) if err.is_retryable() && attempt < self.config.max_conflict_retries => {
                    attempt += 1;
                    warn!(
                        cargo = %key,
                        attempt,
                        max = self.config.max_conflict_retries,
                        error = %err,
                        "Update lost a concurrent race, retrying"
                    );
                    tokio::task::yield_now().await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Repoint the cargo at an existing spec of its own history.
    ///
    /// No spec is created and the version counter does not advance.
    #[instrument(skip(self, key, target), fields(cargo = %key, spec = %target))]
    pub async fn rollback(&self, key: &CargoKey, target: &SpecKey) -> StoreResult<CargoInspect> {
        let inspect = self.storage.set_active_spec(key, target).await?;
        info!(
            cargo = %key,
            version = %inspect.spec.version,
            "Cargo rolled back"
        );
        Ok(inspect)
    }

    /// Roll back to the spec carrying `version`.
    #[instrument(skip(self, key, version), fields(cargo = %key, version = %version))]
    pub async fn rollback_to_version(
        &self,
        key: &CargoKey,
        version: &SpecVersion,
    ) -> StoreResult<CargoInspect> {
        let target = self.get_spec_version(key, version).await?;
        self.rollback(key, &target.key).await
    }

    /// Delete the cargo and its whole spec history.
    #[instrument(skip(self, key), fields(cargo = %key))]
    pub async fn delete(&self, key: &CargoKey) -> StoreResult<Cargo> {
        let cargo = self.storage.delete_cargo(key).await?;
        info!(cargo = %key, "Cargo deleted");
        Ok(cargo)
    }

    // ========== Reads ==========

    /// Cargo together with its active spec.
    pub async fn get(&self, key: &CargoKey) -> StoreResult<CargoInspect> {
        debug!(cargo = %key, "Inspecting cargo");
        self.storage
            .inspect_cargo(key)
            .await?
            .ok_or_else(|| StoreError::cargo_not_found(key))
    }

    pub async fn get_active_spec(&self, key: &CargoKey) -> StoreResult<CargoSpec> {
        Ok(self.get(key).await?.spec)
    }

    pub async fn get_spec(&self, spec_key: &SpecKey) -> StoreResult<CargoSpec> {
        self.storage
            .get_spec(spec_key)
            .await?
            .ok_or_else(|| StoreError::spec_not_found(spec_key))
    }

    pub async fn get_spec_version(
        &self,
        key: &CargoKey,
        version: &SpecVersion,
    ) -> StoreResult<CargoSpec> {
        self.require_cargo(key).await?;
        self.storage
            .get_spec_version(key, version)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("version {version} of cargo {key}")))
    }

    /// Spec history of a cargo, oldest first.
    pub async fn list_spec_history(
        &self,
        key: &CargoKey,
        window: QueryWindow,
    ) -> StoreResult<Vec<CargoSpec>> {
        debug!(cargo = %key, limit = window.limit, offset = window.offset, "Listing history");
        self.storage.list_spec_history(key, window).await
    }

    /// Cargoes of one namespace ordered by name.
    pub async fn list(
        &self,
        namespace: &NamespaceName,
        window: QueryWindow,
    ) -> StoreResult<Vec<Cargo>> {
        if self.storage.get_namespace(namespace).await?.is_none() {
            return Err(StoreError::NamespaceNotFound(namespace.clone()));
        }
        self.storage.list_cargoes(namespace, window).await
    }

    async fn require_cargo(&self, key: &CargoKey) -> StoreResult<Cargo> {
        self.storage
            .get_cargo(key)
            .await?
            .ok_or_else(|| StoreError::cargo_not_found(key))
    }
}
