//! In-memory reference implementation of the Hold storage traits.
//!
//! All state sits behind a single async `RwLock`: every write method holds the
//! write guard for its whole duration, which makes it one atomic unit. Deterministic
//! and test-friendly; production deployments should use the PostgreSQL backend.

use crate::resolver::{latest_spec, resolve_next};
use crate::traits::{CargoStore, NamespaceStore, NewCargo, QueryWindow, SpecStore};
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use hold_types::{
    validate_name, Cargo, CargoInspect, CargoKey, CargoSpec, CargoSpecPartial, Namespace,
    NamespaceName, SpecKey, SpecVersion,
};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct State {
    namespaces: BTreeMap<NamespaceName, Namespace>,
    cargoes: BTreeMap<CargoKey, Cargo>,
    specs: HashMap<SpecKey, CargoSpec>,
    /// Spec keys per cargo in creation order.
    history: HashMap<CargoKey, Vec<SpecKey>>,
}

impl State {
    fn history_of<'a>(&'a self, cargo_key: &CargoKey) -> impl Iterator<Item = &'a CargoSpec> + 'a {
        self.history
            .get(cargo_key)
            .into_iter()
            .flatten()
            .filter_map(|key| self.specs.get(key))
    }

    fn append_spec(
        &mut self,
        cargo_key: &CargoKey,
        partial: CargoSpecPartial,
    ) -> StoreResult<CargoSpec> {
        let next = resolve_next(latest_spec(self.history_of(cargo_key)), Utc::now())?;
        let spec = CargoSpec {
            key: SpecKey::generate(),
            created_at: next.created_at,
            cargo_key: cargo_key.clone(),
            version: next.version,
            data: partial.data,
            metadata: partial.metadata,
        };
        self.history
            .entry(cargo_key.clone())
            .or_default()
            .push(spec.key);
        self.specs.insert(spec.key, spec.clone());
        Ok(spec)
    }

    fn inspect(&self, key: &CargoKey) -> StoreResult<Option<CargoInspect>> {
        let Some(cargo) = self.cargoes.get(key) else {
            return Ok(None);
        };
        let spec = self.specs.get(&cargo.spec_key).ok_or_else(|| {
            StoreError::InvariantViolation(format!(
                "cargo {} points at missing spec {}",
                key, cargo.spec_key
            ))
        })?;
        Ok(Some(CargoInspect {
            cargo: cargo.clone(),
            spec: spec.clone(),
        }))
    }
}

/// In-memory Hold storage adapter.
#[derive(Debug, Default)]
pub struct InMemoryHoldStorage {
    state: RwLock<State>,
}

impl InMemoryHoldStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of specs held across all cargoes.
    pub async fn spec_count(&self) -> usize {
        self.state.read().await.specs.len()
    }
}

#[async_trait]
impl NamespaceStore for InMemoryHoldStorage {
    async fn create_namespace(&self, name: &NamespaceName) -> StoreResult<Namespace> {
        let mut state = self.state.write().await;
        if state.namespaces.contains_key(name) {
            return Err(StoreError::AlreadyExists(format!("namespace {name}")));
        }
        let namespace = Namespace {
            name: name.clone(),
            created_at: Utc::now(),
        };
        state.namespaces.insert(name.clone(), namespace.clone());
        Ok(namespace)
    }

    async fn get_namespace(&self, name: &NamespaceName) -> StoreResult<Option<Namespace>> {
        let state = self.state.read().await;
        Ok(state.namespaces.get(name).cloned())
    }

    async fn list_namespaces(&self, window: QueryWindow) -> StoreResult<Vec<Namespace>> {
        let state = self.state.read().await;
        Ok(window.apply(state.namespaces.values().cloned().collect()))
    }

    async fn delete_namespace(&self, name: &NamespaceName) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if !state.namespaces.contains_key(name) {
            return Err(StoreError::NotFound(format!("namespace {name}")));
        }
        let referencing = state
            .cargoes
            .values()
            .filter(|cargo| &cargo.namespace_name == name)
            .count();
        if referencing > 0 {
            return Err(StoreError::InUse(format!(
                "namespace {name} is referenced by {referencing} cargo(es)"
            )));
        }
        state.namespaces.remove(name);
        Ok(())
    }
}

#[async_trait]
impl SpecStore for InMemoryHoldStorage {
    async fn create_spec(
        &self,
        cargo_key: &CargoKey,
        spec: CargoSpecPartial,
    ) -> StoreResult<CargoSpec> {
        let mut state = self.state.write().await;
        if !state.cargoes.contains_key(cargo_key) {
            return Err(StoreError::cargo_not_found(cargo_key));
        }
        state.append_spec(cargo_key, spec)
    }

    async fn get_spec(&self, key: &SpecKey) -> StoreResult<Option<CargoSpec>> {
        let state = self.state.read().await;
        Ok(state.specs.get(key).cloned())
    }

    async fn get_spec_version(
        &self,
        cargo_key: &CargoKey,
        version: &SpecVersion,
    ) -> StoreResult<Option<CargoSpec>> {
        let state = self.state.read().await;
        let spec = state
            .history_of(cargo_key)
            .find(|spec| &spec.version == version)
            .cloned();
        Ok(spec)
    }

    async fn list_spec_history(
        &self,
        cargo_key: &CargoKey,
        window: QueryWindow,
    ) -> StoreResult<Vec<CargoSpec>> {
        let state = self.state.read().await;
        if !state.cargoes.contains_key(cargo_key) {
            return Err(StoreError::cargo_not_found(cargo_key));
        }
        let mut history = state.history_of(cargo_key).cloned().collect::<Vec<_>>();
        history.sort_by(|a, b| (a.created_at, a.version).cmp(&(b.created_at, b.version)));
        Ok(window.apply(history))
    }
}

#[async_trait]
impl CargoStore for InMemoryHoldStorage {
    async fn create_cargo(&self, cargo: NewCargo) -> StoreResult<CargoInspect> {
        validate_name("cargo", &cargo.name)?;
        let mut state = self.state.write().await;

        if !state.namespaces.contains_key(&cargo.namespace) {
            return Err(StoreError::NamespaceNotFound(cargo.namespace));
        }
        let key = CargoKey::from_parts(&cargo.name, &cargo.namespace);
        if state.cargoes.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!(
                "cargo {} in namespace {}",
                cargo.name, cargo.namespace
            )));
        }

        // Nothing below can fail once the first spec is appended, so the
        // write guard never exposes a cargo without an active spec.
        let spec = state.append_spec(&key, cargo.spec)?;
        let record = Cargo {
            key: key.clone(),
            created_at: spec.created_at,
            name: cargo.name,
            namespace_name: cargo.namespace,
            spec_key: spec.key,
        };
        state.cargoes.insert(key, record.clone());
        Ok(CargoInspect {
            cargo: record,
            spec,
        })
    }

    async fn update_cargo(
        &self,
        key: &CargoKey,
        expected_spec_key: &SpecKey,
        spec: CargoSpecPartial,
    ) -> StoreResult<CargoInspect> {
        let mut state = self.state.write().await;
        let current = state
            .cargoes
            .get(key)
            .map(|cargo| cargo.spec_key)
            .ok_or_else(|| StoreError::cargo_not_found(key))?;
        if &current != expected_spec_key {
            return Err(StoreError::VersionConflict(format!(
                "cargo {key} moved from spec {expected_spec_key} to {current}"
            )));
        }

        let spec = state.append_spec(key, spec)?;
        let cargo = state
            .cargoes
            .get_mut(key)
            .ok_or_else(|| StoreError::cargo_not_found(key))?;
        cargo.spec_key = spec.key;
        Ok(CargoInspect {
            cargo: cargo.clone(),
            spec,
        })
    }

    async fn set_active_spec(
        &self,
        key: &CargoKey,
        spec_key: &SpecKey,
    ) -> StoreResult<CargoInspect> {
        let mut state = self.state.write().await;
        if !state.cargoes.contains_key(key) {
            return Err(StoreError::cargo_not_found(key));
        }
        let spec = state
            .specs
            .get(spec_key)
            .cloned()
            .ok_or_else(|| StoreError::spec_not_found(spec_key))?;
        if &spec.cargo_key != key {
            return Err(StoreError::SpecMismatch {
                spec_key: *spec_key,
                cargo_key: key.clone(),
                owner: spec.cargo_key,
            });
        }

        let cargo = state
            .cargoes
            .get_mut(key)
            .ok_or_else(|| StoreError::cargo_not_found(key))?;
        cargo.spec_key = spec.key;
        Ok(CargoInspect {
            cargo: cargo.clone(),
            spec,
        })
    }

    async fn delete_cargo(&self, key: &CargoKey) -> StoreResult<Cargo> {
        let mut state = self.state.write().await;
        let cargo = state
            .cargoes
            .remove(key)
            .ok_or_else(|| StoreError::cargo_not_found(key))?;
        let history = state.history.remove(key).unwrap_or_default();
        for spec_key in history {
            state.specs.remove(&spec_key);
        }
        Ok(cargo)
    }

    async fn get_cargo(&self, key: &CargoKey) -> StoreResult<Option<Cargo>> {
        let state = self.state.read().await;
        Ok(state.cargoes.get(key).cloned())
    }

    async fn inspect_cargo(&self, key: &CargoKey) -> StoreResult<Option<CargoInspect>> {
        let state = self.state.read().await;
        state.inspect(key)
    }

    async fn list_cargoes(
        &self,
        namespace: &NamespaceName,
        window: QueryWindow,
    ) -> StoreResult<Vec<Cargo>> {
        let state = self.state.read().await;
        let mut cargoes = state
            .cargoes
            .values()
            .filter(|cargo| &cargo.namespace_name == namespace)
            .cloned()
            .collect::<Vec<_>>();
        cargoes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(window.apply(cargoes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn storage_with_namespace(name: &str) -> (InMemoryHoldStorage, NamespaceName) {
        let storage = InMemoryHoldStorage::new();
        let namespace = NamespaceName::parse(name).unwrap();
        storage.create_namespace(&namespace).await.unwrap();
        (storage, namespace)
    }

    fn new_cargo(name: &str, namespace: &NamespaceName, data: serde_json::Value) -> NewCargo {
        NewCargo {
            name: name.to_string(),
            namespace: namespace.clone(),
            spec: CargoSpecPartial::new(data),
        }
    }

    #[tokio::test]
    async fn test_duplicate_namespace_rejected() {
        let (storage, namespace) = storage_with_namespace("demo").await;
        let err = storage.create_namespace(&namespace).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_create_cargo_points_at_first_spec() {
        let (storage, namespace) = storage_with_namespace("demo").await;
        let created = storage
            .create_cargo(new_cargo("web", &namespace, json!({"image": "nginx"})))
            .await
            .unwrap();

        assert_eq!(created.cargo.key.as_str(), "web.demo");
        assert_eq!(created.cargo.spec_key, created.spec.key);
        assert_eq!(created.spec.version, SpecVersion::FIRST);
        assert_eq!(created.spec.cargo_key, created.cargo.key);
    }

    #[tokio::test]
    async fn test_create_cargo_requires_namespace() {
        let storage = InMemoryHoldStorage::new();
        let missing = NamespaceName::new("ghost");
        let err = storage
            .create_cargo(new_cargo("web", &missing, json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NamespaceNotFound(_)));
        assert_eq!(storage.spec_count().await, 0);
    }

    #[tokio::test]
    async fn test_create_cargo_rejects_bad_name() {
        let (storage, namespace) = storage_with_namespace("demo").await;
        let err = storage
            .create_cargo(new_cargo("web.v2", &namespace, json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_duplicate_cargo_leaves_no_orphan_spec() {
        let (storage, namespace) = storage_with_namespace("demo").await;
        storage
            .create_cargo(new_cargo("web", &namespace, json!({})))
            .await
            .unwrap();
        let err = storage
            .create_cargo(new_cargo("web", &namespace, json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(storage.spec_count().await, 1);
    }

    #[tokio::test]
    async fn test_stale_update_is_a_version_conflict() {
        let (storage, namespace) = storage_with_namespace("demo").await;
        let created = storage
            .create_cargo(new_cargo("web", &namespace, json!({"v": 1})))
            .await
            .unwrap();
        let key = created.cargo.key.clone();

        storage
            .update_cargo(&key, &created.spec.key, CargoSpecPartial::new(json!({"v": 2})))
            .await
            .unwrap();
        let err = storage
            .update_cargo(&key, &created.spec.key, CargoSpecPartial::new(json!({"v": 3})))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        let history = storage.list_spec_history(&key, QueryWindow::all()).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_create_spec_does_not_move_pointer() {
        let (storage, namespace) = storage_with_namespace("demo").await;
        let created = storage
            .create_cargo(new_cargo("web", &namespace, json!({"v": 1})))
            .await
            .unwrap();
        let key = created.cargo.key.clone();

        let spec = storage
            .create_spec(&key, CargoSpecPartial::new(json!({"v": 2})))
            .await
            .unwrap();
        assert_eq!(spec.version.get(), 2);

        let cargo = storage.get_cargo(&key).await.unwrap().unwrap();
        assert_eq!(cargo.spec_key, created.spec.key);
    }

    #[tokio::test]
    async fn test_create_spec_for_missing_cargo() {
        let storage = InMemoryHoldStorage::new();
        let err = storage
            .create_spec(&CargoKey::new("web.demo"), CargoSpecPartial::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_set_active_spec_rejects_foreign_spec() {
        let (storage, namespace) = storage_with_namespace("demo").await;
        let web = storage
            .create_cargo(new_cargo("web", &namespace, json!({})))
            .await
            .unwrap();
        let db = storage
            .create_cargo(new_cargo("db", &namespace, json!({})))
            .await
            .unwrap();

        let err = storage
            .set_active_spec(&web.cargo.key, &db.spec.key)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SpecMismatch { .. }));
    }

    #[tokio::test]
    async fn test_delete_cargo_cascades_history() {
        let (storage, namespace) = storage_with_namespace("demo").await;
        let created = storage
            .create_cargo(new_cargo("web", &namespace, json!({})))
            .await
            .unwrap();
        let key = created.cargo.key.clone();
        storage
            .update_cargo(&key, &created.spec.key, CargoSpecPartial::default())
            .await
            .unwrap();

        storage.delete_cargo(&key).await.unwrap();

        assert_eq!(storage.spec_count().await, 0);
        assert!(storage.get_spec(&created.spec.key).await.unwrap().is_none());
        let err = storage
            .list_spec_history(&key, QueryWindow::all())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_namespace_in_use() {
        let (storage, namespace) = storage_with_namespace("demo").await;
        let created = storage
            .create_cargo(new_cargo("web", &namespace, json!({})))
            .await
            .unwrap();

        let err = storage.delete_namespace(&namespace).await.unwrap_err();
        assert!(matches!(err, StoreError::InUse(_)));

        storage.delete_cargo(&created.cargo.key).await.unwrap();
        storage.delete_namespace(&namespace).await.unwrap();
        assert!(storage.get_namespace(&namespace).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_spec_version_finds_exact_version() {
        let (storage, namespace) = storage_with_namespace("demo").await;
        let created = storage
            .create_cargo(new_cargo("web", &namespace, json!({"v": 1})))
            .await
            .unwrap();
        let key = created.cargo.key.clone();
        let updated = storage
            .update_cargo(&key, &created.spec.key, CargoSpecPartial::new(json!({"v": 2})))
            .await
            .unwrap();

        let first = storage.get_spec_version(&key, &SpecVersion::FIRST).await.unwrap();
        assert_eq!(first, Some(created.spec));
        let second = storage
            .get_spec_version(&key, &SpecVersion::new(2).unwrap())
            .await
            .unwrap();
        assert_eq!(second, Some(updated.spec));
        let missing = storage
            .get_spec_version(&key, &SpecVersion::new(3).unwrap())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_namespace() {
        let storage = InMemoryHoldStorage::new();
        let err = storage
            .delete_namespace(&NamespaceName::new("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_cargoes_is_scoped_and_sorted() {
        let (storage, demo) = storage_with_namespace("demo").await;
        let other = NamespaceName::parse("other").unwrap();
        storage.create_namespace(&other).await.unwrap();

        for (name, namespace) in [("web", &demo), ("api", &demo), ("web", &other)] {
            storage
                .create_cargo(new_cargo(name, namespace, json!({})))
                .await
                .unwrap();
        }

        let names = storage
            .list_cargoes(&demo, QueryWindow::all())
            .await
            .unwrap()
            .into_iter()
            .map(|cargo| cargo.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["api", "web"]);
    }
}
