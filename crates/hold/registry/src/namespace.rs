//! Namespace registry

use hold_store::{HoldStorage, QueryWindow, StoreError, StoreResult};
use hold_types::{Namespace, NamespaceName};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Registry of namespaces, the grouping boundary for cargoes.
#[derive(Clone)]
pub struct NamespaceRegistry {
    storage: Arc<dyn HoldStorage>,
}

impl NamespaceRegistry {
    pub fn new(storage: Arc<dyn HoldStorage>) -> Self {
        Self { storage }
    }

    /// Create a namespace after validating its name.
    #[instrument(skip(self, name), fields(namespace = %name))]
    pub async fn create(&self, name: &str) -> StoreResult<Namespace> {
        let name = NamespaceName::parse(name)?;
        let namespace = self.storage.create_namespace(&name).await?;
        info!(namespace = %namespace.name, "Namespace created");
        Ok(namespace)
    }

    pub async fn get(&self, name: &NamespaceName) -> StoreResult<Namespace> {
        debug!(namespace = %name, "Fetching namespace");
        self.storage
            .get_namespace(name)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("namespace {name}")))
    }

    pub async fn list(&self, window: QueryWindow) -> StoreResult<Vec<Namespace>> {
        self.storage.list_namespaces(window).await
    }

    /// Remove a namespace. Blocked with `InUse` while cargoes reference it.
    #[instrument(skip(self, name), fields(namespace = %name))]
    pub async fn delete(&self, name: &NamespaceName) -> StoreResult<()> {
        self.storage.delete_namespace(name).await?;
        info!(namespace = %name, "Namespace deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hold_store::{CargoStore, InMemoryHoldStorage, NewCargo};
    use hold_types::CargoSpecPartial;

    fn registry() -> (Arc<InMemoryHoldStorage>, NamespaceRegistry) {
        let storage = Arc::new(InMemoryHoldStorage::new());
        let registry = NamespaceRegistry::new(storage.clone());
        (storage, registry)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (_, registry) = registry();
        let created = registry.create("demo").await.unwrap();
        let fetched = registry.get(&created.name).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_duplicate_is_rejected() {
        let (_, registry) = registry();
        registry.create("demo").await.unwrap();
        let err = registry.create("demo").await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_invalid_name_is_rejected() {
        let (_, registry) = registry();
        let err = registry.create("has.dot").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
        assert!(registry.list(QueryWindow::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_namespace_is_not_found() {
        let (_, registry) = registry();
        let err = registry
            .get(&NamespaceName::new("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_namespace_is_not_found() {
        let (_, registry) = registry();
        let ghost = NamespaceName::new("ghost");
        let get = registry.get(&ghost).await.unwrap_err();
        let delete = registry.delete(&ghost).await.unwrap_err();
        assert!(matches!(get, StoreError::NotFound(_)));
        assert!(matches!(delete, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_blocked_while_in_use() {
        let (storage, registry) = registry();
        let namespace = registry.create("demo").await.unwrap();
        storage
            .create_cargo(NewCargo {
                name: "web".to_string(),
                namespace: namespace.name.clone(),
                spec: CargoSpecPartial::new(serde_json::json!({"image": "nginx"})),
            })
            .await
            .unwrap();

        let err = registry.delete(&namespace.name).await.unwrap_err();
        assert!(matches!(err, StoreError::InUse(_)));
        assert!(registry.get(&namespace.name).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_paged() {
        let (_, registry) = registry();
        for name in ["gamma", "alpha", "beta"] {
            registry.create(name).await.unwrap();
        }

        let all: Vec<_> = registry
            .list(QueryWindow::all())
            .await
            .unwrap()
            .into_iter()
            .map(|ns| ns.name.to_string())
            .collect();
        assert_eq!(all, vec!["alpha", "beta", "gamma"]);

        let page = registry.list(QueryWindow::page(1, 1)).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].name.as_str(), "beta");
    }
}
