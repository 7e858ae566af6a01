use crate::StoreResult;
use async_trait::async_trait;
use hold_types::{
    Cargo, CargoInspect, CargoKey, CargoSpec, CargoSpecPartial, Namespace, NamespaceName, SpecKey,
    SpecVersion,
};

/// Generic query window for paged reads. A zero limit means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl QueryWindow {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn page(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    pub(crate) fn apply<T>(self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        if self.limit == 0 {
            iter.collect()
        } else {
            iter.take(self.limit).collect()
        }
    }
}

/// Payload for creating a cargo together with its first spec.
#[derive(Debug, Clone)]
pub struct NewCargo {
    pub name: String,
    pub namespace: NamespaceName,
    pub spec: CargoSpecPartial,
}

/// Storage interface for namespaces.
#[async_trait]
pub trait NamespaceStore: Send + Sync {
    /// Insert a namespace. Fails with `AlreadyExists` if the name is taken.
    async fn create_namespace(&self, name: &NamespaceName) -> StoreResult<Namespace>;

    async fn get_namespace(&self, name: &NamespaceName) -> StoreResult<Option<Namespace>>;

    /// List namespaces ordered by name.
    async fn list_namespaces(&self, window: QueryWindow) -> StoreResult<Vec<Namespace>>;

    /// Remove a namespace. Fails with `InUse` while any cargo references it.
    async fn delete_namespace(&self, name: &NamespaceName) -> StoreResult<()>;
}

/// Append-only storage for immutable cargo specs.
#[async_trait]
pub trait SpecStore: Send + Sync {
    /// Persist a new spec for an existing cargo under the next version.
    ///
    /// Version resolution and insert happen in the same atomic unit. The
    /// cargo's active spec is not changed.
    async fn create_spec(
        &self,
        cargo_key: &CargoKey,
        spec: CargoSpecPartial,
    ) -> StoreResult<CargoSpec>;

    async fn get_spec(&self, key: &SpecKey) -> StoreResult<Option<CargoSpec>>;

    async fn get_spec_version(
        &self,
        cargo_key: &CargoKey,
        version: &SpecVersion,
    ) -> StoreResult<Option<CargoSpec>>;

    /// Specs of one cargo, oldest first. Fails with `NotFound` if the cargo
    /// does not exist.
    async fn list_spec_history(
        &self,
        cargo_key: &CargoKey,
        window: QueryWindow,
    ) -> StoreResult<Vec<CargoSpec>>;
}

/// Storage for cargo identity and the active spec pointer.
///
/// Every write method is a single transaction spanning the cargo and spec
/// relations.
#[async_trait]
pub trait CargoStore: Send + Sync {
    /// Create the cargo row and its first spec, then point the cargo at it.
    async fn create_cargo(&self, cargo: NewCargo) -> StoreResult<CargoInspect>;

    /// Append a spec and repoint the cargo at it.
    ///
    /// `expected_spec_key` is the active spec the caller observed. If another
    /// writer moved the pointer since, the call fails with `VersionConflict`.
    async fn update_cargo(
        &self,
        key: &CargoKey,
        expected_spec_key: &SpecKey,
        spec: CargoSpecPartial,
    ) -> StoreResult<CargoInspect>;

    /// Repoint the cargo at an existing spec of its own history.
    async fn set_active_spec(&self, key: &CargoKey, spec_key: &SpecKey)
        -> StoreResult<CargoInspect>;

    /// Remove the cargo and cascade-delete its spec history.
    async fn delete_cargo(&self, key: &CargoKey) -> StoreResult<Cargo>;

    async fn get_cargo(&self, key: &CargoKey) -> StoreResult<Option<Cargo>>;

    /// Cargo and active spec read at one consistent point.
    async fn inspect_cargo(&self, key: &CargoKey) -> StoreResult<Option<CargoInspect>>;

    /// Cargoes of one namespace ordered by name.
    async fn list_cargoes(
        &self,
        namespace: &NamespaceName,
        window: QueryWindow,
    ) -> StoreResult<Vec<Cargo>>;
}

/// Unified storage bundle used by the registries.
pub trait HoldStorage: NamespaceStore + SpecStore + CargoStore + Send + Sync {}

impl<T> HoldStorage for T where T: NamespaceStore + SpecStore + CargoStore + Send + Sync {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_apply() {
        let items = vec![1, 2, 3, 4, 5];
        assert_eq!(QueryWindow::all().apply(items.clone()), items);
        assert_eq!(QueryWindow::page(2, 1).apply(items.clone()), vec![2, 3]);
        assert_eq!(QueryWindow::page(0, 3).apply(items.clone()), vec![4, 5]);
        assert!(QueryWindow::page(2, 10).apply(items).is_empty());
    }
}
