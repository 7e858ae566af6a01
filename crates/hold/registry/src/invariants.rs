//! Consistency checks over persisted state.
//!
//! Used by tests after every operation, and usable by operators to audit a
//! live store. Checks read through the same storage traits as the
//! registries, so they hold for every backend.

use hold_store::{HoldStorage, QueryWindow, StoreError, StoreResult};
use hold_types::{CargoKey, SpecVersion};

/// Verify one cargo:
///
/// - its active spec belongs to it and is part of its history
/// - its history carries versions `1, 2, 3, ...` without gaps, with
///   non-decreasing `created_at`
pub async fn check_cargo<S>(storage: &S, key: &CargoKey) -> StoreResult<()>
where
    S: HoldStorage + ?Sized,
{
    let inspect = storage
        .inspect_cargo(key)
        .await?
        .ok_or_else(|| StoreError::cargo_not_found(key))?;

    if &inspect.spec.cargo_key != key || inspect.spec.key != inspect.cargo.spec_key {
        return Err(StoreError::InvariantViolation(format!(
            "active spec {} of cargo {key} belongs to {}",
            inspect.cargo.spec_key, inspect.spec.cargo_key
        )));
    }

    let history = storage.list_spec_history(key, QueryWindow::all()).await?;
    if !history.iter().any(|spec| spec.key == inspect.spec.key) {
        return Err(StoreError::InvariantViolation(format!(
            "active spec {} of cargo {key} is missing from its history",
            inspect.spec.key
        )));
    }

    let mut expected = Some(SpecVersion::FIRST);
    let mut previous = None;
    for spec in &history {
        if spec.cargo_key != *key {
            return Err(StoreError::InvariantViolation(format!(
                "history of cargo {key} contains spec {} of {}",
                spec.key, spec.cargo_key
            )));
        }
        if Some(spec.version) != expected {
            return Err(StoreError::InvariantViolation(format!(
                "cargo {key} history has version {} where {} was expected",
                spec.version,
                expected.map(|v| v.to_string()).unwrap_or_default()
            )));
        }
        if previous.is_some_and(|at| spec.created_at < at) {
            return Err(StoreError::InvariantViolation(format!(
                "cargo {key} history is not ordered by creation time at version {}",
                spec.version
            )));
        }
        expected = spec.version.next();
        previous = Some(spec.created_at);
    }

    Ok(())
}

/// Verify every cargo of every namespace.
pub async fn check_storage<S>(storage: &S) -> StoreResult<usize>
where
    S: HoldStorage + ?Sized,
{
    let mut checked = 0;
    for namespace in storage.list_namespaces(QueryWindow::all()).await? {
        for cargo in storage
            .list_cargoes(&namespace.name, QueryWindow::all())
            .await?
        {
            if cargo.namespace_name != namespace.name {
                return Err(StoreError::InvariantViolation(format!(
                    "cargo {} listed under namespace {}",
                    cargo.key, namespace.name
                )));
            }
            check_cargo(storage, &cargo.key).await?;
            checked += 1;
        }
    }
    Ok(checked)
}
