//! PostgreSQL adapter for Hold storage.
//!
//! This adapter is the transactional source of truth. Every multi-step write
//! runs in one transaction that first locks the owning `cargoes` row with
//! `SELECT ... FOR UPDATE`, so version resolution and insert are serialised
//! per cargo. Dropping an uncommitted transaction rolls it back, which keeps
//! abandoned calls from leaving partial writes behind.

use crate::resolver::resolve_next;
use crate::traits::{CargoStore, NamespaceStore, NewCargo, QueryWindow, SpecStore};
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use hold_types::{
    validate_name, Cargo, CargoInspect, CargoKey, CargoSpec, CargoSpecPartial, Namespace,
    NamespaceName, SpecKey, SpecVersion,
};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row};
use std::time::Duration;
use tracing::debug;

const CARGO_COLUMNS: &str = "key, created_at, name, namespace_name, spec_key";
const SPEC_COLUMNS: &str = "key, created_at, cargo_key, version, data, metadata";

/// PostgreSQL-backed storage adapter.
#[derive(Debug, Clone)]
pub struct PostgresHoldStorage {
    pool: PgPool,
}

impl PostgresHoldStorage {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(format!("failed to connect postgres: {e}")))?;
        Self::from_pool(pool).await
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StoreResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StoreResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS namespaces (
                name VARCHAR PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS cargo_specs (
                key UUID PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL,
                cargo_key VARCHAR NOT NULL,
                version VARCHAR NOT NULL,
                data JSONB NOT NULL,
                metadata JSONB,
                UNIQUE (cargo_key, version)
            )
            "#,
            r#"CREATE INDEX IF NOT EXISTS cargo_specs_history ON cargo_specs(cargo_key, created_at)"#,
            r#"
            CREATE TABLE IF NOT EXISTS cargoes (
                key VARCHAR PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL,
                name VARCHAR NOT NULL,
                spec_key UUID NOT NULL REFERENCES cargo_specs(key),
                namespace_name VARCHAR NOT NULL REFERENCES namespaces(name),
                UNIQUE (namespace_name, name)
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(format!("schema init failed: {e}")))?;
        }
        debug!("hold schema ready");
        Ok(())
    }
}

#[async_trait]
impl NamespaceStore for PostgresHoldStorage {
    async fn create_namespace(&self, name: &NamespaceName) -> StoreResult<Namespace> {
        let namespace = Namespace {
            name: name.clone(),
            created_at: now(),
        };
        sqlx::query("INSERT INTO namespaces (name, created_at) VALUES ($1, $2)")
            .bind(name.as_str())
            .bind(namespace.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| match map_sqlx_error(e) {
                StoreError::AlreadyExists(_) => StoreError::AlreadyExists(format!("namespace {name}")),
                other => other,
            })?;
        Ok(namespace)
    }

    async fn get_namespace(&self, name: &NamespaceName) -> StoreResult<Option<Namespace>> {
        let row = sqlx::query("SELECT name, created_at FROM namespaces WHERE name = $1")
            .bind(name.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(namespace_from_row).transpose()
    }

    async fn list_namespaces(&self, window: QueryWindow) -> StoreResult<Vec<Namespace>> {
        let rows = sqlx::query(
            "SELECT name, created_at FROM namespaces ORDER BY name ASC LIMIT $1 OFFSET $2",
        )
        .bind(limit_param(window)?)
        .bind(to_i64(window.offset)?)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(namespace_from_row).collect()
    }

    async fn delete_namespace(&self, name: &NamespaceName) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let exists = sqlx::query("SELECT name FROM namespaces WHERE name = $1 FOR UPDATE")
            .bind(name.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if exists.is_none() {
            return Err(StoreError::NotFound(format!("namespace {name}")));
        }

        let referencing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM cargoes WHERE namespace_name = $1")
                .bind(name.as_str())
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        if referencing > 0 {
            return Err(StoreError::InUse(format!(
                "namespace {name} is referenced by {referencing} cargo(es)"
            )));
        }

        sqlx::query("DELETE FROM namespaces WHERE name = $1")
            .bind(name.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| match map_sqlx_error(e) {
                StoreError::ForeignKeyViolation(_) => {
                    StoreError::InUse(format!("namespace {name} is referenced by a cargo"))
                }
                other => other,
            })?;

        tx.commit().await.map_err(map_sqlx_error)
    }
}

#[async_trait]
impl SpecStore for PostgresHoldStorage {
    async fn create_spec(
        &self,
        cargo_key: &CargoKey,
        spec: CargoSpecPartial,
    ) -> StoreResult<CargoSpec> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        lock_cargo(&mut tx, cargo_key).await?;
        let spec = insert_next_spec(&mut tx, cargo_key, spec).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(spec)
    }

    async fn get_spec(&self, key: &SpecKey) -> StoreResult<Option<CargoSpec>> {
        let row = sqlx::query(&format!("SELECT {SPEC_COLUMNS} FROM cargo_specs WHERE key = $1"))
            .bind(*key.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(|row| spec_from_row(row, "")).transpose()
    }

    async fn get_spec_version(
        &self,
        cargo_key: &CargoKey,
        version: &SpecVersion,
    ) -> StoreResult<Option<CargoSpec>> {
        let row = sqlx::query(&format!(
            "SELECT {SPEC_COLUMNS} FROM cargo_specs WHERE cargo_key = $1 AND version = $2"
        ))
        .bind(cargo_key.as_str())
        .bind(version.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.as_ref().map(|row| spec_from_row(row, "")).transpose()
    }

    async fn list_spec_history(
        &self,
        cargo_key: &CargoKey,
        window: QueryWindow,
    ) -> StoreResult<Vec<CargoSpec>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let exists = sqlx::query("SELECT key FROM cargoes WHERE key = $1")
            .bind(cargo_key.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if exists.is_none() {
            return Err(StoreError::cargo_not_found(cargo_key));
        }

        let rows = sqlx::query(&format!(
            r#"
            SELECT {SPEC_COLUMNS}
              FROM cargo_specs
             WHERE cargo_key = $1
             ORDER BY created_at ASC, CAST(version AS BIGINT) ASC
             LIMIT $2 OFFSET $3
            "#
        ))
        .bind(cargo_key.as_str())
        .bind(limit_param(window)?)
        .bind(to_i64(window.offset)?)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        rows.iter().map(|row| spec_from_row(row, "")).collect()
    }
}

#[async_trait]
impl CargoStore for PostgresHoldStorage {
    async fn create_cargo(&self, cargo: NewCargo) -> StoreResult<CargoInspect> {
        validate_name("cargo", &cargo.name)?;
        let key = CargoKey::from_parts(&cargo.name, &cargo.namespace);
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // Share-lock the namespace so a concurrent delete waits for this commit.
        let namespace = sqlx::query("SELECT name FROM namespaces WHERE name = $1 FOR SHARE")
            .bind(cargo.namespace.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if namespace.is_none() {
            return Err(StoreError::NamespaceNotFound(cargo.namespace));
        }

        let existing = sqlx::query("SELECT key FROM cargoes WHERE key = $1")
            .bind(key.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if existing.is_some() {
            return Err(StoreError::AlreadyExists(format!(
                "cargo {} in namespace {}",
                cargo.name, cargo.namespace
            )));
        }

        let spec = insert_next_spec(&mut tx, &key, cargo.spec).await?;
        let record = Cargo {
            key: key.clone(),
            created_at: spec.created_at,
            name: cargo.name,
            namespace_name: cargo.namespace,
            spec_key: spec.key,
        };
        sqlx::query(
            r#"
            INSERT INTO cargoes (key, created_at, name, spec_key, namespace_name)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.key.as_str())
        .bind(record.created_at)
        .bind(record.name.as_str())
        .bind(*record.spec_key.as_uuid())
        .bind(record.namespace_name.as_str())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
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
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let mut cargo = lock_cargo(&mut tx, key).await?;
        if &cargo.spec_key != expected_spec_key {
            return Err(StoreError::VersionConflict(format!(
                "cargo {key} moved from spec {expected_spec_key} to {}",
                cargo.spec_key
            )));
        }

        let spec = insert_next_spec(&mut tx, key, spec).await?;
        repoint(&mut tx, key, &spec.key).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

        cargo.spec_key = spec.key;
        Ok(CargoInspect { cargo, spec })
    }

    async fn set_active_spec(
        &self,
        key: &CargoKey,
        spec_key: &SpecKey,
    ) -> StoreResult<CargoInspect> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let mut cargo = lock_cargo(&mut tx, key).await?;

        let row = sqlx::query(&format!("SELECT {SPEC_COLUMNS} FROM cargo_specs WHERE key = $1"))
            .bind(*spec_key.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        let spec = row
            .as_ref()
            .map(|row| spec_from_row(row, ""))
            .transpose()?
            .ok_or_else(|| StoreError::spec_not_found(spec_key))?;
        if &spec.cargo_key != key {
            return Err(StoreError::SpecMismatch {
                spec_key: *spec_key,
                cargo_key: key.clone(),
                owner: spec.cargo_key,
            });
        }

        repoint(&mut tx, key, spec_key).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

        cargo.spec_key = *spec_key;
        Ok(CargoInspect { cargo, spec })
    }

    async fn delete_cargo(&self, key: &CargoKey) -> StoreResult<Cargo> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let cargo = lock_cargo(&mut tx, key).await?;

        sqlx::query("DELETE FROM cargoes WHERE key = $1")
            .bind(key.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        let removed = sqlx::query("DELETE FROM cargo_specs WHERE cargo_key = $1")
            .bind(key.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(cargo = %key, specs = removed.rows_affected(), "cascaded spec history");
        Ok(cargo)
    }

    async fn get_cargo(&self, key: &CargoKey) -> StoreResult<Option<Cargo>> {
        let row = sqlx::query(&format!("SELECT {CARGO_COLUMNS} FROM cargoes WHERE key = $1"))
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(cargo_from_row).transpose()
    }

    async fn inspect_cargo(&self, key: &CargoKey) -> StoreResult<Option<CargoInspect>> {
        let row = sqlx::query(
            r#"
            SELECT c.key, c.created_at, c.name, c.namespace_name, c.spec_key,
                   s.key AS s_key, s.created_at AS s_created_at, s.cargo_key AS s_cargo_key,
                   s.version AS s_version, s.data AS s_data, s.metadata AS s_metadata
              FROM cargoes c
              JOIN cargo_specs s ON s.key = c.spec_key
             WHERE c.key = $1
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref()
            .map(|row| {
                Ok(CargoInspect {
                    cargo: cargo_from_row(row)?,
                    spec: spec_from_row(row, "s_")?,
                })
            })
            .transpose()
    }

    async fn list_cargoes(
        &self,
        namespace: &NamespaceName,
        window: QueryWindow,
    ) -> StoreResult<Vec<Cargo>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {CARGO_COLUMNS}
              FROM cargoes
             WHERE namespace_name = $1
             ORDER BY name ASC
             LIMIT $2 OFFSET $3
            "#
        ))
        .bind(namespace.as_str())
        .bind(limit_param(window)?)
        .bind(to_i64(window.offset)?)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(cargo_from_row).collect()
    }
}

/// Lock the cargo row for the rest of the transaction.
async fn lock_cargo(conn: &mut PgConnection, key: &CargoKey) -> StoreResult<Cargo> {
    let row = sqlx::query(&format!(
        "SELECT {CARGO_COLUMNS} FROM cargoes WHERE key = $1 FOR UPDATE"
    ))
    .bind(key.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_sqlx_error)?;
    row.as_ref()
        .map(cargo_from_row)
        .transpose()?
        .ok_or_else(|| StoreError::cargo_not_found(key))
}

/// Resolve the next version from persisted history and insert the spec.
/// Callers must hold the cargo row lock.
async fn insert_next_spec(
    conn: &mut PgConnection,
    cargo_key: &CargoKey,
    partial: CargoSpecPartial,
) -> StoreResult<CargoSpec> {
    let latest = sqlx::query(&format!(
        r#"
        SELECT {SPEC_COLUMNS}
          FROM cargo_specs
         WHERE cargo_key = $1
         ORDER BY created_at DESC, CAST(version AS BIGINT) DESC
         LIMIT 1
        "#
    ))
    .bind(cargo_key.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_sqlx_error)?;
    let latest = latest.as_ref().map(|row| spec_from_row(row, "")).transpose()?;

    let next = resolve_next(latest.as_ref(), now())?;
    let spec = CargoSpec {
        key: SpecKey::generate(),
        created_at: next.created_at,
        cargo_key: cargo_key.clone(),
        version: next.version,
        data: partial.data,
        metadata: partial.metadata,
    };

    sqlx::query(
        r#"
        INSERT INTO cargo_specs (key, created_at, cargo_key, version, data, metadata)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(*spec.key.as_uuid())
    .bind(spec.created_at)
    .bind(spec.cargo_key.as_str())
    .bind(spec.version.to_string())
    .bind(spec.data.clone())
    .bind(spec.metadata.clone())
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx_error)?;

    Ok(spec)
}

async fn repoint(conn: &mut PgConnection, key: &CargoKey, spec_key: &SpecKey) -> StoreResult<()> {
    sqlx::query("UPDATE cargoes SET spec_key = $1 WHERE key = $2")
        .bind(*spec_key.as_uuid())
        .bind(key.as_str())
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;
    Ok(())
}

/// Current time at the microsecond precision `TIMESTAMPTZ` stores, so
/// returned records equal what later reads decode.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Backend(e.to_string()))
}

fn namespace_from_row(row: &PgRow) -> StoreResult<Namespace> {
    Ok(Namespace {
        name: NamespaceName::new(column::<String>(row, "name")?),
        created_at: column(row, "created_at")?,
    })
}

fn cargo_from_row(row: &PgRow) -> StoreResult<Cargo> {
    Ok(Cargo {
        key: CargoKey::new(column::<String>(row, "key")?),
        created_at: column(row, "created_at")?,
        name: column(row, "name")?,
        namespace_name: NamespaceName::new(column::<String>(row, "namespace_name")?),
        spec_key: SpecKey::from_uuid(column(row, "spec_key")?),
    })
}

fn spec_from_row(row: &PgRow, prefix: &str) -> StoreResult<CargoSpec> {
    let col = |name: &str| format!("{prefix}{name}");
    let version: String = column(row, &col("version"))?;
    Ok(CargoSpec {
        key: SpecKey::from_uuid(column(row, &col("key"))?),
        created_at: column(row, &col("created_at"))?,
        cargo_key: CargoKey::new(column::<String>(row, &col("cargo_key"))?),
        version: version
            .parse()
            .map_err(|e: hold_types::InvalidVersion| StoreError::Serialization(e.to_string()))?,
        data: column(row, &col("data"))?,
        metadata: column(row, &col("metadata"))?,
    })
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23505") => return StoreError::AlreadyExists(db_err.message().to_string()),
            Some("23503") => return StoreError::ForeignKeyViolation(db_err.message().to_string()),
            Some("40001") | Some("40P01") => {
                return StoreError::VersionConflict(db_err.message().to_string())
            }
            _ => {}
        }
    }
    StoreError::Backend(err.to_string())
}

fn limit_param(window: QueryWindow) -> StoreResult<Option<i64>> {
    // LIMIT NULL is unbounded.
    if window.limit == 0 {
        Ok(None)
    } else {
        to_i64(window.limit).map(Some)
    }
}

fn to_i64(value: usize) -> StoreResult<i64> {
    i64::try_from(value)
        .map_err(|_| StoreError::InvalidInput("window value too large".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn storage() -> Option<PostgresHoldStorage> {
        let url = std::env::var("HOLD_TEST_DATABASE_URL").ok()?;
        Some(PostgresHoldStorage::connect(&url).await.unwrap())
    }

    #[test]
    fn test_now_matches_timestamptz_precision() {
        let at = now();
        assert_eq!(at.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[tokio::test]
    async fn test_postgres_update_and_rollback() {
        let Some(storage) = storage().await else {
            return;
        };
        let namespace = NamespaceName::parse(format!("pg-{}", SpecKey::generate().as_uuid().simple()))
            .unwrap();
        storage.create_namespace(&namespace).await.unwrap();

        let created = storage
            .create_cargo(NewCargo {
                name: "web".to_string(),
                namespace: namespace.clone(),
                spec: CargoSpecPartial::new(json!({"image": "nginx"})),
            })
            .await
            .unwrap();
        let key = created.cargo.key.clone();
        let updated = storage
            .update_cargo(&key, &created.spec.key, CargoSpecPartial::new(json!({"image": "nginx:2"})))
            .await
            .unwrap();
        assert_eq!(updated.spec.version.get(), 2);
        assert_eq!(storage.get_spec(&updated.spec.key).await.unwrap(), Some(updated.spec.clone()));

        let reverted = storage.set_active_spec(&key, &created.spec.key).await.unwrap();
        assert_eq!(reverted.spec.version, SpecVersion::FIRST);
        let history = storage.list_spec_history(&key, QueryWindow::all()).await.unwrap();
        assert_eq!(history.len(), 2);

        storage.delete_cargo(&key).await.unwrap();
        assert!(matches!(
            storage.list_spec_history(&key, QueryWindow::all()).await,
            Err(StoreError::NotFound(_))
        ));
        storage.delete_namespace(&namespace).await.unwrap();
    }
}
