//! Version resolver.
//!
//! Computes the version and timestamp of the next spec of a cargo from its
//! persisted history. Backends call this inside the transaction that inserts
//! the spec; no counter is cached anywhere else.

use crate::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use hold_types::{CargoSpec, SpecVersion};

/// Placement of the next spec in a cargo's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextSpec {
    pub version: SpecVersion,
    pub created_at: DateTime<Utc>,
}

/// Most recent spec by `created_at`, ties broken by version.
pub fn latest_spec<'a, I>(history: I) -> Option<&'a CargoSpec>
where
    I: IntoIterator<Item = &'a CargoSpec>,
{
    history
        .into_iter()
        .max_by(|a, b| (a.created_at, a.version).cmp(&(b.created_at, b.version)))
}

/// Resolve the next version given the most recent spec, if any.
///
/// The returned timestamp never precedes the latest spec's, so ordering
/// history by `created_at` keeps versions strictly increasing even if the
/// wall clock steps backwards.
pub fn resolve_next(latest: Option<&CargoSpec>, now: DateTime<Utc>) -> StoreResult<NextSpec> {
    match latest {
        None => Ok(NextSpec {
            version: SpecVersion::FIRST,
            created_at: now,
        }),
        Some(prior) => {
            let version = prior.version.next().ok_or_else(|| {
                StoreError::InvariantViolation(format!(
                    "version counter exhausted for cargo {}",
                    prior.cargo_key
                ))
            })?;
            Ok(NextSpec {
                version,
                created_at: now.max(prior.created_at),
            })
        }
    }
}
