//! Cargo commands

use super::{parse_document, Registries};
use crate::error::{CliError, CliResult};
use crate::output::{self, print_success, OutputFormat};
use clap::Subcommand;
use hold_registry::QueryWindow;
use hold_types::{Cargo, CargoKey, CargoSpec, CargoSpecPartial, NamespaceName, SpecKey, SpecVersion};
use serde::Serialize;
use tabled::Tabled;

/// Cargo subcommands
#[derive(Subcommand)]
pub enum CargoCommands {
    /// Create a cargo with its first spec
    Create {
        /// Cargo name
        name: String,

        /// Namespace the cargo belongs to
        #[arg(short, long)]
        namespace: String,

        /// Spec data as JSON, or @file
        #[arg(short, long)]
        data: String,

        /// Spec metadata as JSON, or @file
        #[arg(short, long)]
        metadata: Option<String>,
    },

    /// List cargoes of a namespace
    #[command(alias = "list")]
    Ls {
        /// Namespace to list
        #[arg(short, long)]
        namespace: String,

        /// Maximum number of entries (0 for all)
        #[arg(long, default_value_t = 0)]
        limit: usize,

        /// Entries to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Show a cargo with its active spec
    Inspect {
        /// Cargo key (`name.namespace`)
        key: String,
    },

    /// Append a spec that replaces the data and metadata, and make it active
    ///
    /// Fields left out are not carried over from the previous spec.
    #[command(alias = "patch")]
    Update {
        /// Cargo key (`name.namespace`)
        key: String,

        /// Spec data as JSON, or @file
        #[arg(short, long)]
        data: String,

        /// Spec metadata as JSON, or @file
        #[arg(short, long)]
        metadata: Option<String>,
    },

    /// Show the spec history, oldest first
    History {
        /// Cargo key (`name.namespace`)
        key: String,

        /// Maximum number of entries (0 for all)
        #[arg(long, default_value_t = 0)]
        limit: usize,

        /// Entries to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Make an earlier spec active again
    #[command(alias = "rollback")]
    Revert {
        /// Cargo key (`name.namespace`)
        key: String,

        /// Key of the spec to revert to
        #[arg(required_unless_present = "to_version")]
        spec_key: Option<SpecKey>,

        /// Revert to a version number instead of a spec key
        #[arg(long, conflicts_with = "spec_key")]
        to_version: Option<SpecVersion>,
    },

    /// Remove a cargo and its spec history
    #[command(alias = "remove")]
    Rm {
        /// Cargo key (`name.namespace`)
        key: String,
    },
}

/// Table row for cargo display
#[derive(Debug, Serialize, Tabled)]
struct CargoRow {
    key: String,
    name: String,
    namespace: String,
    spec: String,
    created: String,
}

impl From<Cargo> for CargoRow {
    fn from(cargo: Cargo) -> Self {
        Self {
            key: cargo.key.to_string(),
            name: cargo.name,
            namespace: cargo.namespace_name.to_string(),
            spec: cargo.spec_key.to_string(),
            created: cargo.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Table row for history display
#[derive(Debug, Serialize, Tabled)]
struct SpecRow {
    active: String,
    version: String,
    key: String,
    created: String,
    data: String,
}

impl SpecRow {
    fn new(spec: CargoSpec, active: &SpecKey) -> Self {
        Self {
            active: if &spec.key == active { "*" } else { "" }.to_string(),
            version: spec.version.to_string(),
            key: spec.key.to_string(),
            created: spec.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            data: spec.data.to_string(),
        }
    }
}

fn partial(data: &str, metadata: Option<&str>) -> CliResult<CargoSpecPartial> {
    let mut spec = CargoSpecPartial::new(parse_document(data)?);
    if let Some(metadata) = metadata {
        spec = spec.with_metadata(parse_document(metadata)?);
    }
    Ok(spec)
}

/// Execute a cargo command
pub async fn execute(
    command: CargoCommands,
    registries: &Registries,
    format: OutputFormat,
) -> CliResult<()> {
    let cargoes = &registries.cargoes;
    match command {
        CargoCommands::Create {
            name,
            namespace,
            data,
            metadata,
        } => {
            let spec = partial(&data, metadata.as_deref())?;
            let inspect = cargoes
                .create(&name, &NamespaceName::new(namespace), spec)
                .await?;
            print_success(&format!(
                "Created cargo {} at version {}",
                inspect.cargo.key, inspect.spec.version
            ));
            Ok(())
        }

        CargoCommands::Ls {
            namespace,
            limit,
            offset,
        } => {
            let rows: Vec<CargoRow> = cargoes
                .list(&NamespaceName::new(namespace), QueryWindow::page(limit, offset))
                .await?
                .into_iter()
                .map(CargoRow::from)
                .collect();
            output::print_output(rows, format)
        }

        CargoCommands::Inspect { key } => {
            let inspect = cargoes.get(&CargoKey::new(key)).await?;
            output::print_single(&inspect, format)
        }

        CargoCommands::Update {
            key,
            data,
            metadata,
        } => {
            let spec = partial(&data, metadata.as_deref())?;
            let inspect = cargoes.update(&CargoKey::new(key), spec).await?;
            print_success(&format!(
                "Updated cargo {} to version {}",
                inspect.cargo.key, inspect.spec.version
            ));
            Ok(())
        }

        CargoCommands::History { key, limit, offset } => {
            let key = CargoKey::new(key);
            let active = cargoes.get(&key).await?.cargo.spec_key;
            let rows: Vec<SpecRow> = cargoes
                .list_spec_history(&key, QueryWindow::page(limit, offset))
                .await?
                .into_iter()
                .map(|spec| SpecRow::new(spec, &active))
                .collect();
            output::print_output(rows, format)
        }

        CargoCommands::Revert {
            key,
            spec_key,
            to_version,
        } => {
            let key = CargoKey::new(key);
            let inspect = match (spec_key, to_version) {
                (Some(spec_key), _) => cargoes.rollback(&key, &spec_key).await?,
                (None, Some(version)) => cargoes.rollback_to_version(&key, &version).await?,
                (None, None) => {
                    return Err(CliError::InvalidInput(
                        "either a spec key or --to-version is required".to_string(),
                    ))
                }
            };
            print_success(&format!(
                "Reverted cargo {} to version {}",
                inspect.cargo.key, inspect.spec.version
            ));
            Ok(())
        }

        CargoCommands::Rm { key } => {
            let cargo = cargoes.delete(&CargoKey::new(key)).await?;
            print_success(&format!("Removed cargo: {}", cargo.key));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(subcommand)]
        command: CargoCommands,
    }

    #[test]
    fn test_update_accepts_patch_alias() {
        for name in ["update", "patch"] {
            let harness =
                Harness::try_parse_from(["cargo", name, "web.demo", "--data", "{\"image\":\"nginx\"}"])
                    .unwrap();
            assert!(matches!(
                harness.command,
                CargoCommands::Update { ref key, metadata: None, .. } if key == "web.demo"
            ));
        }
    }

    #[test]
    fn test_update_without_metadata_sends_none() {
        let spec = partial("{\"image\":\"nginx\"}", None).unwrap();
        assert_eq!(spec.data, serde_json::json!({"image": "nginx"}));
        assert!(spec.metadata.is_none());
    }
}
