//! Namespace commands

use super::Registries;
use crate::error::CliResult;
use crate::output::{self, print_success, OutputFormat};
use clap::Subcommand;
use hold_registry::QueryWindow;
use hold_types::{Cargo, Namespace, NamespaceName};
use serde::Serialize;
use tabled::Tabled;

/// Namespace subcommands
#[derive(Subcommand)]
pub enum NamespaceCommands {
    /// Create a namespace
    Create {
        /// Namespace name
        name: String,
    },

    /// List namespaces
    #[command(alias = "list")]
    Ls {
        /// Maximum number of entries (0 for all)
        #[arg(long, default_value_t = 0)]
        limit: usize,

        /// Entries to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Show a namespace with its cargoes
    Inspect {
        /// Namespace name
        name: String,
    },

    /// Remove an empty namespace
    #[command(alias = "remove")]
    Rm {
        /// Namespace name
        name: String,
    },
}

/// Table row for namespace display
#[derive(Debug, Serialize, Tabled)]
struct NamespaceRow {
    name: String,
    created: String,
}

impl From<Namespace> for NamespaceRow {
    fn from(namespace: Namespace) -> Self {
        Self {
            name: namespace.name.to_string(),
            created: namespace.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct NamespaceInspect {
    #[serde(flatten)]
    namespace: Namespace,
    cargoes: Vec<Cargo>,
}

/// Execute a namespace command
pub async fn execute(
    command: NamespaceCommands,
    registries: &Registries,
    format: OutputFormat,
) -> CliResult<()> {
    match command {
        NamespaceCommands::Create { name } => {
            let namespace = registries.namespaces.create(&name).await?;
            print_success(&format!("Created namespace: {}", namespace.name));
            Ok(())
        }

        NamespaceCommands::Ls { limit, offset } => {
            let rows: Vec<NamespaceRow> = registries
                .namespaces
                .list(QueryWindow::page(limit, offset))
                .await?
                .into_iter()
                .map(NamespaceRow::from)
                .collect();
            output::print_output(rows, format)
        }

        NamespaceCommands::Inspect { name } => {
            let name = NamespaceName::new(name);
            let namespace = registries.namespaces.get(&name).await?;
            let cargoes = registries.cargoes.list(&name, QueryWindow::all()).await?;
            output::print_single(&NamespaceInspect { namespace, cargoes }, format)
        }

        NamespaceCommands::Rm { name } => {
            let name = NamespaceName::new(name);
            registries.namespaces.delete(&name).await?;
            print_success(&format!("Removed namespace: {}", name));
            Ok(())
        }
    }
}
