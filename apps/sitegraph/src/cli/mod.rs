//! # sitegraph CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show store and cache status
//! - `import` - Import nodes and permissions from a JSON site document
//! - `resolve` - Resolve and dispatch a URI as a given requester
//! - `routes` - List the route table and aliases of a role
//! - `tree` - Print the menu tree of a role
//! - `flush` - Drop cached snapshots
//! - `export` - Write a role's encoded snapshot to a file
//! - `cron` - Run a cron node as the scheduler

mod commands;

use crate::config::AppConfig;
use clap::{Parser, Subcommand};
use sitegraph_core::SiteError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// sitegraph - permission-scoped site routing
///
/// Resolves request paths against per-role snapshots of the site tree and
/// dispatches the matched node.
#[derive(Parser, Debug)]
#[command(name = "sitegraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the configuration file (default: $SITEGRAPH_CONFIG or ./sitegraph.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the site database (overrides the configuration)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (overrides the configuration)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides the configuration)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show store and cache status
    Status,

    /// Import nodes and permissions from a JSON site document
    Import {
        /// Path to the site document
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Resolve and dispatch a URI
    Resolve {
        /// Request URI, e.g. "/docs/page/7?tab=api"
        uri: String,

        /// Requester role (default: the guest role)
        #[arg(short, long)]
        role: Option<String>,

        /// Authenticated user; omit for an anonymous request
        #[arg(short, long)]
        user: Option<String>,
    },

    /// List the route table and aliases of a role
    Routes {
        /// Role (default: the guest role)
        #[arg(short, long)]
        role: Option<String>,
    },

    /// Print the menu tree of a role
    Tree {
        /// Role (default: the guest role)
        #[arg(short, long)]
        role: Option<String>,

        /// Menu root node
        #[arg(long, default_value = "0")]
        root: u64,

        /// Maximum depth below the root
        #[arg(short, long)]
        depth: Option<usize>,

        /// Include hidden nodes
        #[arg(short, long)]
        all: bool,
    },

    /// Drop cached snapshots
    Flush {
        /// Only this role (default: every role)
        #[arg(short, long)]
        role: Option<String>,
    },

    /// Write a role's encoded snapshot to a file
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Role (default: the guest role)
        #[arg(short, long)]
        role: Option<String>,
    },

    /// Run a cron node as the scheduler and record the run
    Cron {
        /// Cron node id
        node: u64,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Load the configuration, applying command-line overrides.
pub fn load_config(cli: &Cli) -> Result<AppConfig, SiteError> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(database) = &cli.database {
        config.storage.database = database.clone();
    }
    Ok(config)
}

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), SiteError> {
    let mut config = load_config(&cli)?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            cmd_server(&config).await
        }
        Some(Commands::Status) => cmd_status(&config, json_mode),
        Some(Commands::Import { file }) => cmd_import(&config, json_mode, &file),
        Some(Commands::Resolve { uri, role, user }) => {
            cmd_resolve(&config, json_mode, &uri, role.as_deref(), user.as_deref())
        }
        Some(Commands::Routes { role }) => cmd_routes(&config, json_mode, role.as_deref()),
        Some(Commands::Tree {
            role,
            root,
            depth,
            all,
        }) => cmd_tree(&config, json_mode, role.as_deref(), root, depth, all),
        Some(Commands::Flush { role }) => cmd_flush(&config, json_mode, role.as_deref()),
        Some(Commands::Export { output, role }) => {
            cmd_export(&config, json_mode, &output, role.as_deref())
        }
        Some(Commands::Cron { node }) => cmd_cron(&config, json_mode, node),
        None => {
            // No subcommand - show status by default
            cmd_status(&config, json_mode)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_flag_overrides_config() {
        let cli = Cli::parse_from([
            "sitegraph",
            "--config",
            "/nonexistent/sitegraph.toml",
            "status",
        ]);
        assert!(load_config(&cli).is_err());

        let cli = Cli::parse_from(["sitegraph", "-D", "/tmp/other.db", "-q", "status"]);
        assert!(cli.quiet);
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/other.db")));
    }

    #[test]
    fn resolve_arguments_parse() {
        let cli = Cli::parse_from([
            "sitegraph",
            "resolve",
            "/docs/page/7?tab=api",
            "--role",
            "member",
            "--user",
            "ada",
            "--json-mode",
        ]);
        assert!(cli.json_mode);
        match cli.command {
            Some(Commands::Resolve { uri, role, user }) => {
                assert_eq!(uri, "/docs/page/7?tab=api");
                assert_eq!(role.as_deref(), Some("member"));
                assert_eq!(user.as_deref(), Some("ada"));
            }
            other => unreachable!("unexpected command {:?}", other),
        }
    }
}
