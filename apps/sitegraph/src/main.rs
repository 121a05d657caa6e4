//! # sitegraph
//!
//! The main binary for the sitegraph routing engine.
//!
//! This application provides:
//! - HTTP server (axum-based) resolving and dispatching site pages
//! - CLI interface for importing, inspecting and flushing site graphs
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  apps/sitegraph (THE BINARY)                │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌────────────────┐  │
//! │  │   CLI       │    │   HTTP API  │    │  Config (toml) │  │
//! │  │  (clap)     │    │   (axum)    │    │  + includes    │  │
//! │  └──────┬──────┘    └──────┬──────┘    └───────┬────────┘  │
//! │         └──────────────────┼───────────────────┘           │
//! │                            ▼                               │
//! │                    ┌────────────────┐                      │
//! │                    │ sitegraph-core │                      │
//! │                    │  (THE LOGIC)   │                      │
//! │                    └────────────────┘                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! sitegraph server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! sitegraph import -f site.json
//! sitegraph resolve /about --role member --user ada
//! sitegraph tree --role guest
//! ```

use clap::Parser;
use sitegraph::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // SITEGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("SITEGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "sitegraph=debug,sitegraph_core=debug,tower_http=debug"
    } else {
        "sitegraph=info,sitegraph_core=info,tower_http=debug"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
  sitegraph v{}

  Permission-scoped routing and dispatch
"#,
        env!("CARGO_PKG_VERSION")
    );
}
