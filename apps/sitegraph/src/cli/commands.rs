//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api::{self, FaultResponse, SiteResponse, StatusResponse};
use crate::config::AppConfig;
use crate::service::SiteService;
use serde::{Deserialize, Serialize};
use sitegraph_core::{
    Action, MenuBuilder, MenuItem, NodeId, NodeRow, RequestContext, RoleId, SiteError,
    snapshot_fingerprint,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a site document (100 MB).
const MAX_IMPORT_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), SiteError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| SiteError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(SiteError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and ensure it names a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, SiteError> {
    let canonical = path.canonicalize().map_err(|e| {
        SiteError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(SiteError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Validate an output path: its parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, SiteError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        SiteError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(SiteError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| SiteError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

fn print_json(value: &impl Serialize) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

fn role_or_guest(service: &SiteService, role: Option<&str>) -> RoleId {
    role.filter(|r| !r.is_empty())
        .map(RoleId::new)
        .unwrap_or_else(|| service.guest_role())
}

// =============================================================================
// SITE DOCUMENT
// =============================================================================

/// Import format: node rows plus role -> visible node ids.
///
/// ```json
/// {
///   "nodes": [{ "node_id": 1, "parent_node_id": 0, "node_type": 1, "node_name": "Home" }],
///   "permissions": { "guest": [1] }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteDocument {
    pub nodes: Vec<NodeRow>,
    #[serde(default)]
    pub permissions: BTreeMap<String, Vec<u64>>,
}

impl SiteDocument {
    /// Flattened `(role, node)` grants.
    #[must_use]
    pub fn grants(&self) -> Vec<(RoleId, u64)> {
        self.permissions
            .iter()
            .flat_map(|(role, ids)| ids.iter().map(move |id| (RoleId::new(role.clone()), *id)))
            .collect()
    }
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(config: &AppConfig) -> Result<(), SiteError> {
    let service = SiteService::open(config)?;

    println!("sitegraph server starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", config.server.host);
    println!("  Port:     {}", config.server.port);
    println!("  Database: {:?}", config.storage.database);
    println!("  Includes: {:?}", config.storage.include_root);
    println!("  Site:     {}", config.site.base_url());
    println!();
    println!("Endpoints:");
    println!("  GET  /health          - Health check");
    println!("  GET  /_admin/status   - Store and cache status");
    println!("  GET  /_admin/routes   - Route table of a role");
    println!("  GET  /_admin/snapshot - Encoded snapshot of a role");
    println!("  GET  /_admin/tree     - Menu tree of a role");
    println!("  POST /_admin/flush    - Drop cached snapshots");
    println!("  *                     - Site pages");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", config.server.host, config.server.port);
    api::run_server(&addr, service, config).await
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show store and cache status.
pub fn cmd_status(config: &AppConfig, json_mode: bool) -> Result<(), SiteError> {
    let service = SiteService::open(config)?;
    let status = StatusResponse::collect(&service)?;

    if json_mode {
        print_json(&status);
        return Ok(());
    }

    println!("sitegraph Status");
    println!("================");
    println!("Database: {:?}", config.storage.database);
    println!();
    println!("Nodes:     {}", status.rows);
    println!("Grants:    {}", status.grants);
    println!("Roles:     {}", status.roles.join(", "));
    println!("Snapshots: {}", status.cached_snapshots.len());
    for key in &status.cached_snapshots {
        println!("  {}", key);
    }

    Ok(())
}

// =============================================================================
// IMPORT COMMAND
// =============================================================================

/// Import a site document and drop every cached snapshot.
pub fn cmd_import(config: &AppConfig, json_mode: bool, file: &Path) -> Result<(), SiteError> {
    let path = validate_file_path(file)?;
    validate_file_size(&path, MAX_IMPORT_FILE_SIZE)?;

    let content = std::fs::read_to_string(&path)
        .map_err(|e| SiteError::IoError(format!("Read failed: {}", e)))?;
    let document: SiteDocument = serde_json::from_str(&content)
        .map_err(|e| SiteError::SerializationError(format!("Invalid site document: {}", e)))?;

    let service = SiteService::open(config)?;
    let grants = document.grants();
    service.store().import(&document.nodes, &grants)?;
    service.flush(None)?;

    tracing::info!(
        nodes = document.nodes.len(),
        grants = grants.len(),
        "site document imported"
    );

    if json_mode {
        print_json(&serde_json::json!({
            "success": true,
            "nodes": document.nodes.len(),
            "grants": grants.len(),
        }));
    } else {
        println!(
            "Imported {} nodes and {} grants from {:?}",
            document.nodes.len(),
            grants.len(),
            path
        );
    }
    Ok(())
}

// =============================================================================
// RESOLVE COMMAND
// =============================================================================

/// Resolve and dispatch a URI as the given requester.
pub fn cmd_resolve(
    config: &AppConfig,
    json_mode: bool,
    uri: &str,
    role: Option<&str>,
    user: Option<&str>,
) -> Result<(), SiteError> {
    let service = SiteService::open(config)?;
    let role = role_or_guest(&service, role);
    let request = match user {
        Some(user) => RequestContext::authenticated(role, uri, user),
        None => RequestContext::anonymous(role, uri),
    };

    let served = match service.serve(request, None) {
        Ok(served) => served,
        Err(SiteError::Halted(fault)) => {
            let response = FaultResponse::new(fault, service.site());
            if json_mode {
                print_json(&response);
            } else {
                println!("{} {}", response.status, response.error);
                if let Some(login) = &response.login_url {
                    println!("Login: {}", login);
                }
            }
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let response = SiteResponse::from(served);
    if json_mode {
        print_json(&response);
        return Ok(());
    }

    match &response.action {
        Action::Controller { node, path, output } => {
            println!("200 node {} via {}", node, path);
            println!("{}", output);
        }
        Action::Include { node, path, body } => {
            println!("200 node {} includes {}", node, path);
            println!("{}", body);
        }
        Action::Redirect { node, url } => println!("302 node {} -> {}", node, url),
        Action::Iframe { node, src, height } => {
            println!("200 node {} frames {} ({}px)", node, src, height);
        }
    }
    if let Some(layout) = &response.layout {
        println!("Layout: {}", layout);
    }
    for notice in &response.notices {
        println!("Notice: {}", notice);
    }
    let trail: Vec<&str> = response.breadcrumbs.iter().map(|b| b.name.as_str()).collect();
    println!("Trail: {}", trail.join(" > "));
    Ok(())
}

// =============================================================================
// ROUTES COMMAND
// =============================================================================

/// List the route table and alias index of a role.
pub fn cmd_routes(config: &AppConfig, json_mode: bool, role: Option<&str>) -> Result<(), SiteError> {
    let service = SiteService::open(config)?;
    let role = role_or_guest(&service, role);
    let graph = service.graph(&role)?;

    if json_mode {
        let routes: Vec<api::RouteJson> = graph.routes().routes().map(api::RouteJson::from).collect();
        let aliases: BTreeMap<&str, NodeId> = graph.aliases().iter().collect();
        print_json(&serde_json::json!({
            "role": role,
            "routes": routes,
            "aliases": aliases,
        }));
        return Ok(());
    }

    println!("Routes for role '{}'", role);
    println!("==================");
    for route in graph.routes().routes() {
        match &route.module {
            Some(module) => println!("  [{}] {} -> {}", module, route.pattern, route.catcher),
            None => println!("  {} -> {}", route.pattern, route.catcher),
        }
    }
    println!();
    println!("Aliases: {}", graph.aliases().len());
    for (slug, node) in graph.aliases().iter() {
        println!("  {} -> {}", slug, node);
    }
    Ok(())
}

// =============================================================================
// TREE COMMAND
// =============================================================================

/// Print the menu tree of a role.
pub fn cmd_tree(
    config: &AppConfig,
    json_mode: bool,
    role: Option<&str>,
    root: u64,
    depth: Option<usize>,
    all: bool,
) -> Result<(), SiteError> {
    let service = SiteService::open(config)?;
    let role = role_or_guest(&service, role);
    let graph = service.graph(&role)?;

    let builder = if all {
        MenuBuilder::unfiltered(&graph)
    } else {
        MenuBuilder::new(&graph, false)
    };
    let items: Vec<MenuItem> = builder.menu(NodeId(root), depth);

    if json_mode {
        print_json(&items);
        return Ok(());
    }

    println!("Menu for role '{}' below node {}", role, root);
    for item in &items {
        println!(
            "{}{} [{}] {}",
            "  ".repeat(item.depth + 1),
            item.name,
            item.node,
            item.href
        );
    }
    Ok(())
}

// =============================================================================
// FLUSH COMMAND
// =============================================================================

/// Drop cached snapshots of one role or all of them.
pub fn cmd_flush(config: &AppConfig, json_mode: bool, role: Option<&str>) -> Result<(), SiteError> {
    let service = SiteService::open(config)?;
    let role = role.filter(|r| !r.is_empty()).map(RoleId::new);
    service.flush(role.as_ref())?;

    if json_mode {
        print_json(&api::FlushResponse {
            success: true,
            role: role.map(|r| r.0),
            error: None,
        });
    } else {
        match role {
            Some(role) => println!("Flushed snapshots of role '{}'", role),
            None => println!("Flushed all snapshots"),
        }
    }
    Ok(())
}

// =============================================================================
// EXPORT COMMAND
// =============================================================================

/// Write a role's encoded snapshot to a file.
pub fn cmd_export(
    config: &AppConfig,
    json_mode: bool,
    output: &Path,
    role: Option<&str>,
) -> Result<(), SiteError> {
    let output = validate_output_path(output)?;
    let service = SiteService::open(config)?;
    let role = role_or_guest(&service, role);

    let bytes = service.snapshot_bytes(&role)?;
    let fingerprint = snapshot_fingerprint(&bytes);
    std::fs::write(&output, &bytes)
        .map_err(|e| SiteError::IoError(format!("Write failed: {}", e)))?;

    if json_mode {
        print_json(&serde_json::json!({
            "role": role,
            "output": output,
            "size": bytes.len(),
            "fingerprint": fingerprint,
        }));
    } else {
        println!("Exported snapshot of role '{}' to {:?}", role, output);
        println!("  Size:        {} bytes", bytes.len());
        println!("  Fingerprint: {}", fingerprint);
    }
    Ok(())
}

// =============================================================================
// CRON COMMAND
// =============================================================================

/// Run a cron node as the scheduler and record the run.
pub fn cmd_cron(config: &AppConfig, json_mode: bool, node: u64) -> Result<(), SiteError> {
    let service = SiteService::open(config)?;
    let now = chrono::Utc::now();
    let served = service.run_scheduled(NodeId(node), now.timestamp())?;

    if json_mode {
        print_json(&SiteResponse::from(served));
    } else {
        println!("Cron node {} ran at {}", node, now.to_rfc3339());
        if let Action::Controller { output, .. } = &served.action {
            println!("{}", output);
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn site_document_flattens_grants() {
        let document: SiteDocument = serde_json::from_str(
            r#"{
                "nodes": [
                    { "node_id": 1, "parent_node_id": 0, "node_type": 1, "node_name": "Home" },
                    { "node_id": 2, "parent_node_id": 1, "node_type": 4, "node_link": "about.html" }
                ],
                "permissions": { "guest": [1], "member": [1, 2] }
            }"#,
        )
        .expect("parse");

        assert_eq!(document.nodes.len(), 2);
        let grants = document.grants();
        assert_eq!(grants.len(), 3);
        assert!(grants.contains(&(RoleId::new("member"), 2)));
    }

    #[test]
    fn site_document_permissions_optional() {
        let document: SiteDocument =
            serde_json::from_str(r#"{ "nodes": [] }"#).expect("parse");
        assert!(document.grants().is_empty());
    }

    #[test]
    fn import_then_status() {
        let dir = tempdir().expect("tempdir");
        let site = dir.path().join("site.json");
        std::fs::write(
            &site,
            r#"{
                "nodes": [{ "node_id": 1, "parent_node_id": 0, "node_type": 1, "node_name": "Home" }],
                "permissions": { "guest": [1] }
            }"#,
        )
        .expect("write");

        let mut config = AppConfig::default();
        config.storage.database = dir.path().join("site.db");

        cmd_import(&config, true, &site).expect("import");
        let service = SiteService::open(&config).expect("open");
        assert_eq!(service.store().row_count().expect("rows"), 1);
        assert_eq!(service.store().grant_count().expect("grants"), 1);
    }

    #[test]
    fn output_path_needs_existing_parent() {
        let dir = tempdir().expect("tempdir");
        assert!(validate_output_path(&dir.path().join("snap.bin")).is_ok());
        assert!(validate_output_path(&dir.path().join("missing/snap.bin")).is_err());
    }

    #[test]
    fn missing_input_rejected() {
        assert!(validate_file_path(Path::new("/nonexistent/site.json")).is_err());
    }
}
