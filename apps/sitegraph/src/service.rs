//! # Site Service
//!
//! Owns the redb store, the snapshot cache and the dispatch collaborators,
//! and runs one request through build -> resolve -> dispatch.
//!
//! Built snapshots are also held in process as `Arc<NodeGraph>` so requests
//! do not decode the cached bytes every time. `flush` clears both layers.
//! Only the guest role and roles holding grants are built and kept; any
//! other role name sees an empty graph that is neither cached nor held.
//!
//! Everything here is synchronous; the HTTP layer calls it from the
//! blocking pool.

use crate::config::AppConfig;
use crate::controllers::registry_from_specs;
use crate::files::FsLoader;
use sitegraph_core::{
    AccessFault, Action, AjaxMode, ControllerRegistry, CronLedger, DispatchContext, Dispatcher,
    FileLoader, GraphBuilder, MenuBuilder, MenuItem, NodeGraph, NodeId, RedbCache, RedbSiteStore,
    RequestContext, Resolver, RoleId, SiteConfig, SiteError, TracingTransactions, Trigger,
    graph_to_bytes,
};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Outcome of a successful dispatch.
#[derive(Debug, Clone)]
pub struct Served {
    pub action: Action,
    pub ajax: Option<AjaxMode>,
    pub layout: Option<&'static str>,
    pub notices: Vec<String>,
    /// Trail from the top level down to the dispatched node.
    pub breadcrumbs: Vec<MenuItem>,
}

/// Shared site state behind the CLI and the HTTP API.
pub struct SiteService {
    store: RedbSiteStore,
    cache: RedbCache,
    files: Box<dyn FileLoader>,
    controllers: ControllerRegistry,
    transactions: TracingTransactions,
    site: SiteConfig,
    snapshots: RwLock<BTreeMap<RoleId, Arc<NodeGraph>>>,
}

impl std::fmt::Debug for SiteService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteService")
            .field("store", &self.store)
            .field("controllers", &self.controllers)
            .field("site", &self.site)
            .finish()
    }
}

fn poisoned(e: impl std::fmt::Display) -> SiteError {
    SiteError::IoError(format!("snapshot lock poisoned: {}", e))
}

impl SiteService {
    /// Assemble a service from its parts.
    #[must_use]
    pub fn new(
        store: RedbSiteStore,
        cache: RedbCache,
        files: Box<dyn FileLoader>,
        controllers: ControllerRegistry,
        site: SiteConfig,
    ) -> Self {
        Self {
            store,
            cache,
            files,
            controllers,
            transactions: TracingTransactions::new(),
            site,
            snapshots: RwLock::new(BTreeMap::new()),
        }
    }

    /// Open the database named by the configuration and wire everything up.
    pub fn open(config: &AppConfig) -> Result<Self, SiteError> {
        let store = RedbSiteStore::open(&config.storage.database)?;
        let cache = RedbCache::shared_with(&store)?;
        let files = FsLoader::new(&config.storage.include_root);
        let controllers = registry_from_specs(&config.controllers);
        tracing::info!(
            database = %config.storage.database.display(),
            controllers = controllers.len(),
            "site service ready"
        );
        Ok(Self::new(
            store,
            cache,
            Box::new(files),
            controllers,
            config.site.clone(),
        ))
    }

    #[must_use]
    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    #[must_use]
    pub fn store(&self) -> &RedbSiteStore {
        &self.store
    }

    #[must_use]
    pub fn cache(&self) -> &RedbCache {
        &self.cache
    }

    #[must_use]
    pub fn transactions(&self) -> &TracingTransactions {
        &self.transactions
    }

    /// Role used when a request names none.
    #[must_use]
    pub fn guest_role(&self) -> RoleId {
        RoleId::new(self.site.guest_role.clone())
    }

    fn builder(&self) -> GraphBuilder<'_> {
        GraphBuilder::new(&self.store, &self.cache, &self.site)
    }

    /// Snapshot for `role`, from process memory, the cache, or a fresh build.
    pub fn graph(&self, role: &RoleId) -> Result<Arc<NodeGraph>, SiteError> {
        if let Some(graph) = self.snapshots.read().map_err(poisoned)?.get(role) {
            return Ok(Arc::clone(graph));
        }
        if role.is_empty() {
            return Err(SiteError::NoRole);
        }
        if *role != self.guest_role() && !self.store.has_role(role)? {
            tracing::debug!(role = %role, "role holds no grants, using an empty graph");
            return Ok(Arc::new(NodeGraph::new(Some(role.clone()))));
        }
        let graph = Arc::new(self.builder().build(role)?);
        self.snapshots
            .write()
            .map_err(poisoned)?
            .insert(role.clone(), Arc::clone(&graph));
        Ok(graph)
    }

    /// Encoded snapshot bytes for `role`.
    pub fn snapshot_bytes(&self, role: &RoleId) -> Result<Vec<u8>, SiteError> {
        graph_to_bytes(self.graph(role)?.as_ref())
    }

    /// Drop snapshots for one role, or all of them.
    pub fn flush(&self, role: Option<&RoleId>) -> Result<(), SiteError> {
        {
            let mut snapshots = self.snapshots.write().map_err(poisoned)?;
            match role {
                Some(role) => {
                    snapshots.remove(role);
                }
                None => snapshots.clear(),
            }
        }
        self.builder().flush(role)
    }

    /// Number of snapshots held in process.
    pub fn held_snapshots(&self) -> Result<usize, SiteError> {
        Ok(self.snapshots.read().map_err(poisoned)?.len())
    }

    /// Resolve and dispatch one request.
    ///
    /// A `halt` raised upstream (e.g. by rate limiting) aborts dispatch; it
    /// also wins over a resolution failure.
    pub fn serve(
        &self,
        request: RequestContext,
        halt: Option<AccessFault>,
    ) -> Result<Served, SiteError> {
        let graph = self.graph(&request.role)?;
        let builder = self.builder();
        let resolver = Resolver::new(&graph, &builder, &self.site);

        let resolution = match (resolver.resolve(&request), &halt) {
            (Ok(resolution), _) => resolution,
            (Err(_), Some(fault)) => return Err(SiteError::Halted(fault.clone())),
            (Err(e), None) => return Err(e),
        };

        let mut ctx = DispatchContext::from_resolution(request, resolution);
        if let Some(fault) = halt {
            ctx.raise(fault);
        }
        let action = self.dispatcher(&graph).dispatch(&mut ctx)?;
        Ok(self.served(&graph, action, ctx))
    }

    /// Run a cron node on behalf of the scheduler and record the run.
    pub fn run_scheduled(&self, node: NodeId, at: i64) -> Result<Served, SiteError> {
        let graph = self.graph(&self.guest_role())?;
        let unfiltered;
        let graph: &NodeGraph = if graph.contains(node) {
            &graph
        } else {
            unfiltered = self.builder().build_unfiltered()?;
            &unfiltered
        };

        let request = RequestContext::anonymous(self.guest_role(), format!("cron:{}", node));
        let mut ctx = DispatchContext::new(request, node).with_trigger(Trigger::Scheduler);
        let action = self.dispatcher(graph).dispatch(&mut ctx)?;
        self.store.record_run(node, at)?;
        tracing::info!(node = %node, at, "scheduled run recorded");
        Ok(self.served(graph, action, ctx))
    }

    fn dispatcher<'a>(&'a self, graph: &'a NodeGraph) -> Dispatcher<'a> {
        Dispatcher::new(
            graph,
            &self.controllers,
            self.files.as_ref(),
            &self.transactions,
            &self.store,
            &self.site,
        )
    }

    fn served(&self, graph: &NodeGraph, action: Action, ctx: DispatchContext) -> Served {
        let breadcrumbs = MenuBuilder::new(graph, ctx.request.authenticated).breadcrumbs(action.node());
        Served {
            layout: ctx.layout(),
            ajax: ctx.ajax,
            notices: ctx.notices,
            breadcrumbs,
            action,
        }
    }
}
