//! # Routing Scenarios
//!
//! End-to-end checks through builder, resolver and dispatcher with the
//! in-memory collaborators.

#![allow(clippy::panic)]

use sitegraph_core::{
    AccessFault, Action, ControllerRegistry, DispatchContext, Dispatcher, GraphBuilder,
    GraphCache, LinkChaser, MemoryCache, MemoryCronLedger, MemoryFiles, MemoryNodeSource, Node,
    NodeGraph, NodeId, NodeRow, NodeType, RequestContext, Resolver, RoleId, RouteTable,
    SiteConfig, SiteError, TracingTransactions, graph_to_bytes,
};

// =============================================================================
// FIXTURE
// =============================================================================

struct Site {
    source: MemoryNodeSource,
    cache: MemoryCache,
    config: SiteConfig,
    controllers: ControllerRegistry,
    files: MemoryFiles,
    transactions: TracingTransactions,
    cron: MemoryCronLedger,
}

fn echo(node: &Node, ctx: &mut DispatchContext) -> Result<String, SiteError> {
    let captures: Vec<String> = ctx
        .captures
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    Ok(format!("{}:{}[{}]", node.plugin, node.link, captures.join(",")))
}

fn guest() -> RoleId {
    RoleId::new("guest")
}

fn member() -> RoleId {
    RoleId::new("member")
}

impl Site {
    fn new(sef: bool) -> Self {
        let mut source = MemoryNodeSource::new();
        source.insert(
            NodeRow::new(1, 0, NodeType::StandardPage)
                .named("Home")
                .linking("content", "home")
                .aliased("home")
                .ranked(1),
        );
        source.insert(
            NodeRow::new(2, 0, NodeType::PlainLink)
                .named("Start")
                .aliased("start")
                .extending(1)
                .ranked(2),
        );
        source.insert(
            NodeRow::new(5, 0, NodeType::ExternalUrl)
                .named("Upstream")
                .linking("", "https://upstream.example.org/")
                .aliased("upstream")
                .ranked(3),
        );
        source.insert(
            NodeRow::new(7, 0, NodeType::StandardPage)
                .named("Secret")
                .linking("content", "secret")
                .aliased("secret")
                .ranked(4),
        );
        source.insert(
            NodeRow::new(9, 0, NodeType::StandardPage)
                .named("About")
                .linking("content", "about")
                .aliased("about")
                .ranked(5),
        );
        source.insert(
            NodeRow::new(11, 0, NodeType::StandardPage)
                .named("Docs")
                .linking("docs", "view")
                .routed("page/<:id>")
                .ranked(6),
        );
        source.insert(
            NodeRow::new(12, 1, NodeType::PlainLink)
                .named("Loop")
                .aliased("loop")
                .extending(12)
                .ranked(7),
        );
        for id in [1, 2, 5, 9, 11, 12] {
            source.grant(&guest(), id);
        }
        source.grant_all(&member());

        let mut controllers = ControllerRegistry::new();
        for path in [
            "content/controllers/home",
            "content/controllers/secret",
            "content/controllers/about",
            "docs/controllers/view",
        ] {
            controllers.register(path, || Box::new(echo));
        }

        Self {
            source,
            cache: MemoryCache::new(),
            config: SiteConfig {
                absolute_url: "https://example.org".to_string(),
                sef,
                ..SiteConfig::default()
            },
            controllers,
            files: MemoryFiles::new(),
            transactions: TracingTransactions::new(),
            cron: MemoryCronLedger::new(),
        }
    }

    fn builder(&self) -> GraphBuilder<'_> {
        GraphBuilder::new(&self.source, &self.cache, &self.config)
    }

    fn graph(&self, role: &RoleId) -> NodeGraph {
        self.builder().build(role).expect("build graph")
    }

    /// Resolve and dispatch one request.
    fn serve(&self, request: RequestContext) -> Result<Action, SiteError> {
        let builder = self.builder();
        let graph = builder.build(&request.role)?;
        let resolution = Resolver::new(&graph, &builder, &self.config).resolve(&request)?;
        let mut ctx = DispatchContext::from_resolution(request, resolution);
        Dispatcher::new(
            &graph,
            &self.controllers,
            &self.files,
            &self.transactions,
            &self.cron,
            &self.config,
        )
        .dispatch(&mut ctx)
    }
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[test]
fn build_twice_is_byte_identical() {
    let site = Site::new(true);
    let first = site.graph(&guest());
    site.cache.flush(None).expect("flush");
    let second = site.graph(&guest());

    assert_eq!(
        graph_to_bytes(&first).expect("encode"),
        graph_to_bytes(&second).expect("encode")
    );
}

#[test]
fn empty_catcher_or_pattern_is_a_no_op() {
    let mut table = RouteTable::new();
    assert!(!table.add_route("", "/x", None, None));
    assert!(!table.add_route("5", "", None, None));
    assert!(table.is_empty());
}

#[test]
fn named_capture_scenario() {
    let mut table = RouteTable::new();
    assert!(table.add_route("77", "docs/<:id>", None, None));

    assert_eq!(table.match_route("docs/42"), Some(NodeId(77)));
    assert_eq!(
        table.parameters().get("id").map(String::as_str),
        Some("42")
    );
    assert_eq!(table.match_route("/nowhere"), None);
}

#[test]
fn unknown_path_is_not_found() {
    let site = Site::new(true);
    let result = site.serve(RequestContext::anonymous(guest(), "/nowhere"));
    assert!(matches!(
        result,
        Err(SiteError::Halted(AccessFault::NotFound { .. }))
    ));
}

#[test]
fn build_url_in_both_modes() {
    let sef = Site::new(true);
    let graph = sef.graph(&guest());
    assert_eq!(
        graph.build_url(NodeId(9), &[], &sef.config).as_deref(),
        Some("https://example.org/about")
    );

    let legacy = Site::new(false);
    let graph = legacy.graph(&guest());
    assert_eq!(
        graph.build_url(NodeId(9), &[], &legacy.config).as_deref(),
        Some("https://example.org/index.php?m=9")
    );
}

#[test]
fn self_extending_link_terminates() {
    let site = Site::new(true);
    let graph = site.graph(&guest());
    // 12 sits under 1, so the escape lands on 1's terminal.
    assert_eq!(LinkChaser::new(&graph).chase(NodeId(12)), NodeId(1));

    let action = site
        .serve(RequestContext::anonymous(guest(), "/loop"))
        .expect("dispatch");
    assert_eq!(action.node(), NodeId(1));
}

#[test]
fn external_url_redirects_without_controller() {
    let site = Site::new(true);
    let action = site
        .serve(RequestContext::anonymous(guest(), "/upstream"))
        .expect("dispatch");
    assert_eq!(
        action,
        Action::Redirect {
            node: NodeId(5),
            url: "https://upstream.example.org/".to_string()
        }
    );
}

#[test]
fn plain_link_runs_target_controller() {
    let site = Site::new(false);
    let action = site
        .serve(RequestContext::anonymous(guest(), "/index.php?m=2"))
        .expect("dispatch");
    match action {
        Action::Controller { node, path, output } => {
            assert_eq!(node, NodeId(1));
            assert_eq!(path, "content/controllers/home");
            assert_eq!(output, "content:home[]");
        }
        other => panic!("expected controller action, got {:?}", other),
    }
    assert_eq!(site.transactions.begun(), 1);
    assert_eq!(site.transactions.committed(), 1);
}

#[test]
fn secret_node_by_permission_and_auth_state() {
    let site = Site::new(true);

    let anonymous = site.serve(RequestContext::anonymous(guest(), "/secret"));
    assert!(matches!(
        anonymous,
        Err(SiteError::Halted(AccessFault::Unauthenticated { node: NodeId(7) }))
    ));

    let authenticated = site.serve(RequestContext::authenticated(guest(), "/secret", "alice"));
    assert!(matches!(
        authenticated,
        Err(SiteError::Halted(AccessFault::Forbidden { node: NodeId(7) }))
    ));

    let permitted = site
        .serve(RequestContext::authenticated(member(), "/secret", "alice"))
        .expect("dispatch");
    assert_eq!(permitted.node(), NodeId(7));
}

#[test]
fn route_captures_reach_the_controller() {
    let site = Site::new(true);
    let action = site
        .serve(RequestContext::anonymous(guest(), "/docs/page/42?tab=api"))
        .expect("dispatch");
    assert!(matches!(
        action,
        Action::Controller { ref output, .. } if output == "docs:view[id=42]"
    ));
}

#[test]
fn front_page_for_empty_path() {
    let site = Site::new(true);
    let action = site
        .serve(RequestContext::anonymous(guest(), "/"))
        .expect("dispatch");
    assert_eq!(action.node(), NodeId(1));
}

#[test]
fn flush_forces_rebuild_after_permission_change() {
    let mut site = Site::new(true);
    assert!(!site.graph(&guest()).contains(NodeId(7)));

    site.source.grant(&guest(), 7);
    // Stale snapshot until flushed.
    assert!(!site.graph(&guest()).contains(NodeId(7)));

    site.builder().flush(Some(&guest())).expect("flush");
    assert!(site.graph(&guest()).contains(NodeId(7)));
}
