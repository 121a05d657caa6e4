//! # Dispatcher
//!
//! Executes one resolved node according to its `NodeType`.
//!
//! ## States
//!
//! | Type | Action |
//! |------|--------|
//! | standard page | controller `{plugin}/controllers/{link}`, else `{plugin}/{link}` |
//! | plain link, jump-to, placeholder | chase `extend`, redispatch once on the terminal |
//! | external file | include the file at `link` |
//! | external url | redirect to `link` |
//! | iframe | embed `link`, height from `extend` |
//! | cron | controller; a manual trigger also records the run |
//! | ajax (4 kinds) | record ajax mode, then controller |
//!
//! ## Transactions and halts
//!
//! Every dispatch runs inside exactly one transaction. A halt already set
//! before dispatch aborts without touching the node. A halt raised during
//! execution (e.g. by a controller) rolls the transaction back and is
//! returned as `SiteError::Halted`, as is any fatal error.

use crate::chaser::LinkChaser;
use crate::collaborators::{CronLedger, FileLoader, TransactionManager};
use crate::config::SiteConfig;
use crate::resolver::Resolution;
use crate::route::RouteParams;
use crate::{AccessFault, AjaxMode, Node, NodeGraph, NodeId, NodeType, RequestContext, SiteError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// CONTROLLERS
// =============================================================================

/// Executable unit behind standard, cron and ajax nodes.
pub trait Controller: Send + Sync {
    /// Run the controller for `node` and return its output.
    ///
    /// A controller may raise a halt through `ctx.raise`; the dispatcher
    /// then discards the output and rolls back.
    fn execute(&self, node: &Node, ctx: &mut DispatchContext) -> Result<String, SiteError>;
}

impl<F> Controller for F
where
    F: Fn(&Node, &mut DispatchContext) -> Result<String, SiteError> + Send + Sync,
{
    fn execute(&self, node: &Node, ctx: &mut DispatchContext) -> Result<String, SiteError> {
        self(node, ctx)
    }
}

/// Creates a fresh controller per dispatch.
pub type ControllerFactory = Box<dyn Fn() -> Box<dyn Controller> + Send + Sync>;

/// Controllers by conventional path (`{plugin}/controllers/{link}`).
#[derive(Default)]
pub struct ControllerRegistry {
    factories: BTreeMap<String, ControllerFactory>,
}

impl ControllerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `path`, replacing any previous one.
    pub fn register<F>(&mut self, path: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Controller> + Send + Sync + 'static,
    {
        self.factories.insert(path.into(), Box::new(factory));
    }

    /// Instantiate the controller registered under `path`.
    #[must_use]
    pub fn instantiate(&self, path: &str) -> Option<Box<dyn Controller>> {
        self.factories.get(path).map(|factory| factory())
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.factories.contains_key(path)
    }

    /// Registered paths in order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

/// Candidate controller paths for a node, in lookup order.
#[must_use]
pub fn controller_paths(node: &Node) -> [String; 2] {
    [
        format!("{}/controllers/{}", node.plugin, node.link),
        format!("{}/{}", node.plugin, node.link),
    ]
}

// =============================================================================
// DISPATCH CONTEXT
// =============================================================================

/// What started the dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// A requester asked for the node (manual for cron nodes).
    Request,
    /// The scheduler ran the node.
    Scheduler,
}

/// Per-dispatch state. Created before dispatch, discarded after.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub request: RequestContext,
    pub trigger: Trigger,
    /// Node currently under dispatch.
    pub current: NodeId,
    pub captures: RouteParams,
    pub query: Vec<(String, String)>,
    pub ajax: Option<AjaxMode>,
    pub notices: Vec<String>,
    halt: Option<AccessFault>,
}

impl DispatchContext {
    /// Context for dispatching `node` on behalf of `request`.
    #[must_use]
    pub fn new(request: RequestContext, node: NodeId) -> Self {
        Self {
            request,
            trigger: Trigger::Request,
            current: node,
            captures: RouteParams::new(),
            query: Vec::new(),
            ajax: None,
            notices: Vec::new(),
            halt: None,
        }
    }

    /// Context seeded from a successful resolution.
    #[must_use]
    pub fn from_resolution(request: RequestContext, resolution: Resolution) -> Self {
        Self {
            captures: resolution.captures,
            query: resolution.query,
            ..Self::new(request, resolution.node)
        }
    }

    #[must_use]
    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// Raise a halt. The first halt raised wins.
    pub fn raise(&mut self, fault: AccessFault) {
        if self.halt.is_none() {
            self.halt = Some(fault);
        }
    }

    #[must_use]
    pub fn halt(&self) -> Option<&AccessFault> {
        self.halt.as_ref()
    }

    /// Layout the templating collaborator should use, if the node asked
    /// for an ajax rendering.
    #[must_use]
    pub fn layout(&self) -> Option<&'static str> {
        self.ajax.and_then(AjaxMode::layout)
    }

    fn check_halt(&self) -> Result<(), SiteError> {
        match &self.halt {
            Some(fault) => Err(SiteError::Halted(fault.clone())),
            None => Ok(()),
        }
    }
}

// =============================================================================
// ACTIONS
// =============================================================================

/// The one concrete action a dispatch produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Controller {
        node: NodeId,
        path: String,
        output: String,
    },
    Include {
        node: NodeId,
        path: String,
        body: String,
    },
    Redirect {
        node: NodeId,
        url: String,
    },
    Iframe {
        node: NodeId,
        src: String,
        height: u64,
    },
}

impl Action {
    /// The node that produced the action.
    #[must_use]
    pub fn node(&self) -> NodeId {
        match self {
            Self::Controller { node, .. }
            | Self::Include { node, .. }
            | Self::Redirect { node, .. }
            | Self::Iframe { node, .. } => *node,
        }
    }
}

// =============================================================================
// DISPATCHER
// =============================================================================

/// The dispatch state machine over one graph snapshot.
pub struct Dispatcher<'a> {
    graph: &'a NodeGraph,
    controllers: &'a ControllerRegistry,
    files: &'a dyn FileLoader,
    transactions: &'a dyn TransactionManager,
    cron: &'a dyn CronLedger,
    config: &'a SiteConfig,
}

impl<'a> Dispatcher<'a> {
    #[must_use]
    pub fn new(
        graph: &'a NodeGraph,
        controllers: &'a ControllerRegistry,
        files: &'a dyn FileLoader,
        transactions: &'a dyn TransactionManager,
        cron: &'a dyn CronLedger,
        config: &'a SiteConfig,
    ) -> Self {
        Self {
            graph,
            controllers,
            files,
            transactions,
            cron,
            config,
        }
    }

    /// Dispatch `ctx.current`.
    pub fn dispatch(&self, ctx: &mut DispatchContext) -> Result<Action, SiteError> {
        ctx.check_halt()?;
        let node = self
            .graph
            .get(ctx.current)
            .ok_or(SiteError::NodeNotFound(ctx.current))?;

        let tx = self.transactions.begin()?;
        let result = self
            .execute(node, ctx)
            .and_then(|action| ctx.check_halt().map(|()| action));

        match result {
            Ok(action) => {
                self.transactions.commit(tx)?;
                tracing::debug!(
                    node = %node.id,
                    node_type = %node.node_type,
                    role = %ctx.request.role,
                    target = %action.node(),
                    "dispatched"
                );
                Ok(action)
            }
            Err(e) => {
                if let Err(rollback) = self.transactions.rollback(tx) {
                    tracing::error!(node = %node.id, error = %rollback, "rollback failed");
                }
                tracing::debug!(node = %node.id, error = %e, "dispatch aborted");
                Err(e)
            }
        }
    }

    fn execute(&self, node: &'a Node, ctx: &mut DispatchContext) -> Result<Action, SiteError> {
        ctx.current = node.id;
        match node.node_type {
            NodeType::StandardPage => self.run_controller(node, ctx),
            NodeType::PlainLink | NodeType::JumpTo | NodeType::Placeholder => {
                self.redispatch(node, ctx)
            }
            NodeType::ExternalFile => self.include(node),
            NodeType::ExternalUrl => Ok(Action::Redirect {
                node: node.id,
                url: node.link.clone(),
            }),
            NodeType::Iframe => Ok(Action::Iframe {
                node: node.id,
                src: node.link.clone(),
                height: node.extend.map_or(0, |h| h.0),
            }),
            NodeType::Cron => {
                let action = self.run_controller(node, ctx)?;
                if ctx.trigger == Trigger::Request && ctx.halt.is_none() {
                    self.record_cron_run(node, ctx)?;
                }
                Ok(action)
            }
            NodeType::WidgetAjax
            | NodeType::HtmlAjax
            | NodeType::LightboxAjax
            | NodeType::RawAjax => {
                ctx.ajax = node.node_type.ajax_mode();
                self.run_controller(node, ctx)
            }
        }
    }

    fn redispatch(&self, node: &'a Node, ctx: &mut DispatchContext) -> Result<Action, SiteError> {
        let front = self.config.front_page_for(ctx.request.authenticated);
        let terminal = LinkChaser::new(self.graph).chase(node.id);

        let mut target = if terminal.is_root() || terminal == node.id {
            front
        } else {
            terminal
        };
        if !self.is_terminal(target) {
            tracing::warn!(node = %node.id, target = %target, "indirection did not reach a dispatchable node, using front page");
            target = front;
        }

        match self.graph.get(target) {
            Some(next) if !next.node_type.is_indirect() => self.execute(next, ctx),
            Some(_) => Err(SiteError::UnterminatedIndirection(node.id)),
            None => Err(SiteError::NodeNotFound(target)),
        }
    }

    fn is_terminal(&self, id: NodeId) -> bool {
        self.graph
            .get(id)
            .is_some_and(|n| !n.node_type.is_indirect())
    }

    fn run_controller(&self, node: &Node, ctx: &mut DispatchContext) -> Result<Action, SiteError> {
        let paths = controller_paths(node);
        for path in &paths {
            if let Some(controller) = self.controllers.instantiate(path) {
                let output = controller.execute(node, ctx)?;
                return Ok(Action::Controller {
                    node: node.id,
                    path: path.clone(),
                    output,
                });
            }
        }
        // An upstream halt explains the missing controller.
        ctx.check_halt()?;
        Err(SiteError::ControllerMissing {
            node: node.id,
            tried: paths.to_vec(),
        })
    }

    fn include(&self, node: &Node) -> Result<Action, SiteError> {
        match self.files.load(&node.link)? {
            Some(body) => Ok(Action::Include {
                node: node.id,
                path: node.link.clone(),
                body,
            }),
            None => Err(SiteError::IncludeMissing {
                node: node.id,
                path: node.link.clone(),
            }),
        }
    }

    fn record_cron_run(&self, node: &Node, ctx: &mut DispatchContext) -> Result<(), SiteError> {
        let now = chrono::Utc::now();
        self.cron.record_run(node.id, now.timestamp())?;
        ctx.notices.push(format!(
            "Cron job '{}' ran at {}",
            node.name,
            now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        ));
        tracing::info!(node = %node.id, "cron job run recorded");
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
