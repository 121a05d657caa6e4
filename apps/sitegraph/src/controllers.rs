//! # Configured Controllers
//!
//! Controllers declared in `[[controllers]]`. A controller with a body
//! renders it as a template: `{{node}}`, `{{name}}`, `{{user}}` and any
//! route capture or query key in double braces are substituted. Without a
//! body the controller answers with a JSON description of the request.

use crate::config::ControllerSpec;
use serde_json::json;
use sitegraph_core::{Controller, ControllerRegistry, DispatchContext, Node, SiteError};

/// Renders a configured template, or describes the request.
#[derive(Debug, Clone)]
pub struct TemplateController {
    body: Option<String>,
}

impl TemplateController {
    #[must_use]
    pub fn new(body: Option<String>) -> Self {
        Self { body }
    }
}

impl Controller for TemplateController {
    fn execute(&self, node: &Node, ctx: &mut DispatchContext) -> Result<String, SiteError> {
        let Some(body) = &self.body else {
            let description = json!({
                "node": node.id,
                "name": node.name,
                "role": ctx.request.role,
                "user": ctx.request.user,
                "captures": ctx.captures,
                "query": ctx.query,
            });
            return serde_json::to_string(&description)
                .map_err(|e| SiteError::SerializationError(e.to_string()));
        };

        let node_id = node.id.to_string();
        Ok(render(body, |key| match key {
            "node" => Some(node_id.as_str()),
            "name" => Some(node.name.as_str()),
            "user" => Some(ctx.request.user.as_deref().unwrap_or("")),
            _ => ctx.captures.get(key).map(String::as_str).or_else(|| {
                ctx.query
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.as_str())
            }),
        }))
    }
}

/// Substitute `{{key}}` placeholders in one pass over `template`.
///
/// Substituted values are never rescanned. Unknown keys stay verbatim.
fn render<'v>(template: &str, lookup: impl Fn(&str) -> Option<&'v str>) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            rest = &rest[start..];
            break;
        };
        let key = &after[..end];
        match lookup(key) {
            Some(value) => output.push_str(value),
            None => {
                output.push_str("{{");
                output.push_str(key);
                output.push_str("}}");
            }
        }
        rest = &after[end + 2..];
    }
    output.push_str(rest);
    output
}

/// Registry holding one factory per configured controller.
#[must_use]
pub fn registry_from_specs(specs: &[ControllerSpec]) -> ControllerRegistry {
    let mut registry = ControllerRegistry::new();
    for spec in specs {
        let body = spec.body.clone();
        registry.register(spec.path.clone(), move || {
            Box::new(TemplateController::new(body.clone())) as Box<dyn Controller>
        });
        tracing::debug!(path = %spec.path, "registered controller");
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitegraph_core::{NodeId, NodeRow, NodeType, RequestContext, RoleId, SiteConfig, assemble};

    fn page() -> Node {
        let graph = assemble(
            None,
            vec![NodeRow::new(4, 0, NodeType::StandardPage).named("Docs")],
            &SiteConfig::default(),
        );
        graph.get(NodeId(4)).cloned().expect("node 4")
    }

    fn context() -> DispatchContext {
        let request = RequestContext::authenticated(RoleId::new("member"), "/docs/7", "ada");
        let mut ctx = DispatchContext::new(request, NodeId(4));
        ctx.captures.insert("id".to_string(), "7".to_string());
        ctx.query.push(("tab".to_string(), "api".to_string()));
        ctx
    }

    #[test]
    fn template_substitutes_placeholders() {
        let controller = TemplateController::new(Some(
            "{{name}} #{{node}} id={{id}} tab={{tab}} user={{user}} {{other}}".to_string(),
        ));
        let out = controller.execute(&page(), &mut context()).expect("execute");
        assert_eq!(out, "Docs #4 id=7 tab=api user=ada {{other}}");
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let request =
            RequestContext::authenticated(RoleId::new("member"), "/docs/{{id}}", "{{name}}");
        let mut ctx = DispatchContext::new(request, NodeId(4));
        ctx.captures.insert("id".to_string(), "{{user}}".to_string());
        ctx.query.push(("tab".to_string(), "{{node}}".to_string()));

        let controller =
            TemplateController::new(Some("u={{user}} id={{id}} tab={{tab}}".to_string()));
        let out = controller.execute(&page(), &mut ctx).expect("execute");
        assert_eq!(out, "u={{name}} id={{user}} tab={{node}}");
    }

    #[test]
    fn unterminated_placeholder_kept() {
        assert_eq!(render("a {{b", |_| Some("x")), "a {{b");
        assert_eq!(render("{{a}}{{", |_| Some("x")), "x{{");
    }

    #[test]
    fn bodyless_controller_describes_request() {
        let controller = TemplateController::new(None);
        let out = controller.execute(&page(), &mut context()).expect("execute");
        let value: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert_eq!(value["node"], 4);
        assert_eq!(value["role"], "member");
        assert_eq!(value["captures"]["id"], "7");
    }

    #[test]
    fn registry_registers_every_spec() {
        let registry = registry_from_specs(&[
            ControllerSpec {
                path: "content/controllers/page".to_string(),
                body: None,
            },
            ControllerSpec {
                path: "docs/view".to_string(),
                body: Some("x".to_string()),
            },
        ]);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("docs/view"));
        assert!(registry.instantiate("content/controllers/page").is_some());
    }
}
