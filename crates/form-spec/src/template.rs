//! Validation message templates.
//!
//! Messages are handlebars templates rendered with `field`, `label`, and
//! `value` in scope. A template that fails to render is shown verbatim.

use handlebars::Handlebars;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct MessageContext<'a> {
    pub field: &'a str,
    pub label: &'a str,
    pub value: Option<&'a Value>,
}

pub struct MessageRenderer {
    engine: Handlebars<'static>,
}

impl MessageRenderer {
    pub fn new() -> Self {
        let mut engine = Handlebars::new();
        engine.register_escape_fn(handlebars::no_escape);
        Self { engine }
    }

    pub fn render(&self, template: &str, ctx: &MessageContext<'_>) -> String {
        if !template.contains("{{") {
            return template.to_string();
        }
        match self.engine.render_template(template, ctx) {
            Ok(rendered) => rendered,
            Err(err) => {
                tracing::warn!(field = ctx.field, error = %err, "message template failed to render");
                template.to_string()
            }
        }
    }
}

impl Default for MessageRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_placeholders_without_escaping() {
        let renderer = MessageRenderer::new();
        let value = json!("<12>");
        let ctx = MessageContext {
            field: "applicant.nid",
            label: "National ID",
            value: Some(&value),
        };
        assert_eq!(
            renderer.render("{{label}} '{{value}}' must be 10 digits", &ctx),
            "National ID '<12>' must be 10 digits"
        );
    }

    #[test]
    fn broken_template_falls_back_to_source() {
        let renderer = MessageRenderer::new();
        let ctx = MessageContext {
            field: "f",
            label: "F",
            value: None,
        };
        assert_eq!(renderer.render("{{#if}}oops", &ctx), "{{#if}}oops");
        assert_eq!(renderer.render("Required", &ctx), "Required");
    }
}
