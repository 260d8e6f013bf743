use std::collections::HashMap;

use handlebars::{handlebars_helper, no_escape, Handlebars};

use crate::error::FabError;
use crate::shell;

handlebars_helper!(quote: |s: str| shell::quote(s));

/// Handlebars registry for filling in command templates.
///
/// Strict mode is on, so a template naming a missing parameter fails instead
/// of rendering an empty string into a shell command. Values are not
/// escaped; use `{{quote name}}` for shell quoting.
pub struct Templates {
    registry: Handlebars<'static>,
}

impl Templates {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(no_escape);
        registry.register_helper("quote", Box::new(quote));
        Self { registry }
    }

    pub fn render(
        &self,
        template: &str,
        params: &HashMap<String, String>,
    ) -> Result<String, FabError> {
        Ok(self.registry.render_template(template, params)?)
    }
}

impl Default for Templates {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_without_html_escaping() {
        let templates = Templates::new();
        let rendered = templates
            .render("echo \"{{line}}\" > {{path}}", &params(&[("line", "a<b>&c"), ("path", "/tmp/x")]))
            .unwrap();
        assert_eq!(rendered, "echo \"a<b>&c\" > /tmp/x");
    }

    #[test]
    fn test_quote_helper() {
        let templates = Templates::new();
        let rendered = templates
            .render("-e DOMAIN={{quote domain}}", &params(&[("domain", "it's.example")]))
            .unwrap();
        assert_eq!(rendered, "-e DOMAIN='it'\\''s.example'");
    }

    #[test]
    fn test_missing_param_fails() {
        let templates = Templates::new();
        assert!(matches!(
            templates.render("fallocate -l {{gb}}G", &HashMap::new()),
            Err(FabError::TemplateError(_))
        ));
    }
}
