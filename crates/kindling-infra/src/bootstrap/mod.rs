//! Cluster and add-on generation
//!
//! One module per pipeline step that needs a payload. Templates live in
//! `templates/` and are embedded at compile time.

pub mod argocd;
pub mod cert_manager;
pub mod dns;
pub mod ingress;
pub mod kind;
pub mod metallb;
pub mod registry;

use minijinja::{AutoEscape, Environment, UndefinedBehavior, Value};
use thiserror::Error;

/// Template rendering failure
#[derive(Debug, Error)]
#[error("failed to render {template}: {source}")]
pub struct RenderError {
    /// Template name
    pub template: &'static str,
    /// Underlying minijinja error
    #[source]
    pub source: minijinja::Error,
}

/// Render an embedded template. Undefined variables are errors.
pub(crate) fn render(
    name: &'static str,
    template: &'static str,
    ctx: Value,
) -> Result<String, RenderError> {
    let wrap = |source| RenderError {
        template: name,
        source,
    };

    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    // YAML is not HTML; never escape substituted values
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.set_keep_trailing_newline(true);
    env.add_template(name, template).map_err(wrap)?;
    env.get_template(name).map_err(wrap)?.render(ctx).map_err(wrap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn render_substitutes_variables() {
        let out = render("t", "name: {{ name }}\n", context! { name => "dev" }).unwrap();
        assert_eq!(out, "name: dev\n");
    }

    #[test]
    fn render_rejects_undefined_variables() {
        let err = render("t", "name: {{ missing }}", context! {}).unwrap_err();
        assert_eq!(err.template, "t");
    }
}
