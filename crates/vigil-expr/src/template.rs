use handlebars::Handlebars;

use crate::env::Env;
use crate::error::{ExprError, Result};

/// Renders a Handlebars template against the bindings in `env`.
///
/// Output is not HTML-escaped and missing fields render as empty strings.
/// Syntax errors and references to unknown partials fail with
/// [`ExprError::Template`].
pub fn render(template: &str, env: &Env) -> Result<String> {
    let mut reg = Handlebars::new();
    reg.register_escape_fn(handlebars::no_escape);
    reg.set_strict_mode(false);

    reg.render_template(template, &env.to_json())
        .map_err(|e| ExprError::Template(e.to_string()))
}
