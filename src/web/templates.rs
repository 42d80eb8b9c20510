use minijinja::Environment;
use std::collections::HashMap;
use tracing::error;

/// Template environment with the page shell registered at build time.
pub fn init_templates() -> Environment<'static> {
    let mut env = Environment::new();

    env.add_template("index.html", include_str!("../../templates/index.html"))
        .expect("Failed to add index template");

    env.add_filter("json", |value: minijinja::value::Value| {
        serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string())
    });

    env
}

/// Renders a registered template, degrading to a bare error page rather
/// than failing the request.
pub fn render_template(
    env: &Environment,
    template_name: &str,
    context: HashMap<&str, minijinja::value::Value>,
) -> String {
    let rendered = env
        .get_template(template_name)
        .and_then(|tmpl| tmpl.render(context));

    rendered.unwrap_or_else(|e| {
        error!("Failed to render template {}: {}", template_name, e);
        format!("<h1>Template Error</h1><p>{}</p>", e)
    })
}
