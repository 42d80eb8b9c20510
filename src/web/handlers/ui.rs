use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use minijinja::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::llm::schema::ORDERS_TABLE;
use crate::web::state::AppState;
use crate::web::templates::render_template;

// Main UI entry point
pub async fn index_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut context = HashMap::new();
    context.insert("version", Value::from(env!("CARGO_PKG_VERSION")));
    context.insert("table", Value::from(ORDERS_TABLE));

    Html(render_template(&state.template_env, "index.html", context))
}
