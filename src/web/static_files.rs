use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;
use std::sync::Arc;

use crate::web::state::AppState;

/// Frontend assets compiled into the binary; there is nothing to deploy
/// next to the executable.
#[derive(RustEmbed)]
#[folder = "static/"]
struct StaticAssets;

pub async fn static_handler(
    Path(path): Path<String>,
    State(_state): State<Arc<AppState>>,
) -> Response {
    let path = path.trim_start_matches('/');

    let Some(asset) = StaticAssets::get(path) else {
        return (StatusCode::NOT_FOUND, "File not found").into_response();
    };

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    ([(header::CONTENT_TYPE, mime.as_ref())], asset.data.to_vec()).into_response()
}
