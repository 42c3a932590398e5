use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
};
use std::sync::Arc;

use crate::sitemap::{build_sitemap, render_xml};
use crate::state::AppState;

pub async fn sitemap_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let entries = build_sitemap(&state.site_url, &state.content, chrono::Utc::now()).await;
    (
        [(header::CONTENT_TYPE, "application/xml")],
        render_xml(&entries),
    )
}
