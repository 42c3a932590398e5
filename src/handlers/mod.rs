mod content;
mod forms;
mod health;
mod metrics;
mod sitemap;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use crate::state::AppState;

pub use content::{
    course_handler, courses_handler, downloadable_resources_handler, post_handler, posts_handler,
    resources_handler, success_stories_handler, teachers_handler,
};
pub use forms::{client_key, demo_handler, download_handler};
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use sitemap::sitemap_handler;

// creating the router with routes
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/sitemap.xml", get(sitemap_handler))
        .route("/api/demo", post(demo_handler))
        .route("/api/resources/{slug}/download", post(download_handler))
        .route("/api/resources", get(resources_handler))
        .route("/api/resources/downloadable", get(downloadable_resources_handler))
        .route("/api/teachers", get(teachers_handler))
        .route("/api/courses", get(courses_handler))
        .route("/api/courses/{slug}", get(course_handler))
        .route("/api/success-stories", get(success_stories_handler))
        .route("/api/posts", get(posts_handler))
        .route("/api/posts/{slug}", get(post_handler))
        .with_state(state)
}
