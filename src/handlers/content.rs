use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::models::{Course, ErrorBody, Post, Resource, SuccessStory, Teacher};
use crate::state::AppState;

// Listings never fail, an unreachable CMS just means an empty list
pub async fn teachers_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Teacher>> {
    Json(state.content.teachers().await)
}

pub async fn courses_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Course>> {
    Json(state.content.courses().await)
}

pub async fn success_stories_handler(State(state): State<Arc<AppState>>) -> Json<Vec<SuccessStory>> {
    Json(state.content.success_stories().await)
}

pub async fn posts_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Post>> {
    Json(state.content.posts().await)
}

pub async fn resources_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Resource>> {
    Json(state.content.resources().await)
}

pub async fn downloadable_resources_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Resource>> {
    Json(state.content.downloadable_resources().await)
}

pub async fn course_handler(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Response {
    match state.content.course_by_slug(&slug).await {
        Some(course) => Json(course).into_response(),
        None => not_found("course"),
    }
}

pub async fn post_handler(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Response {
    match state.content.post_by_slug(&slug).await {
        Some(post) => Json(post).into_response(),
        None => not_found("post"),
    }
}

fn not_found(what: &str) -> Response {
    let body = ErrorBody {
        error: "not_found",
        message: format!("This {} could not be found. Please check the link or browse the site.", what),
        retry_after_seconds: None,
    };
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}
