use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::info;

use crate::models::{DemoBookingForm, ErrorBody, ResourceDownloadForm, SubmissionResponse};
use crate::state::AppState;
use crate::submission::{
    FormKind, SubmissionError, SubmissionOutcome, SubmissionWorkflow, wait_seconds,
};

const ANONYMOUS: &str = "anonymous";

// Who the throttles apply to: first X-Forwarded-For hop, else one shared bucket
pub fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS)
        .to_string()
}

impl IntoResponse for SubmissionError {
    fn into_response(self) -> Response {
        let status = match &self {
            SubmissionError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SubmissionError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            SubmissionError::Relay(_) => StatusCode::BAD_GATEWAY,
            SubmissionError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            SubmissionError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            SubmissionError::AlreadySubmitted => StatusCode::CONFLICT,
        };
        let retry_after = self.retry_after().map(|d| wait_seconds(&d));

        let body = ErrorBody {
            error: self.kind(),
            message: self.user_message(),
            retry_after_seconds: retry_after,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

fn submitted(form: &SubmissionWorkflow, outcome: SubmissionOutcome) -> Response {
    Json(SubmissionResponse {
        status: "submitted",
        message: form.message().unwrap_or_default().to_string(),
        download: outcome.download,
    })
    .into_response()
}

pub async fn demo_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<DemoBookingForm>,
) -> Response {
    // fresh form per request, like a newly opened modal
    let mut form = SubmissionWorkflow::new(
        FormKind::DemoBooking,
        client_key(&headers),
        state.forms.clone(),
    );
    form.set_field("studentName", &payload.student_name);
    form.set_field("phone", &payload.phone);
    form.set_field("class", &payload.class);
    form.set_field("subjectOfInterest", &payload.subject_of_interest);

    match form.submit(&state.shutdown.child_token()).await {
        Ok(outcome) => submitted(&form, outcome),
        Err(e) => e.into_response(),
    }
}

pub async fn download_handler(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<ResourceDownloadForm>,
) -> Response {
    let resource = state.content.resource_by_slug(&slug).await;

    let Some((title, asset_url)) = resource.as_ref().and_then(|r| {
        let title = if r.title.is_empty() { slug.clone() } else { r.title.clone() };
        r.asset_url().map(|url| (title, url.to_string()))
    }) else {
        info!(slug = %slug, "Download requested for resource without a file");
        let body = ErrorBody {
            error: "resource_unavailable",
            message: "PDF file not available for this resource. Please contact us or check back later."
                .to_string(),
            retry_after_seconds: None,
        };
        return (StatusCode::NOT_FOUND, Json(body)).into_response();
    };

    let mut form = SubmissionWorkflow::new(
        FormKind::ResourceDownload { title, asset_url },
        client_key(&headers),
        state.forms.clone(),
    );
    form.set_field("studentName", &payload.student_name);
    form.set_field("phone", &payload.phone);

    match form.submit(&state.shutdown.child_token()).await {
        Ok(outcome) => submitted(&form, outcome),
        Err(e) => e.into_response(),
    }
}
