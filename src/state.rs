use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use crate::content::ContentService;
use crate::submission::WorkflowDeps;

// app's shared state
#[derive(Clone)]
pub struct AppState {
    pub content: Arc<ContentService>,
    pub forms: WorkflowDeps, // limiter, relay, download trigger + timings
    pub site_url: String,
    pub shutdown: CancellationToken, // cancels in-flight relay calls on shutdown
}
