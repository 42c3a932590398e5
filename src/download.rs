use serde::Serialize;
use tracing::info;

use crate::metrics::DOWNLOADS_TRIGGERED;

// File download handed to the client once a download form goes through
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRequest {
    pub url: String,
    pub filename: String,
}

impl DownloadRequest {
    pub fn for_resource(title: &str, url: &str) -> Self {
        Self {
            url: url.to_string(),
            filename: download_filename(title),
        }
    }
}

pub fn download_filename(title: &str) -> String {
    format!("{}.pdf", title)
}

/// Starts a file download for the client.
pub trait DownloadTrigger: Send + Sync {
    fn trigger(&self, request: &DownloadRequest);
}

// Service side trigger: the directive itself goes back in the HTTP response,
// this only records that it happened
pub struct DownloadLog;

impl DownloadTrigger for DownloadLog {
    fn trigger(&self, request: &DownloadRequest) {
        DOWNLOADS_TRIGGERED.inc();
        info!(url = %request.url, filename = %request.filename, "Starting download");
    }
}
