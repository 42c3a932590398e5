//! Outbound form relay.
//!
//! Submissions are posted as JSON to a third-party relay that forwards them
//! on. Only the status code of the reply matters.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_RELAY_URL: &str = "https://api.web3forms.com";
pub const DEFAULT_FROM_NAME: &str = "The Learners Academy Website";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay rejected submission with status {0}")]
    Status(u16),
    #[error("relay unreachable: {0}")]
    Network(String),
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            RelayError::Status(status.as_u16())
        } else {
            RelayError::Network(err.to_string())
        }
    }
}

// What a form hands to the relay: a subject line plus its fields
#[derive(Debug, Clone, PartialEq)]
pub struct FormSubmission {
    pub subject: String,
    pub fields: Map<String, Value>,
}

// Wire body. Envelope keys first, form fields flattened after them.
#[derive(Debug, Serialize)]
pub struct RelayPayload<'a> {
    pub access_key: &'a str,
    pub from_name: &'a str,
    pub subject: &'a str,
    #[serde(flatten)]
    pub fields: &'a Map<String, Value>,
}

#[async_trait]
pub trait FormRelay: Send + Sync {
    async fn submit(&self, submission: &FormSubmission) -> Result<(), RelayError>;
}

/// Web3Forms-compatible relay client.
pub struct Web3FormsRelay {
    client: reqwest::Client,
    base_url: String,
    access_key: String,
    from_name: String,
    timeout: Duration,
}

impl Web3FormsRelay {
    pub fn new(client: reqwest::Client, access_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: DEFAULT_RELAY_URL.to_string(),
            access_key: access_key.into(),
            from_name: DEFAULT_FROM_NAME.to_string(),
            timeout: Duration::from_secs(15),
        }
    }

    // For tests or a self-hosted relay
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_from_name(mut self, from_name: impl Into<String>) -> Self {
        self.from_name = from_name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl FormRelay for Web3FormsRelay {
    async fn submit(&self, submission: &FormSubmission) -> Result<(), RelayError> {
        let payload = RelayPayload {
            access_key: &self.access_key,
            from_name: &self.from_name,
            subject: &submission.subject,
            fields: &submission.fields,
        };

        let res = self
            .client
            .post(format!("{}/submit", self.base_url))
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await?;

        let status = res.status();
        if status.is_success() {
            debug!(subject = %submission.subject, "Relay accepted submission");
            Ok(())
        } else {
            warn!(status = status.as_u16(), subject = %submission.subject, "Relay rejected submission");
            Err(RelayError::Status(status.as_u16()))
        }
    }
}
