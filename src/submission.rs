//! Lead-capture form lifecycle.
//!
//! One `SubmissionWorkflow` per opened form. It validates the fields, runs
//! the cooldown and hourly cap, relays the submission and, for resource
//! downloads, hands out the file once the relay accepted it.
//!
//! ```text
//! Idle -> Submitting -> Submitted
//!            |  \
//!            |   +--> Failed (relay error, timeout, cancel; retry allowed)
//!            +------> Idle   (rate limited)
//! ```

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::download::{DownloadRequest, DownloadTrigger};
use crate::metrics::{FORM_SUBMISSIONS, RATE_LIMITED, RELAY_LATENCY};
use crate::rate_limit::{Admission, RateLimiter, ThrottlePolicy};
use crate::relay::{FormRelay, FormSubmission, RelayError};

pub const PHONE_FIELD: &str = "phone";
pub const PHONE_MAX_DIGITS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Submitting,
    Submitted,
    Failed,
}

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    label: &'static str,
    required: bool,
}

const DEMO_FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "studentName", label: "Student name", required: true },
    FieldSpec { name: PHONE_FIELD, label: "Phone number", required: true },
    FieldSpec { name: "class", label: "Class", required: true },
    FieldSpec { name: "subjectOfInterest", label: "Subject of interest", required: false },
];

const DOWNLOAD_FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "studentName", label: "Student name", required: true },
    FieldSpec { name: PHONE_FIELD, label: "Phone number", required: true },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormKind {
    DemoBooking,
    ResourceDownload { title: String, asset_url: String },
}

impl FormKind {
    // Rate limit action, shared by every instance of this form
    pub fn action(&self) -> &'static str {
        match self {
            FormKind::DemoBooking => "demo_submission",
            FormKind::ResourceDownload { .. } => "resource_download",
        }
    }

    fn fields(&self) -> &'static [FieldSpec] {
        match self {
            FormKind::DemoBooking => DEMO_FIELDS,
            FormKind::ResourceDownload { .. } => DOWNLOAD_FIELDS,
        }
    }

    fn subject(&self) -> String {
        match self {
            FormKind::DemoBooking => "New Demo Booking Request".to_string(),
            FormKind::ResourceDownload { title, .. } => {
                format!("Resource Download Request - {}", title)
            }
        }
    }

    fn success_message(&self) -> &'static str {
        match self {
            FormKind::DemoBooking => {
                "Thank you! We'll contact you soon to schedule your free demo class."
            }
            FormKind::ResourceDownload { .. } => {
                "Download started! Your download should begin shortly. Thank you for providing your details."
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("{label} is required")]
    Validation { field: &'static str, label: &'static str },
    #[error("rate limited, retry in {}s", wait_seconds(.wait))]
    RateLimited { wait: Duration },
    #[error("relay failed: {0}")]
    Relay(#[from] RelayError),
    #[error("relay did not answer within {}s", .after.as_secs())]
    Timeout { after: Duration },
    #[error("submission cancelled")]
    Cancelled,
    #[error("form already submitted")]
    AlreadySubmitted,
}

impl SubmissionError {
    pub fn kind(&self) -> &'static str {
        match self {
            SubmissionError::Validation { .. } => "validation",
            SubmissionError::RateLimited { .. } => "rate_limited",
            SubmissionError::Relay(_) => "relay",
            SubmissionError::Timeout { .. } => "timeout",
            SubmissionError::Cancelled => "cancelled",
            SubmissionError::AlreadySubmitted => "already_submitted",
        }
    }

    // What the visitor sees, always with a next step
    pub fn user_message(&self) -> String {
        match self {
            SubmissionError::Validation { label, .. } => format!("Please fill in {}.", label),
            SubmissionError::RateLimited { wait } => format!(
                "Too many requests. Please wait {} seconds before trying again.",
                wait_seconds(wait)
            ),
            SubmissionError::Relay(_) => {
                "There was an error submitting your request. Please try again.".to_string()
            }
            SubmissionError::Timeout { .. } => {
                "The request took too long. Please try again, or contact us directly.".to_string()
            }
            SubmissionError::Cancelled => {
                "The request was cancelled. Please try again.".to_string()
            }
            SubmissionError::AlreadySubmitted => {
                "This form has already been submitted. Close it to start a new one.".to_string()
            }
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SubmissionError::RateLimited { wait } => Some(*wait),
            _ => None,
        }
    }
}

// Whole seconds, rounded up so "wait 0 seconds" is never shown for a real wait
pub fn wait_seconds(wait: &Duration) -> u64 {
    wait.as_millis().div_ceil(1000) as u64
}

/// Field values of one form instance, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormFields {
    values: Vec<(&'static str, String)>,
}

impl FormFields {
    fn empty(specs: &[FieldSpec]) -> Self {
        Self {
            values: specs.iter().map(|f| (f.name, String::new())).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.values.iter().map(|(n, v)| (*n, v.as_str()))
    }

    pub fn is_blank(&self) -> bool {
        self.values.iter().all(|(_, v)| v.is_empty())
    }

    fn set(&mut self, name: &str, value: String) -> bool {
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    fn clear(&mut self) {
        for (_, v) in &mut self.values {
            v.clear();
        }
    }
}

// Digits only, capped at a mobile number's length
pub fn filter_phone(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_digit())
        .take(PHONE_MAX_DIGITS)
        .collect()
}

// Everything a workflow needs from the outside, cheap to clone per form
#[derive(Clone)]
pub struct WorkflowDeps {
    pub limiter: Arc<RateLimiter>,
    pub relay: Arc<dyn FormRelay>,
    pub downloads: Arc<dyn DownloadTrigger>,
    pub policy: ThrottlePolicy,
    pub relay_timeout: Duration,
    pub download_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionOutcome {
    pub download: Option<DownloadRequest>,
}

pub struct SubmissionWorkflow {
    kind: FormKind,
    client: String,
    state: SubmissionState,
    fields: FormFields,
    message: Option<String>,
    deps: WorkflowDeps,
}

impl SubmissionWorkflow {
    /// A fresh, idle form for `client` (the key the throttles are scoped to).
    pub fn new(kind: FormKind, client: impl Into<String>, deps: WorkflowDeps) -> Self {
        let fields = FormFields::empty(kind.fields());
        Self {
            kind,
            client: client.into(),
            state: SubmissionState::Idle,
            fields,
            message: None,
            deps,
        }
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    pub fn fields(&self) -> &FormFields {
        &self.fields
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn rate_limit_key(&self) -> String {
        format!("{}:{}", self.kind.action(), self.client)
    }

    /// Update a field as the visitor types. The phone field drops anything
    /// that is not a digit. Unknown field names are ignored.
    pub fn set_field(&mut self, name: &str, value: &str) {
        let value = if name == PHONE_FIELD {
            filter_phone(value)
        } else {
            value.to_string()
        };
        if !self.fields.set(name, value) {
            warn!(field = name, action = self.kind.action(), "Ignoring unknown form field");
        }
    }

    fn validate(&self) -> Result<(), SubmissionError> {
        for spec in self.kind.fields().iter().filter(|f| f.required) {
            let blank = self
                .fields
                .get(spec.name)
                .is_none_or(|v| v.trim().is_empty());
            if blank {
                return Err(SubmissionError::Validation {
                    field: spec.name,
                    label: spec.label,
                });
            }
        }
        Ok(())
    }

    fn build_submission(&self) -> FormSubmission {
        let mut fields = Map::new();
        for (name, value) in self.fields.iter() {
            fields.insert(name.to_string(), Value::String(value.to_string()));
        }
        if let FormKind::ResourceDownload { title, .. } = &self.kind {
            fields.insert("resource_downloaded".into(), Value::String(title.clone()));
            // spam trap, always empty for real visitors
            fields.insert("_honeypot".into(), Value::String(String::new()));
            fields.insert("_captcha".into(), Value::Bool(false));
        }
        FormSubmission {
            subject: self.kind.subject(),
            fields,
        }
    }

    // Leave Submitting for `state`, remembering what to show
    fn settle(&mut self, state: SubmissionState, err: SubmissionError) -> SubmissionError {
        self.state = state;
        self.message = Some(err.user_message());
        err
    }

    /// Drive one submission attempt. Taking `&mut self` means a single form
    /// can never have two attempts in flight.
    pub async fn submit(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let result = self.run(cancel).await;

        let outcome = match &result {
            Ok(_) => "submitted",
            Err(e) => e.kind(),
        };
        FORM_SUBMISSIONS
            .with_label_values(&[self.kind.action(), outcome])
            .inc();

        result
    }

    async fn run(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        if self.state == SubmissionState::Submitted {
            return Err(SubmissionError::AlreadySubmitted);
        }

        if let Err(e) = self.validate() {
            return Err(self.settle(SubmissionState::Idle, e));
        }

        self.state = SubmissionState::Submitting;
        self.message = None;

        let key = self.rate_limit_key();
        let limiter = Arc::clone(&self.deps.limiter);
        let policy = self.deps.policy;

        // cooldown, hourly cap and an in-flight hold in one step, so a second
        // request from the same client cannot slip in while this one is relayed
        let hold = policy.cooldown.max(self.deps.relay_timeout);
        let wait_ms = match limiter.admit(&key, policy.max_attempts, policy.window, hold) {
            Admission::Allowed => None,
            Admission::CoolingDown { wait_ms } => {
                info!(key = %key, wait_ms, "Submission still cooling down");
                Some(wait_ms)
            }
            Admission::Exhausted { wait_ms } => {
                info!(key = %key, wait_ms, "Submission cap reached");
                Some(wait_ms)
            }
        };
        if let Some(wait_ms) = wait_ms {
            RATE_LIMITED.with_label_values(&[self.kind.action()]).inc();
            let err = SubmissionError::RateLimited {
                wait: Duration::from_millis(wait_ms),
            };
            return Err(self.settle(SubmissionState::Idle, err));
        }

        let submission = self.build_submission();
        let timeout = self.deps.relay_timeout;
        let relay = Arc::clone(&self.deps.relay);
        let start = Instant::now();

        let relayed = tokio::select! {
            _ = cancel.cancelled() => Err(SubmissionError::Cancelled),
            res = tokio::time::timeout(timeout, relay.submit(&submission)) => match res {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(SubmissionError::Relay(e)),
                Err(_) => Err(SubmissionError::Timeout { after: timeout }),
            },
        };
        RELAY_LATENCY.observe(start.elapsed().as_secs_f64());

        if let Err(e) = relayed {
            warn!(key = %key, error = %e, "Form submission failed");
            limiter.release_cooldown(&key);
            // fields stay as typed so the visitor can retry
            return Err(self.settle(SubmissionState::Failed, e));
        }

        limiter.set_cooldown(&key, policy.cooldown);
        self.state = SubmissionState::Submitted;
        self.fields.clear();
        self.message = Some(self.kind.success_message().to_string());
        info!(key = %key, "Form submitted");

        let download = match &self.kind {
            FormKind::ResourceDownload { title, asset_url } => {
                // let the success message show before the file starts
                tokio::time::sleep(self.deps.download_delay).await;
                let request = DownloadRequest::for_resource(title, asset_url);
                self.deps.downloads.trigger(&request);
                Some(request)
            }
            FormKind::DemoBooking => None,
        };

        Ok(SubmissionOutcome { download })
    }
}
