use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, Histogram, IntCounterVec, register_counter, register_gauge,
    register_histogram, register_int_counter_vec,
};

lazy_static! {
    // labels: form, outcome
    pub static ref FORM_SUBMISSIONS: IntCounterVec = register_int_counter_vec!(
        "lead_form_submissions_total",
        "Form submissions by form and outcome",
        &["form", "outcome"]
    )
    .unwrap();
    pub static ref RATE_LIMITED: IntCounterVec = register_int_counter_vec!(
        "lead_rate_limited_total",
        "Attempts denied by the rate limiter",
        &["action"]
    )
    .unwrap();
    pub static ref RELAY_LATENCY: Histogram = register_histogram!(
        "lead_relay_latency_seconds",
        "Form relay call latency in seconds"
    )
    .unwrap();
    pub static ref DOWNLOADS_TRIGGERED: Counter =
        register_counter!("lead_downloads_triggered_total", "Resource downloads handed out").unwrap();
    pub static ref CONTENT_CACHE_HITS: Counter =
        register_counter!("lead_content_cache_hits_total", "Content cache hits").unwrap();
    pub static ref CONTENT_CACHE_MISSES: Counter =
        register_counter!("lead_content_cache_misses_total", "Content cache misses").unwrap();
    pub static ref CONTENT_FALLBACKS: IntCounterVec = register_int_counter_vec!(
        "lead_content_fallbacks_total",
        "Content queries answered with the empty fallback",
        &["query"]
    )
    .unwrap();
    pub static ref CONTENT_CACHE_SIZE: Gauge =
        register_gauge!("lead_content_cache_size", "Current number of items in content cache").unwrap();
}
