//! Lead capture and CMS content gateway for a tutoring business website.
//!
//! Throttles and relays the demo-booking and resource-download forms, and
//! serves typed content from the headless CMS with graceful fallbacks.

pub mod cache;
pub mod config;
pub mod content;
pub mod download;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod relay;
pub mod sitemap;
pub mod state;
pub mod submission;
pub mod worker;
