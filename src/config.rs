use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::content::{ContentLimits, DEFAULT_API_VERSION};
use crate::rate_limit::ThrottlePolicy;
use crate::relay::{DEFAULT_FROM_NAME, DEFAULT_RELAY_URL};

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "lead-gateway")]
#[command(about = "Lead capture and content gateway for the tutoring site")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    // Form relay base url, submissions go to <url>/submit
    #[arg(long, default_value = DEFAULT_RELAY_URL)]
    pub relay_url: String,

    // Relay access key
    #[arg(long, env = "WEB3FORMS_ACCESS_KEY", default_value = "", hide_env_values = true)]
    pub relay_access_key: String,

    // Sender name shown in relayed mails
    #[arg(long, default_value = DEFAULT_FROM_NAME)]
    pub from_name: String,

    // Give up on the relay after this many seconds
    #[arg(long, default_value_t = 20)]
    pub relay_timeout: u64,

    // Seconds a client must wait after a successful submission
    #[arg(long, default_value_t = 30)]
    pub cooldown: u64,

    // Max submission attempts per window, per form and client
    #[arg(long, default_value_t = 10)]
    pub submission_limit: u32,

    // Submission window in seconds
    #[arg(long, default_value_t = 3600)]
    pub submission_window: u64,

    // Where to persist rate limit state. In memory when not set
    #[arg(long)]
    pub rate_limit_store: Option<PathBuf>,

    // How often pending rate limit state is written to the store file, in seconds
    #[arg(long, default_value_t = 5)]
    pub store_flush_interval: u64,

    // Delay before a resource download is handed out, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub download_delay_ms: u64,

    // CMS project
    #[arg(long, env = "SANITY_PROJECT_ID", default_value = "")]
    pub sanity_project_id: String,

    #[arg(long, env = "SANITY_DATASET", default_value = "production")]
    pub sanity_dataset: String,

    #[arg(long, env = "SANITY_API_VERSION", default_value = DEFAULT_API_VERSION)]
    pub sanity_api_version: String,

    // Optional, only needed for private datasets
    #[arg(long, env = "SANITY_API_TOKEN", hide_env_values = true)]
    pub sanity_token: Option<String>,

    // Overrides https://<project>.api.sanity.io
    #[arg(long)]
    pub sanity_url: Option<String>,

    // Content cache TTL in seconds
    #[arg(short, long, default_value_t = 60)]
    pub cache_ttl: u64,

    // Max CMS fetches per query per window
    #[arg(long, default_value_t = 50)]
    pub content_rate_limit: u32,

    // CMS fetch window in seconds
    #[arg(long, default_value_t = 60)]
    pub content_rate_window: u64,

    // Expired cache sweep interval in seconds
    #[arg(long, default_value_t = 300)]
    pub sweep_interval: u64,

    // Public site url used in the sitemap
    #[arg(long, default_value = "https://learnersacademy.com")]
    pub site_url: String,
}

impl Args {
    pub fn throttle_policy(&self) -> ThrottlePolicy {
        ThrottlePolicy {
            cooldown: Duration::from_secs(self.cooldown),
            max_attempts: self.submission_limit,
            window: Duration::from_secs(self.submission_window),
        }
    }

    pub fn content_limits(&self) -> ContentLimits {
        ContentLimits {
            ttl: Duration::from_secs(self.cache_ttl),
            max_fetches: self.content_rate_limit,
            window: Duration::from_secs(self.content_rate_window),
        }
    }

    pub fn relay_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_timeout)
    }

    pub fn store_flush_interval(&self) -> Duration {
        Duration::from_secs(self.store_flush_interval.max(1))
    }

    pub fn download_delay(&self) -> Duration {
        Duration::from_millis(self.download_delay_ms)
    }
}
