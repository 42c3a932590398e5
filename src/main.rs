use clap::Parser; // for cli
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lead_gateway::config::Args;
use lead_gateway::content::{ContentService, SanityClient};
use lead_gateway::download::DownloadLog;
use lead_gateway::handlers;
use lead_gateway::rate_limit::{FileStore, MemoryStore, RateLimitStore, RateLimiter, SystemClock};
use lead_gateway::relay::Web3FormsRelay;
use lead_gateway::state::AppState;
use lead_gateway::submission::WorkflowDeps;
use lead_gateway::worker::{cache_sweeper, store_flusher};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // parse cli arguments
    let args = Args::parse();

    if args.relay_access_key.is_empty() {
        warn!("No relay access key configured, the relay will reject submissions");
    }
    if args.sanity_project_id.is_empty() && args.sanity_url.is_none() {
        warn!("No CMS project configured, content endpoints will serve empty lists");
    }

    let shutdown = CancellationToken::new();

    // form throttles, optionally persisted; flushed in the background
    let mut flusher = None;
    let store: Arc<dyn RateLimitStore> = match &args.rate_limit_store {
        Some(path) => {
            let file_store = Arc::new(FileStore::open(path));
            flusher = Some(tokio::spawn(store_flusher(
                Arc::clone(&file_store),
                args.store_flush_interval(),
                shutdown.clone(),
            )));
            file_store
        }
        None => Arc::new(MemoryStore::new()),
    };
    let limiter = Arc::new(RateLimiter::new(store, Arc::new(SystemClock)));

    // CMS fetch throttle is per process, never persisted
    let content_limiter = Arc::new(RateLimiter::in_memory());

    let client = reqwest::Client::new();

    let relay = Web3FormsRelay::new(client.clone(), args.relay_access_key.clone())
        .with_base_url(args.relay_url.clone())
        .with_from_name(args.from_name.clone())
        .with_timeout(args.relay_timeout());

    let mut sanity = SanityClient::new(client, &args.sanity_project_id, args.sanity_dataset.clone())
        .with_api_version(args.sanity_api_version.clone())
        .with_token(args.sanity_token.clone());
    if let Some(url) = &args.sanity_url {
        sanity = sanity.with_base_url(url.clone());
    }

    let content = Arc::new(ContentService::new(
        Arc::new(sanity),
        content_limiter,
        args.content_limits(),
    ));

    // spawn the background sweeper
    tokio::spawn(cache_sweeper(
        Arc::clone(&content),
        std::time::Duration::from_secs(args.sweep_interval.max(1)),
        shutdown.clone(),
    ));

    let state = Arc::new(AppState {
        content,
        forms: WorkflowDeps {
            limiter,
            relay: Arc::new(relay),
            downloads: Arc::new(DownloadLog),
            policy: args.throttle_policy(),
            relay_timeout: args.relay_timeout(),
            download_delay: args.download_delay(),
        },
        site_url: args.site_url.clone(),
        shutdown: shutdown.clone(),
    });

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let policy = args.throttle_policy();
    info!(port = args.port, "Gateway running on http://localhost:{}", args.port);
    info!(relay = %args.relay_url, "Relaying form submissions");
    info!(
        cooldown_secs = policy.cooldown.as_secs(),
        limit = policy.max_attempts,
        window_secs = policy.window.as_secs(),
        "Submission throttle"
    );
    info!(ttl_secs = args.cache_ttl, "Content cache");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    // last flush runs on cancel, wait for it
    if let Some(flusher) = flusher {
        if let Err(e) = flusher.await {
            warn!(error = %e, "Rate limit store flusher failed");
        }
    }

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
    shutdown.cancel();
}
