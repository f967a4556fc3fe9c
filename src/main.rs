//! Edge Analytics - demo client for the analytics pipeline
//!
//! This service plays the role of a client application: it signals that it
//! became active, logs synthetic usage events, and lets the scheduler deliver
//! the buffered events to the collector. Events survive restarts through the
//! JSON store file.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `EDGE_ANALYTICS_API_URL`: collector URL (default: http://localhost:8000)
//! - `EDGE_ANALYTICS_CAPACITY_BYTES`: store cap in bytes (default: 1 MiB)
//! - `EDGE_ANALYTICS_FLUSH_INTERVAL_SECS`: seconds between deliveries (default: 30)
//! - `EDGE_ANALYTICS_STORE_PATH`: buffered events file
//! - `EDGE_ANALYTICS_USER_ID`: user identity attached to deliveries (optional)
//! - `RUST_LOG`: Logging level filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::json;
use tokio::time::interval;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use edge_analytics::client::HttpTransport;
use edge_analytics::config::Config;
use edge_analytics::facade::AnalyticsFacade;
use edge_analytics::store::JsonFilePersistence;

/// Interval between synthetic usage events in milliseconds
const ACTIVITY_INTERVAL_MS: u64 = 500;

/// Upper bound on the final delivery at shutdown
const SHUTDOWN_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Screens the synthetic user navigates between
const SCREENS: &[&str] = &["home", "search", "product", "cart", "checkout", "settings"];

/// Actions the synthetic user performs
const ACTIONS: &[&str] = &["tap", "scroll", "add_to_cart", "share", "favorite"];

#[tokio::main]
async fn main() {
    init_tracing();

    info!("Starting Edge Analytics demo client...");

    let config = match Config::from_env() {
        Ok(config) => {
            info!(
                ingest_url = %config.ingest_url,
                capacity_bytes = config.capacity_bytes,
                flush_interval_secs = config.flush_interval.as_secs(),
                store_path = %config.store_path.display(),
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let transport = match HttpTransport::new(&config) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            error!(error = %e, "Failed to create HTTP transport");
            std::process::exit(1);
        }
    };

    let facade = Arc::new(
        AnalyticsFacade::new(transport.clone())
            .with_persistence(Arc::new(JsonFilePersistence::new(&config.store_path))),
    );
    facade.register_identity_consumer(transport);

    if let Err(e) = facade.initialize(config.app_identity(), config.init_options()) {
        error!(error = %e, "Failed to initialize analytics");
        std::process::exit(1);
    }

    if let Ok(user_id) = std::env::var("EDGE_ANALYTICS_USER_ID") {
        facade.set_user_identity(Some(user_id));
    }

    if let Err(e) = facade.on_activate() {
        warn!(error = %e, "Failed to record activation");
    }

    let scheduler = facade.spawn_scheduler(config.flush_interval);

    let activity_facade = facade.clone();
    let activity_handle = tokio::spawn(async move {
        info!("Activity task started");
        run_activity(activity_facade).await;
    });

    info!("Edge Analytics running. Press Ctrl+C to stop.");
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, stopping..."),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }

    activity_handle.abort();
    scheduler.abort();

    if let Err(e) = facade.on_resign_active() {
        warn!(error = %e, "Failed to record session end");
    }

    // Final delivery waits out any send the scheduler already started.
    // Whatever does not make it stays in the store file.
    match tokio::time::timeout(SHUTDOWN_DELIVERY_TIMEOUT, facade.send_when_idle()).await {
        Ok(Ok(outcome)) if outcome.is_success() => {
            info!(sent = outcome.sent_count(), "Final delivery complete");
        }
        Ok(Ok(outcome)) => warn!(outcome = ?outcome, "Final delivery failed"),
        Ok(Err(e)) => warn!(error = %e, "Final delivery could not start"),
        Err(_) => warn!(
            "Final delivery timed out after {:?}",
            SHUTDOWN_DELIVERY_TIMEOUT
        ),
    }

    let flush_facade = facade.clone();
    match tokio::task::spawn_blocking(move || flush_facade.flush_persistence()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Failed to flush buffered events"),
        Err(e) => warn!(error = %e, "Flush task failed"),
    }

    if let Ok(buffered) = facade.buffered_len() {
        info!(buffered = buffered, "Edge Analytics stopped");
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

/// Log synthetic screen views and actions until aborted.
async fn run_activity(facade: Arc<AnalyticsFacade>) {
    let mut ticker = interval(Duration::from_millis(ACTIVITY_INTERVAL_MS));
    let mut logged: u64 = 0;

    loop {
        ticker.tick().await;

        let metadata = {
            let mut rng = rand::thread_rng();
            let screen = SCREENS.choose(&mut rng).copied().unwrap_or("home");
            if rng.gen_bool(0.6) {
                json!({ "event": "screen_view", "screen": screen })
            } else {
                let action = ACTIONS.choose(&mut rng).copied().unwrap_or("tap");
                json!({
                    "event": "action",
                    "screen": screen,
                    "action": action,
                    "latency_ms": rng.gen_range(5..400),
                })
            }
        };

        match facade.log(&metadata) {
            Ok(()) => {
                logged += 1;
                if logged % 100 == 0 {
                    info!(logged = logged, "Activity progress");
                }
            }
            Err(e) => warn!(error = %e, "Failed to log activity event"),
        }
    }
}
