//! Edge Analytics Library
//!
//! This library captures client analytics events, buffers them durably under
//! a byte cap, and delivers them to a remote collector:
//!
//! - **config**: Environment-based configuration
//! - **event**: Immutable event records and the delivery envelope
//! - **store**: Bounded, rotating, optionally persistent event store
//! - **lifecycle**: Foreground/background signals turned into session events
//! - **delivery**: Single-flight delivery of buffered events through a transport
//! - **client**: HTTP transport with connection pooling and retry logic
//! - **facade**: The entry point applications call
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use edge_analytics::client::HttpTransport;
//! use edge_analytics::config::Config;
//! use edge_analytics::facade::AnalyticsFacade;
//! use edge_analytics::store::JsonFilePersistence;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!
//!     let transport = Arc::new(HttpTransport::new(&config).expect("Failed to create transport"));
//!     let facade = Arc::new(
//!         AnalyticsFacade::new(transport.clone())
//!             .with_persistence(Arc::new(JsonFilePersistence::new(&config.store_path))),
//!     );
//!     facade.register_identity_consumer(transport);
//!     facade
//!         .initialize(config.app_identity(), config.init_options())
//!         .expect("Failed to initialize analytics");
//!
//!     facade.log(&json!({"screen": "home"})).ok();
//!     let scheduler = facade.spawn_scheduler(config.flush_interval);
//!     # scheduler.abort();
//! }
//! ```

pub mod client;
pub mod config;
pub mod delivery;
pub mod event;
pub mod facade;
pub mod lifecycle;
pub mod store;

#[cfg(test)]
mod testing;

pub use client::{ClientError, HttpTransport, IngestResponse};
pub use config::{Config, ConfigError};
pub use delivery::{
    Ack, DeliveryCoordinator, DeliveryError, DeliveryOutcome, DeliveryStats, Transport,
    TransportError,
};
pub use event::{AppIdentity, DeviceEventKind, EventBatch, EventError, EventKind, EventRecord};
pub use facade::{AnalyticsError, AnalyticsFacade, IdentityConsumer, InitOptions};
pub use lifecycle::{LifecycleState, LifecycleTracker};
pub use store::{BoundedLogStore, JsonFilePersistence, Persistence, PersistenceError, StoreStats};
