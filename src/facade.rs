//! Facade module: the single entry point application code talks to.
//!
//! One [`AnalyticsFacade`] is built by application startup code and shared
//! (usually behind an `Arc`) for the life of the process. It must be
//! initialized before events can be logged or sent.
//!
//! # Example
//!
//! ```no_run
//! use std::collections::HashSet;
//! use std::sync::Arc;
//!
//! use edge_analytics::client::HttpTransport;
//! use edge_analytics::config::Config;
//! use edge_analytics::event::{AppIdentity, DeviceEventKind};
//! use edge_analytics::facade::{AnalyticsFacade, InitOptions};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::default();
//!     let transport = Arc::new(HttpTransport::new(&config).unwrap());
//!     let facade = AnalyticsFacade::new(transport);
//!
//!     let options = InitOptions {
//!         device_event_kinds: HashSet::from([DeviceEventKind::Lifecycle]),
//!         ..InitOptions::default()
//!     };
//!     facade.initialize(AppIdentity::new("shop", "2.1.0"), options).unwrap();
//!
//!     facade.log(&json!({"screen": "checkout"})).unwrap();
//!     let outcome = facade.send_and_wait().await.unwrap();
//!     println!("delivered {} events", outcome.sent_count());
//! }
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};
use tracing::{debug, info, warn};

use crate::delivery::{DeliveryCoordinator, DeliveryError, DeliveryOutcome, DeliveryStats, Transport};
use crate::event::{AppIdentity, DeviceEventKind, EventError, EventRecord};
use crate::lifecycle::LifecycleTracker;
use crate::store::{BoundedLogStore, Persistence, StoreStats};

/// Default store capacity used by `InitOptions::default` (1 MiB).
const DEFAULT_CAPACITY_BYTES: usize = 1024 * 1024;

/// How often `send_when_idle` checks whether a running delivery finished.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Receives the user identity whenever it changes.
///
/// Notifications are delivered under the facade's identity lock, in the
/// order identities were set. Implementations must not call back into the
/// facade's identity methods.
pub trait IdentityConsumer: Send + Sync {
    fn identity_changed(&self, user_id: Option<&str>);
}

/// Errors surfaced by the facade.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("analytics used before initialize")]
    NotInitialized,

    #[error("analytics already initialized")]
    AlreadyInitialized,

    #[error(transparent)]
    InvalidMetadata(#[from] EventError),

    #[error("a delivery is already in flight")]
    DeliveryInProgress,

    #[error("no tokio runtime available to run the delivery")]
    NoRuntime,

    #[error("delivery task ended without reporting an outcome")]
    DeliveryAborted,
}

impl From<DeliveryError> for AnalyticsError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::InProgress => AnalyticsError::DeliveryInProgress,
            DeliveryError::NoRuntime => AnalyticsError::NoRuntime,
        }
    }
}

/// Settings applied by `AnalyticsFacade::initialize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOptions {
    /// Whether `log` buffers events
    pub enabled: bool,

    /// Store capacity in bytes
    pub capacity_bytes: usize,

    /// Device events captured automatically
    pub device_event_kinds: HashSet<DeviceEventKind>,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
            device_event_kinds: DeviceEventKind::all().iter().copied().collect(),
        }
    }
}

/// State that exists only once the facade is initialized.
struct Session {
    app: AppIdentity,
    store: Arc<BoundedLogStore>,
    lifecycle: LifecycleTracker,
    device_event_kinds: HashSet<DeviceEventKind>,
}

/// Current user identity and the consumers told about it.
#[derive(Default)]
struct IdentityState {
    user_id: Option<String>,
    consumers: Vec<Arc<dyn IdentityConsumer>>,
}

/// Process-wide analytics entry point.
pub struct AnalyticsFacade {
    transport: Arc<dyn Transport>,
    persistence: Option<Arc<dyn Persistence>>,
    coordinator: Arc<DeliveryCoordinator>,
    session: OnceLock<Session>,
    enabled: AtomicBool,
    identity: Mutex<IdentityState>,
}

impl AnalyticsFacade {
    /// Create an uninitialized facade sending through `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            persistence: None,
            coordinator: DeliveryCoordinator::new(),
            session: OnceLock::new(),
            enabled: AtomicBool::new(true),
            identity: Mutex::new(IdentityState::default()),
        }
    }

    /// Back the event store with `persistence` once initialized.
    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Initialize the facade. Must be called exactly once before use.
    ///
    /// Creates the event store (restoring persisted events, if a persistence
    /// backend was supplied) and applies `options`.
    pub fn initialize(&self, app: AppIdentity, options: InitOptions) -> Result<(), AnalyticsError> {
        let mut created = false;
        let session = self.session.get_or_init(|| {
            created = true;
            self.enabled.store(options.enabled, Ordering::SeqCst);

            let store = match &self.persistence {
                Some(persistence) => {
                    BoundedLogStore::with_persistence(options.capacity_bytes, persistence.clone())
                }
                None => BoundedLogStore::new(options.capacity_bytes),
            };

            Session {
                app,
                store: Arc::new(store),
                lifecycle: LifecycleTracker::new(),
                device_event_kinds: options.device_event_kinds,
            }
        });

        if !created {
            return Err(AnalyticsError::AlreadyInitialized);
        }

        let kinds: Vec<&str> = session
            .device_event_kinds
            .iter()
            .map(DeviceEventKind::name)
            .collect();
        info!(
            app = %session.app.name,
            enabled = options.enabled,
            capacity_bytes = options.capacity_bytes,
            device_events = ?kinds,
            buffered = session.store.len(),
            "Analytics initialized"
        );
        Ok(())
    }

    fn session(&self) -> Result<&Session, AnalyticsError> {
        self.session.get().ok_or(AnalyticsError::NotInitialized)
    }

    /// Whether `initialize` has completed.
    pub fn is_initialized(&self) -> bool {
        self.session.get().is_some()
    }

    /// Whether `log` currently buffers events.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Turn capture on or off. While off, `log` drops events.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        info!(enabled = enabled, "Analytics capture toggled");
    }

    /// Capture a custom event with the given metadata.
    ///
    /// # Errors
    ///
    /// - `AnalyticsError::NotInitialized` before `initialize`.
    /// - `AnalyticsError::InvalidMetadata` if `metadata` is not a serializable
    ///   key/value mapping; the event is dropped.
    pub fn log<M>(&self, metadata: &M) -> Result<(), AnalyticsError>
    where
        M: Serialize + ?Sized,
    {
        let session = self.session()?;
        if !self.is_enabled() {
            return Ok(());
        }

        let record = EventRecord::custom(metadata).map_err(|e| {
            warn!(error = %e, "Dropping event with invalid metadata");
            e
        })?;
        session.store.append(record);
        Ok(())
    }

    fn capture_device_event(&self, session: &Session, record: EventRecord) {
        if self.is_enabled() {
            session.store.append(record);
        }
    }

    /// Forward the host's "became active" signal.
    pub fn on_activate(&self) -> Result<(), AnalyticsError> {
        let session = self.session()?;
        if session.device_event_kinds.contains(&DeviceEventKind::Lifecycle) {
            session.lifecycle.on_activate();
        }
        Ok(())
    }

    /// Forward the host's "will resign active" signal.
    pub fn on_resign_active(&self) -> Result<(), AnalyticsError> {
        let session = self.session()?;
        if !session.device_event_kinds.contains(&DeviceEventKind::Lifecycle) {
            return Ok(());
        }

        if let Some(record) = session.lifecycle.on_resign_active() {
            self.capture_device_event(session, record);
        }
        Ok(())
    }

    /// Start delivering buffered events; `on_complete` receives the outcome.
    ///
    /// # Errors
    ///
    /// - `AnalyticsError::NotInitialized` before `initialize`.
    /// - `AnalyticsError::DeliveryInProgress` if a send is still in flight.
    /// - `AnalyticsError::NoRuntime` outside a tokio runtime.
    pub fn send<F>(&self, on_complete: F) -> Result<(), AnalyticsError>
    where
        F: FnOnce(DeliveryOutcome) + Send + 'static,
    {
        let session = self.session()?;
        self.coordinator
            .send(&session.store, &self.transport, on_complete)
            .map_err(AnalyticsError::from)
    }

    /// Start delivering buffered events, ignoring the outcome.
    pub fn send_detached(&self) -> Result<(), AnalyticsError> {
        self.send(|_| {})
    }

    /// Deliver buffered events and wait for the outcome.
    pub async fn send_and_wait(&self) -> Result<DeliveryOutcome, AnalyticsError> {
        let (tx, rx) = oneshot::channel();
        self.send(move |outcome| {
            let _ = tx.send(outcome);
        })?;
        rx.await.map_err(|_| AnalyticsError::DeliveryAborted)
    }

    /// Deliver on a fixed cadence until the returned task is aborted.
    ///
    /// Ticks that find a delivery still in flight are skipped.
    pub fn spawn_scheduler(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let facade = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = interval(every);
            // Skip the first immediate tick
            ticker.tick().await;

            loop {
                ticker.tick().await;

                match facade.send_detached() {
                    Ok(()) => {}
                    Err(AnalyticsError::DeliveryInProgress) => {
                        debug!("Scheduled delivery skipped: previous send still in flight");
                    }
                    Err(e) => {
                        warn!(error = %e, "Scheduled delivery could not start");
                    }
                }
            }
        })
    }

    /// Deliver buffered events once any delivery already in flight has finished.
    ///
    /// Unlike `send_and_wait`, a running send is waited out rather than
    /// reported as `DeliveryInProgress`. Bound the wait with a timeout.
    pub async fn send_when_idle(&self) -> Result<DeliveryOutcome, AnalyticsError> {
        loop {
            match self.send_and_wait().await {
                Err(AnalyticsError::DeliveryInProgress) => sleep(IDLE_POLL_INTERVAL).await,
                result => return result,
            }
        }
    }

    /// Whether a delivery is currently in flight.
    pub fn is_delivery_in_flight(&self) -> bool {
        self.coordinator.is_in_flight()
    }

    /// Block until buffered changes have reached the persistence backend.
    ///
    /// Blocks the calling thread; from async code run it via `spawn_blocking`.
    pub fn flush_persistence(&self) -> Result<(), AnalyticsError> {
        self.session()?.store.flush();
        Ok(())
    }

    /// Drop every buffered event.
    pub fn reset(&self) -> Result<(), AnalyticsError> {
        let session = self.session()?;
        session.store.reset();
        info!("Buffered events cleared");
        Ok(())
    }

    /// Set or clear the user identity and notify registered consumers.
    ///
    /// Allowed at any time, including before `initialize`. Concurrent calls
    /// are serialized, so consumers see identities in the order they were
    /// stored and the last notification matches `user_identity`.
    pub fn set_user_identity(&self, user_id: Option<String>) {
        let mut identity = self.lock_identity();
        identity.user_id = user_id;

        debug!(
            has_identity = identity.user_id.is_some(),
            consumers = identity.consumers.len(),
            "User identity changed"
        );
        for consumer in &identity.consumers {
            consumer.identity_changed(identity.user_id.as_deref());
        }
    }

    /// Current user identity.
    pub fn user_identity(&self) -> Option<String> {
        self.lock_identity().user_id.clone()
    }

    /// Register a consumer for identity changes.
    ///
    /// A consumer registered after an identity was set is told about it at once.
    pub fn register_identity_consumer(&self, consumer: Arc<dyn IdentityConsumer>) {
        let mut identity = self.lock_identity();
        if let Some(user_id) = &identity.user_id {
            consumer.identity_changed(Some(user_id));
        }
        identity.consumers.push(consumer);
    }

    fn lock_identity(&self) -> MutexGuard<'_, IdentityState> {
        self.identity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Identity passed to `initialize`.
    pub fn app_identity(&self) -> Result<&AppIdentity, AnalyticsError> {
        Ok(&self.session()?.app)
    }

    /// Number of buffered events.
    pub fn buffered_len(&self) -> Result<usize, AnalyticsError> {
        Ok(self.session()?.store.len())
    }

    /// Aggregate size of buffered events.
    pub fn buffered_bytes(&self) -> Result<usize, AnalyticsError> {
        Ok(self.session()?.store.current_size_bytes())
    }

    /// Copy of the buffered events, oldest first.
    pub fn snapshot(&self) -> Result<Vec<EventRecord>, AnalyticsError> {
        Ok(self.session()?.store.drain_all())
    }

    pub fn store_stats(&self) -> Result<StoreStats, AnalyticsError> {
        Ok(self.session()?.store.stats())
    }

    pub fn delivery_stats(&self) -> DeliveryStats {
        self.coordinator.stats()
    }
}
