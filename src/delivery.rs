//! Delivery module sending buffered events to the collector.
//!
//! The coordinator allows one delivery in flight at a time. A send snapshots
//! the store, hands the snapshot to the transport on a tokio task, and only
//! removes the snapshot's records once the transport acknowledges them. A
//! failed send leaves the store untouched; retrying is up to the caller or the
//! transport.

use std::error::Error as StdError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::event::EventRecord;
use crate::store::BoundedLogStore;

/// Acknowledgement returned by a transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ack {
    /// Number of events the collector accepted
    pub accepted: u64,

    /// Collector-assigned batch ID, if any
    pub batch_id: Option<String>,
}

/// Failure reported by a [`Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The collector answered but refused the payload
    #[error("collector rejected the payload ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The payload could not be delivered
    #[error("transport failed: {0}")]
    Failed(#[source] Box<dyn StdError + Send + Sync>),
}

impl TransportError {
    /// Wrap any error as a delivery failure.
    pub fn failed(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        TransportError::Failed(err.into())
    }
}

/// Capability that carries a payload of events to the collector.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn transmit(&self, payload: Vec<EventRecord>) -> Result<Ack, TransportError>;
}

/// Reasons a send is refused before anything is transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("a delivery is already in flight")]
    InProgress,

    #[error("no tokio runtime available to run the delivery")]
    NoRuntime,
}

/// Final result of a send, passed to the completion callback.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// The collector acknowledged `count` events, now removed from the store.
    Sent { count: usize, ack: Ack },

    /// The store was empty; the transport was not contacted.
    NothingToSend,

    /// The transport failed; the store keeps every record.
    Failed { reason: TransportError },
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, DeliveryOutcome::Failed { .. })
    }

    /// Number of events delivered by this send.
    pub fn sent_count(&self) -> usize {
        match self {
            DeliveryOutcome::Sent { count, .. } => *count,
            _ => 0,
        }
    }
}

/// Statistics about delivery attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Sends acknowledged by the transport
    pub deliveries_succeeded: u64,

    /// Sends the transport failed
    pub deliveries_failed: u64,

    /// Total events acknowledged
    pub records_sent: u64,

    /// Sends refused because another was in flight
    pub rejected_busy: u64,
}

#[derive(Debug, Default)]
struct DeliveryCounters {
    deliveries_succeeded: AtomicU64,
    deliveries_failed: AtomicU64,
    records_sent: AtomicU64,
    rejected_busy: AtomicU64,
}

/// Releases the in-flight flag when dropped, including on task panic.
struct InFlightGuard {
    coordinator: Arc<DeliveryCoordinator>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.coordinator.in_flight.store(false, Ordering::SeqCst);
    }
}

/// Drains the store into the transport with at most one send in flight.
#[derive(Debug, Default)]
pub struct DeliveryCoordinator {
    in_flight: AtomicBool,
    counters: DeliveryCounters,
}

impl DeliveryCoordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Whether a delivery is currently in flight.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Get current delivery statistics.
    pub fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            deliveries_succeeded: self.counters.deliveries_succeeded.load(Ordering::Relaxed),
            deliveries_failed: self.counters.deliveries_failed.load(Ordering::Relaxed),
            records_sent: self.counters.records_sent.load(Ordering::Relaxed),
            rejected_busy: self.counters.rejected_busy.load(Ordering::Relaxed),
        }
    }

    /// Start sending everything currently buffered in `store`.
    ///
    /// Returns as soon as the transport call is scheduled. `on_complete` runs
    /// later on a runtime worker thread, or synchronously before this returns
    /// when there is nothing to send.
    ///
    /// # Errors
    ///
    /// - `DeliveryError::InProgress` if another send has not completed yet.
    /// - `DeliveryError::NoRuntime` if called outside a tokio runtime.
    pub fn send<F>(
        self: &Arc<Self>,
        store: &Arc<BoundedLogStore>,
        transport: &Arc<dyn Transport>,
        on_complete: F,
    ) -> Result<(), DeliveryError>
    where
        F: FnOnce(DeliveryOutcome) + Send + 'static,
    {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.counters.rejected_busy.fetch_add(1, Ordering::Relaxed);
            debug!("Delivery already in flight, rejecting send");
            return Err(DeliveryError::InProgress);
        }
        let guard = InFlightGuard {
            coordinator: self.clone(),
        };

        let snapshot = store.drain_all();
        if snapshot.is_empty() {
            drop(guard);
            debug!("Nothing to send");
            on_complete(DeliveryOutcome::NothingToSend);
            return Ok(());
        }

        let Ok(handle) = Handle::try_current() else {
            drop(guard);
            warn!(pending = snapshot.len(), "Cannot send events outside a tokio runtime");
            return Err(DeliveryError::NoRuntime);
        };

        let store = store.clone();
        let transport = transport.clone();
        let coordinator = self.clone();

        handle.spawn(async move {
            let count = snapshot.len();
            let ids: Vec<Uuid> = snapshot.iter().map(EventRecord::id).collect();
            debug!(count = count, "Sending buffered events");

            let outcome = match transport.transmit(snapshot).await {
                Ok(ack) => {
                    let removed = store.remove_delivered(&ids);
                    if removed != count {
                        debug!(
                            sent = count,
                            removed = removed,
                            "Some delivered events were already rotated out"
                        );
                    }
                    drop(guard);

                    coordinator
                        .counters
                        .deliveries_succeeded
                        .fetch_add(1, Ordering::Relaxed);
                    coordinator
                        .counters
                        .records_sent
                        .fetch_add(count as u64, Ordering::Relaxed);
                    info!(
                        count = count,
                        accepted = ack.accepted,
                        batch_id = ?ack.batch_id,
                        "Delivered buffered events"
                    );
                    DeliveryOutcome::Sent { count, ack }
                }
                Err(reason) => {
                    drop(guard);

                    coordinator
                        .counters
                        .deliveries_failed
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(
                        error = %reason,
                        pending = count,
                        "Delivery failed, events kept for a later send"
                    );
                    DeliveryOutcome::Failed { reason }
                }
            };

            on_complete(outcome);
        });

        Ok(())
    }
}
