//! Shared test doubles and fixtures.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::Notify;

use crate::delivery::{Ack, Transport, TransportError};
use crate::event::EventRecord;
use crate::facade::IdentityConsumer;
use crate::store::{Persistence, PersistenceError};

/// Metadata whose custom event serializes to exactly `size` bytes.
pub fn sized_metadata(size: usize) -> Map<String, Value> {
    let base = EventRecord::custom(&json!({ "pad": "" }))
        .unwrap()
        .size_bytes();
    assert!(size >= base, "requested size {} below minimum {}", size, base);

    let mut metadata = Map::new();
    metadata.insert("pad".to_string(), Value::String("x".repeat(size - base)));
    metadata
}

/// A custom event that serializes to exactly `size` bytes.
pub fn sized_record(size: usize) -> EventRecord {
    let record = EventRecord::custom(&sized_metadata(size)).unwrap();
    assert_eq!(record.size_bytes(), size);
    record
}

/// Transport that records every payload and answers with a fixed result.
#[derive(Default)]
pub struct StubTransport {
    fail: bool,
    pub calls: AtomicUsize,
    pub payloads: Mutex<Vec<Vec<EventRecord>>>,
}

impl StubTransport {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn transmit(&self, payload: Vec<EventRecord>) -> Result<Ack, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let count = payload.len() as u64;
        self.payloads.lock().unwrap().push(payload);

        if self.fail {
            Err(TransportError::failed("collector unavailable"))
        } else {
            Ok(Ack {
                accepted: count,
                batch_id: None,
            })
        }
    }
}

/// Transport that holds each call until released, then succeeds.
#[derive(Default)]
pub struct GatedTransport {
    pub entered: Notify,
    pub release: Notify,
    pub calls: AtomicUsize,
}

impl GatedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn transmit(&self, payload: Vec<EventRecord>) -> Result<Ack, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(Ack {
            accepted: payload.len() as u64,
            batch_id: None,
        })
    }
}

/// Persistence held in memory, counting loads and writes.
#[derive(Default)]
pub struct MemoryPersistence {
    pub records: Mutex<Vec<EventRecord>>,
    pub loads: AtomicUsize,
    pub writes: AtomicUsize,
}

impl Persistence for MemoryPersistence {
    fn load_persisted(&self) -> Result<Vec<EventRecord>, PersistenceError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.lock().unwrap().clone())
    }

    fn persist(&self, records: &[EventRecord]) -> Result<(), PersistenceError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.records.lock().unwrap() = records.to_vec();
        Ok(())
    }
}

/// Persistence that loads nothing and fails every write.
#[derive(Default)]
pub struct FailingPersistence {
    pub attempts: AtomicUsize,
}

impl Persistence for FailingPersistence {
    fn load_persisted(&self) -> Result<Vec<EventRecord>, PersistenceError> {
        Ok(Vec::new())
    }

    fn persist(&self, _records: &[EventRecord]) -> Result<(), PersistenceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(PersistenceError::Io(io::Error::new(
            io::ErrorKind::Other,
            "disk full",
        )))
    }
}

/// Identity consumer recording every notification in order.
#[derive(Default)]
pub struct RecordingConsumer {
    pub seen: Mutex<Vec<Option<String>>>,
}

impl IdentityConsumer for RecordingConsumer {
    fn identity_changed(&self, user_id: Option<&str>) {
        self.seen
            .lock()
            .unwrap()
            .push(user_id.map(str::to_string));
    }
}
