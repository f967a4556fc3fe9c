//! Store module holding buffered events under a hard byte cap.
//!
//! Appends that would push the store over its capacity rotate it: records are
//! evicted oldest-first until the new record fits. A new record is never
//! rejected, so a single record larger than the whole capacity still lands
//! (alone) in the store.
//!
//! Every mutation happens under one mutex. When a [`Persistence`] backend is
//! attached, mutations only mark the store dirty; a background writer thread
//! snapshots the records and writes them out, collapsing bursts of changes
//! into a single write.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::event::EventRecord;

/// How long the writer lets changes accumulate before writing a snapshot.
const PERSIST_COALESCE_WINDOW: Duration = Duration::from_millis(200);

/// Errors raised by a persistence backend.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable backing for the store, so buffered events survive a restart.
pub trait Persistence: Send + Sync {
    /// Load previously persisted records, oldest first.
    fn load_persisted(&self) -> Result<Vec<EventRecord>, PersistenceError>;

    /// Replace the persisted records with `records`.
    fn persist(&self, records: &[EventRecord]) -> Result<(), PersistenceError>;
}

/// Persists the store as a single JSON array file.
///
/// Writes go to a sibling `.tmp` file that is then renamed over the target,
/// so a crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl Persistence for JsonFilePersistence {
    fn load_persisted(&self) -> Result<Vec<EventRecord>, PersistenceError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        Ok(serde_json::from_slice(&bytes)?)
    }

    fn persist(&self, records: &[EventRecord]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.tmp_path();
        fs::write(&tmp, serde_json::to_vec(records)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Statistics about store operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Total number of records appended
    pub records_appended: u64,

    /// Total number of records evicted by rotation
    pub records_evicted: u64,

    /// Total bytes evicted by rotation
    pub bytes_evicted: u64,

    /// Total number of records removed after delivery
    pub records_removed: u64,

    /// Number of failed persistence writes
    pub persist_failures: u64,
}

enum WriteCommand {
    /// Records changed since the last snapshot
    Dirty,

    /// Write pending changes now, then acknowledge
    Flush(oneshot::Sender<()>),
}

struct StoreInner {
    records: VecDeque<EventRecord>,
    current_size_bytes: usize,
    stats: StoreStats,

    /// A change is waiting for the writer to snapshot it
    write_pending: bool,
}

impl StoreInner {
    fn admit(&mut self, record: EventRecord, capacity_bytes: usize) -> usize {
        let size = record.size_bytes();
        let mut evicted = 0;

        while self.current_size_bytes + size > capacity_bytes {
            let Some(oldest) = self.records.pop_front() else {
                break;
            };
            self.current_size_bytes -= oldest.size_bytes();
            self.stats.bytes_evicted += oldest.size_bytes() as u64;
            evicted += 1;
        }

        self.current_size_bytes += size;
        self.records.push_back(record);
        self.stats.records_appended += 1;
        self.stats.records_evicted += evicted as u64;
        evicted
    }

    fn pop_front(&mut self) -> Option<EventRecord> {
        let record = self.records.pop_front()?;
        self.current_size_bytes -= record.size_bytes();
        self.stats.records_removed += 1;
        Some(record)
    }
}

fn lock_inner(inner: &Mutex<StoreInner>) -> MutexGuard<'_, StoreInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to the background thread writing store snapshots.
struct PersistWriter {
    commands: mpsc::UnboundedSender<WriteCommand>,
    thread: JoinHandle<()>,
}

impl PersistWriter {
    fn spawn(
        inner: Arc<Mutex<StoreInner>>,
        persistence: Arc<dyn Persistence>,
    ) -> std::io::Result<Self> {
        let (commands, rx) = mpsc::unbounded_channel();
        let thread = thread::Builder::new()
            .name("edge-analytics-persist".to_string())
            .spawn(move || run_writer(&inner, persistence.as_ref(), rx))?;

        Ok(Self { commands, thread })
    }
}

/// Writer loop. Runs until the owning store is dropped, then writes any
/// change still pending.
fn run_writer(
    inner: &Mutex<StoreInner>,
    persistence: &dyn Persistence,
    mut commands: mpsc::UnboundedReceiver<WriteCommand>,
) {
    while let Some(command) = commands.blocking_recv() {
        let mut acks = Vec::new();
        match command {
            WriteCommand::Flush(ack) => acks.push(ack),
            WriteCommand::Dirty => thread::sleep(PERSIST_COALESCE_WINDOW),
        }
        while let Ok(command) = commands.try_recv() {
            if let WriteCommand::Flush(ack) = command {
                acks.push(ack);
            }
        }

        write_snapshot(inner, persistence);
        for ack in acks {
            let _ = ack.send(());
        }
    }

    write_snapshot(inner, persistence);
}

fn write_snapshot(inner: &Mutex<StoreInner>, persistence: &dyn Persistence) {
    let snapshot: Vec<EventRecord> = {
        let mut inner = lock_inner(inner);
        if !inner.write_pending {
            return;
        }
        inner.write_pending = false;
        inner.records.iter().cloned().collect()
    };

    match persistence.persist(&snapshot) {
        Ok(()) => debug!(records = snapshot.len(), "Persisted event store"),
        Err(e) => {
            lock_inner(inner).stats.persist_failures += 1;
            warn!(
                error = %e,
                records = snapshot.len(),
                "Failed to persist event store"
            );
        }
    }
}

/// Append-only event store with a byte-size cap and oldest-first rotation.
pub struct BoundedLogStore {
    capacity_bytes: usize,
    inner: Arc<Mutex<StoreInner>>,
    writer: Option<PersistWriter>,
}

impl BoundedLogStore {
    /// Create an empty in-memory store.
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            capacity_bytes,
            inner: Arc::new(Mutex::new(StoreInner {
                records: VecDeque::new(),
                current_size_bytes: 0,
                stats: StoreStats::default(),
                write_pending: false,
            })),
            writer: None,
        }
    }

    /// Create a store backed by `persistence`, re-admitting anything it holds.
    ///
    /// Loaded records go through normal rotation, so the capacity invariant
    /// holds even when the persisted set was written under a larger cap. A
    /// backend that fails to load is logged and the store starts empty.
    pub fn with_persistence(capacity_bytes: usize, persistence: Arc<dyn Persistence>) -> Self {
        let loaded = match persistence.load_persisted() {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Failed to load persisted events, starting empty");
                Vec::new()
            }
        };

        let mut store = Self::new(capacity_bytes);
        let evicted = {
            let mut inner = store.lock();
            let loaded_count = loaded.len();
            let mut evicted = 0;
            for record in loaded {
                evicted += inner.admit(record, capacity_bytes);
            }
            inner.stats = StoreStats::default();

            if loaded_count > 0 {
                info!(
                    loaded = loaded_count,
                    evicted = evicted,
                    size_bytes = inner.current_size_bytes,
                    "Restored persisted events"
                );
            }
            evicted
        };

        match PersistWriter::spawn(store.inner.clone(), persistence) {
            Ok(writer) => store.writer = Some(writer),
            Err(e) => {
                warn!(error = %e, "Failed to start persistence writer, events kept in memory only");
            }
        }

        if evicted > 0 {
            let mut inner = store.lock();
            store.schedule_write(&mut inner);
        }

        store
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        lock_inner(&self.inner)
    }

    fn schedule_write(&self, inner: &mut StoreInner) {
        let Some(writer) = &self.writer else {
            return;
        };
        if inner.write_pending {
            return;
        }

        inner.write_pending = true;
        if writer.commands.send(WriteCommand::Dirty).is_err() {
            debug!("Persistence writer stopped, change not written");
        }
    }

    /// Append a record, rotating out the oldest records if needed.
    ///
    /// Returns the number of records evicted to make room.
    pub fn append(&self, record: EventRecord) -> usize {
        let mut inner = self.lock();
        let size = record.size_bytes();
        let evicted = inner.admit(record, self.capacity_bytes);

        if evicted > 0 {
            debug!(
                evicted = evicted,
                record_size = size,
                capacity_bytes = self.capacity_bytes,
                "Store rotated: evicted oldest events"
            );
        }
        if size > self.capacity_bytes {
            warn!(
                record_size = size,
                capacity_bytes = self.capacity_bytes,
                "Event larger than store capacity; kept as sole record"
            );
        }

        self.schedule_write(&mut inner);
        evicted
    }

    /// Copy out the current records in order, without removing them.
    pub fn drain_all(&self) -> Vec<EventRecord> {
        self.lock().records.iter().cloned().collect()
    }

    /// Remove exactly the first `count` records (fewer if the store is shorter).
    ///
    /// Returns the number of records removed.
    pub fn remove_prefix(&self, count: usize) -> usize {
        let mut inner = self.lock();
        let count = count.min(inner.records.len());
        for _ in 0..count {
            inner.pop_front();
        }

        if count > 0 {
            self.schedule_write(&mut inner);
        }
        count
    }

    /// Remove the leading records that belong to a previously drained snapshot.
    ///
    /// Records of the snapshot that rotation already evicted are no longer at
    /// the head, so only the survivors are removed and newer records stay.
    /// Returns the number of records removed.
    pub fn remove_delivered(&self, delivered: &[Uuid]) -> usize {
        let ids: HashSet<Uuid> = delivered.iter().copied().collect();

        let mut inner = self.lock();
        let mut removed = 0;
        while inner
            .records
            .front()
            .is_some_and(|record| ids.contains(&record.id()))
        {
            inner.pop_front();
            removed += 1;
        }

        if removed > 0 {
            self.schedule_write(&mut inner);
        }
        removed
    }

    /// Remove every record.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let cleared = inner.records.len();
        inner.records.clear();
        inner.current_size_bytes = 0;

        debug!(cleared = cleared, "Store reset");
        self.schedule_write(&mut inner);
    }

    /// Block until every change made before this call has reached the
    /// persistence backend. Returns at once for an in-memory store.
    ///
    /// Blocks the calling thread; from async code run it via `spawn_blocking`.
    pub fn flush(&self) {
        let Some(writer) = &self.writer else {
            return;
        };

        let (ack, done) = oneshot::channel();
        if writer.commands.send(WriteCommand::Flush(ack)).is_ok() {
            let _ = done.blocking_recv();
        }
    }

    /// Get the number of buffered records.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Sum of `size_bytes` over buffered records.
    pub fn current_size_bytes(&self) -> usize {
        self.lock().current_size_bytes
    }

    /// Configured maximum aggregate size.
    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    /// Get current store statistics.
    pub fn stats(&self) -> StoreStats {
        self.lock().stats.clone()
    }
}

impl Drop for BoundedLogStore {
    fn drop(&mut self) {
        let Some(PersistWriter { commands, thread }) = self.writer.take() else {
            return;
        };

        // Closing the channel lets the writer write what is pending and exit.
        drop(commands);
        if thread.join().is_err() {
            warn!("Persistence writer panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sized_record, FailingPersistence, MemoryPersistence};
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::thread;

    fn ids(records: &[EventRecord]) -> Vec<Uuid> {
        records.iter().map(EventRecord::id).collect()
    }

    fn assert_size_consistent(store: &BoundedLogStore) {
        let records = store.drain_all();
        let sum: usize = records.iter().map(EventRecord::size_bytes).sum();
        assert_eq!(store.current_size_bytes(), sum);
    }

    #[test]
    fn test_append_within_capacity() {
        let store = BoundedLogStore::new(1000);

        assert_eq!(store.append(sized_record(200)), 0);
        assert_eq!(store.append(sized_record(300)), 0);

        assert_eq!(store.len(), 2);
        assert_eq!(store.current_size_bytes(), 500);
        assert_size_consistent(&store);
    }

    #[test]
    fn test_rotation_evicts_oldest_first() {
        let store = BoundedLogStore::new(1000);
        let records: Vec<EventRecord> = (0..5).map(|_| sized_record(300)).collect();

        let mut evicted = 0;
        for record in records.clone() {
            evicted += store.append(record);
        }

        assert_eq!(evicted, 2);
        assert_eq!(store.len(), 3);
        assert_eq!(store.current_size_bytes(), 900);
        assert_eq!(ids(&store.drain_all()), ids(&records[2..]));

        let stats = store.stats();
        assert_eq!(stats.records_appended, 5);
        assert_eq!(stats.records_evicted, 2);
        assert_eq!(stats.bytes_evicted, 600);
    }

    #[test]
    fn test_rotation_keeps_a_suffix_for_mixed_sizes() {
        let store = BoundedLogStore::new(1000);
        let sizes = [120, 450, 140, 300, 610, 150, 200, 999, 130];

        let mut appended: Vec<EventRecord> = Vec::new();
        for size in sizes {
            let record = sized_record(size);
            appended.push(record.clone());
            store.append(record);

            let current = store.drain_all();
            assert!(store.current_size_bytes() <= store.capacity_bytes());
            assert_size_consistent(&store);

            let suffix = &appended[appended.len() - current.len()..];
            assert_eq!(ids(&current), ids(suffix));
        }
    }

    #[test]
    fn test_oversized_record_is_kept_alone() {
        let store = BoundedLogStore::new(500);
        store.append(sized_record(200));
        store.append(sized_record(200));

        let big = sized_record(800);
        assert_eq!(store.append(big.clone()), 2);
        assert_eq!(ids(&store.drain_all()), vec![big.id()]);
        assert_eq!(store.current_size_bytes(), 800);

        // The next append rotates the oversized record out.
        let next = sized_record(150);
        assert_eq!(store.append(next.clone()), 1);
        assert_eq!(ids(&store.drain_all()), vec![next.id()]);
        assert_eq!(store.current_size_bytes(), 150);
    }

    #[test]
    fn test_drain_all_does_not_mutate() {
        let store = BoundedLogStore::new(1000);
        store.append(sized_record(200));
        store.append(sized_record(200));

        let first = store.drain_all();
        let second = store.drain_all();
        assert_eq!(first, second);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_remove_prefix_keeps_later_appends() {
        let store = BoundedLogStore::new(10_000);
        for _ in 0..3 {
            store.append(sized_record(200));
        }

        let snapshot = store.drain_all();
        let late: Vec<EventRecord> = (0..2).map(|_| sized_record(150)).collect();
        for record in late.clone() {
            store.append(record);
        }

        assert_eq!(store.remove_prefix(snapshot.len()), 3);
        assert_eq!(ids(&store.drain_all()), ids(&late));
        assert_eq!(store.current_size_bytes(), 300);
        assert_eq!(store.stats().records_removed, 3);
    }

    #[test]
    fn test_remove_prefix_clamps_to_length() {
        let store = BoundedLogStore::new(1000);
        store.append(sized_record(200));

        assert_eq!(store.remove_prefix(5), 1);
        assert!(store.is_empty());
        assert_eq!(store.current_size_bytes(), 0);
        assert_eq!(store.remove_prefix(1), 0);
    }

    #[test]
    fn test_remove_delivered_after_rotation() {
        let store = BoundedLogStore::new(1000);
        store.append(sized_record(300));
        store.append(sized_record(300));
        store.append(sized_record(300));
        let snapshot = store.drain_all();

        // Rotation during delivery evicts the first snapshot record.
        let late = sized_record(300);
        store.append(late.clone());

        assert_eq!(store.remove_delivered(&ids(&snapshot)), 2);
        assert_eq!(ids(&store.drain_all()), vec![late.id()]);
        assert_size_consistent(&store);
    }

    #[test]
    fn test_reset_clears_everything() {
        let store = BoundedLogStore::new(1000);
        store.append(sized_record(200));
        store.append(sized_record(200));

        store.reset();
        assert!(store.is_empty());
        assert_eq!(store.current_size_bytes(), 0);
    }

    #[test]
    fn test_concurrent_appends_keep_accounting() {
        let store = Arc::new(BoundedLogStore::new(5_000));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        let record =
                            EventRecord::custom(&json!({"thread": t, "seq": i})).unwrap();
                        store.append(record);
                        if i % 10 == 0 {
                            let snapshot = store.drain_all();
                            let sum: usize =
                                snapshot.iter().map(EventRecord::size_bytes).sum();
                            assert!(sum <= 5_000);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(store.current_size_bytes() <= 5_000);
        assert_size_consistent(&store);
        let stats = store.stats();
        assert_eq!(stats.records_appended, 400);
        assert_eq!(stats.records_evicted as usize + store.len(), 400);
    }

    /// Persistence whose writes block while `gate` is held.
    #[derive(Default)]
    struct GatedPersistence {
        gate: Mutex<()>,
        inner: MemoryPersistence,
    }

    impl Persistence for GatedPersistence {
        fn load_persisted(&self) -> Result<Vec<EventRecord>, PersistenceError> {
            self.inner.load_persisted()
        }

        fn persist(&self, records: &[EventRecord]) -> Result<(), PersistenceError> {
            let _open = self.gate.lock().unwrap();
            self.inner.persist(records)
        }
    }

    #[test]
    fn test_mutations_are_persisted_on_flush() {
        let persistence = Arc::new(MemoryPersistence::default());
        let store = BoundedLogStore::with_persistence(1000, persistence.clone());

        store.append(sized_record(200));
        store.append(sized_record(200));
        store.flush();
        assert_eq!(*persistence.records.lock().unwrap(), store.drain_all());

        store.remove_prefix(1);
        store.flush();
        assert_eq!(persistence.records.lock().unwrap().len(), 1);

        store.reset();
        store.flush();
        assert!(persistence.records.lock().unwrap().is_empty());
    }

    #[test]
    fn test_flush_without_changes_does_not_write() {
        let persistence = Arc::new(MemoryPersistence::default());
        let store = BoundedLogStore::with_persistence(1000, persistence.clone());

        store.flush();
        assert_eq!(persistence.writes.load(Ordering::SeqCst), 0);

        // In-memory stores have nothing to flush.
        BoundedLogStore::new(1000).flush();
    }

    #[test]
    fn test_append_does_not_wait_for_persistence() {
        let persistence = Arc::new(GatedPersistence::default());
        let store = BoundedLogStore::with_persistence(100_000, persistence.clone());

        let closed = persistence.gate.lock().unwrap();
        for _ in 0..200 {
            store.append(sized_record(200));
        }
        assert_eq!(store.len(), 200);
        assert_eq!(persistence.inner.writes.load(Ordering::SeqCst), 0);
        drop(closed);

        store.flush();
        assert_eq!(persistence.inner.records.lock().unwrap().len(), 200);
        assert!(persistence.inner.writes.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_persistence_writes_are_coalesced() {
        let persistence = Arc::new(MemoryPersistence::default());
        let store = BoundedLogStore::with_persistence(1024 * 1024, persistence.clone());

        for _ in 0..2000 {
            store.append(sized_record(200));
        }
        store.flush();

        assert_eq!(persistence.records.lock().unwrap().len(), 2000);
        let writes = persistence.writes.load(Ordering::SeqCst);
        assert!(writes < 100, "expected coalesced writes, got {}", writes);
    }

    #[test]
    fn test_failed_persist_keeps_records_in_memory() {
        let persistence = Arc::new(FailingPersistence::default());
        let store = BoundedLogStore::with_persistence(1000, persistence.clone());

        let records: Vec<EventRecord> = (0..3).map(|_| sized_record(200)).collect();
        for record in records.clone() {
            assert_eq!(store.append(record), 0);
        }
        store.flush();

        assert_eq!(store.drain_all(), records);
        assert_eq!(store.current_size_bytes(), 600);
        let attempts = persistence.attempts.load(Ordering::SeqCst);
        assert!(attempts >= 1);
        assert_eq!(store.stats().persist_failures as usize, attempts);

        // The next change is written again.
        store.append(sized_record(200));
        store.flush();
        assert_eq!(
            store.stats().persist_failures as usize,
            persistence.attempts.load(Ordering::SeqCst)
        );
        assert!(persistence.attempts.load(Ordering::SeqCst) > attempts);
    }

    #[test]
    fn test_reload_applies_current_capacity() {
        let persistence = Arc::new(MemoryPersistence::default());
        let records: Vec<EventRecord> = (0..4).map(|_| sized_record(300)).collect();
        *persistence.records.lock().unwrap() = records.clone();

        let store = BoundedLogStore::with_persistence(700, persistence.clone());

        assert_eq!(ids(&store.drain_all()), ids(&records[2..]));
        assert_eq!(store.current_size_bytes(), 600);
        store.flush();
        assert_eq!(persistence.records.lock().unwrap().len(), 2);
        assert_eq!(store.stats(), StoreStats::default());
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("events.json");
        let persistence = Arc::new(JsonFilePersistence::new(&path));

        let store = BoundedLogStore::with_persistence(1000, persistence.clone());
        let first = sized_record(200);
        let second = sized_record(250);
        store.append(first.clone());
        store.append(second.clone());
        drop(store);

        assert!(path.exists());
        assert!(!persistence.tmp_path().exists());

        let reopened = BoundedLogStore::with_persistence(1000, persistence);
        assert_eq!(reopened.drain_all(), vec![first, second]);
        assert_eq!(reopened.current_size_bytes(), 450);
    }

    #[test]
    fn test_json_file_missing_or_blank_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        let persistence = JsonFilePersistence::new(&path);
        assert!(persistence.load_persisted().unwrap().is_empty());

        fs::write(&path, "  \n").unwrap();
        assert!(persistence.load_persisted().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        fs::write(&path, "{not json").unwrap();

        let persistence = Arc::new(JsonFilePersistence::new(&path));
        assert!(matches!(
            persistence.load_persisted(),
            Err(PersistenceError::Json(_))
        ));

        let store = BoundedLogStore::with_persistence(1000, persistence);
        assert!(store.is_empty());

        store.append(sized_record(200));
        store.flush();
        assert_eq!(
            JsonFilePersistence::new(&path).load_persisted().unwrap().len(),
            1
        );
    }
}
