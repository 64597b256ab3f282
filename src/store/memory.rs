//! Embedded ordered key-value backend
//!
//! Rows live in one ordered map per partition. An optional [`WriteLog`]
//! makes writes survive restarts; log appends are serialized by an async
//! write-order lock and synced on the blocking pool, outside the table lock.
//! Every committed write is published on a broadcast change feed while the
//! table lock is held, so the feed order is the commit order.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::backend::{
    KeyValueBackend, QueryPage, QueryRequest, DEFAULT_PAGE_SIZE, MAX_BATCH_WRITE_ITEMS,
};
use super::log::{LogEntry, WriteLog};
use crate::error::{TelemetryError, TelemetryResult};
use crate::types::{
    item_key, AttributeValue, ChangeBatch, ChangeKind, ChangeRecord, Item, PARTITION_KEY,
    SORT_KEY,
};
use crate::utils::current_timestamp;

/// Configuration for the [`MemoryBackend`]
#[derive(Debug, Clone)]
pub struct MemoryBackendConfig {
    /// Items per query page when the request sets no limit
    pub page_size: usize,
    /// Change batches buffered for slow subscribers before they lag
    pub change_feed_capacity: usize,
}

impl Default for MemoryBackendConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            change_feed_capacity: 1024,
        }
    }
}

type Partition = BTreeMap<String, Item>;

#[derive(Default)]
struct TableState {
    partitions: BTreeMap<String, Partition>,
}

impl TableState {
    /// Apply a put; returns whether a row was replaced
    fn put(&mut self, pk: String, sk: String, item: Item) -> bool {
        self.partitions
            .entry(pk)
            .or_default()
            .insert(sk, item)
            .is_some()
    }

    /// Apply a delete; returns whether a row existed
    fn delete(&mut self, pk: &str, sk: &str) -> bool {
        let Some(partition) = self.partitions.get_mut(pk) else {
            return false;
        };
        let existed = partition.remove(sk).is_some();
        if partition.is_empty() {
            self.partitions.remove(pk);
        }
        existed
    }
}

/// Rows plus the change feed they publish to
struct Table {
    state: RwLock<TableState>,
    changes: broadcast::Sender<ChangeBatch>,
    sequence_counter: AtomicU64,
}

impl Table {
    fn change_record(&self, kind: ChangeKind, pk: &str, sk: &str, new_image: Option<Item>) -> ChangeRecord {
        let mut keys = Item::new();
        keys.insert(PARTITION_KEY.to_string(), AttributeValue::string(pk));
        keys.insert(SORT_KEY.to_string(), AttributeValue::string(sk));

        ChangeRecord {
            sequence_number: self.sequence_counter.fetch_add(1, Ordering::SeqCst),
            kind,
            keys,
            new_image,
            approximate_creation_time: current_timestamp(),
        }
    }

    fn publish(&self, batch: ChangeBatch) {
        if batch.is_empty() {
            return;
        }
        // Ignore send errors - they just mean nobody is listening
        let _ = self.changes.send(batch);
    }

    /// Apply puts and publish them while the table lock is held
    fn commit_puts(&self, keys: Vec<(String, String)>, items: Vec<Item>) {
        let mut state = self.state.write();
        let mut batch = Vec::with_capacity(items.len());
        for ((pk, sk), item) in keys.into_iter().zip(items) {
            let record_pk = pk.clone();
            let record_sk = sk.clone();
            let replaced = state.put(pk, sk, item.clone());
            let kind = if replaced {
                ChangeKind::Modify
            } else {
                ChangeKind::Insert
            };
            batch.push(self.change_record(kind, &record_pk, &record_sk, Some(item)));
        }
        self.publish(batch);
    }

    fn commit_delete(&self, pk: &str, sk: &str) {
        let mut state = self.state.write();
        if state.delete(pk, sk) {
            let record = self.change_record(ChangeKind::Remove, pk, sk, None);
            self.publish(vec![record]);
        }
    }
}

/// Write log plus the guard that keeps log order equal to commit order
struct Durability {
    log: Arc<Mutex<WriteLog>>,
    write_order: Arc<tokio::sync::Mutex<()>>,
}

/// In-process backend with ordered partitions and a change feed
pub struct MemoryBackend {
    table: Arc<Table>,
    durability: Option<Durability>,
    config: MemoryBackendConfig,
}

impl MemoryBackend {
    /// Create an empty, memory-only backend
    pub fn new() -> Self {
        Self::with_config(MemoryBackendConfig::default())
    }

    /// Create an empty, memory-only backend with custom settings
    pub fn with_config(config: MemoryBackendConfig) -> Self {
        Self::from_state(TableState::default(), None, config)
    }

    /// Open a backend persisted in a write log, replaying existing entries
    pub fn open<P: AsRef<Path>>(path: P, config: MemoryBackendConfig) -> TelemetryResult<Self> {
        let log = WriteLog::open(path)?;
        let entries = log.load()?;

        let mut state = TableState::default();
        for entry in &entries {
            match entry {
                LogEntry::Put { item } => {
                    // Entries without keys never reach the log
                    if let Some((pk, sk)) = item_key(item) {
                        let (pk, sk) = (pk.to_string(), sk.to_string());
                        state.put(pk, sk, item.clone());
                    }
                }
                LogEntry::Delete { pk, sk } => {
                    state.delete(pk, sk);
                }
            }
        }

        let rows: usize = state.partitions.values().map(|p| p.len()).sum();
        info!(
            path = %log.path().display(),
            entries = entries.len(),
            rows,
            "replayed write log"
        );

        Ok(Self::from_state(state, Some(log), config))
    }

    fn from_state(state: TableState, log: Option<WriteLog>, config: MemoryBackendConfig) -> Self {
        let (changes, _) = broadcast::channel(config.change_feed_capacity.max(1));
        Self {
            table: Arc::new(Table {
                state: RwLock::new(state),
                changes,
                sequence_counter: AtomicU64::new(0),
            }),
            durability: log.map(|log| Durability {
                log: Arc::new(Mutex::new(log)),
                write_order: Arc::new(tokio::sync::Mutex::new(())),
            }),
            config,
        }
    }

    /// Total number of stored rows
    pub fn item_count(&self) -> usize {
        self.table.state.read().partitions.values().map(|p| p.len()).sum()
    }

    fn owned_key(item: &Item) -> TelemetryResult<(String, String)> {
        item_key(item)
            .map(|(pk, sk)| (pk.to_string(), sk.to_string()))
            .ok_or_else(|| {
                TelemetryError::validation(format!(
                    "item is missing string {} / {} attributes",
                    PARTITION_KEY, SORT_KEY
                ))
            })
    }

    /// Log `entries`, then run `commit` against the table
    ///
    /// Without a log the commit runs inline. With one, the append, its sync
    /// and the commit run on the blocking pool so no table lock is held across
    /// disk I/O. The write-order guard travels with that task, so a dropped
    /// caller cannot reorder or half-apply a logged write.
    async fn durable_commit<F>(&self, entries: Vec<LogEntry>, commit: F) -> TelemetryResult<()>
    where
        F: FnOnce(&Table) + Send + 'static,
    {
        let Some(durability) = &self.durability else {
            commit(&self.table);
            return Ok(());
        };

        let order = durability.write_order.clone().lock_owned().await;
        let log = durability.log.clone();
        let table = self.table.clone();

        tokio::task::spawn_blocking(move || -> TelemetryResult<()> {
            let _order = order;
            log.lock().append(&entries)?;
            commit(&table);
            Ok(())
        })
        .await
        .map_err(|e| TelemetryError::store(format!("write log task failed: {}", e)))?
    }

    async fn write_items(&self, items: Vec<Item>) -> TelemetryResult<()> {
        let keys = items
            .iter()
            .map(Self::owned_key)
            .collect::<TelemetryResult<Vec<_>>>()?;

        let entries: Vec<LogEntry> = items
            .iter()
            .map(|item| LogEntry::Put { item: item.clone() })
            .collect();

        self.durable_commit(entries, move |table| table.commit_puts(keys, items))
            .await
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    async fn put_item(&self, item: Item) -> TelemetryResult<()> {
        self.write_items(vec![item]).await
    }

    async fn batch_write(&self, items: Vec<Item>) -> TelemetryResult<()> {
        if items.is_empty() || items.len() > MAX_BATCH_WRITE_ITEMS {
            return Err(TelemetryError::validation(format!(
                "batch write takes 1 to {} items, got {}",
                MAX_BATCH_WRITE_ITEMS,
                items.len()
            )));
        }
        debug!(items = items.len(), "batch write");
        self.write_items(items).await
    }

    async fn delete_item(&self, partition_key: &str, sort_key: &str) -> TelemetryResult<()> {
        let pk = partition_key.to_string();
        let sk = sort_key.to_string();
        let entries = vec![LogEntry::Delete {
            pk: pk.clone(),
            sk: sk.clone(),
        }];

        self.durable_commit(entries, move |table| table.commit_delete(&pk, &sk))
            .await
    }

    async fn query(&self, request: &QueryRequest) -> TelemetryResult<QueryPage> {
        let limit = request.limit.unwrap_or(self.config.page_size).max(1);
        let state = self.table.state.read();

        let Some(partition) = state.partitions.get(&request.partition_key) else {
            return Ok(QueryPage::default());
        };

        let start = request
            .condition
            .scan_start(request.exclusive_start_key.as_deref());

        let mut page = QueryPage::default();
        for (sk, item) in partition.range::<str, _>((start, Bound::Unbounded)) {
            if request.condition.is_past(sk) {
                break;
            }
            if !request.condition.matches(sk) {
                continue;
            }
            page.items.push(item.clone());
            if page.items.len() == limit {
                page.last_evaluated_key = Some(sk.clone());
                break;
            }
        }

        Ok(page)
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<ChangeBatch> {
        self.table.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::backend::SortKeyCondition;
    use tempfile::TempDir;

    fn item(pk: &str, sk: &str, value: i64) -> Item {
        let mut item = Item::new();
        item.insert(PARTITION_KEY.to_string(), AttributeValue::string(pk));
        item.insert(SORT_KEY.to_string(), AttributeValue::string(sk));
        item.insert("Value".to_string(), AttributeValue::number(value));
        item
    }

    fn values(page: &QueryPage) -> Vec<String> {
        page.items
            .iter()
            .map(|i| i["Value"].as_n().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_put_overwrites_same_key() {
        let backend = MemoryBackend::new();
        backend.put_item(item("A", "1", 1)).await.unwrap();
        backend.put_item(item("A", "1", 2)).await.unwrap();

        let page = backend
            .query(&QueryRequest::new("A", SortKeyCondition::All))
            .await
            .unwrap();
        assert_eq!(values(&page), vec!["2"]);
        assert_eq!(backend.item_count(), 1);
    }

    #[tokio::test]
    async fn test_put_rejects_item_without_keys() {
        let backend = MemoryBackend::new();
        let mut bad = Item::new();
        bad.insert("Value".to_string(), AttributeValue::number(1));
        let err = backend.put_item(bad).await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_batch_write_bounds() {
        let backend = MemoryBackend::new();
        assert!(backend.batch_write(vec![]).await.is_err());

        let too_many: Vec<Item> = (0..26).map(|i| item("A", &format!("{:02}", i), i)).collect();
        assert!(backend.batch_write(too_many).await.is_err());
        assert_eq!(backend.item_count(), 0);

        let full: Vec<Item> = (0..25).map(|i| item("A", &format!("{:02}", i), i)).collect();
        backend.batch_write(full).await.unwrap();
        assert_eq!(backend.item_count(), 25);
    }

    #[tokio::test]
    async fn test_query_between_and_pagination() {
        let backend = MemoryBackend::new();
        for i in 0..10 {
            backend.put_item(item("A", &format!("k{}", i), i)).await.unwrap();
        }
        backend.put_item(item("B", "k5", 99)).await.unwrap();

        let mut request =
            QueryRequest::new("A", SortKeyCondition::between("k2", "k6")).with_limit(2);

        let first = backend.query(&request).await.unwrap();
        assert_eq!(values(&first), vec!["2", "3"]);
        assert_eq!(first.last_evaluated_key.as_deref(), Some("k3"));

        request.exclusive_start_key = first.last_evaluated_key;
        let second = backend.query(&request).await.unwrap();
        assert_eq!(values(&second), vec!["4", "5"]);

        request.exclusive_start_key = second.last_evaluated_key;
        let third = backend.query(&request).await.unwrap();
        assert_eq!(values(&third), vec!["6"]);
        assert!(third.last_evaluated_key.is_none());
    }

    #[tokio::test]
    async fn test_query_inverted_range_is_empty() {
        let backend = MemoryBackend::new();
        backend.put_item(item("A", "k5", 5)).await.unwrap();

        let page = backend
            .query(&QueryRequest::new("A", SortKeyCondition::between("k9", "k1")))
            .await
            .unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_change_feed_kinds() {
        let backend = MemoryBackend::new();
        let mut rx = backend.subscribe_changes();

        backend.put_item(item("A", "1", 1)).await.unwrap();
        backend.put_item(item("A", "1", 2)).await.unwrap();
        backend.delete_item("A", "1").await.unwrap();
        // Absent row: no change emitted
        backend.delete_item("A", "1").await.unwrap();
        backend
            .batch_write(vec![item("A", "2", 2), item("A", "3", 3)])
            .await
            .unwrap();

        let insert = rx.recv().await.unwrap();
        assert_eq!(insert[0].kind, ChangeKind::Insert);
        assert_eq!(insert[0].sequence_number, 0);

        let modify = rx.recv().await.unwrap();
        assert_eq!(modify[0].kind, ChangeKind::Modify);

        let remove = rx.recv().await.unwrap();
        assert_eq!(remove[0].kind, ChangeKind::Remove);
        assert!(remove[0].new_image.is_none());

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].sequence_number, 4);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_open_replays_write_log() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("items.jsonl");

        {
            let backend = MemoryBackend::open(&path, MemoryBackendConfig::default()).unwrap();
            backend.put_item(item("A", "1", 1)).await.unwrap();
            backend
                .batch_write(vec![item("A", "2", 2), item("B", "1", 3)])
                .await
                .unwrap();
            backend.delete_item("A", "1").await.unwrap();
        }

        let reopened = MemoryBackend::open(&path, MemoryBackendConfig::default()).unwrap();
        assert_eq!(reopened.item_count(), 2);

        let page = reopened
            .query(&QueryRequest::new("A", SortKeyCondition::All))
            .await
            .unwrap();
        assert_eq!(values(&page), vec!["2"]);
    }

    #[tokio::test]
    async fn test_reads_proceed_while_log_sync_is_pending() {
        let temp_dir = TempDir::new().unwrap();
        let backend = Arc::new(
            MemoryBackend::open(temp_dir.path().join("items.jsonl"), MemoryBackendConfig::default())
                .unwrap(),
        );
        backend.put_item(item("A", "1", 1)).await.unwrap();

        // Hold the log so the next append stalls like a slow disk
        let held = backend.durability.as_ref().unwrap().log.lock();
        let writer = {
            let backend = backend.clone();
            tokio::spawn(async move { backend.put_item(item("A", "2", 2)).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let page = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            backend.query(&QueryRequest::new("A", SortKeyCondition::All)),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(values(&page), vec!["1"]);
        assert!(!writer.is_finished());

        drop(held);
        writer.await.unwrap().unwrap();
        assert_eq!(backend.item_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_logged_writes_feed_in_log_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("items.jsonl");
        let backend = Arc::new(MemoryBackend::open(&path, MemoryBackendConfig::default()).unwrap());
        let mut rx = backend.subscribe_changes();

        let writers: Vec<_> = (0..16)
            .map(|i| {
                let backend = backend.clone();
                tokio::spawn(async move { backend.put_item(item("A", &format!("{:02}", i), i)).await })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let mut fed = Vec::new();
        while fed.len() < 16 {
            for record in rx.recv().await.unwrap() {
                fed.push(record.keys[SORT_KEY].as_s().unwrap().to_string());
            }
        }

        let logged: Vec<String> = WriteLog::open(&path)
            .unwrap()
            .load()
            .unwrap()
            .into_iter()
            .filter_map(|entry| match entry {
                LogEntry::Put { item } => item_key(&item).map(|(_, sk)| sk.to_string()),
                LogEntry::Delete { .. } => None,
            })
            .collect();
        assert_eq!(fed, logged);
    }
}
