//! Durable, most-recent-first collection of content batches.
//!
//! Every mutation is written through the persistence port before the call
//! returns. Write failures are logged and swallowed: memory stays
//! authoritative for the rest of the process.
use crate::kv::{KvStore, HISTORY_KEY};
use crate::model::{BatchId, ContentBatch};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

pub struct HistoryStore {
    kv: Arc<dyn KvStore>,
    // Held across the persist call so writes land in mutation order.
    entries: Mutex<Vec<ContentBatch>>,
}

impl HistoryStore {
    /// Read the persisted collection. Missing or unreadable documents yield
    /// an empty history; unreadable entries are skipped one by one.
    #[instrument(skip_all)]
    pub async fn load(kv: Arc<dyn KvStore>) -> Self {
        let entries = match kv.get(HISTORY_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Value>>(&raw) {
                Ok(values) => parse_entries(values),
                Err(err) => {
                    warn!(?err, "stored history is unreadable; starting empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(?err, "failed to read history");
                Vec::new()
            }
        };
        debug!(count = entries.len(), "history loaded");
        Self {
            kv,
            entries: Mutex::new(entries),
        }
    }

    /// Insert at the head.
    pub async fn append(&self, entry: ContentBatch) {
        let mut entries = self.entries.lock().await;
        entries.insert(0, entry);
        self.persist(&entries).await;
    }

    /// Apply `mutator` to every entry matching `predicate`; returns how many
    /// entries matched. Nothing is written when nothing matched.
    pub async fn update_where<P, M>(&self, predicate: P, mut mutator: M) -> usize
    where
        P: Fn(&ContentBatch) -> bool,
        M: FnMut(&mut ContentBatch),
    {
        let mut entries = self.entries.lock().await;
        let mut matched = 0;
        for entry in entries.iter_mut().filter(|e| predicate(e)) {
            mutator(entry);
            matched += 1;
        }
        if matched > 0 {
            self.persist(&entries).await;
        }
        matched
    }

    /// Mutate the entry with `id`. The mutator reports whether it changed
    /// anything; unchanged entries are not rewritten. Returns the entry after
    /// mutation, or `None` if no entry has that id.
    pub async fn update_by_id<M>(&self, id: &BatchId, mutator: M) -> Option<ContentBatch>
    where
        M: FnOnce(&mut ContentBatch) -> bool,
    {
        let mut entries = self.entries.lock().await;
        let entry = entries.iter_mut().find(|e| e.id() == id)?;
        let changed = mutator(entry);
        let snapshot = entry.clone();
        if changed {
            self.persist(&entries).await;
        }
        Some(snapshot)
    }

    /// Removing an unknown id is a no-op.
    pub async fn remove_by_id(&self, id: &BatchId) -> bool {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| e.id() != id);
        let removed = entries.len() != before;
        if removed {
            self.persist(&entries).await;
        }
        removed
    }

    pub async fn get(&self, id: &BatchId) -> Option<ContentBatch> {
        let entries = self.entries.lock().await;
        entries.iter().find(|e| e.id() == id).cloned()
    }

    pub async fn all(&self) -> Vec<ContentBatch> {
        self.entries.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    async fn persist(&self, entries: &[ContentBatch]) {
        let raw = match serde_json::to_string(entries) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(?err, "failed to serialize history");
                return;
            }
        };
        if let Err(err) = self.kv.set(HISTORY_KEY, &raw).await {
            warn!(?err, "failed to persist history; keeping in-memory state");
        }
    }
}

fn parse_entries(values: Vec<Value>) -> Vec<ContentBatch> {
    values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value::<ContentBatch>(value) {
            Ok(entry) if entry.platforms().is_empty() => {
                warn!(index, id = %entry.id(), "skipping stored entry without platforms");
                None
            }
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(index, ?err, "skipping unreadable stored entry");
                None
            }
        })
        .collect()
}
