use super::{ChangeFeed, RemoteLayout, RemoteStore, Subscription};
use crate::error::{NexusError, PostgrestError};
use crate::types::{ChangeEvent, ChangeFilter, ChangeKind, NewQuote, Quote};
use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

#[derive(Debug, Default)]
struct Tables {
    quotes: Vec<Quote>,
    next_id: i64,
    counter: Option<u64>,
    stats_table_missing: bool,
}

/// In-process remote store with the hosted store's contract, including change
/// notifications. Can be switched into a failing mode to simulate an unreachable service.
pub struct MemoryStore {
    layout: RemoteLayout,
    tables: Mutex<Tables>,
    changes: broadcast::Sender<ChangeEvent>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(RemoteLayout::default())
    }
}

impl MemoryStore {
    pub fn new(layout: RemoteLayout) -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            layout,
            tables: Mutex::new(Tables {
                next_id: 1,
                ..Default::default()
            }),
            changes,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Seed rows as-is (ids kept); new inserts continue after the highest id.
    pub fn with_quotes(self, quotes: Vec<Quote>) -> Self {
        {
            let mut t = self.lock();
            t.next_id = quotes.iter().filter_map(|q| q.id).max().unwrap_or(0) + 1;
            t.quotes = quotes;
        }
        self
    }

    pub fn with_counter(self, count: u64) -> Self {
        self.lock().counter = Some(count);
        self
    }

    /// Every table operation fails with a 503 while set.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make the counter table look absent to the existence check.
    pub fn set_stats_table_missing(&self, missing: bool) {
        self.lock().stats_table_missing = missing;
    }

    /// Number of table operations attempted so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn counter(&self) -> Option<u64> {
        self.lock().counter
    }

    /// Push a change to subscribers as if another session had written it.
    pub fn emit(&self, event: ChangeEvent) {
        let _ = self.changes.send(event);
    }

    /// Overwrite the stored counter without notifying subscribers.
    pub fn set_counter(&self, count: u64) {
        self.lock().counter = Some(count);
    }

    /// Write the counter from "another session": stores it and pushes an UPDATE.
    pub fn external_counter_write(&self, count: u64) {
        self.lock().counter = Some(count);
        self.emit_counter(count);
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> Result<(), NexusError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(NexusError::Remote {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: PostgrestError {
                    message: Some("store unavailable".to_string()),
                    ..Default::default()
                },
            });
        }
        Ok(())
    }

    fn emit_quote(&self, kind: ChangeKind, record: Value, old_record: Value) {
        self.emit(ChangeEvent {
            table: self.layout.quotes_table.clone(),
            kind,
            record,
            old_record,
        });
    }

    fn emit_counter(&self, count: u64) {
        self.emit(ChangeEvent {
            table: self.layout.stats_table.clone(),
            kind: ChangeKind::Update,
            record: json!({ "id": self.layout.counter_id, "count": count }),
            old_record: json!({ "id": self.layout.counter_id }),
        });
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn layout(&self) -> &RemoteLayout {
        &self.layout
    }

    async fn list_quotes(&self) -> Result<Vec<Quote>, NexusError> {
        self.begin()?;
        let mut quotes = self.lock().quotes.clone();
        quotes.sort_by_key(|q| q.id);
        Ok(quotes)
    }

    async fn insert_quote(&self, quote: &NewQuote) -> Result<(), NexusError> {
        self.begin()?;
        let row = {
            let mut t = self.lock();
            let row = Quote {
                id: Some(t.next_id),
                text: quote.text().to_string(),
                author: quote.author().to_string(),
            };
            t.next_id += 1;
            t.quotes.push(row.clone());
            row
        };
        self.emit_quote(ChangeKind::Insert, serde_json::to_value(&row)?, Value::Null);
        Ok(())
    }

    async fn update_quote(&self, id: i64, quote: &NewQuote) -> Result<(), NexusError> {
        self.begin()?;
        let row = {
            let mut t = self.lock();
            let Some(row) = t.quotes.iter_mut().find(|q| q.id == Some(id)) else {
                return Err(NexusError::NotFound(id));
            };
            row.text = quote.text().to_string();
            row.author = quote.author().to_string();
            row.clone()
        };
        self.emit_quote(
            ChangeKind::Update,
            serde_json::to_value(&row)?,
            json!({ "id": id }),
        );
        Ok(())
    }

    async fn delete_quote(&self, id: i64) -> Result<(), NexusError> {
        self.begin()?;
        {
            let mut t = self.lock();
            let before = t.quotes.len();
            t.quotes.retain(|q| q.id != Some(id));
            if t.quotes.len() == before {
                return Err(NexusError::NotFound(id));
            }
        }
        self.emit_quote(ChangeKind::Delete, Value::Null, json!({ "id": id }));
        Ok(())
    }

    async fn count_quotes(&self) -> Result<u64, NexusError> {
        self.begin()?;
        Ok(self.lock().quotes.len() as u64)
    }

    async fn fetch_counter(&self) -> Result<Option<u64>, NexusError> {
        self.begin()?;
        Ok(self.lock().counter)
    }

    async fn insert_counter(&self, count: u64) -> Result<Option<u64>, NexusError> {
        self.begin()?;
        let mut t = self.lock();
        if t.counter.is_some() {
            return Err(NexusError::Remote {
                status: StatusCode::CONFLICT,
                body: PostgrestError {
                    code: Some("23505".to_string()),
                    message: Some("duplicate key value violates unique constraint".to_string()),
                    ..Default::default()
                },
            });
        }
        t.counter = Some(count);
        Ok(Some(count))
    }

    async fn update_counter(&self, count: u64) -> Result<(), NexusError> {
        self.begin()?;
        {
            let mut t = self.lock();
            if t.counter.is_none() {
                // PATCH on a missing row matches nothing and succeeds.
                return Ok(());
            }
            t.counter = Some(count);
        }
        self.emit_counter(count);
        Ok(())
    }

    async fn counter_table_exists(&self) -> Result<bool, NexusError> {
        self.begin()?;
        Ok(!self.lock().stats_table_missing)
    }
}

impl ChangeFeed for MemoryStore {
    fn subscribe(&self, filter: ChangeFilter) -> Subscription {
        let mut changes = self.changes.subscribe();
        let (tx, rx) = mpsc::channel(64);
        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(event) if filter.matches(&event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, table = %filter.table, "change subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Subscription::new(rx, task)
    }
}
