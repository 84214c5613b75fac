//! Remote structured data store: table CRUD and row-change notifications.
//!
//! Layout:
//! - `postgrest.rs`: REST client for the hosted tables
//! - `realtime.rs`: websocket change feed
//! - `memory.rs`: in-process store with the same contract (local runs and tests)

pub mod memory;
pub mod postgrest;
pub mod realtime;

use crate::config::{Config, USER_AGENT};
use crate::error::NexusError;
use crate::types::{ChangeEvent, ChangeFilter, NewQuote, Quote};
use async_trait::async_trait;
use reqwest::header::{CONNECTION, HeaderMap, HeaderValue};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use memory::MemoryStore;
pub use postgrest::PostgrestStore;
pub use realtime::RealtimeFeed;

/// Table names and the counter row key used on the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    pub quotes_table: String,
    pub stats_table: String,
    pub counter_id: i64,
}

impl Default for RemoteLayout {
    fn default() -> Self {
        Self {
            quotes_table: "motivational_quotes".to_string(),
            stats_table: "motivation_stats".to_string(),
            counter_id: 1,
        }
    }
}

impl From<&Config> for RemoteLayout {
    fn from(cfg: &Config) -> Self {
        Self {
            quotes_table: cfg.quotes_table.clone(),
            stats_table: cfg.stats_table.clone(),
            counter_id: cfg.counter_id,
        }
    }
}

/// Table operations the service needs from the hosted store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    fn layout(&self) -> &RemoteLayout;

    /// All quotes ordered by id ascending.
    async fn list_quotes(&self) -> Result<Vec<Quote>, NexusError>;

    async fn insert_quote(&self, quote: &NewQuote) -> Result<(), NexusError>;

    /// `NexusError::NotFound` when no row has this id.
    async fn update_quote(&self, id: i64, quote: &NewQuote) -> Result<(), NexusError>;

    /// `NexusError::NotFound` when no row has this id.
    async fn delete_quote(&self, id: i64) -> Result<(), NexusError>;

    async fn count_quotes(&self) -> Result<u64, NexusError>;

    /// `Ok(None)` when the counter row does not exist.
    async fn fetch_counter(&self) -> Result<Option<u64>, NexusError>;

    /// Insert the counter row and return the stored count.
    async fn insert_counter(&self, count: u64) -> Result<Option<u64>, NexusError>;

    async fn update_counter(&self, count: u64) -> Result<(), NexusError>;

    /// Lightweight existence check of the counter table.
    async fn counter_table_exists(&self) -> Result<bool, NexusError>;
}

/// Push channel of row changes, scoped by table and event type.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self, filter: ChangeFilter) -> Subscription;
}

/// A live subscription. Dropping it tears the underlying channel down.
pub struct Subscription {
    rx: mpsc::Receiver<ChangeEvent>,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<ChangeEvent>, task: JoinHandle<()>) -> Self {
        Self { rx, task }
    }

    /// Next matching change, or `None` once the channel has closed.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A configured remote: table access plus its change feed.
#[derive(Clone)]
pub struct Remote {
    pub store: Arc<dyn RemoteStore>,
    pub feed: Arc<dyn ChangeFeed>,
}

impl Remote {
    /// Hosted store from configuration; `Ok(None)` when URL or key is empty.
    pub fn from_config(cfg: &Config, client: reqwest::Client) -> Result<Option<Self>, NexusError> {
        if !cfg.remote_configured() {
            return Ok(None);
        }
        let layout = RemoteLayout::from(cfg);
        let store = PostgrestStore::new(
            client,
            cfg.supabase_url.trim(),
            cfg.supabase_anon_key.trim(),
            layout,
        )?;
        let feed = RealtimeFeed::new(cfg.supabase_url.trim(), cfg.supabase_anon_key.trim())?;
        Ok(Some(Self {
            store: Arc::new(store),
            feed: Arc::new(feed),
        }))
    }

    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            store: store.clone(),
            feed: store,
        }
    }

    pub fn layout(&self) -> &RemoteLayout {
        self.store.layout()
    }
}

/// Shared HTTP client for the REST API.
pub fn build_client(cfg: &Config) -> Result<reqwest::Client, NexusError> {
    let mut headers = HeaderMap::new();

    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10));

    if let Some(proxy_url) = cfg.proxy.clone() {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
    }

    if !cfg.enable_multiplexing {
        headers.insert(CONNECTION, HeaderValue::from_static("close"));

        builder = builder
            .http1_only()
            .pool_max_idle_per_host(0)
            .pool_idle_timeout(Duration::from_secs(0));
    } else {
        builder = builder.http2_adaptive_window(true);
    }

    Ok(builder.default_headers(headers).build()?)
}
