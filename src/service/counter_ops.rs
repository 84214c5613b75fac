use crate::api::Remote;
use crate::db::LocalStorage;
use crate::error::NexusError;
use crate::types::CountSource;
use tracing::{debug, error, info, warn};

/// Reads and writes of the motivation counter against the remote store and the
/// local fallback. Every failure is logged here and degraded to a safe value.
#[derive(Clone)]
pub struct CounterOps {
    local: LocalStorage,
    remote: Option<Remote>,
}

impl CounterOps {
    pub fn new(local: LocalStorage, remote: Option<Remote>) -> Self {
        Self { local, remote }
    }

    pub fn remote(&self) -> Option<&Remote> {
        self.remote.as_ref()
    }

    /// Load-path read. Remote configured: remote value, lazily creating the row,
    /// `0` on error (local storage is not consulted). Not configured: cached value or `0`.
    pub async fn fetch_motivation_count(&self) -> (u64, CountSource) {
        if self.remote.is_none() {
            return (self.read_local().await.unwrap_or(0), CountSource::Local);
        }
        match self.fetch_remote_count().await {
            Ok(count) => (count, CountSource::Remote),
            Err(e) => {
                error!(error = %e, "failed to fetch motivation count");
                (0, CountSource::Remote)
            }
        }
    }

    /// Strict remote read used by refreshes; errors are returned to the caller.
    pub async fn fetch_remote_count(&self) -> Result<u64, NexusError> {
        let remote = self.remote.as_ref().ok_or(NexusError::NotConfigured)?;
        match remote.store.fetch_counter().await? {
            Some(count) => {
                self.store_local(count).await;
                Ok(count)
            }
            None => {
                info!("counter row missing; creating it with count 0");
                Ok(remote.store.insert_counter(0).await?.unwrap_or(0))
            }
        }
    }

    /// Create the counter row when it does not exist yet. No-op without a remote.
    pub async fn ensure_counter_row(&self) -> Result<(), NexusError> {
        let Some(remote) = self.remote.as_ref() else {
            return Ok(());
        };
        if remote.store.fetch_counter().await?.is_none() {
            remote.store.insert_counter(0).await?;
            info!("initialized remote counter row");
        }
        Ok(())
    }

    pub async fn read_local(&self) -> Option<u64> {
        self.local
            .motivation_count()
            .await
            .inspect_err(|e| warn!(error = %e, "failed to read cached motivation count"))
            .ok()
            .flatten()
    }

    pub async fn store_local(&self, count: u64) {
        match self.local.set_motivation_count(count).await {
            Ok(()) => debug!(count, "cached motivation count"),
            Err(e) => warn!(count, error = %e, "failed to cache motivation count"),
        }
    }

    /// Single attempt, gated on the table existence check. Returns whether the write landed.
    pub async fn write_remote(&self, count: u64) -> bool {
        let Some(remote) = self.remote.as_ref() else {
            return false;
        };
        match remote.store.counter_table_exists().await {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    table = %remote.layout().stats_table,
                    "counter table not found; skipping remote write"
                );
                return false;
            }
            Err(e) => {
                warn!(error = %e, "counter table check failed; skipping remote write");
                return false;
            }
        }
        match remote.store.update_counter(count).await {
            Ok(()) => {
                debug!(count, "remote motivation count updated");
                true
            }
            Err(e) => {
                error!(count, error = %e, "failed to update remote motivation count");
                false
            }
        }
    }
}
