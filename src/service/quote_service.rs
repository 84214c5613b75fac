use crate::api::RemoteStore;
use crate::error::NexusError;
use crate::types::{NewQuote, Quote, QuoteQuery};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Quote CRUD against the remote store.
///
/// Reads degrade to an empty list when the store is unreachable; writes
/// validate their input before touching the network and report every
/// failure to the caller.
#[derive(Clone)]
pub struct QuoteService {
    remote: Option<Arc<dyn RemoteStore>>,
}

impl QuoteService {
    pub fn new(remote: Option<Arc<dyn RemoteStore>>) -> Self {
        Self { remote }
    }

    /// All quotes ordered by id; empty when the store is missing or failing.
    pub async fn list_quotes(&self) -> Vec<Quote> {
        let Some(remote) = self.remote.as_ref() else {
            debug!("remote store not configured; no quotes to list");
            return Vec::new();
        };
        match remote.list_quotes().await {
            Ok(quotes) => {
                debug!(count = quotes.len(), "quotes loaded");
                quotes
            }
            Err(e) => {
                error!(error = %e, "failed to load quotes");
                Vec::new()
            }
        }
    }

    pub async fn create_quote(&self, text: &str, author: &str) -> Result<(), NexusError> {
        let quote = NewQuote::new(text, author)?;
        self.store()?.insert_quote(&quote).await?;
        info!(author = %quote.author(), "quote created");
        Ok(())
    }

    pub async fn update_quote(&self, id: i64, text: &str, author: &str) -> Result<(), NexusError> {
        let quote = NewQuote::new(text, author)?;
        self.store()?.update_quote(id, &quote).await?;
        info!(id, "quote updated");
        Ok(())
    }

    pub async fn delete_quote(&self, id: i64) -> Result<(), NexusError> {
        self.store()?.delete_quote(id).await?;
        info!(id, "quote deleted");
        Ok(())
    }

    pub async fn count_quotes(&self) -> Result<u64, NexusError> {
        self.store()?.count_quotes().await
    }

    /// Admin view: blank rows dropped, then filtered and sorted per `query`.
    pub async fn admin_list(&self, query: &QuoteQuery) -> Vec<Quote> {
        let quotes: Vec<Quote> = self
            .list_quotes()
            .await
            .into_iter()
            .filter(Quote::is_displayable)
            .collect();
        query.apply(&quotes)
    }

    fn store(&self) -> Result<&Arc<dyn RemoteStore>, NexusError> {
        self.remote.as_ref().ok_or(NexusError::NotConfigured)
    }
}
