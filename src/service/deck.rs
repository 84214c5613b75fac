use crate::error::NexusError;
use crate::service::quote_service::QuoteService;
use crate::types::Quote;
use rand::Rng;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// In-memory display list. Loaded once at startup; admin edits do not touch it
/// until an explicit reload.
#[derive(Clone, Default)]
pub struct QuoteDeck {
    quotes: Arc<RwLock<Vec<Quote>>>,
}

impl QuoteDeck {
    pub fn new(quotes: Vec<Quote>) -> Self {
        Self {
            quotes: Arc::new(RwLock::new(quotes)),
        }
    }

    /// Replace the display list with a fresh read from the store. Rows with a
    /// blank text or author are never shown.
    pub async fn reload(&self, service: &QuoteService) -> usize {
        let quotes: Vec<Quote> = service
            .list_quotes()
            .await
            .into_iter()
            .filter(Quote::is_displayable)
            .collect();
        let len = quotes.len();
        if len == 0 {
            warn!("display list is empty; quotes will be unavailable");
        }
        *self.write() = quotes;
        info!(count = len, "display list loaded");
        len
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Uniformly random entry; repeats allowed.
    pub fn pick(&self) -> Result<Quote, NexusError> {
        pick_random(&self.read(), &mut rand::rng()).cloned()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Quote>> {
        self.quotes
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Quote>> {
        self.quotes
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

pub fn pick_random<'a, R: Rng + ?Sized>(
    quotes: &'a [Quote],
    rng: &mut R,
) -> Result<&'a Quote, NexusError> {
    if quotes.is_empty() {
        return Err(NexusError::NoQuotesAvailable);
    }
    Ok(&quotes[rng.random_range(0..quotes.len())])
}
