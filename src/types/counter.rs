use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row of the single-row counter table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CounterRow {
    pub id: i64,
    pub count: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CountOnly {
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterPhase {
    /// Initial fetch in flight.
    Loading,
    /// Value reflects the last known remote or local value.
    Synced,
    /// An increment's remote write is in flight.
    Updating,
}

/// Where the held value last came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CountSource {
    Remote,
    Local,
    Push,
    Optimistic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub count: u64,
    pub phase: CounterPhase,
    pub source: CountSource,
    pub updated_at: DateTime<Utc>,
}

impl CounterSnapshot {
    pub fn loading() -> Self {
        Self {
            count: 0,
            phase: CounterPhase::Loading,
            source: CountSource::Local,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuoteStats {
    pub motivation_count: u64,
    pub quote_count: u64,
}
