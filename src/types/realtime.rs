use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Row-change event type of a realtime subscription. `All` is the `*` wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "*")]
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeFilter {
    pub event: ChangeKind,
    pub schema: String,
    pub table: String,
}

impl ChangeFilter {
    pub fn new(table: impl Into<String>, event: ChangeKind) -> Self {
        Self {
            event,
            schema: "public".to_string(),
            table: table.into(),
        }
    }

    pub fn matches(&self, ev: &ChangeEvent) -> bool {
        ev.table == self.table && (self.event == ChangeKind::All || self.event == ev.kind)
    }
}

/// A row change pushed by the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub record: Value,
    pub old_record: Value,
}

impl ChangeEvent {
    /// `record.count` when it is a non-negative integer.
    pub fn count(&self) -> Option<u64> {
        self.record.get("count")?.as_u64()
    }
}
