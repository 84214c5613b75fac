use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbEntry {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}
