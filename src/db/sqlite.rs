use crate::db::models::DbEntry;
use crate::db::schema::SQLITE_INIT;
use crate::error::NexusError;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::{str::FromStr, time::Duration};
use tracing::{info, warn};

pub type SqlitePool = Pool<Sqlite>;

/// Key of the cached motivation counter.
pub const MOTIVATION_COUNT_KEY: &str = "motivationCount";

/// Local persistent key/value store used as the counter fallback.
#[derive(Clone)]
pub struct LocalStorage {
    pool: SqlitePool,
}

impl LocalStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the SQLite file and apply the schema.
    pub async fn connect(database_url: &str) -> Result<Self, NexusError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .connect_with(connect_opts)
            .await?;
        let storage = Self::new(pool);
        storage.init_schema().await?;
        info!(database_url = %database_url, "local storage ready");
        Ok(storage)
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), NexusError> {
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn get_entry(&self, key: &str) -> Result<Option<DbEntry>, NexusError> {
        let entry = sqlx::query_as::<_, DbEntry>(
            "SELECT key, value, updated_at FROM local_storage WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    pub async fn get_item(&self, key: &str) -> Result<Option<String>, NexusError> {
        Ok(self.get_entry(key).await?.map(|e| e.value))
    }

    /// Upsert by key.
    pub async fn set_item(&self, key: &str, value: &str) -> Result<(), NexusError> {
        sqlx::query(
            r#"
            INSERT INTO local_storage (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Cached counter; an unparsable value reads as absent.
    pub async fn motivation_count(&self) -> Result<Option<u64>, NexusError> {
        let Some(raw) = self.get_item(MOTIVATION_COUNT_KEY).await? else {
            return Ok(None);
        };
        match raw.trim().parse::<u64>() {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                warn!(value = %raw, error = %e, "ignoring unparsable cached motivation count");
                Ok(None)
            }
        }
    }

    pub async fn set_motivation_count(&self, count: u64) -> Result<(), NexusError> {
        self.set_item(MOTIVATION_COUNT_KEY, &count.to_string())
            .await
    }
}
