//! SQL DDL for the local fallback store.
//! SQLite-first design; a plain key/value table in the spirit of browser local storage.

/// SQLite schema with:
/// - `key` TEXT PRIMARY KEY (e.g. `motivationCount`)
/// - `value` TEXT, stored verbatim as the string the caller wrote
/// - `updated_at` TEXT, RFC3339 time of the last write
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS local_storage (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL -- RFC3339
);
"#;
